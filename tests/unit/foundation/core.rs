use super::*;

#[test]
fn sanitize_id_folds_diacritics_and_drops_symbols() {
    assert_eq!(sanitize_id("Café del Mar"), "CafedelMar");
    assert_eq!(sanitize_id("track-01 (live)!"), "track01live");
    assert_eq!(sanitize_id("Ünïcödé"), "Unicode");
}

#[test]
fn sanitize_id_defaults_and_caps() {
    assert_eq!(sanitize_id(""), "Track");
    assert_eq!(sanitize_id("---"), "Track");
    let long = "a".repeat(100);
    assert_eq!(sanitize_id(&long).len(), MAX_ITEM_KEY_LEN);
}

#[test]
fn mod_id_rules() {
    assert!(validate_mod_id("My_Mixtape2").is_ok());
    assert!(validate_mod_id("").is_err());
    assert!(validate_mod_id("has space").is_err());
    assert!(validate_mod_id("dash-ed").is_err());
    assert!(validate_mod_id(&"x".repeat(MAX_MOD_ID_LEN + 1)).is_err());
}

#[test]
fn display_name_replaces_underscores() {
    assert_eq!(
        display_name_from_stem(Path::new("music/Night_Drive.mp3")),
        "Night Drive"
    );
    assert_eq!(display_name_from_stem(Path::new("_.wav")), "Track");
}

#[test]
fn cancel_token_is_shared_between_clones() {
    let a = CancelToken::new();
    let b = a.clone();
    assert!(!b.is_cancelled());
    a.cancel();
    assert!(b.is_cancelled());
}

#[test]
fn partial_path_is_a_hidden_sibling() {
    let p = partial_path(Path::new("/tmp/x/song.ogg"));
    assert_eq!(p.parent(), Some(Path::new("/tmp/x")));
    let name = p.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(".song.ogg.partial-"));
    assert!(name.ends_with(".ogg"));
    assert_ne!(p, partial_path(Path::new("/tmp/x/song.ogg")));
}
