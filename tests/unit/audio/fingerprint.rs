use super::*;

fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "moozic_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn fingerprint_is_deterministic_for_unchanged_file() {
    let tmp = temp_dir("fp_stable");
    let p = tmp.join("a.wav");
    std::fs::write(&p, b"RIFF....").unwrap();
    for mode in [FingerprintMode::Metadata, FingerprintMode::Content] {
        assert_eq!(fingerprint_file(&p, mode).unwrap(), fingerprint_file(&p, mode).unwrap());
    }
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn content_change_changes_fingerprint() {
    let tmp = temp_dir("fp_change");
    let p = tmp.join("a.wav");
    std::fs::write(&p, b"one").unwrap();
    let meta_a = fingerprint_file(&p, FingerprintMode::Metadata).unwrap();
    let content_a = fingerprint_file(&p, FingerprintMode::Content).unwrap();
    std::fs::write(&p, b"three").unwrap();
    assert_ne!(meta_a, fingerprint_file(&p, FingerprintMode::Metadata).unwrap());
    assert_ne!(content_a, fingerprint_file(&p, FingerprintMode::Content).unwrap());
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn content_mode_ignores_location_but_metadata_mode_does_not() {
    let tmp = temp_dir("fp_location");
    let a = tmp.join("a.wav");
    let b = tmp.join("b.wav");
    std::fs::write(&a, b"same bytes").unwrap();
    std::fs::write(&b, b"same bytes").unwrap();
    assert_eq!(
        fingerprint_file(&a, FingerprintMode::Content).unwrap(),
        fingerprint_file(&b, FingerprintMode::Content).unwrap()
    );
    assert_ne!(
        fingerprint_file(&a, FingerprintMode::Metadata).unwrap(),
        fingerprint_file(&b, FingerprintMode::Metadata).unwrap()
    );
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn missing_source_is_an_io_error() {
    let tmp = temp_dir("fp_missing");
    let err = fingerprint_file(&tmp.join("nope.mp3"), FingerprintMode::Content).unwrap_err();
    assert!(matches!(err, MoozicError::Io { .. }));
    assert!(err.is_not_found());
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn hex_roundtrip_and_combine_order() {
    let a = Fingerprint { hi: 1, lo: 2 };
    let b = Fingerprint { hi: 3, lo: 4 };
    assert_eq!(Fingerprint::from_hex(&a.to_hex()), Some(a));
    assert_eq!(a.to_hex().len(), 32);
    assert!(Fingerprint::from_hex("xyz").is_none());
    assert_ne!(Fingerprint::combine(&[a, b]), Fingerprint::combine(&[b, a]));
    assert_eq!(Fingerprint::combine(&[a, b]), Fingerprint::combine(&[a, b]));
}
