use super::*;
use std::path::Path;

#[test]
fn defaults_are_usable() {
    let cfg = BuildConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.policy, BackendPolicy::Auto);
    assert!(!cfg.force);
    assert_eq!(cfg.convert_timeout, Duration::from_secs(300));
    let n = cfg.effective_threads();
    assert!((1..=MAX_DEFAULT_THREADS).contains(&n));
}

#[test]
fn zero_threads_is_rejected() {
    let cfg = BuildConfig {
        threads: Some(0),
        ..BuildConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(MoozicError::Validation(_))));

    let cfg = BuildConfig {
        threads: Some(3),
        ..BuildConfig::default()
    };
    cfg.validate().unwrap();
    assert_eq!(cfg.effective_threads(), 3);
}

#[test]
fn asset_and_output_paths() {
    let cfg = BuildConfig {
        output_dir: PathBuf::from("out"),
        assets_root: PathBuf::from("a"),
        ..BuildConfig::default()
    };
    assert_eq!(cfg.masks_dir(), Path::new("a/masks"));
    assert_eq!(cfg.covers_dir(), Path::new("a/covers"));
    assert_eq!(cfg.default_poster(), Path::new("a/poster/poster.png"));
    assert_eq!(cfg.default_icon(), Path::new("a/poster/icon.png"));
    assert_eq!(cfg.models_dir(), Path::new("a/models_X/WorldItems"));
    assert_eq!(cfg.tree_dir("M"), Path::new("out/M"));
    let staging = cfg.staging_dir("M");
    assert_eq!(staging.parent(), Some(Path::new("out")));
    assert!(
        staging
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(".M.staging-"))
    );
    let retired = cfg.retired_dir("M");
    assert_eq!(retired.parent(), Some(Path::new("out")));
    assert_ne!(retired, staging);
}

#[test]
fn backend_opts_mirror_config() {
    let cfg = BuildConfig {
        convert_timeout: Duration::from_secs(7),
        cancel_grace: Duration::from_millis(50),
        ffmpeg_candidates: vec![PathBuf::from("/opt/ffmpeg")],
        ..BuildConfig::default()
    };
    let opts = cfg.backend_opts();
    assert_eq!(opts.timeout, Duration::from_secs(7));
    assert_eq!(opts.cancel_grace, Duration::from_millis(50));
    assert_eq!(opts.ffmpeg_candidates, vec![PathBuf::from("/opt/ffmpeg")]);
}
