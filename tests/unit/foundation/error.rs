use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        MoozicError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        MoozicError::conversion("x")
            .to_string()
            .contains("conversion error:")
    );
    assert!(
        MoozicError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
    let io = MoozicError::io("a/b.ogg", std::io::Error::other("denied"));
    assert!(io.to_string().starts_with("io error at 'a/b.ogg'"));
}

#[test]
fn timeout_counts_as_conversion_failure() {
    let err = MoozicError::Timeout {
        tool: "ffmpeg".to_string(),
        secs: 3,
    };
    assert!(err.is_conversion_failure());
    assert!(err.to_string().contains("within 3s"));
    assert!(!MoozicError::validation("x").is_conversion_failure());
}

#[test]
fn missing_assets_are_not_found() {
    let err = MoozicError::from(CoverError::MissingBase {
        path: "cover.png".into(),
    });
    assert!(err.is_not_found());
    assert!(err.to_string().contains("compositing error:"));

    let err = MoozicError::from(CoverError::UnsupportedImage {
        path: "cover.png".into(),
        reason: "bad header".to_string(),
    });
    assert!(!err.is_not_found());

    let err = MoozicError::io(
        "gone.mp3",
        std::io::Error::from(std::io::ErrorKind::NotFound),
    );
    assert!(err.is_not_found());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = MoozicError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
