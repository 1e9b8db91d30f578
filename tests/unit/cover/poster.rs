use super::*;
use crate::foundation::error::{CoverError, MoozicError};

#[test]
fn renders_both_sizes_opaque() {
    let tmp = std::env::temp_dir().join(format!(
        "moozic_poster_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&tmp).unwrap();
    let src = tmp.join("poster.png");
    image::RgbaImage::from_pixel(300, 100, image::Rgba([10, 200, 30, 128]))
        .save(&src)
        .unwrap();

    let imgs = render_workshop_images(&src).unwrap();
    assert_eq!((imgs.poster.width, imgs.poster.height), (POSTER_SIDE, POSTER_SIDE));
    assert_eq!((imgs.preview.width, imgs.preview.height), (PREVIEW_SIDE, PREVIEW_SIDE));
    assert!(imgs.poster.data.chunks_exact(4).all(|p| p[3] == 255));
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn missing_source_is_missing_base() {
    let err = render_workshop_images(Path::new("/definitely/not/here.png")).unwrap_err();
    assert!(matches!(err, MoozicError::Cover(CoverError::MissingBase { .. })));
}
