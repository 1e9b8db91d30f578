use super::*;

fn temp_dir(name: &str) -> PathBuf {
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

const RED: [u8; 4] = [220, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 200, 255];

/// 8x8 mask: opaque red border, magenta centre 4x4, cyan row under it.
fn write_masks(dir: &Path, variant: MaskVariant, with_overlay: bool) {
    let mask = RgbaImage::from_fn(8, 8, |x, y| {
        let px = if (2..6).contains(&x) && (2..6).contains(&y) {
            [255, 0, 255, 255]
        } else if (2..6).contains(&x) && y == 6 {
            [0, 255, 255, 255]
        } else if x == 0 || y == 0 || x == 7 || y == 7 {
            RED
        } else {
            [0, 0, 0, 0]
        };
        image::Rgba(px)
    });
    mask.save(dir.join(format!("{}.png", variant.asset_name())))
        .unwrap();
    if with_overlay {
        let overlay = RgbaImage::from_fn(8, 8, |x, y| {
            image::Rgba(if x == 3 && y == 3 { RED } else { [0, 0, 0, 0] })
        });
        overlay
            .save(dir.join(format!("{}_overlay.png", variant.asset_name())))
            .unwrap();
    }
}

fn px(t: &Texture, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * t.width + x) * 4) as usize;
    [t.data[i], t.data[i + 1], t.data[i + 2], t.data[i + 3]]
}

fn solid(w: u32, h: u32, c: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, image::Rgba(c))
}

#[test]
fn base_fills_region_and_frame_stays_outside() {
    let tmp = temp_dir("compose_region");
    write_masks(&tmp, MaskVariant::CassetteFront, false);
    let c = Compositor::new(&tmp);
    let t = c
        .composite_sized(&solid(16, 16, BLUE), MaskVariant::CassetteFront, 8, 8)
        .unwrap();
    assert_eq!(px(&t, 3, 3), BLUE);
    assert_eq!(px(&t, 0, 0), RED);
    assert_eq!(px(&t, 1, 1), [0, 0, 0, 0]);
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn trim_region_is_darkened_per_variant() {
    let tmp = temp_dir("compose_trim");
    write_masks(&tmp, MaskVariant::CassetteFront, false);
    write_masks(&tmp, MaskVariant::VinylInner, false);
    let c = Compositor::new(&tmp);
    let base = solid(8, 8, [200, 200, 200, 255]);
    let cassette = c
        .composite_sized(&base, MaskVariant::CassetteFront, 8, 8)
        .unwrap();
    let vinyl = c
        .composite_sized(&base, MaskVariant::VinylInner, 8, 8)
        .unwrap();
    assert_eq!(px(&cassette, 3, 6), [100, 100, 100, 255]);
    assert_eq!(px(&vinyl, 3, 6), [168, 168, 168, 255]);
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn layering_decides_who_occludes() {
    let tmp = temp_dir("compose_layering");
    write_masks(&tmp, MaskVariant::CassetteFront, true);
    write_masks(&tmp, MaskVariant::VinylOuter, true);
    let c = Compositor::new(&tmp);
    let base = solid(8, 8, BLUE);

    let under = c
        .composite_sized(&base, MaskVariant::CassetteFront, 8, 8)
        .unwrap();
    assert_eq!(px(&under, 3, 3), RED, "frame must occlude the base");
    assert_eq!(px(&under, 4, 4), BLUE);

    let over = c
        .composite_sized(&base, MaskVariant::VinylOuter, 8, 8)
        .unwrap();
    assert_eq!(px(&over, 3, 3), BLUE, "base must sit on top of the frame");
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn compositing_is_pixel_identical_across_runs() {
    let tmp = temp_dir("compose_determinism");
    write_masks(&tmp, MaskVariant::VinylOuter, true);
    let base = RgbaImage::from_fn(37, 23, |x, y| {
        image::Rgba([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, 255])
    });
    let a = Compositor::new(&tmp)
        .composite_image(&base, MaskVariant::VinylOuter, ResolutionTier::Standard)
        .unwrap();
    let b = Compositor::new(&tmp)
        .composite_image(&base, MaskVariant::VinylOuter, ResolutionTier::Standard)
        .unwrap();
    assert_eq!(a, b);
    assert_eq!((a.width, a.height), (150, 150));
    assert_eq!(a.encode_png().unwrap(), b.encode_png().unwrap());
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn high_res_tier_grows_with_base_and_caps() {
    assert_eq!(
        tier_side(MaskVariant::CassetteFront, ResolutionTier::Standard, (4000, 4000)),
        256
    );
    assert_eq!(
        tier_side(MaskVariant::CassetteFront, ResolutionTier::HighRes, (1000, 600)),
        1000
    );
    assert_eq!(
        tier_side(MaskVariant::VinylInner, ResolutionTier::HighRes, (5000, 100)),
        MAX_HIGH_RES_SIDE
    );
    assert_eq!(
        tier_side(MaskVariant::VinylInner, ResolutionTier::HighRes, (20, 20)),
        150
    );
}

#[test]
fn missing_base_mask_and_bad_image_are_distinct_errors() {
    let tmp = temp_dir("compose_errors");
    let c = Compositor::new(&tmp);

    let err = c
        .composite(&tmp.join("nope.png"), MaskVariant::CassetteFront, ResolutionTier::Standard)
        .unwrap_err();
    assert!(matches!(err, MoozicError::Cover(CoverError::MissingBase { .. })));

    let base_path = tmp.join("base.png");
    solid(4, 4, BLUE).save(&base_path).unwrap();
    let err = c
        .composite(&base_path, MaskVariant::CassetteFront, ResolutionTier::Standard)
        .unwrap_err();
    assert!(matches!(err, MoozicError::Cover(CoverError::MissingMask { .. })));

    let junk = tmp.join("junk.png");
    std::fs::write(&junk, b"not an image").unwrap();
    let err = c
        .composite(&junk, MaskVariant::CassetteFront, ResolutionTier::Standard)
        .unwrap_err();
    assert!(matches!(err, MoozicError::Cover(CoverError::UnsupportedImage { .. })));
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn cover_crop_fills_exact_size() {
    let img = solid(100, 50, BLUE);
    let out = cover_crop(&img, 30, 30);
    assert_eq!(out.dimensions(), (30, 30));
    assert_eq!(out.get_pixel(15, 15).0, BLUE);
}

#[test]
fn letterbox_keeps_aspect_on_background() {
    let img = solid(100, 50, BLUE);
    let out = letterbox_square(&img, 64, [0, 0, 0, 255]);
    assert_eq!(out.dimensions(), (64, 64));
    assert_eq!(out.get_pixel(32, 2).0, [0, 0, 0, 255]);
    assert_eq!(out.get_pixel(32, 32).0, BLUE);
}

#[test]
fn letterbox_on_opaque_backdrop_is_fully_opaque() {
    let img = solid(30, 10, [10, 200, 30, 128]);
    let out = letterbox_square(&img, 60, [0, 0, 0, 255]);
    assert!(out.pixels().all(|p| p.0[3] == 255));
    let mid = out.get_pixel(30, 30).0;
    assert!(mid[1].abs_diff(100) <= 2, "half-covered green over black: {mid:?}");
}

#[test]
fn fit_within_preserves_aspect() {
    assert_eq!(fit_within(200, 100, 50), (50, 25));
    assert_eq!(fit_within(100, 200, 50), (25, 50));
    assert_eq!(fit_within(1, 1000, 10), (1, 10));
}

#[test]
fn seeded_selection_is_stable_and_order_independent() {
    let pool = DefaultCoverPool::from_images(
        "covers",
        (0..7).map(|i| PathBuf::from(format!("covers/{i}.png"))).collect(),
    );
    let a = pool.select("TrackA", CoverSelection::Seeded(9)).unwrap().to_path_buf();
    let _ = pool.select("TrackB", CoverSelection::Seeded(9)).unwrap();
    let again = pool.select("TrackA", CoverSelection::Seeded(9)).unwrap();
    assert_eq!(a, again);
    let random = pool.select("TrackA", CoverSelection::Random).unwrap();
    assert!(random.starts_with("covers"));
}

#[test]
fn empty_pool_is_an_error() {
    let tmp = temp_dir("compose_pool_empty");
    let pool = DefaultCoverPool::scan(tmp.join("covers")).unwrap();
    assert!(pool.is_empty());
    let err = pool.select("x", CoverSelection::default()).unwrap_err();
    assert!(matches!(err, MoozicError::Cover(CoverError::EmptyDefaultPool { .. })));
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn pool_scan_sorts_and_filters_images() {
    let tmp = temp_dir("compose_pool_scan");
    for name in ["b.png", "a.jpg", "notes.txt"] {
        std::fs::write(tmp.join(name), b"x").unwrap();
    }
    let pool = DefaultCoverPool::scan(&tmp).unwrap();
    assert_eq!(pool.len(), 2);
    let picked = pool.select("k", CoverSelection::Seeded(0)).unwrap();
    assert_ne!(picked.file_name().unwrap(), "notes.txt");
    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn icon_downscale_keeps_aspect() {
    let t = Texture::from_image(solid(256, 128, BLUE));
    let icon = t.downscaled(ICON_SIDE).unwrap();
    assert_eq!((icon.width, icon.height), (32, 16));
}

#[test]
fn item_mask_drives_icon_when_present() {
    let tmp = temp_dir("compose_item_icon");
    write_masks(&tmp, MaskVariant::CassetteFront, false);
    let c = Compositor::new(&tmp);
    let base = solid(16, 16, BLUE);
    let world = c
        .composite_sized(&base, MaskVariant::CassetteFront, 64, 64)
        .unwrap();
    let fallback = c.icon(&base, MaskVariant::CassetteFront, &world).unwrap();
    assert_eq!((fallback.width, fallback.height), (ICON_SIDE, ICON_SIDE));

    let tmp_item = temp_dir("compose_item_icon_mask");
    write_masks(&tmp_item, MaskVariant::CassetteFront, false);
    let item = RgbaImage::from_fn(64, 32, |x, _| {
        image::Rgba(if x < 32 { [255, 0, 255, 255] } else { [0, 0, 0, 0] })
    });
    item.save(tmp_item.join("cassette_front_item.png")).unwrap();
    let c = Compositor::new(&tmp_item);
    let icon = c.icon(&base, MaskVariant::CassetteFront, &world).unwrap();
    assert_eq!((icon.width, icon.height), (32, 16));
    assert_eq!(px(&icon, 3, 8), BLUE);
    assert_eq!(px(&icon, 28, 8)[3], 0);
    std::fs::remove_dir_all(&tmp).ok();
    std::fs::remove_dir_all(&tmp_item).ok();
}
