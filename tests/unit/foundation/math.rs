use super::*;

#[test]
fn mul_div255_endpoints() {
    assert_eq!(mul_div255(255, 255), 255);
    assert_eq!(mul_div255(0, 255), 0);
    assert_eq!(mul_div255(128, 255), 128);
    assert_eq!(mul_div255(255, 0), 0);
}

#[test]
fn over_respects_alpha_endpoints() {
    let dst = [10, 20, 30, 255];
    assert_eq!(over(dst, [0, 0, 0, 0]), dst);
    assert_eq!(over(dst, [1, 2, 3, 255]), [1, 2, 3, 255]);
    let half = over([0, 0, 0, 0], [100, 50, 25, 128]);
    assert_eq!(half, [100, 50, 25, 128]);
}

#[test]
fn premultiply_roundtrip_is_close_for_opaque_and_exact_for_clear() {
    assert_eq!(unpremultiply_px(premultiply_px([200, 100, 50, 255])), [200, 100, 50, 255]);
    assert_eq!(unpremultiply_px([0, 0, 0, 0]), [0, 0, 0, 0]);
    let back = unpremultiply_px(premultiply_px([200, 100, 50, 128]));
    for i in 0..3 {
        assert!((i32::from(back[i]) - i32::from([200, 100, 50][i])).abs() <= 2);
    }
}

#[test]
fn scale_px_zero_clears_pixel() {
    assert_eq!(scale_px([9, 9, 9, 9], 0), [0, 0, 0, 0]);
    assert_eq!(scale_px([9, 9, 9, 9], 255), [9, 9, 9, 9]);
}
