use super::*;

#[test]
fn white_canvas_is_opaque_white() {
    let c = Canvas::white(3, 2).unwrap();
    assert_eq!(c.stride(), 12);
    assert_eq!(c.data().len(), 24);
    assert!(c.data().iter().all(|&b| b == 255));
}

#[test]
fn from_rgba8_rejects_wrong_length() {
    let err = Canvas::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
    assert!(err.to_string().contains("validation error:"));
}

#[test]
fn stride_must_cover_row() {
    assert!(Canvas::from_rgba8_with_stride(4, 1, 15, vec![0; 15]).is_err());
    let c = Canvas::from_rgba8_with_stride(4, 2, 20, vec![0; 40]).unwrap();
    assert_eq!(c.row(1).len(), 16);
}

#[test]
fn pixel_accessors_respect_stride() {
    let mut c = Canvas::from_rgba8_with_stride(2, 2, 12, vec![0; 24]).unwrap();
    c.set_pixel(1, 1, [1, 2, 3, 4]);
    assert_eq!(c.pixel(1, 1), [1, 2, 3, 4]);
    assert_eq!(&c.data()[16..20], &[1, 2, 3, 4]);
}

#[test]
fn image_roundtrip_drops_padding() {
    let mut c = Canvas::from_rgba8_with_stride(2, 1, 16, vec![9; 16]).unwrap();
    c.set_pixel(0, 0, [10, 20, 30, 40]);
    let img = c.to_rgba_image().unwrap();
    assert_eq!(img.as_raw().len(), 8);
    let back = Canvas::from_rgba_image(&img).unwrap();
    assert_eq!(back.pixel(0, 0), [10, 20, 30, 40]);
    assert_eq!(back.stride(), 8);
}

#[test]
fn filled_like_keeps_padding_zeroed() {
    let padded = Canvas::from_rgba8_with_stride(1, 2, 8, vec![0; 16]).unwrap();
    let white = Canvas::filled_like(&padded, WHITE);
    assert_eq!(white.stride(), 8);
    assert_eq!(&white.data()[..8], &[255, 255, 255, 255, 0, 0, 0, 0]);
}

#[test]
fn relayout_copies_visible_pixels() {
    let mut tight = Canvas::white(2, 2).unwrap();
    tight.set_pixel(1, 1, [1, 2, 3, 4]);
    let padded = Canvas::from_rgba8_with_stride(2, 2, 12, vec![0; 24]).unwrap();
    let out = Canvas::relayout(&tight, &padded);
    assert!(out.same_layout(&padded));
    assert_eq!(out.pixel(1, 1), [1, 2, 3, 4]);
    assert_eq!(out.pixel(0, 0), WHITE);
}

#[test]
#[should_panic(expected = "canvas layout mismatch")]
fn copy_from_panics_on_mismatch() {
    let mut a = Canvas::white(2, 2).unwrap();
    let b = Canvas::white(3, 2).unwrap();
    a.copy_from(&b);
}
