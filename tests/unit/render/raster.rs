use super::*;
use crate::foundation::core::WHITE;

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(seed: u64) -> f64 {
    (mix64(seed) >> 11) as f64 / (1u64 << 53) as f64
}

/// Per-pixel distance test over the whole canvas, used as the oracle for the scanline path.
fn composite_brute_force(canvas: &mut Canvas, circle: &Circle) {
    let Some(paint) = Paint::from_circle(circle) else {
        return;
    };
    for y in 0..canvas.height() {
        for x in 0..canvas.width() {
            let dx = f64::from(x) - paint.cx;
            let dy = f64::from(y) - paint.cy;
            if dx * dx + dy * dy > paint.r2 {
                continue;
            }
            let mut px = canvas.pixel(x, y);
            blend_over(&mut px, &paint);
            canvas.set_pixel(x, y, px);
        }
    }
}

fn circle(x: f64, y: f64, r: f64, rgb: [f64; 3], opacity: f64) -> Circle {
    Circle {
        x,
        y,
        r,
        color_r: rgb[0],
        color_g: rgb[1],
        color_b: rgb[2],
        opacity,
    }
}

fn max_channel_delta(a: &Canvas, b: &Canvas) -> u8 {
    let mut worst = 0;
    for y in 0..a.height() {
        for (p, q) in a.row(y).iter().zip(b.row(y)) {
            worst = worst.max(p.abs_diff(*q));
        }
    }
    worst
}

#[test]
fn opaque_black_circle_over_white() {
    let mut c = Canvas::white(9, 9).unwrap();
    composite_circle(&mut c, &circle(4.0, 4.0, 2.0, [0.0; 3], 1.0));
    assert_eq!(c.pixel(4, 4), [0, 0, 0, 255]);
    assert_eq!(c.pixel(6, 4), [0, 0, 0, 255]);
    assert_eq!(c.pixel(6, 6), WHITE);
    assert_eq!(c.pixel(0, 0), WHITE);
}

#[test]
fn half_opacity_rounds_half_up() {
    let mut c = Canvas::white(1, 1).unwrap();
    composite_circle(&mut c, &circle(0.0, 0.0, 1.0, [0.0; 3], 0.5));
    // 0.5 * 255 = 127.5 rounds to 128.
    assert_eq!(c.pixel(0, 0), [128, 128, 128, 255]);
}

#[test]
fn over_transparent_background_keeps_foreground_color() {
    let mut c = Canvas::filled(1, 1, [0, 0, 0, 0]).unwrap();
    composite_circle(&mut c, &circle(0.0, 0.0, 1.0, [1.0, 0.0, 0.0], 0.5));
    assert_eq!(c.pixel(0, 0), [255, 0, 0, 128]);
}

#[test]
fn nearly_transparent_and_degenerate_circles_are_skipped() {
    let mut c = Canvas::white(4, 4).unwrap();
    let before = c.clone();
    composite_circle(&mut c, &circle(2.0, 2.0, 3.0, [0.0; 3], 0.0009));
    composite_circle(&mut c, &circle(2.0, 2.0, 3.0, [0.0; 3], f64::NAN));
    composite_circle(&mut c, &circle(2.0, 2.0, -3.0, [0.0; 3], 1.0));
    composite_circle(&mut c, &circle(f64::NAN, 2.0, 3.0, [0.0; 3], 1.0));
    composite_circle(&mut c, &circle(-10.0, 2.0, 3.0, [0.0; 3], 1.0));
    composite_circle(&mut c, &circle(2.0, 100.0, 3.0, [0.0; 3], 1.0));
    assert_eq!(c, before);
}

#[test]
fn out_of_range_color_and_opacity_are_clamped() {
    let mut a = Canvas::white(5, 5).unwrap();
    let mut b = Canvas::white(5, 5).unwrap();
    composite_circle(&mut a, &circle(2.0, 2.0, 2.0, [2.0, -1.0, 0.5], 7.0));
    composite_circle(&mut b, &circle(2.0, 2.0, 2.0, [1.0, 0.0, 0.5], 1.0));
    assert_eq!(a, b);
}

#[test]
fn center_outside_canvas_still_paints_overlap() {
    let mut c = Canvas::white(6, 6).unwrap();
    let mut oracle = c.clone();
    let k = circle(-1.5, 2.5, 3.0, [0.2, 0.4, 0.6], 0.8);
    composite_circle(&mut c, &k);
    composite_brute_force(&mut oracle, &k);
    assert_eq!(c, oracle);
    assert_ne!(c.pixel(0, 2), WHITE);
}

#[test]
fn scanline_matches_brute_force_on_random_circles() {
    for case in 0..64u64 {
        let w = 8 + (mix64(case) % 40) as u32;
        let h = 8 + (mix64(case + 1000) % 40) as u32;
        let mut fast = Canvas::white(w, h).unwrap();
        let mut oracle = Canvas::white(w, h).unwrap();
        for i in 0..12u64 {
            let s = case * 131 + i * 7;
            let k = circle(
                unit(s) * f64::from(w + 10) - 5.0,
                unit(s + 1) * f64::from(h + 10) - 5.0,
                0.3 + unit(s + 2) * f64::from(w.max(h)) * 0.5,
                [unit(s + 3), unit(s + 4), unit(s + 5)],
                unit(s + 6),
            );
            composite_circle(&mut fast, &k);
            composite_brute_force(&mut oracle, &k);
        }
        assert!(
            max_channel_delta(&fast, &oracle) <= 1,
            "case {case}: scanline deviates from per-pixel test"
        );
    }
}

#[test]
fn padded_stride_is_respected() {
    let mut c = Canvas::from_rgba8_with_stride(3, 3, 16, vec![255; 48]).unwrap();
    composite_circle(&mut c, &circle(1.0, 1.0, 5.0, [0.0; 3], 1.0));
    for y in 0..3 {
        let row = y as usize * 16;
        assert_eq!(&c.data()[row + 12..row + 16], &[255, 255, 255, 255]);
        assert_eq!(c.pixel(2, y), [0, 0, 0, 255]);
    }
}
