//! Scanline circle rasterizer with straight-alpha Porter-Duff "over" compositing.
//!
//! Pixel `(x, y)` is covered by a circle when `(x - cx)^2 + (y - cy)^2 <= r^2`, i.e. pixel
//! centers sit on integer coordinates.

use crate::foundation::core::Canvas;
use crate::params::Circle;

/// Circles with a (clamped) opacity below this are not drawn.
pub const MIN_OPACITY: f64 = 0.001;

const INV_255: f64 = 1.0 / 255.0;

/// Paint source derived from a raw circle: clamped, premultiplied color plus coverage geometry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Paint {
    pub(crate) cx: f64,
    pub(crate) cy: f64,
    pub(crate) r2: f64,
    pub(crate) extent: f64,
    pub(crate) premul: [f64; 3],
    pub(crate) alpha: f64,
}

impl Paint {
    /// Clamp color and opacity to `[0, 1]` and reject circles that cannot paint anything.
    pub(crate) fn from_circle(c: &Circle) -> Option<Self> {
        if c.opacity.is_nan() {
            return None;
        }
        let alpha = c.opacity.clamp(0.0, 1.0);
        if alpha < MIN_OPACITY {
            return None;
        }
        if !(c.x.is_finite() && c.y.is_finite() && c.r.is_finite()) || c.r <= 0.0 {
            return None;
        }
        let unit = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Some(Self {
            cx: c.x,
            cy: c.y,
            r2: c.r * c.r,
            extent: c.r,
            premul: [
                unit(c.color_r) * alpha,
                unit(c.color_g) * alpha,
                unit(c.color_b) * alpha,
            ],
            alpha,
        })
    }

    #[inline(always)]
    pub(crate) fn covers(&self, x: i64, dy2: f64) -> bool {
        let dx = x as f64 - self.cx;
        dx * dx + dy2 <= self.r2
    }
}

/// Blend `paint` over one straight-alpha RGBA8 pixel.
#[inline(always)]
pub(crate) fn blend_over(px: &mut [u8], paint: &Paint) {
    let bg_a = f64::from(px[3]) * INV_255;
    let out_a = paint.alpha + bg_a * (1.0 - paint.alpha);
    if out_a == 0.0 {
        return;
    }
    let inv_out = 1.0 / out_a;
    let keep = bg_a * (1.0 - paint.alpha);

    for ch in 0..3 {
        let bg = f64::from(px[ch]) * INV_255;
        px[ch] = to_u8((paint.premul[ch] + bg * keep) * inv_out);
    }
    px[3] = to_u8(out_a);
}

// Round half up; `as` saturates out-of-range floats.
#[inline(always)]
fn to_u8(v: f64) -> u8 {
    (v * 255.0 + 0.5) as u8
}

/// Composite one circle onto `canvas`.
pub fn composite_circle(canvas: &mut Canvas, circle: &Circle) {
    let Some(paint) = Paint::from_circle(circle) else {
        return;
    };
    let w = i64::from(canvas.width());
    let h = i64::from(canvas.height());
    if w == 0 || h == 0 {
        return;
    }
    let (max_x, max_y) = ((w - 1) as f64, (h - 1) as f64);

    if paint.cx + paint.extent < 0.0
        || paint.cx - paint.extent > max_x
        || paint.cy + paint.extent < 0.0
        || paint.cy - paint.extent > max_y
    {
        return;
    }

    let y0 = (paint.cy - paint.extent).floor().max(0.0) as i64;
    let y1 = (paint.cy + paint.extent).ceil().min(max_y) as i64;
    // Nearest in-canvas column to the center: if it is not covered, no column of the row is.
    let seed = paint.cx.round().clamp(0.0, max_x) as i64;
    let stride = canvas.stride();
    let data = canvas.data_mut();

    for y in y0..=y1 {
        let dy = y as f64 - paint.cy;
        let dy2 = dy * dy;
        if dy2 > paint.r2 || !paint.covers(seed, dy2) {
            continue;
        }

        let mut x_start = seed;
        while x_start > 0 && paint.covers(x_start - 1, dy2) {
            x_start -= 1;
        }
        let mut x_end = seed;
        while x_end < w - 1 && paint.covers(x_end + 1, dy2) {
            x_end += 1;
        }

        let row = y as usize * stride;
        let span = &mut data[row + x_start as usize * 4..row + (x_end as usize + 1) * 4];
        for px in span.chunks_exact_mut(4) {
            blend_over(px, &paint);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/raster.rs"]
mod tests;
