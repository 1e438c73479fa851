//! Portable reference kernels.
//!
//! These are the oracle every vectorized tier is checked against. All sums are accumulated in
//! integers and converted to `f64` once per row, so the three SSD variants return bit-identical
//! results for any input.

/// Scale applied to the weighted SAD sum.
pub const SAD_SCALE: f64 = 1.0 / 650_250.0;

#[inline(always)]
fn pixel_sq(a: &[u8], b: &[u8], i: usize) -> u32 {
    let dr = i32::from(a[i]) - i32::from(b[i]);
    let dg = i32::from(a[i + 1]) - i32::from(b[i + 1]);
    let db = i32::from(a[i + 2]) - i32::from(b[i + 2]);
    (dr * dr + dg * dg + db * db) as u32
}

/// Quadratically weighted absolute difference of one pixel, before scaling.
#[inline(always)]
pub(crate) fn pixel_sad_weighted(a: &[u8], b: &[u8], i: usize) -> u64 {
    let v = u64::from(a[i].abs_diff(b[i]))
        + u64::from(a[i + 1].abs_diff(b[i + 1]))
        + u64::from(a[i + 2].abs_diff(b[i + 2]));
    v * (255 + 9 * v)
}

/// Sum of squared RGB differences of the pixels `[x0, width)` of the row starting at `row`.
#[inline(always)]
pub(crate) fn ssd_row_tail(a: &[u8], b: &[u8], row: usize, x0: usize, width: usize) -> u64 {
    (x0..width)
        .map(|x| u64::from(pixel_sq(a, b, row + x * 4)))
        .sum()
}

/// Weighted SAD of the pixels `[x0, width)` of the row starting at `row`, unscaled.
#[inline(always)]
pub(crate) fn sad_row_tail(a: &[u8], b: &[u8], row: usize, x0: usize, width: usize) -> u64 {
    (x0..width)
        .map(|x| pixel_sad_weighted(a, b, row + x * 4))
        .sum()
}

pub fn ssd_naive(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    let mut sum = 0.0;
    for y in 0..height {
        sum += ssd_row_tail(a, b, y * stride, 0, width) as f64;
    }
    sum
}

pub fn ssd_unrolled4(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    let main = width / 4 * 4;
    let mut sum = 0.0;
    for y in 0..height {
        let row = y * stride;
        let mut acc = 0u64;
        let mut x = 0;
        while x < main {
            let i = row + x * 4;
            // 4 * 195_075 fits comfortably in u32.
            let block = pixel_sq(a, b, i)
                + pixel_sq(a, b, i + 4)
                + pixel_sq(a, b, i + 8)
                + pixel_sq(a, b, i + 12);
            acc += u64::from(block);
            x += 4;
        }
        acc += ssd_row_tail(a, b, row, main, width);
        sum += acc as f64;
    }
    sum
}

pub fn ssd_unrolled8(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    let main = width / 8 * 8;
    let mut sum = 0.0;
    for y in 0..height {
        let row = y * stride;
        let mut acc = 0u64;
        let mut x = 0;
        while x < main {
            let i = row + x * 4;
            let lo = pixel_sq(a, b, i)
                + pixel_sq(a, b, i + 4)
                + pixel_sq(a, b, i + 8)
                + pixel_sq(a, b, i + 12);
            let hi = pixel_sq(a, b, i + 16)
                + pixel_sq(a, b, i + 20)
                + pixel_sq(a, b, i + 24)
                + pixel_sq(a, b, i + 28);
            acc += u64::from(lo + hi);
            x += 8;
        }
        acc += ssd_row_tail(a, b, row, main, width);
        sum += acc as f64;
    }
    sum
}

pub fn sad(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    let mut total = 0u64;
    for y in 0..height {
        total += sad_row_tail(a, b, y * stride, 0, width);
    }
    total as f64 * SAD_SCALE
}

#[cfg(test)]
#[path = "../../tests/unit/kernels/scalar.rs"]
mod tests;
