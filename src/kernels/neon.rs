//! NEON kernels, 4 pixels (16 bytes) per iteration.
#![allow(unsafe_code)]

use std::arch::aarch64::*;

use super::scalar::{SAD_SCALE, sad_row_tail, ssd_row_tail};

// Each iteration adds at most 4 * 255^2 to a u32 lane.
const SSD_FLUSH_EVERY: usize = 4096;
// Each iteration adds at most 765 * (255 + 9 * 765) to a u32 lane.
const SAD_FLUSH_EVERY: usize = 256;

pub(super) fn ssd(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    // SAFETY: only reachable through a kernel table built after NEON detection; buffer lengths
    // were checked by the caller to cover `height` rows of `width` pixels.
    unsafe { ssd_neon(a, b, stride, width, height) as f64 }
}

pub(super) fn sad(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    // SAFETY: see `ssd`.
    unsafe { sad_neon(a, b, stride, width, height) as f64 * SAD_SCALE }
}

#[target_feature(enable = "neon")]
unsafe fn ssd_neon(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> u64 {
    let main = width / 4 * 4;
    let rgb_mask = vreinterpretq_u8_u32(vdupq_n_u32(0x00FF_FFFF));
    let mut total = 0u64;

    for y in 0..height {
        let row = y * stride;
        let mut acc = vdupq_n_u32(0);
        let mut pending = 0usize;
        let mut x = 0;
        while x < main {
            let off = row + x * 4;
            let (va, vb) = unsafe { (vld1q_u8(a.as_ptr().add(off)), vld1q_u8(b.as_ptr().add(off))) };

            let ad = vandq_u8(vabdq_u8(va, vb), rgb_mask);
            let lo = vget_low_u8(ad);
            let hi = vget_high_u8(ad);
            acc = vpadalq_u16(acc, vmull_u8(lo, lo));
            acc = vpadalq_u16(acc, vmull_u8(hi, hi));

            pending += 1;
            if pending == SSD_FLUSH_EVERY {
                total += vaddlvq_u32(acc);
                acc = vdupq_n_u32(0);
                pending = 0;
            }
            x += 4;
        }
        total += vaddlvq_u32(acc);
        total += ssd_row_tail(a, b, row, main, width);
    }

    total
}

#[target_feature(enable = "neon")]
unsafe fn sad_neon(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> u64 {
    let main = width / 4 * 4;
    let rgb_mask = vreinterpretq_u8_u32(vdupq_n_u32(0x00FF_FFFF));
    let c255 = vdupq_n_u32(255);
    let c9 = vdupq_n_u32(9);
    let mut total = 0u64;

    for y in 0..height {
        let row = y * stride;
        let mut acc = vdupq_n_u32(0);
        let mut pending = 0usize;
        let mut x = 0;
        while x < main {
            let off = row + x * 4;
            let (va, vb) = unsafe { (vld1q_u8(a.as_ptr().add(off)), vld1q_u8(b.as_ptr().add(off))) };

            let ad = vandq_u8(vabdq_u8(va, vb), rgb_mask);
            // bytes -> u16 pairs -> u32 per pixel: |dr| + |dg| + |db|
            let v = vpaddlq_u16(vpaddlq_u8(ad));
            let weight = vmlaq_u32(c255, v, c9);
            acc = vmlaq_u32(acc, v, weight);

            pending += 1;
            if pending == SAD_FLUSH_EVERY {
                total += vaddlvq_u32(acc);
                acc = vdupq_n_u32(0);
                pending = 0;
            }
            x += 4;
        }
        total += vaddlvq_u32(acc);
        total += sad_row_tail(a, b, row, main, width);
    }

    total
}
