//! AVX2 kernels, 8 pixels (32 bytes) per iteration.
//!
//! The public wrappers are only ever installed in a [`super::PixelKernels`] table after
//! `is_x86_feature_detected!("avx2")` returned `true`.
#![allow(unsafe_code)]

use std::arch::x86_64::*;

use super::scalar::{SAD_SCALE, sad_row_tail, ssd_row_tail};

// Each iteration adds at most 2 * 2 * 255^2 to an i32 lane.
const SSD_FLUSH_EVERY: usize = 4096;
// Each iteration adds at most 765 * (255 + 9 * 765) to an i32 lane.
const SAD_FLUSH_EVERY: usize = 256;

pub(super) fn ssd(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    // SAFETY: only reachable through a kernel table built after AVX2 detection; buffer lengths
    // were checked by the caller to cover `height` rows of `width` pixels.
    unsafe { ssd_avx2(a, b, stride, width, height) as f64 }
}

pub(super) fn sad(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
    // SAFETY: see `ssd`.
    unsafe { sad_avx2(a, b, stride, width, height) as f64 * SAD_SCALE }
}

#[target_feature(enable = "avx2")]
unsafe fn hsum_epi64(v: __m256i) -> u64 {
    let mut lanes = [0i64; 4];
    unsafe { _mm256_storeu_si256(lanes.as_mut_ptr() as *mut __m256i, v) };
    lanes.iter().sum::<i64>() as u64
}

#[target_feature(enable = "avx2")]
unsafe fn widen_add(acc64: __m256i, acc32: __m256i) -> __m256i {
    let lo = _mm256_cvtepi32_epi64(_mm256_castsi256_si128(acc32));
    let hi = _mm256_cvtepi32_epi64(_mm256_extracti128_si256::<1>(acc32));
    _mm256_add_epi64(acc64, _mm256_add_epi64(lo, hi))
}

#[target_feature(enable = "avx2")]
unsafe fn ssd_avx2(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> u64 {
    let main = width / 8 * 8;
    // Zero the alpha lane of every 4 x i16 pixel group.
    let rgb_mask = _mm256_set1_epi64x(0x0000_FFFF_FFFF_FFFF);
    let mut acc64 = _mm256_setzero_si256();
    let mut tail = 0u64;

    for y in 0..height {
        let row = y * stride;
        let mut acc32 = _mm256_setzero_si256();
        let mut pending = 0usize;
        let mut x = 0;
        while x < main {
            let off = row + x * 4;
            let (va, vb) = unsafe {
                (
                    _mm256_loadu_si256(a.as_ptr().add(off) as *const __m256i),
                    _mm256_loadu_si256(b.as_ptr().add(off) as *const __m256i),
                )
            };

            let a_lo = _mm256_cvtepu8_epi16(_mm256_castsi256_si128(va));
            let a_hi = _mm256_cvtepu8_epi16(_mm256_extracti128_si256::<1>(va));
            let b_lo = _mm256_cvtepu8_epi16(_mm256_castsi256_si128(vb));
            let b_hi = _mm256_cvtepu8_epi16(_mm256_extracti128_si256::<1>(vb));

            let d_lo = _mm256_and_si256(_mm256_sub_epi16(a_lo, b_lo), rgb_mask);
            let d_hi = _mm256_and_si256(_mm256_sub_epi16(a_hi, b_hi), rgb_mask);

            let sq = _mm256_add_epi32(_mm256_madd_epi16(d_lo, d_lo), _mm256_madd_epi16(d_hi, d_hi));
            acc32 = _mm256_add_epi32(acc32, sq);

            pending += 1;
            if pending == SSD_FLUSH_EVERY {
                acc64 = unsafe { widen_add(acc64, acc32) };
                acc32 = _mm256_setzero_si256();
                pending = 0;
            }
            x += 8;
        }
        acc64 = unsafe { widen_add(acc64, acc32) };
        tail += ssd_row_tail(a, b, row, main, width);
    }

    tail + unsafe { hsum_epi64(acc64) }
}

#[target_feature(enable = "avx2")]
unsafe fn sad_avx2(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> u64 {
    let main = width / 8 * 8;
    let rgb_mask = _mm256_set1_epi32(0x00FF_FFFF);
    let ones_u8 = _mm256_set1_epi8(1);
    let ones_i16 = _mm256_set1_epi16(1);
    let c255 = _mm256_set1_epi32(255);
    let c9 = _mm256_set1_epi32(9);
    let mut acc64 = _mm256_setzero_si256();
    let mut tail = 0u64;

    for y in 0..height {
        let row = y * stride;
        let mut acc32 = _mm256_setzero_si256();
        let mut pending = 0usize;
        let mut x = 0;
        while x < main {
            let off = row + x * 4;
            let (va, vb) = unsafe {
                (
                    _mm256_loadu_si256(a.as_ptr().add(off) as *const __m256i),
                    _mm256_loadu_si256(b.as_ptr().add(off) as *const __m256i),
                )
            };

            let ad = _mm256_or_si256(_mm256_subs_epu8(va, vb), _mm256_subs_epu8(vb, va));
            let ad = _mm256_and_si256(ad, rgb_mask);
            // bytes -> i16 pairs -> i32 per pixel: |dr| + |dg| + |db|
            let v = _mm256_madd_epi16(_mm256_maddubs_epi16(ad, ones_u8), ones_i16);
            let weight = _mm256_add_epi32(c255, _mm256_mullo_epi32(v, c9));
            acc32 = _mm256_add_epi32(acc32, _mm256_mullo_epi32(v, weight));

            pending += 1;
            if pending == SAD_FLUSH_EVERY {
                acc64 = unsafe { widen_add(acc64, acc32) };
                acc32 = _mm256_setzero_si256();
                pending = 0;
            }
            x += 8;
        }
        acc64 = unsafe { widen_add(acc64, acc32) };
        tail += sad_row_tail(a, b, row, main, width);
    }

    tail + unsafe { hsum_epi64(acc64) }
}
