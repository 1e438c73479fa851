//! Parameter vector codec and search-space bounds.
//!
//! A parameter vector is a flat `f64` slice holding `K` circles of [`PARAMS_PER_CIRCLE`] values
//! each, laid out as `x, y, r, color_r, color_g, color_b, opacity`. The hot path only ever sees
//! borrowed slices; [`ParamVector`] is the owned form used at API boundaries.

use crate::foundation::error::{CircleFitError, CircleFitResult};

/// Number of `f64` slots occupied by one circle.
pub const PARAMS_PER_CIRCLE: usize = 7;

/// Minimum radius of a circle inside the search space.
pub const MIN_RADIUS: f64 = 1.0;

/// A colored circle with straight (non-premultiplied) color and an opacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Circle {
    /// Center x in pixels.
    pub x: f64,
    /// Center y in pixels.
    pub y: f64,
    /// Radius in pixels.
    pub r: f64,
    /// Red in `[0, 1]`.
    pub color_r: f64,
    /// Green in `[0, 1]`.
    pub color_g: f64,
    /// Blue in `[0, 1]`.
    pub color_b: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
}

impl Circle {
    fn to_array(self) -> [f64; PARAMS_PER_CIRCLE] {
        [
            self.x,
            self.y,
            self.r,
            self.color_r,
            self.color_g,
            self.color_b,
            self.opacity,
        ]
    }

    fn from_array(v: &[f64]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            r: v[2],
            color_r: v[3],
            color_g: v[4],
            color_b: v[5],
            opacity: v[6],
        }
    }
}

/// Number of whole circles encoded in `data`.
pub fn circle_count(data: &[f64]) -> usize {
    data.len() / PARAMS_PER_CIRCLE
}

/// Write `circle` into slot `i`.
///
/// # Panics
///
/// Panics when slot `i` does not fit in `data`.
pub fn encode(data: &mut [f64], i: usize, circle: Circle) {
    let off = slot_offset(data.len(), i);
    data[off..off + PARAMS_PER_CIRCLE].copy_from_slice(&circle.to_array());
}

/// Read the circle stored in slot `i`.
///
/// # Panics
///
/// Panics when slot `i` does not fit in `data`.
pub fn decode(data: &[f64], i: usize) -> Circle {
    let off = slot_offset(data.len(), i);
    Circle::from_array(&data[off..off + PARAMS_PER_CIRCLE])
}

fn slot_offset(len: usize, i: usize) -> usize {
    let off = i * PARAMS_PER_CIRCLE;
    assert!(
        off + PARAMS_PER_CIRCLE <= len,
        "circle slot {i} out of range for parameter vector of length {len}"
    );
    off
}

/// Order-sensitive, bit-exact fingerprint of a parameter vector.
///
/// Two vectors hash equal only if every `f64` has the same bit pattern (so `0.0` and `-0.0`
/// differ, and NaN payloads are distinguished).
pub fn fingerprint(data: &[f64]) -> u64 {
    let mut h = xxhash_rust::xxh3::Xxh3::new();
    h.update(&(data.len() as u64).to_le_bytes());
    for v in data {
        h.update(&v.to_bits().to_le_bytes());
    }
    h.digest()
}

/// Owned parameter vector for `K` circles.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ParamVector {
    data: Vec<f64>,
}

impl ParamVector {
    /// All-zero vector for `k` circles (every circle fully transparent).
    pub fn zeros(k: usize) -> Self {
        Self {
            data: vec![0.0; k * PARAMS_PER_CIRCLE],
        }
    }

    /// Wrap an existing flat vector, rejecting lengths that are not a multiple of 7.
    pub fn from_vec(data: Vec<f64>) -> CircleFitResult<Self> {
        if !data.len().is_multiple_of(PARAMS_PER_CIRCLE) {
            return Err(CircleFitError::validation(format!(
                "parameter vector length {} is not a multiple of {PARAMS_PER_CIRCLE}",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    pub fn from_circles(circles: &[Circle]) -> Self {
        let mut out = Self::zeros(circles.len());
        for (i, c) in circles.iter().enumerate() {
            encode(&mut out.data, i, *c);
        }
        out
    }

    pub fn len_circles(&self) -> usize {
        circle_count(&self.data)
    }

    pub fn encode(&mut self, i: usize, circle: Circle) {
        encode(&mut self.data, i, circle);
    }

    pub fn decode(&self, i: usize) -> Circle {
        decode(&self.data, i)
    }

    pub fn circles(&self) -> impl Iterator<Item = Circle> + '_ {
        self.data
            .chunks_exact(PARAMS_PER_CIRCLE)
            .map(Circle::from_array)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

/// Per-slot lower and upper limits of the search space.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bounds {
    /// Lower limit for every parameter slot.
    pub lower: Vec<f64>,
    /// Upper limit for every parameter slot.
    pub upper: Vec<f64>,
}

impl Bounds {
    /// Bounds for `k` circles on a `width x height` canvas.
    ///
    /// `x` spans `[0, width]`, `y` spans `[0, height]`, the radius spans
    /// `[1, max(width, height)]` and the four color/opacity slots span `[0, 1]`.
    pub fn new(k: usize, width: u32, height: u32) -> Self {
        let w = f64::from(width);
        let h = f64::from(height);
        let r_max = w.max(h).max(MIN_RADIUS);
        let lo = [0.0, 0.0, MIN_RADIUS, 0.0, 0.0, 0.0, 0.0];
        let hi = [w, h, r_max, 1.0, 1.0, 1.0, 1.0];

        let mut lower = Vec::with_capacity(k * PARAMS_PER_CIRCLE);
        let mut upper = Vec::with_capacity(k * PARAMS_PER_CIRCLE);
        for _ in 0..k {
            lower.extend_from_slice(&lo);
            upper.extend_from_slice(&hi);
        }
        Self { lower, upper }
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn circles(&self) -> usize {
        circle_count(&self.lower)
    }

    /// Bounds restricted to the first `k` circles.
    ///
    /// # Panics
    ///
    /// Panics when `k` exceeds the number of circles covered by `self`.
    pub fn truncate(&self, k: usize) -> Self {
        let dim = k * PARAMS_PER_CIRCLE;
        assert!(
            dim <= self.dim(),
            "cannot truncate bounds for {} circles to {k}",
            self.circles()
        );
        Self {
            lower: self.lower[..dim].to_vec(),
            upper: self.upper[..dim].to_vec(),
        }
    }

    /// Check that both vectors agree in length, are whole circles and are well ordered.
    pub fn validate(&self) -> CircleFitResult<()> {
        if self.lower.len() != self.upper.len() {
            return Err(CircleFitError::validation(format!(
                "bounds length mismatch: lower={} upper={}",
                self.lower.len(),
                self.upper.len()
            )));
        }
        if !self.lower.len().is_multiple_of(PARAMS_PER_CIRCLE) {
            return Err(CircleFitError::validation(
                "bounds length is not a multiple of the circle size",
            ));
        }
        for (i, (lo, hi)) in self.lower.iter().zip(&self.upper).enumerate() {
            if lo.is_nan() || hi.is_nan() || lo > hi {
                return Err(CircleFitError::validation(format!(
                    "bounds slot {i} is malformed: [{lo}, {hi}]"
                )));
            }
        }
        Ok(())
    }

    /// Clamp `circle` to the limits of slot `i`.
    pub fn clamp_circle(&self, i: usize, circle: Circle) -> Circle {
        let off = slot_offset(self.dim(), i);
        let mut v = circle.to_array();
        for (j, x) in v.iter_mut().enumerate() {
            *x = clamp_slot(*x, self.lower[off + j], self.upper[off + j]);
        }
        Circle::from_array(&v)
    }

    /// Clamp every element of `data` in place. Extra trailing elements past the bounds are
    /// left untouched.
    pub fn clamp_vector(&self, data: &mut [f64]) {
        for ((x, lo), hi) in data.iter_mut().zip(&self.lower).zip(&self.upper) {
            *x = clamp_slot(*x, *lo, *hi);
        }
    }
}

// NaN collapses to the lower limit so a clamped vector is always finite.
fn clamp_slot(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() { lo } else { x.clamp(lo, hi) }
}

#[cfg(test)]
#[path = "../tests/unit/params.rs"]
mod tests;
