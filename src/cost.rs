//! Pluggable cost functions comparing a rendered canvas with the reference.

use crate::foundation::core::Canvas;
use crate::kernels;

/// Error between a rendered canvas and the reference. Lower is better.
///
/// Implementations must be pure: the same pair of canvases always yields the same value.
pub trait CostFunction: Send + Sync {
    /// # Panics
    ///
    /// Implementations panic when the two canvases differ in layout.
    fn cost(&self, current: &Canvas, reference: &Canvas) -> f64;
}

impl<F> CostFunction for F
where
    F: Fn(&Canvas, &Canvas) -> f64 + Send + Sync,
{
    fn cost(&self, current: &Canvas, reference: &Canvas) -> f64 {
        self(current, reference)
    }
}

/// Built-in cost metrics.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CostMetric {
    /// Mean squared error over RGB, straightforward loop.
    #[default]
    Mse,
    /// Mean squared error over RGB through the dispatched SSD kernel.
    FastMse,
    /// Quadratically weighted SAD through the dispatched SAD kernel.
    FastSad,
}

impl CostFunction for CostMetric {
    fn cost(&self, current: &Canvas, reference: &Canvas) -> f64 {
        match self {
            CostMetric::Mse => mse(current, reference),
            CostMetric::FastMse => kernels::fast_mse(current, reference),
            CostMetric::FastSad => kernels::fast_sad(current, reference),
        }
    }
}

/// Mean squared error over the RGB channels, normalized by `width * height * 3`.
///
/// # Panics
///
/// Panics when the canvases differ in width or height.
pub fn mse(current: &Canvas, reference: &Canvas) -> f64 {
    assert!(
        current.width() == reference.width() && current.height() == reference.height(),
        "image dimensions must match: {}x{} vs {}x{}",
        current.width(),
        current.height(),
        reference.width(),
        reference.height()
    );
    let pixels = current.pixel_count();
    if pixels == 0 {
        return 0.0;
    }

    let mut sum = 0.0;
    for y in 0..current.height() {
        for (p, q) in current
            .row(y)
            .chunks_exact(4)
            .zip(reference.row(y).chunks_exact(4))
        {
            let dr = f64::from(p[0]) - f64::from(q[0]);
            let dg = f64::from(p[1]) - f64::from(q[1]);
            let db = f64::from(p[2]) - f64::from(q[2]);
            sum += dr * dr + dg * dg + db * db;
        }
    }
    sum / (pixels * 3) as f64
}
