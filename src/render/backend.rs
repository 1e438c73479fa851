use std::fmt;

use crate::foundation::core::Canvas;
use crate::params::Bounds;

/// Canonical backend identifier.
///
/// `Other` keeps the caller's original spelling so error messages can echo exactly what was
/// requested.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// Scanline rasterizer on the CPU.
    Cpu,
    /// wgpu compute backend (requires the `gpu` feature).
    Gpu,
    /// Any selector the normalizer does not recognize.
    Other(String),
}

impl BackendId {
    pub fn as_str(&self) -> &str {
        match self {
            BackendId::Cpu => "cpu",
            BackendId::Gpu => "gpu",
            BackendId::Other(s) => s,
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a parameter vector and scores it against a fixed reference.
///
/// A renderer owns its canvas; every method that touches it takes `&mut self`, so one instance
/// is never used from two threads at once. Independent instances share nothing and may run in
/// parallel.
pub trait Renderer: Send {
    /// Render `params` (`params.len() / 7` circles) and return the resulting canvas.
    ///
    /// The returned canvas is only valid until the next call.
    fn render(&mut self, params: &[f64]) -> &Canvas;

    /// Render `params` and return its cost against [`Renderer::reference`].
    fn cost(&mut self, params: &[f64]) -> f64;

    /// Dimension of the full search space (`K * 7`).
    fn dim(&self) -> usize;

    /// Search-space bounds for all `K` circles.
    fn bounds(&self) -> &Bounds;

    /// The image being approximated.
    fn reference(&self) -> &Canvas;

    /// Backend that actually serves calls.
    fn backend(&self) -> BackendId;

    /// `true` once a GPU renderer has permanently fallen back to the CPU.
    fn is_degraded(&self) -> bool {
        false
    }
}
