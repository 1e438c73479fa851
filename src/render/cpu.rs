use crate::cost::{CostFunction, CostMetric};
use crate::foundation::core::{Canvas, WHITE};
use crate::params::{Bounds, PARAMS_PER_CIRCLE, decode};
use crate::render::backend::{BackendId, Renderer};
use crate::render::raster::composite_circle;

/// CPU scanline renderer.
///
/// Owns one working canvas that is reset from a background template by a single bulk copy
/// before each render.
pub struct CpuRenderer {
    reference: Canvas,
    background: Canvas,
    canvas: Canvas,
    bounds: Bounds,
    cost_fn: Box<dyn CostFunction>,
}

impl CpuRenderer {
    /// Renderer for `k` circles on an opaque white background.
    pub fn new(reference: Canvas, k: usize) -> Self {
        let background = Canvas::filled_like(&reference, WHITE);
        Self::from_parts(reference, background, k)
    }

    /// Renderer for `k` circles drawn on top of `background`, e.g. a previous partial solution.
    ///
    /// # Panics
    ///
    /// Panics when `background` and `reference` differ in width or height.
    pub fn with_background(reference: Canvas, background: &Canvas, k: usize) -> Self {
        let background = Canvas::relayout(background, &reference);
        Self::from_parts(reference, background, k)
    }

    fn from_parts(reference: Canvas, background: Canvas, k: usize) -> Self {
        let bounds = Bounds::new(k, reference.width(), reference.height());
        Self {
            canvas: background.clone(),
            background,
            reference,
            bounds,
            cost_fn: Box::new(CostMetric::default()),
        }
    }

    /// Replace the cost strategy.
    pub fn set_cost_function(&mut self, cost_fn: Box<dyn CostFunction>) {
        self.cost_fn = cost_fn;
    }

    pub fn set_cost_metric(&mut self, metric: CostMetric) {
        self.cost_fn = Box::new(metric);
    }

    /// Switch to the SIMD-dispatched MSE.
    pub fn use_fast_cost(&mut self) {
        self.set_cost_metric(CostMetric::FastMse);
    }

    /// Canvas produced by the most recent render.
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn background(&self) -> &Canvas {
        &self.background
    }

    pub fn circles(&self) -> usize {
        self.bounds.circles()
    }
}

impl Renderer for CpuRenderer {
    fn render(&mut self, params: &[f64]) -> &Canvas {
        self.canvas.copy_from(&self.background);
        for i in 0..params.len() / PARAMS_PER_CIRCLE {
            composite_circle(&mut self.canvas, &decode(params, i));
        }
        &self.canvas
    }

    fn cost(&mut self, params: &[f64]) -> f64 {
        self.render(params);
        self.cost_fn.cost(&self.canvas, &self.reference)
    }

    fn dim(&self) -> usize {
        self.bounds.dim()
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn reference(&self) -> &Canvas {
        &self.reference
    }

    fn backend(&self) -> BackendId {
        BackendId::Cpu
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
