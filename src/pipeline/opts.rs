use crate::cost::CostMetric;
use crate::foundation::core::Canvas;
use crate::foundation::error::{CircleFitError, CircleFitResult};
use crate::opt::{RandomSearch, RandomSearchOpts, WarmStart};
use crate::params::circle_count;
use crate::pipeline::convergence::ConvergenceConfig;
use crate::pipeline::orchestrator::{OptimizationResult, PipelineMode, run_pipeline};
use crate::render::backend::{BackendId, Renderer};
use crate::render::factory::{
    Cleanup, create_cpu_renderer, create_renderer, normalize_backend_name,
};

/// Which renderer to build and how it scores.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RendererOpts {
    /// Backend selector, see [`normalize_backend_name`].
    pub backend: String,
    /// Cost metric used by the CPU renderer. The GPU backend always reports MSE.
    pub cost: CostMetric,
}

impl Default for RendererOpts {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            cost: CostMetric::default(),
        }
    }
}

impl RendererOpts {
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_cost(mut self, cost: CostMetric) -> Self {
        self.cost = cost;
        self
    }

    /// Build a renderer for `k` circles against `reference`.
    pub fn build(
        &self,
        reference: &Canvas,
        k: usize,
    ) -> CircleFitResult<(Box<dyn Renderer>, Cleanup)> {
        if normalize_backend_name(&self.backend) == BackendId::Cpu {
            return Ok(create_cpu_renderer(reference, k, self.cost));
        }
        if self.cost != CostMetric::Mse {
            tracing::warn!(backend = %self.backend, cost = ?self.cost, "cost metric ignored by this backend");
        }
        create_renderer(&self.backend, reference, k)
    }
}

/// Strategy, circle budget and optimizer settings of one fit.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineOpts {
    pub mode: PipelineMode,
    /// Circle budget for joint and sequential mode. Batch mode places
    /// `batch_size * passes` circles instead.
    pub circles: usize,
    pub convergence: ConvergenceConfig,
    pub optimizer: RandomSearchOpts,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            mode: PipelineMode::default(),
            circles: 50,
            convergence: ConvergenceConfig::default(),
            optimizer: RandomSearchOpts::default(),
        }
    }
}

impl PipelineOpts {
    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_circles(mut self, circles: usize) -> Self {
        self.circles = circles;
        self
    }

    pub fn with_convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn with_optimizer(mut self, optimizer: RandomSearchOpts) -> Self {
        self.optimizer = optimizer;
        self
    }
}

/// Complete configuration of a fit, loadable from JSON.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FitOpts {
    pub renderer: RendererOpts,
    pub pipeline: PipelineOpts,
}

impl FitOpts {
    pub fn from_json(json: &str) -> CircleFitResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CircleFitError::validation(format!("invalid fit options: {e}")))
    }

    /// Circles the renderer must hold, including a resumed prefix.
    pub fn capacity(&self, warm_start: Option<&WarmStart>) -> usize {
        let requested = self.pipeline.mode.circles_requested(self.pipeline.circles);
        match (self.pipeline.mode, warm_start) {
            (PipelineMode::Batch { .. }, Some(ws)) => circle_count(&ws.params) + requested,
            (PipelineMode::Sequential, Some(ws)) => circle_count(&ws.params).max(requested),
            _ => requested,
        }
    }
}

/// Build the configured renderer and optimizer and run the pipeline against `reference`.
///
/// The renderer's cleanup runs before returning.
pub fn fit(
    reference: &Canvas,
    opts: &FitOpts,
    warm_start: Option<&WarmStart>,
) -> CircleFitResult<OptimizationResult> {
    let (mut renderer, mut cleanup) = opts.renderer.build(reference, opts.capacity(warm_start))?;
    let mut optimizer = RandomSearch::new(opts.pipeline.optimizer.clone());
    let out = run_pipeline(
        opts.pipeline.mode,
        renderer.as_mut(),
        &mut optimizer,
        opts.pipeline.circles,
        opts.pipeline.convergence,
        warm_start,
    );
    if renderer.is_degraded() {
        tracing::info!("fit finished on the cpu fallback");
    }
    drop(renderer);
    cleanup.run();
    out
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/opts.rs"]
mod tests;
