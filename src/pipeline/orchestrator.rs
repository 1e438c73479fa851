use crate::foundation::error::{CircleFitError, CircleFitResult};
use crate::opt::{Optimizer, WarmStart};
use crate::params::{PARAMS_PER_CIRCLE, circle_count};
use crate::pipeline::convergence::{ConvergenceConfig, ConvergenceTracker};
use crate::render::backend::Renderer;

/// How circles are added to the solution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum PipelineMode {
    /// All `K` circles in a single optimizer run.
    #[default]
    Joint,
    /// One circle per optimizer run, earlier circles frozen.
    Sequential,
    /// `batch_size` circles per optimizer run, for up to `passes` runs.
    Batch { batch_size: usize, passes: usize },
}

impl PipelineMode {
    /// Total circles the mode asks for given the requested `k`.
    pub fn circles_requested(&self, k: usize) -> usize {
        match *self {
            PipelineMode::Joint | PipelineMode::Sequential => k,
            PipelineMode::Batch { batch_size, passes } => batch_size * passes,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OptimizationResult {
    /// Parameters of every placed circle (`circles_used * 7` values).
    pub best_params: Vec<f64>,
    /// Cost of `best_params`.
    pub best_cost: f64,
    /// Cost with every circle transparent.
    pub initial_cost: f64,
    pub circles_used: usize,
    /// Optimizer runs performed.
    pub passes_used: usize,
    /// `true` when the convergence tracker ended the run.
    pub stopped_early: bool,
}

impl OptimizationResult {
    /// Relative cost reduction versus the empty image, `0` when the initial cost is zero.
    pub fn improvement(&self) -> f64 {
        if self.initial_cost > 0.0 {
            (self.initial_cost - self.best_cost) / self.initial_cost
        } else {
            0.0
        }
    }

    pub fn warm_start(&self) -> WarmStart {
        WarmStart {
            params: self.best_params.clone(),
            cost: self.best_cost,
        }
    }
}

/// Run `mode` for `k` circles.
///
/// A warm start is forwarded to the optimizer in joint mode. In sequential and batch mode its
/// whole circles become the frozen prefix the run continues from.
pub fn run_pipeline(
    mode: PipelineMode,
    renderer: &mut dyn Renderer,
    optimizer: &mut dyn Optimizer,
    k: usize,
    convergence: ConvergenceConfig,
    warm_start: Option<&WarmStart>,
) -> CircleFitResult<OptimizationResult> {
    match mode {
        PipelineMode::Joint => {
            if let Some(seed) = warm_start
                && !optimizer.warm_start(seed)
            {
                tracing::debug!("optimizer ignores warm start");
            }
            optimize_joint(renderer, optimizer, k)
        }
        PipelineMode::Sequential => {
            optimize_sequential(renderer, optimizer, k, convergence, resume_prefix(warm_start))
        }
        PipelineMode::Batch { batch_size, passes } => optimize_batch(
            renderer,
            optimizer,
            batch_size,
            passes,
            convergence,
            resume_prefix(warm_start),
        ),
    }
}

fn resume_prefix(warm_start: Option<&WarmStart>) -> Vec<f64> {
    warm_start
        .map(|ws| ws.params[..circle_count(&ws.params) * PARAMS_PER_CIRCLE].to_vec())
        .unwrap_or_default()
}

fn check_capacity(renderer: &dyn Renderer, circles: usize) -> CircleFitResult<()> {
    let capacity = renderer.bounds().circles();
    if circles > capacity {
        return Err(CircleFitError::validation(format!(
            "pipeline needs {circles} circles but the renderer was built for {capacity}"
        )));
    }
    Ok(())
}

fn empty_cost(renderer: &mut dyn Renderer, k: usize) -> f64 {
    renderer.cost(&vec![0.0; k * PARAMS_PER_CIRCLE])
}

/// Optimize all `k` circles at once over a `k * 7` dimensional space.
#[tracing::instrument(skip(renderer, optimizer), fields(backend = %renderer.backend()))]
pub fn optimize_joint(
    renderer: &mut dyn Renderer,
    optimizer: &mut dyn Optimizer,
    k: usize,
) -> CircleFitResult<OptimizationResult> {
    check_capacity(renderer, k)?;
    let bounds = renderer.bounds().truncate(k);
    let initial_cost = empty_cost(renderer, k);
    tracing::info!(circles = k, initial_cost, "joint optimization started");

    let mut objective = |p: &[f64]| renderer.cost(p);
    let (best_params, best_cost) = optimizer.run(&mut objective, &bounds.lower, &bounds.upper);

    tracing::info!(initial_cost, best_cost, "joint optimization finished");
    Ok(OptimizationResult {
        best_params,
        best_cost,
        initial_cost,
        circles_used: k,
        passes_used: 1,
        stopped_early: false,
    })
}

/// Place circles one at a time until `k` are placed, freezing each after its run.
///
/// Circles already in `prefix` count towards `k`.
#[tracing::instrument(skip(renderer, optimizer, prefix), fields(backend = %renderer.backend()))]
pub fn optimize_sequential(
    renderer: &mut dyn Renderer,
    optimizer: &mut dyn Optimizer,
    k: usize,
    convergence: ConvergenceConfig,
    prefix: Vec<f64>,
) -> CircleFitResult<OptimizationResult> {
    let remaining = k.saturating_sub(circle_count(&prefix));
    grow(renderer, optimizer, 1, remaining, convergence, prefix)
}

/// Add `batch_size` circles per pass for up to `passes` passes on top of `prefix`.
#[tracing::instrument(skip(renderer, optimizer, prefix), fields(backend = %renderer.backend()))]
pub fn optimize_batch(
    renderer: &mut dyn Renderer,
    optimizer: &mut dyn Optimizer,
    batch_size: usize,
    passes: usize,
    convergence: ConvergenceConfig,
    prefix: Vec<f64>,
) -> CircleFitResult<OptimizationResult> {
    if batch_size == 0 {
        return Err(CircleFitError::validation("batch size must be positive"));
    }
    grow(renderer, optimizer, batch_size, passes, convergence, prefix)
}

fn grow(
    renderer: &mut dyn Renderer,
    optimizer: &mut dyn Optimizer,
    step: usize,
    passes: usize,
    convergence: ConvergenceConfig,
    prefix: Vec<f64>,
) -> CircleFitResult<OptimizationResult> {
    let resumed = circle_count(&prefix);
    let requested = resumed + step * passes;
    check_capacity(renderer, requested)?;

    let slot_bounds = renderer.bounds().truncate(step.min(requested));
    let initial_cost = empty_cost(renderer, requested);
    tracing::info!(
        step,
        passes,
        resumed,
        convergence_enabled = convergence.enabled,
        patience = convergence.patience,
        threshold = convergence.threshold,
        initial_cost,
        "incremental optimization started"
    );

    let mut tracker = ConvergenceTracker::new(convergence);
    let mut placed = prefix;
    let mut scratch = Vec::with_capacity(requested * PARAMS_PER_CIRCLE);
    let mut passes_used = 0;
    let mut stopped_early = false;

    for pass in 0..passes {
        let frozen = placed.len();
        let mut objective = |fresh: &[f64]| {
            scratch.clear();
            scratch.extend_from_slice(&placed[..frozen]);
            scratch.extend_from_slice(fresh);
            renderer.cost(&scratch)
        };
        let (best_new, _) = optimizer.run(&mut objective, &slot_bounds.lower, &slot_bounds.upper);
        placed.extend_from_slice(&best_new);
        passes_used = pass + 1;

        let cost = renderer.cost(&placed);
        tracing::debug!(pass = passes_used, circles = circle_count(&placed), cost, "pass finished");
        if tracker.update(cost) {
            tracing::info!(
                passes_used,
                passes_requested = passes,
                circles_used = circle_count(&placed),
                cost,
                "converged, stopping early"
            );
            stopped_early = true;
            break;
        }
    }

    let best_cost = renderer.cost(&placed);
    let circles_used = circle_count(&placed);
    tracing::info!(
        initial_cost,
        best_cost,
        circles_used,
        passes_used,
        "incremental optimization finished"
    );
    Ok(OptimizationResult {
        best_params: placed,
        best_cost,
        initial_cost,
        circles_used,
        passes_used,
        stopped_early,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/orchestrator.rs"]
mod tests;
