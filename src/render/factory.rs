use crate::cost::CostMetric;
use crate::foundation::core::Canvas;
use crate::foundation::error::{CircleFitError, CircleFitResult};
use crate::render::backend::{BackendId, Renderer};
use crate::render::cpu::CpuRenderer;

/// Selectors the factory recognizes but has no code path for.
const NOT_IMPLEMENTED: &[&str] = &["cuda"];

/// Map a user-supplied backend selector to its canonical id.
///
/// Matching ignores case and surrounding whitespace. Unrecognized selectors come back as
/// [`BackendId::Other`] carrying the caller's original string.
pub fn normalize_backend_name(name: &str) -> BackendId {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "cpu" => BackendId::Cpu,
        "gpu" | "opencl" | "cl" | "wgpu" => BackendId::Gpu,
        _ => BackendId::Other(name.to_string()),
    }
}

/// Canonical ids of the backends this build can construct.
pub fn supported_backends() -> Vec<BackendId> {
    let mut out = vec![BackendId::Cpu];
    if cfg!(feature = "gpu") {
        out.push(BackendId::Gpu);
    }
    out
}

/// Release action returned alongside every renderer.
///
/// Runs at most once, either through [`Cleanup::run`] or when dropped. The CPU path hands out a
/// no-op so callers can always keep the handle alive for as long as the renderer.
#[must_use = "dropping a Cleanup releases the renderer's resources immediately"]
pub struct Cleanup {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl Cleanup {
    pub fn noop() -> Self {
        Self { action: None }
    }

    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// Run the release action if it has not run yet.
    pub fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }

    /// `true` while the release action has not run.
    pub fn is_pending(&self) -> bool {
        self.action.is_some()
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Construct the renderer named by `name` for `k` circles against `reference`.
///
/// - `cpu` always succeeds and returns a no-op cleanup.
/// - `gpu` fails with [`CircleFitError::BackendUnavailable`] when the crate was built without
///   the `gpu` feature or no adapter/device can be acquired. Failures after that point yield a
///   renderer that serves every call from the CPU.
/// - recognized selectors without a code path fail with
///   [`CircleFitError::BackendNotImplemented`]; anything else with
///   [`CircleFitError::UnknownBackend`].
///
/// Bind the returned [`Cleanup`] for as long as the renderer is in use. Dropping it, e.g. via
/// `let (r, _) = create_renderer(..)?`, releases the device at once and every later call on a
/// GPU renderer falls back to the CPU.
pub fn create_renderer(
    name: &str,
    reference: &Canvas,
    k: usize,
) -> CircleFitResult<(Box<dyn Renderer>, Cleanup)> {
    match normalize_backend_name(name) {
        BackendId::Cpu => Ok(create_cpu_renderer(reference, k, CostMetric::default())),
        BackendId::Gpu => create_gpu(reference, k),
        BackendId::Other(raw) => {
            let canon = raw.trim().to_ascii_lowercase();
            if NOT_IMPLEMENTED.contains(&canon.as_str()) {
                Err(CircleFitError::backend_not_implemented(raw))
            } else {
                Err(CircleFitError::unknown_backend(raw))
            }
        }
    }
}

/// CPU renderer scoring with `metric`, paired with a no-op cleanup.
pub fn create_cpu_renderer(
    reference: &Canvas,
    k: usize,
    metric: CostMetric,
) -> (Box<dyn Renderer>, Cleanup) {
    let mut renderer = CpuRenderer::new(reference.clone(), k);
    renderer.set_cost_metric(metric);
    (Box::new(renderer), Cleanup::noop())
}

#[cfg(feature = "gpu")]
fn create_gpu(reference: &Canvas, k: usize) -> CircleFitResult<(Box<dyn Renderer>, Cleanup)> {
    let renderer = crate::render::gpu::GpuRenderer::new(reference.clone(), k)?;
    let cleanup = renderer.cleanup_handle();
    Ok((Box::new(renderer), cleanup))
}

#[cfg(not(feature = "gpu"))]
fn create_gpu(_reference: &Canvas, _k: usize) -> CircleFitResult<(Box<dyn Renderer>, Cleanup)> {
    Err(CircleFitError::backend_unavailable(
        "gpu backend requires building with the `gpu` feature",
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/render/factory.rs"]
mod tests;
