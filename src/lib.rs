//! circlefit approximates a reference image with a fixed budget of semi-transparent circles.
//!
//! The crate is the rendering and error-evaluation engine behind that search:
//!
//! - a flat parameter codec with search-space [`Bounds`]
//! - a scanline [`CpuRenderer`] compositing circles with Porter-Duff "over"
//! - SSD/SAD pixel kernels (scalar, AVX2, NEON) behind a dispatch table chosen once per process
//! - an optional wgpu compute renderer (feature `gpu`) that degrades to the CPU on any failure
//! - a backend factory and joint/sequential/batch optimization pipelines
#![deny(unsafe_code)]

mod foundation;

pub mod cost;
pub mod kernels;
pub mod opt;
pub mod params;
/// Optimization pipelines and convergence tracking.
pub mod pipeline;
/// Renderers and backend selection.
pub mod render;

pub use crate::cost::{CostFunction, CostMetric};
pub use crate::foundation::core::{Canvas, WHITE};
pub use crate::foundation::error::{CircleFitError, CircleFitResult};
pub use crate::kernels::{KernelTier, PixelKernels, ScalarVariant, fast_mse, fast_sad, fast_ssd};
pub use crate::opt::{Optimizer, RandomSearch, RandomSearchOpts, WarmStart};
pub use crate::params::{Bounds, Circle, PARAMS_PER_CIRCLE, ParamVector};
pub use crate::pipeline::convergence::{ConvergenceConfig, ConvergenceTracker};
pub use crate::pipeline::opts::{FitOpts, PipelineOpts, RendererOpts, fit};
pub use crate::pipeline::orchestrator::{OptimizationResult, PipelineMode, run_pipeline};
pub use crate::render::backend::{BackendId, Renderer};
pub use crate::render::cpu::CpuRenderer;
pub use crate::render::factory::{
    Cleanup, create_cpu_renderer, create_renderer, normalize_backend_name, supported_backends,
};
#[cfg(feature = "gpu")]
pub use crate::render::gpu::GpuRenderer;
pub use crate::render::raster::composite_circle;
