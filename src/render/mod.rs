/// Renderer contract shared by every backend.
pub mod backend;
/// CPU scanline renderer.
pub mod cpu;
/// Backend selection by name.
pub mod factory;
/// wgpu compute renderer.
#[cfg(feature = "gpu")]
pub mod gpu;
pub(crate) mod raster;
