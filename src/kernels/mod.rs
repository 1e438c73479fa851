//! Pixel-difference kernels and their dispatch table.
//!
//! Every kernel shares one signature: two RGBA8 buffers with the same `stride`, a `width` and a
//! `height`, returning an `f64`. Alpha bytes are never read into the result.
//!
//! The process-wide table is built once on first use and is immutable afterwards. Tests and
//! benchmarks that want a specific tier or scalar variant build their own [`PixelKernels`] value
//! instead of touching global state.

use std::fmt;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::foundation::core::Canvas;

pub mod scalar;

#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(target_arch = "x86_64")]
mod x86;

/// Environment variable forcing a kernel tier (`scalar`, `avx2`, `neon` or `auto`).
pub const KERNELS_ENV: &str = "CIRCLEFIT_KERNELS";

/// Signature shared by all SSD and SAD implementations.
pub type KernelFn = fn(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64;

/// Instruction-set tier a kernel table runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelTier {
    /// Portable scalar code.
    Scalar,
    /// x86-64 AVX2, 8 pixels per iteration.
    Avx2,
    /// AArch64 NEON, 4 pixels per iteration.
    Neon,
}

impl KernelTier {
    /// Tiers the current CPU can execute, best first.
    pub fn available() -> Vec<KernelTier> {
        let mut out = Vec::with_capacity(2);
        #[cfg(target_arch = "x86_64")]
        {
            if std::arch::is_x86_feature_detected!("avx2") {
                out.push(KernelTier::Avx2);
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            if std::arch::is_aarch64_feature_detected!("neon") {
                out.push(KernelTier::Neon);
            }
        }
        out.push(KernelTier::Scalar);
        out
    }

    pub fn is_available(self) -> bool {
        Self::available().contains(&self)
    }

    /// Parse a tier name; `auto` maps to `None`.
    pub fn parse(s: &str) -> Result<Option<KernelTier>, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(None),
            "scalar" => Ok(Some(KernelTier::Scalar)),
            "avx2" => Ok(Some(KernelTier::Avx2)),
            "neon" => Ok(Some(KernelTier::Neon)),
            other => Err(format!(
                "unknown kernel tier '{other}' (expected scalar, avx2, neon or auto)"
            )),
        }
    }
}

impl fmt::Display for KernelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KernelTier::Scalar => "scalar",
            KernelTier::Avx2 => "AVX2",
            KernelTier::Neon => "NEON",
        })
    }
}

/// Loop shape of the scalar SSD kernel. All variants return bit-identical sums.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarVariant {
    Naive,
    Unrolled4,
    #[default]
    Unrolled8,
}

impl ScalarVariant {
    pub const ALL: [ScalarVariant; 3] = [
        ScalarVariant::Naive,
        ScalarVariant::Unrolled4,
        ScalarVariant::Unrolled8,
    ];

    fn ssd_fn(self) -> KernelFn {
        match self {
            ScalarVariant::Naive => scalar::ssd_naive,
            ScalarVariant::Unrolled4 => scalar::ssd_unrolled4,
            ScalarVariant::Unrolled8 => scalar::ssd_unrolled8,
        }
    }
}

/// Immutable table of SSD/SAD kernels for one tier.
#[derive(Clone, Copy)]
pub struct PixelKernels {
    tier: KernelTier,
    ssd: KernelFn,
    sad: KernelFn,
}

impl fmt::Debug for PixelKernels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelKernels")
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

impl PixelKernels {
    /// Scalar table using the given SSD loop shape.
    pub fn scalar(variant: ScalarVariant) -> Self {
        Self {
            tier: KernelTier::Scalar,
            ssd: variant.ssd_fn(),
            sad: scalar::sad,
        }
    }

    /// Table for `tier`, or `None` when the CPU cannot execute it.
    pub fn for_tier(tier: KernelTier) -> Option<Self> {
        match tier {
            KernelTier::Scalar => Some(Self::scalar(ScalarVariant::default())),
            KernelTier::Avx2 => Self::avx2(),
            KernelTier::Neon => Self::neon(),
        }
    }

    /// Best table for the current CPU.
    pub fn detect() -> Self {
        KernelTier::available()
            .into_iter()
            .find_map(Self::for_tier)
            .unwrap_or_else(|| Self::scalar(ScalarVariant::default()))
    }

    #[cfg(target_arch = "x86_64")]
    fn avx2() -> Option<Self> {
        std::arch::is_x86_feature_detected!("avx2").then_some(Self {
            tier: KernelTier::Avx2,
            ssd: x86::ssd,
            sad: x86::sad,
        })
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn avx2() -> Option<Self> {
        None
    }

    #[cfg(target_arch = "aarch64")]
    fn neon() -> Option<Self> {
        std::arch::is_aarch64_feature_detected!("neon").then_some(Self {
            tier: KernelTier::Neon,
            ssd: neon::ssd,
            sad: neon::sad,
        })
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn neon() -> Option<Self> {
        None
    }

    pub fn tier(&self) -> KernelTier {
        self.tier
    }

    /// Sum of squared RGB differences over `height` rows of `width` pixels.
    ///
    /// # Panics
    ///
    /// Panics when either buffer is too short for the given geometry.
    pub fn ssd(&self, a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
        check_geometry(a, b, stride, width, height);
        (self.ssd)(a, b, stride, width, height)
    }

    /// Quadratically weighted sum of absolute RGB differences.
    ///
    /// # Panics
    ///
    /// Panics when either buffer is too short for the given geometry.
    pub fn sad(&self, a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) -> f64 {
        check_geometry(a, b, stride, width, height);
        (self.sad)(a, b, stride, width, height)
    }

    /// SSD between two canvases.
    ///
    /// # Panics
    ///
    /// Panics on a layout mismatch.
    pub fn ssd_canvas(&self, current: &Canvas, reference: &Canvas) -> f64 {
        check_layout(current, reference);
        self.ssd(
            current.data(),
            reference.data(),
            current.stride(),
            current.width() as usize,
            current.height() as usize,
        )
    }

    /// Weighted SAD between two canvases.
    ///
    /// # Panics
    ///
    /// Panics on a layout mismatch.
    pub fn sad_canvas(&self, current: &Canvas, reference: &Canvas) -> f64 {
        check_layout(current, reference);
        self.sad(
            current.data(),
            reference.data(),
            current.stride(),
            current.width() as usize,
            current.height() as usize,
        )
    }

    /// SSD normalized by `width * height * 3`. Empty canvases score `0`.
    pub fn mse_canvas(&self, current: &Canvas, reference: &Canvas) -> f64 {
        let denom = current.pixel_count() * 3;
        if denom == 0 {
            return 0.0;
        }
        self.ssd_canvas(current, reference) / denom as f64
    }
}

fn check_geometry(a: &[u8], b: &[u8], stride: usize, width: usize, height: usize) {
    if width == 0 || height == 0 {
        return;
    }
    assert!(
        stride >= width * 4,
        "kernel stride {stride} smaller than width * 4 = {}",
        width * 4
    );
    let need = (height - 1) * stride + width * 4;
    assert!(
        a.len() >= need && b.len() >= need,
        "kernel buffers too short: need {need} bytes, got {} and {}",
        a.len(),
        b.len()
    );
}

fn check_layout(current: &Canvas, reference: &Canvas) {
    assert!(
        current.same_layout(reference),
        "image dimensions must match: {}x{} vs {}x{}",
        current.width(),
        current.height(),
        reference.width(),
        reference.height()
    );
}

static ACTIVE: OnceLock<PixelKernels> = OnceLock::new();

/// Process-wide kernel table, initialized on first call.
pub fn active() -> &'static PixelKernels {
    ACTIVE.get_or_init(init_active)
}

/// Tier of the process-wide table.
pub fn active_tier() -> KernelTier {
    active().tier()
}

fn init_active() -> PixelKernels {
    let forced = std::env::var(KERNELS_ENV).ok();
    let kernels = match forced.as_deref().map(KernelTier::parse) {
        Some(Ok(Some(tier))) => match PixelKernels::for_tier(tier) {
            Some(k) => {
                tracing::debug!(tier = %tier, env = KERNELS_ENV, "pixel kernel tier forced");
                k
            }
            None => {
                tracing::warn!(
                    tier = %tier,
                    env = KERNELS_ENV,
                    "forced kernel tier is not supported on this CPU, auto-detecting"
                );
                PixelKernels::detect()
            }
        },
        Some(Err(msg)) => {
            tracing::warn!(env = KERNELS_ENV, "{msg}, auto-detecting");
            PixelKernels::detect()
        }
        Some(Ok(None)) | None => PixelKernels::detect(),
    };
    tracing::debug!(tier = %kernels.tier(), "pixel kernels initialized");
    kernels
}

/// Raw SSD between two canvases using the process-wide table.
pub fn fast_ssd(current: &Canvas, reference: &Canvas) -> f64 {
    active().ssd_canvas(current, reference)
}

/// SSD-based MSE (`ssd / (width * height * 3)`) using the process-wide table.
pub fn fast_mse(current: &Canvas, reference: &Canvas) -> f64 {
    active().mse_canvas(current, reference)
}

/// Weighted SAD between two canvases using the process-wide table.
pub fn fast_sad(current: &Canvas, reference: &Canvas) -> f64 {
    active().sad_canvas(current, reference)
}

/// Check the active SSD and SAD kernels against every scalar variant.
///
/// Returns `false` as soon as any relative difference exceeds `tolerance`.
pub fn compare_implementations(a: &Canvas, b: &Canvas, tolerance: f64) -> bool {
    let active = active();
    let ssd = active.ssd_canvas(a, b);
    let sad = active.sad_canvas(a, b);

    ScalarVariant::ALL.iter().all(|&variant| {
        let oracle = PixelKernels::scalar(variant);
        let ok_ssd = within(ssd, oracle.ssd_canvas(a, b), tolerance);
        let ok_sad = within(sad, oracle.sad_canvas(a, b), tolerance);
        if !(ok_ssd && ok_sad) {
            tracing::warn!(tier = %active.tier(), ?variant, "kernel mismatch against scalar oracle");
        }
        ok_ssd && ok_sad
    })
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= tolerance * scale
}

/// Megapixels per second for `iterations` passes over a `width x height` image.
pub fn throughput_mpix_per_s(iterations: u64, width: u32, height: u32, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    let pixels = iterations as f64 * f64::from(width) * f64::from(height);
    pixels / secs / 1e6
}

/// Time `iterations` SSD evaluations of `kernels` and report Mpix/s.
pub fn measure_ssd_throughput(
    kernels: &PixelKernels,
    a: &Canvas,
    b: &Canvas,
    iterations: u64,
) -> f64 {
    let start = Instant::now();
    let mut sink = 0.0;
    for _ in 0..iterations {
        sink += kernels.ssd_canvas(a, b);
    }
    std::hint::black_box(sink);
    throughput_mpix_per_s(iterations, a.width(), a.height(), start.elapsed())
}

#[cfg(test)]
#[path = "../../tests/unit/kernels/dispatch.rs"]
mod tests;
