use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;

#[test]
fn normalize_maps_aliases() {
    assert_eq!(normalize_backend_name(""), BackendId::Cpu);
    assert_eq!(normalize_backend_name("  CPU "), BackendId::Cpu);
    for alias in ["gpu", "GPU", "opencl", "cl", " wgpu"] {
        assert_eq!(normalize_backend_name(alias), BackendId::Gpu, "{alias}");
    }
}

#[test]
fn normalize_passes_unknown_through_unchanged() {
    assert_eq!(
        normalize_backend_name(" Quantum "),
        BackendId::Other(" Quantum ".to_string())
    );
}

#[test]
fn supported_backends_always_lists_cpu() {
    let all = supported_backends();
    assert_eq!(all[0], BackendId::Cpu);
    assert_eq!(all.contains(&BackendId::Gpu), cfg!(feature = "gpu"));
}

#[test]
fn cpu_backend_returns_noop_cleanup() {
    let reference = Canvas::white(4, 4).unwrap();
    let (mut r, mut cleanup) = create_renderer("cpu", &reference, 2).unwrap();
    assert!(!cleanup.is_pending());
    cleanup.run();
    cleanup.run();
    assert_eq!(r.dim(), 14);
    assert_eq!(r.cost(&[]), 0.0);
}

#[test]
fn cpu_helper_applies_metric_and_matches_named_cpu_backend() {
    let reference = Canvas::white(6, 4).unwrap();
    let dot = [2.0, 2.0, 1.5, 0.0, 0.0, 0.0, 1.0];

    let (mut named, _c1) = create_renderer("cpu", &reference, 1).unwrap();
    let (mut mse, c2) = create_cpu_renderer(&reference, 1, CostMetric::Mse);
    let (mut sad, _c3) = create_cpu_renderer(&reference, 1, CostMetric::FastSad);
    assert!(!c2.is_pending());
    assert_eq!(mse.backend(), BackendId::Cpu);
    assert_eq!(named.cost(&dot), mse.cost(&dot));

    let mut expected = CpuRenderer::new(reference.clone(), 1);
    expected.set_cost_metric(CostMetric::FastSad);
    assert_eq!(sad.cost(&dot), expected.cost(&dot));
    assert_ne!(sad.cost(&dot), mse.cost(&dot));
}

#[test]
fn unknown_backend_echoes_name() {
    let reference = Canvas::white(2, 2).unwrap();
    let err = create_renderer("Vulkan9", &reference, 1).err().unwrap();
    assert!(matches!(err, CircleFitError::UnknownBackend(ref n) if n == "Vulkan9"));
}

#[test]
fn cuda_is_recognized_but_not_implemented() {
    let reference = Canvas::white(2, 2).unwrap();
    let err = create_renderer("CUDA", &reference, 1).err().unwrap();
    assert!(matches!(err, CircleFitError::BackendNotImplemented(_)));
}

#[cfg(not(feature = "gpu"))]
#[test]
fn gpu_without_feature_is_unavailable() {
    let reference = Canvas::white(2, 2).unwrap();
    let err = create_renderer("opencl", &reference, 1).err().unwrap();
    assert!(matches!(err, CircleFitError::BackendUnavailable(_)));
}

#[test]
fn cleanup_runs_exactly_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let mut c = Cleanup::new(move || {
        h.fetch_add(1, Ordering::SeqCst);
    });
    assert!(c.is_pending());
    c.run();
    c.run();
    drop(c);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn cleanup_runs_on_drop() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    {
        let _c = Cleanup::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
