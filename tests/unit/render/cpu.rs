use super::*;
use crate::params::{Circle, ParamVector};

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn gradient(w: u32, h: u32) -> Canvas {
    let mut c = Canvas::white(w, h).unwrap();
    for y in 0..h {
        for x in 0..w {
            c.set_pixel(x, y, [(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8, 255]);
        }
    }
    c
}

fn random_params(k: usize, w: u32, h: u32, seed: u64) -> Vec<f64> {
    let u = |s: u64| (mix64(s) >> 11) as f64 / (1u64 << 53) as f64;
    let mut out = Vec::with_capacity(k * 7);
    for i in 0..k as u64 {
        let s = seed * 1000 + i * 10;
        out.extend_from_slice(&[
            u(s) * f64::from(w),
            u(s + 1) * f64::from(h),
            1.0 + u(s + 2) * f64::from(w.max(h)) * 0.4,
            u(s + 3),
            u(s + 4),
            u(s + 5),
            u(s + 6),
        ]);
    }
    out
}

#[test]
fn empty_params_render_background() {
    let reference = gradient(8, 6);
    let mut r = CpuRenderer::new(reference, 3);
    let out = r.render(&[]);
    assert!(out.data().iter().all(|&b| b == 255));
}

#[test]
fn dim_and_bounds_follow_k() {
    let r = CpuRenderer::new(gradient(10, 20), 4);
    assert_eq!(r.dim(), 28);
    assert_eq!(r.bounds().upper[2], 20.0);
    assert_eq!(r.circles(), 4);
    assert_eq!(r.backend(), BackendId::Cpu);
    assert!(!r.is_degraded());
}

#[test]
fn render_is_deterministic_and_resets_between_calls() {
    let mut r = CpuRenderer::new(gradient(16, 16), 5);
    let p = random_params(5, 16, 16, 3);
    let first = r.render(&p).clone();
    let _ = r.render(&random_params(5, 16, 16, 4));
    let again = r.render(&p).clone();
    assert_eq!(first, again);
}

#[test]
fn renders_len_over_seven_circles() {
    let mut r = CpuRenderer::new(gradient(8, 8), 1);
    let pv = ParamVector::from_circles(&[
        Circle {
            x: 1.0,
            y: 1.0,
            r: 1.0,
            opacity: 1.0,
            ..Circle::default()
        },
        Circle {
            x: 6.0,
            y: 6.0,
            r: 1.0,
            opacity: 1.0,
            ..Circle::default()
        },
    ]);
    let out = r.render(pv.as_slice());
    assert_eq!(out.pixel(1, 1), [0, 0, 0, 255]);
    assert_eq!(out.pixel(6, 6), [0, 0, 0, 255]);
}

#[test]
fn cost_of_reference_itself_is_zero() {
    let reference = Canvas::white(7, 5).unwrap();
    let mut r = CpuRenderer::new(reference, 2);
    assert_eq!(r.cost(&[0.0; 14]), 0.0);
}

#[test]
fn fast_cost_agrees_with_default() {
    let reference = gradient(32, 24);
    let mut r = CpuRenderer::new(reference, 10);
    for seed in 0..8 {
        let p = random_params(10, 32, 24, seed);
        r.set_cost_metric(CostMetric::Mse);
        let slow = r.cost(&p);
        r.use_fast_cost();
        let fast = r.cost(&p);
        let rel = (slow - fast).abs() / slow.max(1e-12);
        assert!(rel <= 1e-3, "seed {seed}: {slow} vs {fast}");
    }
}

#[test]
fn custom_cost_function_is_used() {
    let mut r = CpuRenderer::new(gradient(4, 4), 1);
    r.set_cost_function(Box::new(|_: &Canvas, _: &Canvas| 42.0));
    assert_eq!(r.cost(&[0.0; 7]), 42.0);
}

#[test]
fn custom_background_is_restored_each_render() {
    let reference = gradient(6, 6);
    let bg = Canvas::filled(6, 6, [10, 20, 30, 255]).unwrap();
    let mut r = CpuRenderer::with_background(reference, &bg, 1);
    let p = [3.0, 3.0, 2.0, 1.0, 1.0, 1.0, 1.0];
    assert_eq!(r.render(&p).pixel(3, 3), [255, 255, 255, 255]);
    assert_eq!(r.render(&[]).pixel(3, 3), [10, 20, 30, 255]);
    assert_eq!(r.background().pixel(0, 0), [10, 20, 30, 255]);
}

#[test]
#[should_panic(expected = "canvas dimensions must match")]
fn custom_background_dimension_mismatch_panics() {
    let bg = Canvas::white(5, 6).unwrap();
    let _ = CpuRenderer::with_background(gradient(6, 6), &bg, 1);
}
