use std::time::{Duration, Instant};

use anyhow::Context as _;
use circlefit::Renderer as _;
use rayon::prelude::*;
use serde_json::json;

#[derive(Clone, Debug)]
struct BenchArgs {
    width: u32,
    height: u32,
    circles: usize,
    warmup: u32,
    repeats: u32,
    kernel_iterations: u64,
    backend: String,
    workers: usize,
    skip_kernels: bool,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    let args = parse_args()?;

    if args.width == 0 || args.height == 0 {
        anyhow::bail!("--width/--height must be > 0");
    }
    if args.repeats == 0 {
        anyhow::bail!("--repeats must be >= 1");
    }
    if args.workers == 0 {
        anyhow::bail!("--workers must be >= 1");
    }

    let reference = test_image(args.width, args.height, 0x5eed)?;
    let params = random_params(args.circles, args.width, args.height, 7);

    eprintln!(
        "bench: {w}x{h}, {k} circles, {repeats} evaluation(s) ({profile} build), backend={backend}, kernels={tier}",
        w = args.width,
        h = args.height,
        k = args.circles,
        repeats = args.repeats,
        profile = if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        backend = args.backend,
        tier = circlefit::kernels::active_tier(),
    );

    let kernels = if args.skip_kernels {
        json!(null)
    } else {
        bench_kernels(&reference, &args)?
    };
    let renderer = bench_renderer(&reference, &params, &args)?;
    let parallel = bench_parallel_cpu(&reference, &params, &args)?;

    let report = json!({
        "width": args.width,
        "height": args.height,
        "circles": args.circles,
        "repeats": args.repeats,
        "active_tier": circlefit::kernels::active_tier(),
        "kernels": kernels,
        "renderer": renderer,
        "parallel_cpu": parallel,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize bench report")?
    );
    Ok(())
}

fn bench_kernels(
    reference: &circlefit::Canvas,
    args: &BenchArgs,
) -> anyhow::Result<serde_json::Value> {
    let other = test_image(args.width, args.height, 0xbeef)?;
    let iters = args.kernel_iterations.max(1);
    let mut rows = Vec::new();

    let mut tables: Vec<(String, circlefit::PixelKernels)> = circlefit::ScalarVariant::ALL
        .iter()
        .map(|&v| (format!("scalar/{v:?}"), circlefit::PixelKernels::scalar(v)))
        .collect();
    for tier in circlefit::KernelTier::available() {
        if tier == circlefit::KernelTier::Scalar {
            continue;
        }
        if let Some(k) = circlefit::PixelKernels::for_tier(tier) {
            tables.push((tier.to_string(), k));
        }
    }

    for (name, k) in &tables {
        let ssd = circlefit::kernels::measure_ssd_throughput(k, reference, &other, iters);

        let start = Instant::now();
        let mut sink = 0.0;
        for _ in 0..iters {
            sink += k.sad_canvas(reference, &other);
        }
        std::hint::black_box(sink);
        let sad = circlefit::kernels::throughput_mpix_per_s(
            iters,
            args.width,
            args.height,
            start.elapsed(),
        );

        eprintln!("  kernels {name:18} ssd={ssd:>9.1} Mpix/s  sad={sad:>9.1} Mpix/s");
        rows.push(json!({ "name": name, "ssd_mpix_s": ssd, "sad_mpix_s": sad }));
    }
    Ok(json!(rows))
}

fn bench_renderer(
    reference: &circlefit::Canvas,
    params: &[f64],
    args: &BenchArgs,
) -> anyhow::Result<serde_json::Value> {
    let create = Instant::now();
    let (mut renderer, mut cleanup) =
        circlefit::create_renderer(&args.backend, reference, args.circles)
            .with_context(|| format!("create '{}' renderer", args.backend))?;
    let backend_create = create.elapsed();

    for i in 0..args.warmup {
        let _ = renderer.cost(&perturbed(params, u64::from(i)));
    }

    // Distinct vectors every call so result caches never hit.
    let inputs: Vec<Vec<f64>> = (0..args.repeats)
        .map(|i| perturbed(params, 1000 + u64::from(i)))
        .collect();
    let mut samples = Vec::with_capacity(inputs.len());
    let mut last = 0.0;
    for p in &inputs {
        let t = Instant::now();
        last = renderer.cost(p);
        samples.push(t.elapsed());
    }
    std::hint::black_box(last);

    let served_by = renderer.backend();
    let degraded = renderer.is_degraded();
    drop(renderer);
    cleanup.run();

    samples.sort();
    let total: Duration = samples.iter().sum();
    let evals_per_s = samples.len() as f64 / total.as_secs_f64().max(f64::EPSILON);
    eprintln!(
        "  renderer {served_by}: create={create:.3}ms p50={p50:.3}ms p90={p90:.3}ms p99={p99:.3}ms ({evals_per_s:.0} evals/s){deg}",
        create = ms(backend_create),
        p50 = ms(percentile(&samples, 0.50)),
        p90 = ms(percentile(&samples, 0.90)),
        p99 = ms(percentile(&samples, 0.99)),
        deg = if degraded { " [degraded]" } else { "" },
    );

    Ok(json!({
        "requested": args.backend,
        "served_by": served_by.as_str(),
        "degraded": degraded,
        "create_ms": ms(backend_create),
        "p50_ms": ms(percentile(&samples, 0.50)),
        "p90_ms": ms(percentile(&samples, 0.90)),
        "p99_ms": ms(percentile(&samples, 0.99)),
        "evals_per_s": evals_per_s,
    }))
}

fn bench_parallel_cpu(
    reference: &circlefit::Canvas,
    params: &[f64],
    args: &BenchArgs,
) -> anyhow::Result<serde_json::Value> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.workers)
        .build()
        .context("build rayon thread pool")?;

    let start = Instant::now();
    let costs: Vec<f64> = pool.install(|| {
        (0..args.workers)
            .into_par_iter()
            .map(|w| {
                let mut r = circlefit::CpuRenderer::new(reference.clone(), args.circles);
                let mut acc = 0.0;
                for i in 0..args.repeats {
                    acc += r.cost(&perturbed(params, ((w as u64) << 32) | u64::from(i)));
                }
                acc
            })
            .collect()
    });
    let wall = start.elapsed();
    std::hint::black_box(&costs);

    let evals = args.workers as f64 * f64::from(args.repeats);
    let evals_per_s = evals / wall.as_secs_f64().max(f64::EPSILON);
    eprintln!(
        "  parallel cpu x{}: wall={:.3}ms ({evals_per_s:.0} evals/s)",
        args.workers,
        ms(wall)
    );
    Ok(json!({
        "workers": args.workers,
        "wall_ms": ms(wall),
        "evals_per_s": evals_per_s,
    }))
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let n = sorted.len();
    let rank = (p * (n as f64)).ceil().clamp(1.0, n as f64) as usize;
    sorted[rank - 1]
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(seed: u64) -> f64 {
    (mix64(seed) >> 11) as f64 / (1u64 << 53) as f64
}

fn test_image(width: u32, height: u32, seed: u64) -> anyhow::Result<circlefit::Canvas> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for i in 0..u64::from(width) * u64::from(height) {
        let v = mix64(seed ^ i);
        data.extend_from_slice(&[v as u8, (v >> 8) as u8, (v >> 16) as u8, 255]);
    }
    Ok(circlefit::Canvas::from_rgba8(width, height, data)?)
}

fn random_params(k: usize, width: u32, height: u32, seed: u64) -> Vec<f64> {
    let w = f64::from(width);
    let h = f64::from(height);
    let mut out = Vec::with_capacity(k * circlefit::PARAMS_PER_CIRCLE);
    for i in 0..k as u64 {
        let s = seed.wrapping_mul(1_000_003) + i * 16;
        out.extend_from_slice(&[
            unit(s) * w,
            unit(s + 1) * h,
            1.0 + unit(s + 2) * w.max(h) * 0.25,
            unit(s + 3),
            unit(s + 4),
            unit(s + 5),
            0.2 + 0.8 * unit(s + 6),
        ]);
    }
    out
}

fn perturbed(params: &[f64], salt: u64) -> Vec<f64> {
    params
        .iter()
        .enumerate()
        .map(|(i, v)| v + (unit(salt ^ ((i as u64) << 20)) - 0.5) * 1e-3)
        .collect()
}

fn parse_args() -> anyhow::Result<BenchArgs> {
    let mut args = std::env::args().skip(1);

    let mut out = BenchArgs {
        width: 256,
        height: 256,
        circles: 50,
        warmup: 5,
        repeats: 200,
        kernel_iterations: 200,
        backend: "cpu".to_string(),
        workers: 4,
        skip_kernels: false,
    };

    while let Some(a) = args.next() {
        match a.as_str() {
            "--width" => out.width = parse_u32(args.next(), "--width")?,
            "--height" => out.height = parse_u32(args.next(), "--height")?,
            "--circles" => out.circles = parse_usize(args.next(), "--circles")?,
            "--warmup" => out.warmup = parse_u32(args.next(), "--warmup")?,
            "--repeats" => out.repeats = parse_u32(args.next(), "--repeats")?,
            "--kernel-iterations" => {
                out.kernel_iterations =
                    parse_usize(args.next(), "--kernel-iterations")? as u64
            }
            "--workers" => out.workers = parse_usize(args.next(), "--workers")?,
            "--backend" => {
                out.backend = args.next().ok_or_else(|| {
                    anyhow::anyhow!("missing value for --backend (cpu, gpu, opencl, cl)")
                })?
            }
            "--skip-kernels" => out.skip_kernels = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => anyhow::bail!("unknown arg '{a}' (try --help)"),
        }
    }

    Ok(out)
}

fn print_help() {
    eprintln!(
        r#"circlefit-bench

Measures pixel-kernel throughput per tier, per-evaluation renderer latency and
parallel CPU throughput. Human-readable lines go to stderr, a JSON report to stdout.

Usage:
  cargo run -q --release
  cargo run -q --release -- --width 512 --height 512 --circles 200
  cargo run -q --release --features gpu -- --backend gpu

Args:
  --width N              (default 256)
  --height N             (default 256)
  --circles N            (default 50)
  --warmup N             (default 5)
  --repeats N            (default 200; renderer evaluations per worker)
  --kernel-iterations N  (default 200)
  --workers N            (default 4; independent CPU renderers run in parallel)
  --backend NAME         (default cpu)
  --skip-kernels
"#
    );
}

fn parse_u32(v: Option<String>, flag: &str) -> anyhow::Result<u32> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<u32>()
        .with_context(|| format!("parse {flag} value '{v}' as u32"))
}

fn parse_usize(v: Option<String>, flag: &str) -> anyhow::Result<usize> {
    let v = v.ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))?;
    v.parse::<usize>()
        .with_context(|| format!("parse {flag} value '{v}' as usize"))
}
