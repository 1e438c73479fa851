use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use circlefit::Renderer as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "circlefit", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Approximate a PNG with circles.
    Fit(FitArgs),
    /// Print the active pixel kernels and their throughput.
    Kernels(KernelArgs),
}

#[derive(Parser, Debug)]
struct FitArgs {
    /// Reference image (PNG).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Fit options JSON; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the optimization result as JSON.
    #[arg(long)]
    result: Option<PathBuf>,

    /// Resume from a previous result JSON.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Circle budget (joint and sequential mode).
    #[arg(long)]
    circles: Option<usize>,

    #[arg(long, value_enum)]
    mode: Option<ModeChoice>,

    /// Circles per pass in batch mode.
    #[arg(long, default_value_t = 5)]
    batch_size: usize,

    /// Passes in batch mode; defaults to `circles / batch_size`.
    #[arg(long)]
    passes: Option<usize>,

    /// Backend selector (cpu, gpu, opencl, cl, wgpu).
    #[arg(long)]
    backend: Option<String>,

    #[arg(long, value_enum)]
    cost: Option<circlefit::CostMetric>,

    /// Optimizer generations per run.
    #[arg(long)]
    iters: Option<usize>,

    /// Candidates per generation.
    #[arg(long)]
    population: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Disable early stopping.
    #[arg(long)]
    no_convergence: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Joint,
    Sequential,
    Batch,
}

#[derive(Parser, Debug)]
struct KernelArgs {
    /// SSD evaluations per tier for the throughput estimate (0 skips it).
    #[arg(long, default_value_t = 200)]
    iterations: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Fit(args) => cmd_fit(args),
        Command::Kernels(args) => cmd_kernels(args),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse {what} JSON '{}'", path.display()))
}

fn fit_opts(args: &FitArgs) -> anyhow::Result<circlefit::FitOpts> {
    let mut opts: circlefit::FitOpts = match &args.config {
        Some(path) => read_json(path, "fit options")?,
        None => circlefit::FitOpts::default(),
    };

    if let Some(backend) = &args.backend {
        opts.renderer.backend = backend.clone();
    }
    if let Some(cost) = args.cost {
        opts.renderer.cost = cost;
    }
    if let Some(circles) = args.circles {
        opts.pipeline.circles = circles;
    }
    if let Some(mode) = args.mode {
        opts.pipeline.mode = match mode {
            ModeChoice::Joint => circlefit::PipelineMode::Joint,
            ModeChoice::Sequential => circlefit::PipelineMode::Sequential,
            ModeChoice::Batch => {
                anyhow::ensure!(args.batch_size > 0, "--batch-size must be positive");
                circlefit::PipelineMode::Batch {
                    batch_size: args.batch_size,
                    passes: args
                        .passes
                        .unwrap_or_else(|| opts.pipeline.circles.div_ceil(args.batch_size)),
                }
            }
        };
    }
    if let Some(iters) = args.iters {
        opts.pipeline.optimizer.iterations = iters;
    }
    if let Some(population) = args.population {
        opts.pipeline.optimizer.population = population;
    }
    if let Some(seed) = args.seed {
        opts.pipeline.optimizer.seed = seed;
    }
    if args.no_convergence {
        opts.pipeline.convergence = circlefit::ConvergenceConfig::disabled();
    }
    Ok(opts)
}

fn cmd_fit(args: FitArgs) -> anyhow::Result<()> {
    let opts = fit_opts(&args)?;

    let img = image::open(&args.in_path)
        .with_context(|| format!("decode image '{}'", args.in_path.display()))?
        .to_rgba8();
    let reference = circlefit::Canvas::from_rgba_image(&img)?;

    let warm: Option<circlefit::WarmStart> = match &args.resume {
        Some(path) => {
            let prev: circlefit::OptimizationResult = read_json(path, "previous result")?;
            Some(prev.warm_start())
        }
        None => None,
    };

    tracing::info!(
        width = reference.width(),
        height = reference.height(),
        backend = %opts.renderer.backend,
        mode = ?opts.pipeline.mode,
        kernels = %circlefit::kernels::active_tier(),
        "fit started"
    );
    let result = circlefit::fit(&reference, &opts, warm.as_ref())?;

    let mut renderer = circlefit::CpuRenderer::new(reference, result.circles_used);
    let out = renderer.render(&result.best_params).to_rgba_image()?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    out.save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    if let Some(path) = &args.result {
        let f = File::create(path)
            .with_context(|| format!("create result '{}'", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(f), &result)
            .with_context(|| format!("write result '{}'", path.display()))?;
    }

    eprintln!(
        "cost {:.3} -> {:.3} ({:.1}% better), {} circles, {} passes{}",
        result.initial_cost,
        result.best_cost,
        result.improvement() * 100.0,
        result.circles_used,
        result.passes_used,
        if result.stopped_early {
            ", stopped early"
        } else {
            ""
        }
    );
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_kernels(args: KernelArgs) -> anyhow::Result<()> {
    println!("active: {}", circlefit::kernels::active_tier());
    let available: Vec<String> = circlefit::KernelTier::available()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("available: {}", available.join(", "));
    println!(
        "backends: {}",
        circlefit::supported_backends()
            .iter()
            .map(|b| b.as_str().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if args.iterations == 0 {
        return Ok(());
    }
    let a = circlefit::Canvas::white(256, 256)?;
    let b = circlefit::Canvas::filled(256, 256, [12, 34, 56, 255])?;
    for tier in circlefit::KernelTier::available() {
        let Some(kernels) = circlefit::PixelKernels::for_tier(tier) else {
            continue;
        };
        let mpix = circlefit::kernels::measure_ssd_throughput(&kernels, &a, &b, args.iterations);
        println!("ssd {tier:>6}: {mpix:.1} Mpix/s");
    }
    Ok(())
}
