use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lottiereel::server::ApiServer;
use lottiereel::{
    AnimationDescriptor, EncoderOpts, FrameIndex, PixelLayout, ProcessRasterizerFactory,
    RenderOpts, Rgb8, ServiceConfig,
};

#[derive(Parser, Debug)]
#[command(name = "lottiereel", version, about = "Render Lottie animations to MP4")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render an MP4 video (requires `ffmpeg`).
    Render(RenderArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Print the resampling plan as JSON without rendering.
    Plan(PlanArgs),
    /// Run the HTTP job service.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct SizeArgs {
    /// Output width (defaults to the animation's `w`).
    #[arg(long)]
    width: Option<u32>,

    /// Output height (defaults to the animation's `h`).
    #[arg(long)]
    height: Option<u32>,

    /// Background colour, `#RRGGBB`.
    #[arg(long = "bg", default_value = "#000000")]
    background: String,
}

#[derive(clap::Args, Debug)]
struct RasterizerArgs {
    /// Rasterizer executable.
    #[arg(long, env = "LOTTIEREEL_RASTERIZER")]
    rasterizer: Option<PathBuf>,

    /// Seconds to wait for each rasterizer to report ready (0 waits forever).
    #[arg(long, default_value_t = 30)]
    ready_timeout_secs: u64,
}

#[derive(clap::Args, Debug)]
struct EncoderArgs {
    /// Constant rate factor.
    #[arg(long, env = "LOTTIEREEL_CRF", default_value_t = 18.0)]
    crf: f32,

    /// Encoder preset.
    #[arg(long, env = "LOTTIEREEL_PRESET", default_value = "veryfast")]
    preset: String,

    /// Encoder threads.
    #[arg(long)]
    threads: Option<u32>,

    /// Explicit `ffmpeg` binary (otherwise `FFMPEG_PATH`, then `PATH`).
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Extra encoder argument, placed before the output path. Repeatable.
    #[arg(long = "extra-arg", allow_hyphen_values = true)]
    extra_args: Vec<String>,

    /// Pipe packed RGB instead of RGBA into the encoder.
    #[arg(long, default_value_t = false)]
    rgb24: bool,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input Lottie JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Output frame rate (defaults to the animation's rate).
    #[arg(long)]
    fps: Option<f64>,

    /// Render workers (clamped to `min(cpus - 1, 8)`).
    #[arg(long, env = "LOTTIEREEL_WORKERS")]
    workers: Option<usize>,

    #[command(flatten)]
    size: SizeArgs,

    #[command(flatten)]
    rasterizer: RasterizerArgs,

    #[command(flatten)]
    encoder: EncoderArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input Lottie JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Source frame index (0-based).
    #[arg(long)]
    frame: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    size: SizeArgs,

    #[command(flatten)]
    rasterizer: RasterizerArgs,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    /// Input Lottie JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output frame rate (defaults to the animation's rate).
    #[arg(long)]
    fps: Option<f64>,

    /// Include the per-frame repeat counts.
    #[arg(long, default_value_t = false)]
    repeats: bool,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Listen host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Jobs rendering at once.
    #[arg(long, env = "CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Default render workers per job.
    #[arg(long, env = "LOTTIEREEL_WORKERS")]
    workers: Option<usize>,

    /// Root for job working directories.
    #[arg(long, env = "LOTTIEREEL_WORK_DIR")]
    work_dir: Option<PathBuf>,

    #[command(flatten)]
    rasterizer: RasterizerArgs,

    #[command(flatten)]
    encoder: EncoderArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Plan(args) => cmd_plan(args),
        Command::Serve(args) => cmd_serve(args),
    }
}

#[tracing::instrument(skip(args), fields(input = %args.in_path.display()))]
fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let anim = load(&args.in_path)?;
    let factory = rasterizer_factory(&args.rasterizer)?;
    let opts = RenderOpts {
        width: args.size.width,
        height: args.size.height,
        fps: args.fps,
        background: Rgb8::parse_hex(&args.size.background)?,
        workers: args.workers,
        channel_capacity: None,
    };
    let stats =
        lottiereel::render_to_file(&anim, &opts, encoder_opts(&args.encoder), &factory, &args.out)?;

    eprintln!(
        "wrote {} ({} frames at {} fps, {} rendered, {} skipped)",
        args.out.display(),
        stats.frames_out,
        stats.output_fps,
        stats.frames_rendered,
        stats.frames_skipped
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let anim = load(&args.in_path)?;
    let factory = rasterizer_factory(&args.rasterizer)?;
    let opts = RenderOpts {
        width: args.size.width,
        height: args.size.height,
        background: Rgb8::parse_hex(&args.size.background)?,
        ..RenderOpts::default()
    };
    let frame = lottiereel::render_still(&anim, &opts, &factory, FrameIndex(args.frame))?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanReport<'a> {
    source_frames: u64,
    source_fps: f64,
    output_fps: u32,
    total_out: u64,
    contributing: usize,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repeats: Option<&'a [u32]>,
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let anim = load(&args.in_path)?;
    let plan = lottiereel::ResamplePlan::new(anim.frame_count(), anim.frame_rate(), args.fps)?;
    let size = anim.native_size();
    let report = PlanReport {
        source_frames: plan.source_frames(),
        source_fps: anim.frame_rate(),
        output_fps: plan.output_fps(),
        total_out: plan.total_out(),
        contributing: plan.contributing_count(),
        width: size.map(|c| c.width),
        height: size.map(|c| c.height),
        repeats: args.repeats.then(|| plan.repeats()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let defaults = ServiceConfig::default();
    let cfg = ServiceConfig {
        host: args.host,
        port: args.port,
        concurrency: args.concurrency,
        workers: args.workers,
        encoder: encoder_opts(&args.encoder),
        rasterizer: args.rasterizer.rasterizer.clone(),
        rasterizer_ready_timeout: ready_timeout(&args.rasterizer),
        work_dir: args.work_dir.unwrap_or(defaults.work_dir),
    };
    let scheduler = cfg.scheduler()?;
    tracing::info!(
        concurrency = cfg.concurrency,
        work_dir = %cfg.work_dir.display(),
        "starting job service"
    );
    ApiServer::new(scheduler).run(&cfg.listen_addr())?;
    Ok(())
}

fn load(path: &Path) -> anyhow::Result<AnimationDescriptor> {
    AnimationDescriptor::from_path(path)
        .with_context(|| format!("load animation '{}'", path.display()))
}

fn ready_timeout(args: &RasterizerArgs) -> Option<Duration> {
    (args.ready_timeout_secs > 0).then(|| Duration::from_secs(args.ready_timeout_secs))
}

fn rasterizer_factory(args: &RasterizerArgs) -> anyhow::Result<ProcessRasterizerFactory> {
    let factory = match &args.rasterizer {
        Some(binary) => ProcessRasterizerFactory::new(binary),
        None => ProcessRasterizerFactory::from_env()?,
    };
    Ok(factory.with_ready_timeout(ready_timeout(args)))
}

fn encoder_opts(args: &EncoderArgs) -> EncoderOpts {
    EncoderOpts {
        binary: args.ffmpeg.clone(),
        preset: args.preset.clone(),
        crf: args.crf,
        threads: args.threads,
        extra_args: args.extra_args.clone(),
        pixel_layout: if args.rgb24 {
            PixelLayout::Rgb24
        } else {
            PixelLayout::Rgba
        },
        ..EncoderOpts::default()
    }
}
