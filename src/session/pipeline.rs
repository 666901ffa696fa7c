use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;

use crate::animation::descriptor::AnimationDescriptor;
use crate::encode::ffmpeg::{EncoderOpts, FfmpegSink};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, FrameIndex, Rgb8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::plan::resample::ResamplePlan;
use crate::render::handle::{FrameBuffer, RendererHandle};
use crate::render::pool::{RenderWorkerPool, WorkerEvent, effective_worker_count};
use crate::render::rasterizer::{RasterizerConfig, RasterizerFactory};
use crate::session::sequencer::Sequencer;

/// Per-render options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderOpts {
    /// Output width; falls back to the animation's native width.
    pub width: Option<u32>,
    /// Output height; falls back to the animation's native height.
    pub height: Option<u32>,
    /// Output frame rate; falls back to the animation's native rate.
    pub fps: Option<f64>,
    /// Background painted under transparent regions.
    pub background: Rgb8,
    /// Requested render worker count, clamped to `[1, min(cpus - 1, 8)]`.
    pub workers: Option<usize>,
    /// Bounded channel capacity between workers and the sequencer.
    pub channel_capacity: Option<usize>,
}

/// What a render did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct RenderStats {
    /// Source frames in the animation.
    pub frames_source: u64,
    /// Output frames written to the sink.
    pub frames_out: u64,
    /// Distinct source frames rasterized.
    pub frames_rendered: u64,
    /// Source frames skipped by down-sampling.
    pub frames_skipped: u64,
    /// Render workers used.
    pub workers: usize,
    /// Output frame rate.
    pub output_fps: u32,
}

/// Resolve the output canvas and resampling plan for a render.
pub fn plan_render(
    anim: &AnimationDescriptor,
    opts: &RenderOpts,
) -> ReelResult<(Canvas, ResamplePlan)> {
    let canvas = anim.output_canvas(opts.width, opts.height)?;
    let plan = ResamplePlan::new(anim.frame_count(), anim.frame_rate(), opts.fps)?;
    Ok((canvas, plan))
}

/// Rasterize `anim` in parallel and stream every output frame, in order, into `sink`.
///
/// On any failure the sink is aborted instead of ended, so an encoder child is killed and reaped
/// before this returns. A worker failure aborts the sink as soon as it is observed, without
/// waiting for sibling workers to finish their current frame.
#[tracing::instrument(skip(anim, factory, sink), fields(frames = anim.frame_count()))]
pub fn render_animation(
    anim: &AnimationDescriptor,
    opts: &RenderOpts,
    factory: &dyn RasterizerFactory,
    sink: &mut dyn FrameSink,
) -> ReelResult<RenderStats> {
    let (canvas, plan) = plan_render(anim, opts)?;
    if plan.total_out() == 0 {
        return Err(ReelError::validation(format!(
            "animation is too short to produce a frame at {} fps",
            plan.output_fps()
        )));
    }

    let indices: Vec<FrameIndex> = plan.contributing().collect();
    let workers = effective_worker_count(opts.workers, indices.len());
    let cfg = RasterizerConfig {
        animation: anim.data().clone(),
        canvas,
        background: opts.background,
    };
    let mut pool = RenderWorkerPool::new(factory, cfg, &indices, workers);
    if let Some(capacity) = opts.channel_capacity {
        pool = pool.with_channel_capacity(capacity);
    }

    tracing::info!(
        width = canvas.width,
        height = canvas.height,
        fps = plan.output_fps(),
        frames_out = plan.total_out(),
        distinct = indices.len(),
        workers = pool.worker_count(),
        "render started"
    );

    sink.begin(SinkConfig {
        canvas,
        fps: plan.output_fps(),
        total_frames: plan.total_out(),
    })?;

    let consumed = pool
        .run(|rx, cancel| consume_ordered(rx, cancel, &plan, &mut *sink))
        .and_then(|r| r);
    let frames_out = match consumed {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "render failed; aborting sink");
            sink.abort();
            return Err(e);
        }
    };
    sink.end()?;

    let stats = RenderStats {
        frames_source: plan.source_frames(),
        frames_out,
        frames_rendered: indices.len() as u64,
        frames_skipped: plan.source_frames() - indices.len() as u64,
        workers: pool.worker_count(),
        output_fps: plan.output_fps(),
    };
    tracing::info!(?stats, "render finished");
    Ok(stats)
}

fn consume_ordered(
    rx: Receiver<WorkerEvent>,
    cancel: &AtomicBool,
    plan: &ResamplePlan,
    sink: &mut dyn FrameSink,
) -> ReelResult<u64> {
    let res = sequence_events(&rx, plan, sink);
    if res.is_err() {
        // Runs before the pool joins its workers, so the encoder never waits on in-flight draws.
        cancel.store(true, Ordering::SeqCst);
        sink.abort();
    }
    res
}

fn sequence_events(
    rx: &Receiver<WorkerEvent>,
    plan: &ResamplePlan,
    sink: &mut dyn FrameSink,
) -> ReelResult<u64> {
    let mut seq = Sequencer::new(plan);
    while !seq.is_complete() {
        match rx.recv() {
            Ok(WorkerEvent::Frame { frame, .. }) => seq.accept(frame, sink)?,
            Ok(WorkerEvent::Failed { worker, error }) => {
                return Err(ReelError::worker_failure(worker, error));
            }
            Err(_) => {
                return Err(ReelError::render(format!(
                    "render workers exited with frame {} outstanding",
                    seq.next_expected().map_or(0, |f| f.0)
                )));
            }
        }
    }
    debug_assert_eq!(seq.frames_written(), plan.total_out());
    Ok(seq.frames_written())
}

/// Render `anim` to an MP4 at `out_path` through the encoder subprocess.
///
/// A failed render leaves no file behind.
pub fn render_to_file(
    anim: &AnimationDescriptor,
    opts: &RenderOpts,
    encoder: EncoderOpts,
    factory: &dyn RasterizerFactory,
    out_path: &Path,
) -> ReelResult<RenderStats> {
    let mut sink = FfmpegSink::new(out_path, encoder);
    let res = render_animation(anim, opts, factory, &mut sink);
    drop(sink);
    if res.is_err()
        && out_path.exists()
        && let Err(e) = std::fs::remove_file(out_path)
    {
        tracing::warn!(out = %out_path.display(), error = %e, "failed to remove partial output");
    }
    res
}

/// Rasterize a single source frame with one renderer instance.
#[tracing::instrument(skip(anim, factory))]
pub fn render_still(
    anim: &AnimationDescriptor,
    opts: &RenderOpts,
    factory: &dyn RasterizerFactory,
    index: FrameIndex,
) -> ReelResult<FrameBuffer> {
    if index.0 >= anim.frame_count() {
        return Err(ReelError::validation(format!(
            "frame {index} is outside the animation (0..{})",
            anim.frame_count()
        )));
    }
    let cfg = RasterizerConfig {
        animation: anim.data().clone(),
        canvas: anim.output_canvas(opts.width, opts.height)?,
        background: opts.background,
    };
    let mut handle = RendererHandle::new(factory, &cfg)?;
    handle.prepare()?;
    handle.render_at(index)
}

#[cfg(test)]
#[path = "../../tests/unit/session/pipeline.rs"]
mod tests;
