//! lottiereel turns Lottie animations into MP4 video.
//!
//! Every distinct source frame is rasterized once by an external rasterizer, in parallel across
//! independent renderer instances. Results are put back into timeline order, repeated or skipped
//! to hit the requested output frame rate, and streamed as raw RGBA into an `ffmpeg` subprocess.
//!
//! - Load an [`AnimationDescriptor`]
//! - Compute a [`ResamplePlan`] for the output frame rate
//! - Render into any [`FrameSink`] with [`render_animation`], or to a file with [`render_to_file`]
//! - Run many renders under a concurrency ceiling with a [`JobScheduler`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Animation payload loading and metadata.
pub mod animation;
/// Service configuration.
pub mod config;
/// Encoding sinks.
pub mod encode;
/// Render jobs: request decoding, lifecycle records and concurrency-limited admission.
pub mod jobs;
/// Frame-rate resampling.
pub mod plan;
/// Rasterization: the external rasterizer contract, per-worker handles and the worker pool.
pub mod render;
/// HTTP surface for the job scheduler.
pub mod server;
/// Ordered render sessions: worker pool in, sequencer in the middle, sink out.
pub mod session;

pub use crate::foundation::core::{Canvas, FrameIndex, Rgb8};
pub use crate::foundation::error::{ReelError, ReelResult};

pub use crate::animation::descriptor::{AnimationDescriptor, AnimationSource};
pub use crate::config::ServiceConfig;
pub use crate::encode::ffmpeg::{EncoderOpts, FfmpegSink, PixelLayout};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::jobs::options::{JobOptions, JobRequest};
pub use crate::jobs::record::{JobId, JobSnapshot, JobStatus};
pub use crate::jobs::scheduler::{
    JobArtifact, JobRunner, JobScheduler, PipelineRunner, SchedulerConfig,
};
pub use crate::plan::resample::ResamplePlan;
pub use crate::render::handle::FrameBuffer;
pub use crate::render::process::ProcessRasterizerFactory;
pub use crate::render::rasterizer::{Interrupt, Rasterizer, RasterizerConfig, RasterizerFactory};
pub use crate::session::pipeline::{
    RenderOpts, RenderStats, plan_render, render_animation, render_still, render_to_file,
};
