use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::encode::ffmpeg::EncoderOpts;
use crate::foundation::error::{ReelError, ReelResult};
use crate::jobs::scheduler::{JobScheduler, PipelineRunner, SchedulerConfig};
use crate::render::process::ProcessRasterizerFactory;

/// Maximum accepted request body for the HTTP surface.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Settings for the render service.
///
/// The binary fills this from flags and their environment fallbacks (`HOST`, `PORT`,
/// `CONCURRENCY`, `LOTTIEREEL_*`, `FFMPEG_PATH`).
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Listen host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Jobs allowed to run at once.
    pub concurrency: usize,
    /// Render workers per job when the request does not say.
    pub workers: Option<usize>,
    /// Encoder defaults; requests may override crf, preset, threads and extra args.
    pub encoder: EncoderOpts,
    /// Rasterizer executable.
    pub rasterizer: Option<PathBuf>,
    /// How long to wait for a rasterizer to report `ready`.
    pub rasterizer_ready_timeout: Option<Duration>,
    /// Root for per-job working directories.
    pub work_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            concurrency: 1,
            workers: None,
            encoder: EncoderOpts::default(),
            rasterizer: None,
            rasterizer_ready_timeout: Some(Duration::from_secs(30)),
            work_dir: std::env::temp_dir().join("lottiereel"),
        }
    }
}

impl ServiceConfig {
    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> ReelResult<()> {
        if self.concurrency == 0 {
            return Err(ReelError::validation("concurrency must be at least 1"));
        }
        if self.workers == Some(0) {
            return Err(ReelError::validation("workers must be at least 1"));
        }
        if !self.encoder.crf.is_finite() || self.encoder.crf < 0.0 {
            return Err(ReelError::validation(format!(
                "crf must be a non-negative number, got {}",
                self.encoder.crf
            )));
        }
        Ok(())
    }

    /// The rasterizer factory: the configured binary, else `LOTTIEREEL_RASTERIZER`.
    pub fn rasterizer_factory(&self) -> ReelResult<ProcessRasterizerFactory> {
        let factory = match &self.rasterizer {
            Some(binary) => ProcessRasterizerFactory::new(binary),
            None => ProcessRasterizerFactory::from_env()?,
        };
        Ok(factory
            .with_ready_timeout(self.rasterizer_ready_timeout)
            .with_scratch_dir(self.work_dir.join("payloads")))
    }

    /// Build the job scheduler backed by the full render pipeline.
    pub fn scheduler(&self) -> ReelResult<JobScheduler> {
        self.validate()?;
        let runner = PipelineRunner::new(Arc::new(self.rasterizer_factory()?), self.encoder.clone())
            .with_default_workers(self.workers);
        Ok(JobScheduler::new(
            SchedulerConfig {
                concurrency: self.concurrency,
                work_root: self.work_dir.join("jobs"),
            },
            Arc::new(runner),
        ))
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
