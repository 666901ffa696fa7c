use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Read;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use chrono::Utc;

use crate::animation::descriptor::AnimationDescriptor;
use crate::encode::ffmpeg::EncoderOpts;
use crate::foundation::error::{ReelError, ReelResult};
use crate::jobs::options::{JobOptions, JobRequest};
use crate::jobs::record::{JobId, JobRecord, JobSnapshot, JobStatus};
use crate::render::rasterizer::RasterizerFactory;
use crate::session::pipeline::{RenderStats, render_to_file};

/// Executes one admitted job. Called on the job's own thread.
pub trait JobRunner: Send + Sync {
    /// Produce the artifact at `output` or fail.
    fn run(
        &self,
        anim: &AnimationDescriptor,
        options: &JobOptions,
        output: &Path,
    ) -> ReelResult<RenderStats>;
}

/// Runs the full render pipeline into the encoder subprocess.
pub struct PipelineRunner {
    factory: Arc<dyn RasterizerFactory>,
    encoder: EncoderOpts,
    default_workers: Option<usize>,
}

impl PipelineRunner {
    /// Runner with service-wide encoder defaults.
    pub fn new(factory: Arc<dyn RasterizerFactory>, encoder: EncoderOpts) -> Self {
        Self {
            factory,
            encoder,
            default_workers: None,
        }
    }

    /// Worker count used when a request does not name one.
    pub fn with_default_workers(mut self, workers: Option<usize>) -> Self {
        self.default_workers = workers;
        self
    }
}

impl JobRunner for PipelineRunner {
    fn run(
        &self,
        anim: &AnimationDescriptor,
        options: &JobOptions,
        output: &Path,
    ) -> ReelResult<RenderStats> {
        let mut opts = options.render_opts()?;
        opts.workers = opts.workers.or(self.default_workers);
        let encoder = options.encoder_opts(&self.encoder);
        render_to_file(anim, &opts, encoder, self.factory.as_ref(), output)
    }
}

/// Scheduler settings.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running at once (at least 1).
    pub concurrency: usize,
    /// Parent of the per-job working directories.
    pub work_root: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            work_root: std::env::temp_dir().join("lottiereel"),
        }
    }
}

struct Slot {
    record: JobRecord,
    anim: Option<AnimationDescriptor>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Slot>,
    queue: VecDeque<JobId>,
    running: usize,
}

struct Inner {
    state: Mutex<State>,
    changed: Condvar,
    runner: Arc<dyn JobRunner>,
    cfg: SchedulerConfig,
}

/// FIFO job admission under a concurrency ceiling.
///
/// Every admitted job runs on its own thread. Each state transition re-runs admission and wakes
/// anyone blocked in [`JobScheduler::wait`]. Cloning shares the same scheduler.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    /// Create a scheduler; the ceiling is raised to 1 if zero.
    pub fn new(mut cfg: SchedulerConfig, runner: Arc<dyn JobRunner>) -> Self {
        cfg.concurrency = cfg.concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                changed: Condvar::new(),
                runner,
                cfg,
            }),
        }
    }

    /// Concurrency ceiling.
    pub fn concurrency(&self) -> usize {
        self.inner.cfg.concurrency
    }

    /// Validate and enqueue a job, admitting it immediately if a slot is free.
    ///
    /// The payload metadata and options are checked here, so malformed requests never occupy a
    /// slot.
    pub fn submit(&self, request: JobRequest) -> ReelResult<JobId> {
        let anim = AnimationDescriptor::load(request.input)?;
        let render_opts = request.options.render_opts()?;
        anim.output_canvas(render_opts.width, render_opts.height)?;

        let id = JobId::new();
        let work_dir = self.inner.cfg.work_root.join(format!("job-{id}"));
        std::fs::create_dir_all(&work_dir)
            .with_context(|| format!("create job directory '{}'", work_dir.display()))?;

        let mut state = self.inner.lock();
        state.jobs.insert(
            id,
            Slot {
                record: JobRecord::new(id, request.options, work_dir),
                anim: Some(anim),
            },
        );
        state.queue.push_back(id);
        tracing::info!(%id, queued = state.queue.len(), "job queued");
        self.inner.pump(&mut state);
        drop(state);
        self.inner.changed.notify_all();
        Ok(id)
    }

    /// Current state of a job.
    pub fn status(&self, id: JobId) -> ReelResult<JobSnapshot> {
        let state = self.inner.lock();
        state
            .jobs
            .get(&id)
            .map(|slot| slot.record.snapshot())
            .ok_or_else(|| ReelError::not_found(id.to_string()))
    }

    /// Snapshots of every known job, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let state = self.inner.lock();
        let mut out: Vec<JobSnapshot> = state.jobs.values().map(|s| s.record.snapshot()).collect();
        out.sort_by_key(|s| s.queued_at);
        out
    }

    /// Take the finished artifact of a `done` job.
    ///
    /// The job record is forgotten immediately; its working directory goes away when the
    /// returned artifact is dropped.
    pub fn take_result(&self, id: JobId) -> ReelResult<JobArtifact> {
        let record = {
            let mut state = self.inner.lock();
            let slot = state
                .jobs
                .get(&id)
                .ok_or_else(|| ReelError::not_found(id.to_string()))?;
            if slot.record.status != JobStatus::Done {
                return Err(ReelError::not_ready(format!(
                    "job {id} is {:?}",
                    slot.record.status
                )));
            }
            match state.jobs.remove(&id) {
                Some(slot) => slot.record,
                None => return Err(ReelError::not_found(id.to_string())),
            }
        };
        self.inner.changed.notify_all();

        match File::open(&record.output) {
            Ok(file) => {
                let len = file.metadata().map(|m| m.len()).unwrap_or(0);
                tracing::info!(%id, bytes = len, "job result taken");
                Ok(JobArtifact {
                    file,
                    len,
                    path: record.output,
                    work_dir: record.work_dir,
                })
            }
            Err(e) => {
                remove_work_dir(&record.work_dir);
                Err(anyhow::Error::new(e)
                    .context(format!("open result '{}'", record.output.display()))
                    .into())
            }
        }
    }

    /// Forget a queued or finished job and delete its working directory.
    ///
    /// A running job cannot be cleaned up (`NotReady`).
    pub fn cleanup(&self, id: JobId) -> ReelResult<()> {
        let work_dir = {
            let mut state = self.inner.lock();
            let status = state
                .jobs
                .get(&id)
                .map(|slot| slot.record.status)
                .ok_or_else(|| ReelError::not_found(id.to_string()))?;
            if status == JobStatus::Running {
                return Err(ReelError::not_ready(format!("job {id} is still running")));
            }
            state.queue.retain(|q| *q != id);
            match state.jobs.remove(&id) {
                Some(slot) => slot.record.work_dir,
                None => return Err(ReelError::not_found(id.to_string())),
            }
        };
        self.inner.changed.notify_all();
        remove_work_dir(&work_dir);
        tracing::info!(%id, "job cleaned up");
        Ok(())
    }

    /// Block until the job is `done` or `error`, or until `timeout` elapses.
    ///
    /// On timeout the current, non-terminal snapshot is returned.
    pub fn wait(&self, id: JobId, timeout: Option<Duration>) -> ReelResult<JobSnapshot> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.inner.lock();
        loop {
            let snapshot = state
                .jobs
                .get(&id)
                .map(|slot| slot.record.snapshot())
                .ok_or_else(|| ReelError::not_found(id.to_string()))?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            state = match deadline {
                None => self
                    .inner
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(snapshot);
                    }
                    self.inner
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Jobs currently running.
    pub fn running_count(&self) -> usize {
        self.inner.lock().running
    }

    /// Jobs waiting for a slot.
    pub fn queued_count(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit queued jobs, oldest first, while slots are free.
    fn pump(self: &Arc<Self>, state: &mut State) {
        while state.running < self.cfg.concurrency {
            let Some(id) = state.queue.pop_front() else {
                break;
            };
            let Some(slot) = state.jobs.get_mut(&id) else {
                continue;
            };
            let Some(anim) = slot.anim.take() else {
                continue;
            };
            slot.record.status = JobStatus::Running;
            slot.record.started_at = Some(Utc::now());
            let options = slot.record.options.clone();
            let output = slot.record.output.clone();
            state.running += 1;
            tracing::info!(%id, running = state.running, "job started");

            let inner = Arc::clone(self);
            let spawned = std::thread::Builder::new()
                .name(format!("lottiereel-job-{id}"))
                .spawn(move || inner.execute(id, anim, options, output));
            if let Err(e) = spawned {
                state.running -= 1;
                if let Some(slot) = state.jobs.get_mut(&id) {
                    slot.record.status = JobStatus::Error;
                    slot.record.ended_at = Some(Utc::now());
                    slot.record.error = Some(format!("failed to spawn job thread: {e}"));
                }
                tracing::error!(%id, error = %e, "failed to spawn job thread");
            }
        }
    }

    fn execute(
        self: Arc<Self>,
        id: JobId,
        anim: AnimationDescriptor,
        options: JobOptions,
        output: PathBuf,
    ) {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.runner.run(&anim, &options, &output)
        }))
        .unwrap_or_else(|_| Err(ReelError::render("job runner panicked")));

        if outcome.is_err()
            && let Err(e) = std::fs::remove_file(&output)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(%id, error = %e, "failed to remove partial output");
        }

        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        match state.jobs.get_mut(&id) {
            Some(slot) => {
                slot.record.ended_at = Some(Utc::now());
                match outcome {
                    Ok(stats) => {
                        slot.record.status = JobStatus::Done;
                        slot.record.stats = Some(stats);
                        tracing::info!(%id, frames = stats.frames_out, "job done");
                    }
                    Err(e) => {
                        slot.record.status = JobStatus::Error;
                        slot.record.error = Some(e.to_string());
                        tracing::warn!(%id, error = %e, "job failed");
                    }
                }
            }
            None => {
                if let Some(parent) = output.parent() {
                    remove_work_dir(parent);
                }
            }
        }
        self.pump(&mut state);
        drop(state);
        self.changed.notify_all();
    }
}

/// A finished video, readable once. Dropping it deletes the job's working directory.
#[derive(Debug)]
pub struct JobArtifact {
    file: File,
    len: u64,
    path: PathBuf,
    work_dir: PathBuf,
}

impl JobArtifact {
    /// Size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the artifact is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Location of the artifact while it is alive.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for JobArtifact {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Drop for JobArtifact {
    fn drop(&mut self) {
        remove_work_dir(&self.work_dir);
    }
}

fn remove_work_dir(dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(dir)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(dir = %dir.display(), error = %e, "failed to remove job directory");
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jobs/scheduler.rs"]
mod tests;
