use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, PoisonError};

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::handle::{FrameBuffer, RendererHandle};
use crate::render::rasterizer::{Interrupt, RasterizerConfig, RasterizerFactory};

/// Upper bound on concurrent rasterizer instances per render.
pub const MAX_WORKERS: usize = 8;

/// Message from a render worker to the ordered consumer.
#[derive(Debug)]
pub enum WorkerEvent {
    /// A finished frame. Frames from one worker arrive in ascending index order.
    Frame {
        /// Worker that rendered the frame.
        worker: usize,
        /// Rendered pixels.
        frame: FrameBuffer,
    },
    /// The worker stopped on an error and will send nothing else.
    Failed {
        /// Worker that failed.
        worker: usize,
        /// Cause reported by the worker.
        error: ReelError,
    },
}

/// Worker count used when the request does not specify one: `min(cpus - 1, 8)`, at least 1.
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(1).clamp(1, MAX_WORKERS)
}

/// Clamp a requested worker count to `[1, min(cpus - 1, 8)]` and to the number of frames.
pub fn effective_worker_count(requested: Option<usize>, distinct_frames: usize) -> usize {
    let ceiling = default_worker_count();
    requested
        .unwrap_or(ceiling)
        .clamp(1, ceiling)
        .min(distinct_frames.max(1))
}

/// Split `indices` into at most `workers` contiguous chunks whose sizes differ by at most one.
///
/// Earlier chunks take the remainder. Empty chunks are never produced.
pub fn partition(indices: &[FrameIndex], workers: usize) -> Vec<Vec<FrameIndex>> {
    if indices.is_empty() {
        return Vec::new();
    }
    let k = workers.clamp(1, indices.len());
    let base = indices.len() / k;
    let rem = indices.len() % k;

    let mut out = Vec::with_capacity(k);
    let mut start = 0usize;
    for i in 0..k {
        let len = base + usize::from(i < rem);
        out.push(indices[start..start + len].to_vec());
        start += len;
    }
    out
}

/// A set of render workers, each owning one rasterizer and one contiguous chunk of frames.
pub struct RenderWorkerPool<'a> {
    factory: &'a dyn RasterizerFactory,
    cfg: RasterizerConfig,
    chunks: Vec<Vec<FrameIndex>>,
    channel_capacity: usize,
}

impl<'a> RenderWorkerPool<'a> {
    /// Plan a pool rendering `indices` (ascending, distinct) with `workers` units.
    pub fn new(
        factory: &'a dyn RasterizerFactory,
        cfg: RasterizerConfig,
        indices: &[FrameIndex],
        workers: usize,
    ) -> Self {
        let chunks = partition(indices, workers);
        let channel_capacity = chunks.len().max(1) * 2;
        Self {
            factory,
            cfg,
            chunks,
            channel_capacity,
        }
    }

    /// Override the bounded channel capacity between workers and the consumer.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Number of workers that will run.
    pub fn worker_count(&self) -> usize {
        self.chunks.len()
    }

    /// Frame chunks, one per worker.
    pub fn chunks(&self) -> &[Vec<FrameIndex>] {
        &self.chunks
    }

    /// Run every worker concurrently while `consume` drains their events on the calling thread.
    ///
    /// When `consume` returns, the cancellation flag is raised and the receiver dropped, so
    /// workers still rendering stop before their next frame. If `consume` raised the flag itself,
    /// every rasterizer that offers an [`Interrupt`] is also interrupted mid-draw. This returns
    /// once every worker has exited.
    pub fn run<R>(
        &self,
        consume: impl FnOnce(Receiver<WorkerEvent>, &AtomicBool) -> R,
    ) -> ReelResult<R> {
        let cancel = AtomicBool::new(false);
        let (tx, rx) = mpsc::sync_channel::<WorkerEvent>(self.channel_capacity);

        if self.chunks.is_empty() {
            drop(tx);
            return Ok(consume(rx, &cancel));
        }

        let pool = build_thread_pool(self.chunks.len())?;
        let interrupts = Interrupts::default();
        let ctx = WorkerCtx {
            factory: self.factory,
            cfg: &self.cfg,
            cancel: &cancel,
            interrupts: &interrupts,
        };

        let out = pool.in_place_scope(|scope| {
            for (worker, indices) in self.chunks.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| run_worker(worker, indices, ctx, tx));
            }
            drop(tx);

            let out = consume(rx, &cancel);
            if cancel.swap(true, Ordering::SeqCst) {
                interrupts.fire();
            }
            out
        });
        Ok(out)
    }
}

/// Interrupt hooks of the live rasterizers. Hooks registered after `fire` run immediately.
#[derive(Default)]
struct Interrupts {
    state: Mutex<InterruptState>,
}

#[derive(Default)]
struct InterruptState {
    fired: bool,
    hooks: Vec<Interrupt>,
}

impl Interrupts {
    fn register(&self, hook: Interrupt) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fired {
            drop(state);
            hook();
        } else {
            state.hooks.push(hook);
        }
    }

    fn fire(&self) {
        let hooks = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.fired = true;
            std::mem::take(&mut state.hooks)
        };
        tracing::debug!(rasterizers = hooks.len(), "interrupting render workers");
        for hook in hooks {
            hook();
        }
    }
}

#[derive(Clone, Copy)]
struct WorkerCtx<'a> {
    factory: &'a dyn RasterizerFactory,
    cfg: &'a RasterizerConfig,
    cancel: &'a AtomicBool,
    interrupts: &'a Interrupts,
}

fn run_worker(
    worker: usize,
    indices: &[FrameIndex],
    ctx: WorkerCtx<'_>,
    tx: SyncSender<WorkerEvent>,
) {
    tracing::debug!(
        worker,
        frames = indices.len(),
        first = indices.first().map(|f| f.0),
        "render worker started"
    );
    let outcome =
        std::panic::catch_unwind(AssertUnwindSafe(|| render_chunk(worker, indices, ctx, &tx)));

    let error = match outcome {
        Ok(Ok(())) => {
            tracing::debug!(worker, "render worker finished");
            return;
        }
        Ok(Err(e)) => e,
        Err(payload) => {
            ReelError::render(format!("worker panicked: {}", panic_message(&*payload)))
        }
    };

    if ctx.cancel.load(Ordering::SeqCst) {
        tracing::debug!(worker, error = %error, "render worker stopped after cancellation");
        return;
    }
    tracing::warn!(worker, error = %error, "render worker failed");
    let _ = tx.send(WorkerEvent::Failed { worker, error });
}

fn render_chunk(
    worker: usize,
    indices: &[FrameIndex],
    ctx: WorkerCtx<'_>,
    tx: &SyncSender<WorkerEvent>,
) -> ReelResult<()> {
    let mut handle = RendererHandle::new(ctx.factory, ctx.cfg)?;
    if let Some(hook) = handle.interrupt_handle() {
        ctx.interrupts.register(hook);
    }
    handle.prepare()?;

    for &index in indices {
        if ctx.cancel.load(Ordering::SeqCst) {
            return Ok(());
        }
        let frame = handle.render_at(index)?;
        // A closed channel means the consumer has already stopped; nothing left to do.
        if tx.send(WorkerEvent::Frame { worker, frame }).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn build_thread_pool(threads: usize) -> ReelResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("lottiereel-render-{i}"))
        .build()
        .map_err(|e| ReelError::render(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/render/pool.rs"]
mod tests;
