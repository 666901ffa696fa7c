use crate::foundation::core::Canvas;
use crate::foundation::error::ReelResult;
use crate::render::handle::FrameBuffer;

/// Configuration provided to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    /// Output canvas.
    pub canvas: Canvas,
    /// Output frames-per-second.
    pub fps: u32,
    /// Number of output frames that will be pushed.
    pub total_frames: u64,
}

/// Sink contract for consuming output frames in timeline order.
///
/// Ordering contract: `push_frame` is called with `out_idx` = 0, 1, 2, ... without gaps. A
/// source frame that spans several output frames is pushed once per output frame.
///
/// `push_frame` may block while the sink is saturated; the caller does not push again until it
/// returns, so a slow sink throttles the whole pipeline.
pub trait FrameSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()>;
    /// Push one output frame.
    fn push_frame(&mut self, out_idx: u64, frame: &FrameBuffer) -> ReelResult<()>;
    /// Called once after the last frame is pushed.
    fn end(&mut self) -> ReelResult<()>;
    /// Called instead of `end` when the pipeline fails. Must release external resources and
    /// tolerate being called more than once.
    fn abort(&mut self) {}
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(u64, FrameBuffer)>,
    ended: bool,
    aborted: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sink configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// Captured `(output index, frame)` pairs in push order.
    pub fn frames(&self) -> &[(u64, FrameBuffer)] {
        &self.frames
    }

    /// Whether `end` was called.
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Whether `abort` was called.
    pub fn aborted(&self) -> bool {
        self.aborted
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        self.aborted = false;
        Ok(())
    }

    fn push_frame(&mut self, out_idx: u64, frame: &FrameBuffer) -> ReelResult<()> {
        self.frames.push((out_idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        self.ended = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}
