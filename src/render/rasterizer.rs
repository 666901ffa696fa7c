use std::sync::Arc;

use crate::foundation::core::{Canvas, FrameIndex, Rgb8};
use crate::foundation::error::ReelResult;

/// Thread-safe hook that makes a blocked [`Rasterizer::draw`] return early with an error.
pub type Interrupt = Arc<dyn Fn() + Send + Sync>;

/// Everything a rasterizer instance is constructed from.
#[derive(Clone, Debug)]
pub struct RasterizerConfig {
    /// Lottie JSON payload, shared read-only.
    pub animation: Arc<str>,
    /// Output canvas size.
    pub canvas: Canvas,
    /// Background the animation is composited over.
    pub background: Rgb8,
}

/// One external rasterizer instance bound to a single animation and canvas.
///
/// Implementations keep internal draw state and are not reentrant; the pipeline gives every
/// render worker its own instance and never shares one across threads concurrently.
pub trait Rasterizer: Send {
    /// Block until the animation is loaded and the canvas is sized.
    fn wait_ready(&mut self) -> ReelResult<()>;

    /// Seek to `frame` and redraw. Returns only once the draw has completed.
    fn draw(&mut self, frame: FrameIndex) -> ReelResult<()>;

    /// Tightly packed straight-alpha RGBA8 pixels of the last draw (`width*height*4` bytes).
    ///
    /// The slice is valid until the next call to [`Rasterizer::draw`].
    fn pixels(&self) -> &[u8];

    /// Hook that aborts an in-flight `wait_ready` or `draw` from another thread.
    ///
    /// The pool fires it when a sibling worker fails. `None` means a draw always runs to
    /// completion before the worker notices the cancellation.
    fn interrupt_handle(&self) -> Option<Interrupt> {
        None
    }
}

/// Creates independent [`Rasterizer`] instances, one per render worker.
pub trait RasterizerFactory: Send + Sync {
    /// Construct a fresh instance. Loading errors may surface here or in `wait_ready`.
    fn create(&self, cfg: &RasterizerConfig) -> ReelResult<Box<dyn Rasterizer>>;
}
