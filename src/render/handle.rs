use crate::foundation::core::{Canvas, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::rasterizer::{Interrupt, Rasterizer, RasterizerConfig, RasterizerFactory};

/// Rendered pixels for exactly one source frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Source frame this buffer was rendered from.
    pub index: FrameIndex,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major, straight alpha.
    pub data: Vec<u8>,
}

/// Exclusive wrapper around one [`Rasterizer`] for one worker.
pub struct RendererHandle {
    rasterizer: Box<dyn Rasterizer>,
    canvas: Canvas,
    prepared: bool,
}

impl RendererHandle {
    /// Build the underlying rasterizer. Construction failures are reported as init errors.
    pub fn new(factory: &dyn RasterizerFactory, cfg: &RasterizerConfig) -> ReelResult<Self> {
        let rasterizer = factory.create(cfg).map_err(into_init_error)?;
        Ok(Self {
            rasterizer,
            canvas: cfg.canvas,
            prepared: false,
        })
    }

    /// One-time setup: wait until the rasterizer has loaded the animation.
    pub fn prepare(&mut self) -> ReelResult<()> {
        if self.prepared {
            return Ok(());
        }
        self.rasterizer.wait_ready().map_err(into_init_error)?;
        self.prepared = true;
        Ok(())
    }

    /// Draw `index` and copy the result out of the rasterizer.
    pub fn render_at(&mut self, index: FrameIndex) -> ReelResult<FrameBuffer> {
        if !self.prepared {
            return Err(ReelError::render("render_at called before prepare"));
        }
        self.rasterizer.draw(index)?;

        let pixels = self.rasterizer.pixels();
        let expected = self.canvas.rgba_len();
        if pixels.len() != expected {
            return Err(ReelError::render(format!(
                "rasterizer returned {} bytes for frame {index}, expected {expected}",
                pixels.len()
            )));
        }

        Ok(FrameBuffer {
            index,
            width: self.canvas.width,
            height: self.canvas.height,
            data: pixels.to_vec(),
        })
    }

    /// Interrupt hook of the underlying rasterizer, if it has one.
    pub fn interrupt_handle(&self) -> Option<Interrupt> {
        self.rasterizer.interrupt_handle()
    }

    /// Output canvas this handle renders at.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }
}

fn into_init_error(e: ReelError) -> ReelError {
    match e {
        ReelError::RendererInit(_) => e,
        other => ReelError::renderer_init(other.to_string()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/handle.rs"]
mod tests;
