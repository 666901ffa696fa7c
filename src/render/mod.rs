/// Exclusive per-worker rasterizer wrapper and the frame buffer type.
pub mod handle;
/// Parallel render workers.
pub mod pool;
/// Subprocess-backed rasterizer.
pub mod process;
/// Rasterizer traits.
pub mod rasterizer;
