/// End-to-end render entry points.
pub mod pipeline;
/// Reordering and repeat expansion of rendered frames.
pub mod sequencer;
