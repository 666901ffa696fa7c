//! Sinks consume output frames in timeline order and are driven by the sequencer.

/// `ffmpeg` subprocess sink (MP4 output).
pub mod ffmpeg;
/// Generic frame sink trait and built-in sinks.
pub mod sink;
