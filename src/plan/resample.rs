use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReelError, ReelResult};

/// Lowest output frame rate accepted by [`ResamplePlan::new`].
pub const MIN_OUTPUT_FPS: u32 = 1;
/// Highest output frame rate accepted by [`ResamplePlan::new`].
pub const MAX_OUTPUT_FPS: u32 = 240;
/// Most source frames a plan may cover.
pub const MAX_SOURCE_FRAMES: u64 = 1_000_000;
/// Most output frames a plan may produce (about 11.5 hours at the highest rate).
pub const MAX_OUTPUT_FRAMES: u64 = 10_000_000;

/// Run-length mapping from source frames to output frames.
///
/// `repeats[k]` is the number of consecutive output frames that show source frame `k`. A zero
/// means a neighbouring frame supersedes `k` at the target rate, so `k` is never rendered.
///
/// The cumulative count up to source frame `j` is `min(round(j * ratio), total_out)`, with the
/// final boundary pinned to `total_out`. Output timing therefore never drifts from the ideal
/// continuous mapping and the repeats always sum to `total_out`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ResamplePlan {
    output_fps: u32,
    total_out: u64,
    repeats: Vec<u32>,
}

impl ResamplePlan {
    /// Build the plan for `source_frames` frames at `source_fps`, resampled to `fps`.
    ///
    /// `fps` defaults to `source_fps`; either way it is rounded to an integer and clamped to
    /// `[MIN_OUTPUT_FPS, MAX_OUTPUT_FPS]`.
    pub fn new(source_frames: u64, source_fps: f64, fps: Option<f64>) -> ReelResult<Self> {
        if source_frames == 0 {
            return Err(ReelError::invalid_animation("source frame count must be > 0"));
        }
        if source_frames > MAX_SOURCE_FRAMES {
            return Err(ReelError::invalid_animation(format!(
                "{source_frames} source frames exceeds the limit of {MAX_SOURCE_FRAMES}"
            )));
        }
        if !source_fps.is_finite() || source_fps <= 0.0 {
            return Err(ReelError::invalid_animation(format!(
                "source frame rate must be positive, got {source_fps}"
            )));
        }

        let output_fps = normalize_output_fps(fps.unwrap_or(source_fps));
        let ratio = f64::from(output_fps) / source_fps;
        let duration = source_frames as f64 / source_fps;
        let total_out = (duration * f64::from(output_fps)).round();
        if !total_out.is_finite() || total_out > MAX_OUTPUT_FRAMES as f64 {
            return Err(ReelError::invalid_animation(format!(
                "{source_frames} frames at {source_fps} fps resample to more than \
                 {MAX_OUTPUT_FRAMES} output frames"
            )));
        }
        let total_out = total_out as u64;

        let cumulative = |j: u64| -> u64 {
            if j >= source_frames {
                total_out
            } else {
                ((j as f64 * ratio).round() as u64).min(total_out)
            }
        };

        let mut repeats = Vec::with_capacity(source_frames as usize);
        let mut prev = 0u64;
        for k in 0..source_frames {
            let next = cumulative(k + 1);
            // total_out is capped well below u32::MAX, so a single repeat always fits.
            repeats.push(u32::try_from(next.saturating_sub(prev)).unwrap_or(u32::MAX));
            prev = prev.max(next);
        }

        Ok(Self {
            output_fps,
            total_out,
            repeats,
        })
    }

    /// Integer output frame rate passed to the encoder.
    pub fn output_fps(&self) -> u32 {
        self.output_fps
    }

    /// Total number of output frames.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Number of source frames covered by the plan.
    pub fn source_frames(&self) -> u64 {
        self.repeats.len() as u64
    }

    /// Per-source-frame repeat counts.
    pub fn repeats(&self) -> &[u32] {
        &self.repeats
    }

    /// Repeat count for source frame `idx` (0 when out of range).
    pub fn repeat(&self, idx: FrameIndex) -> u32 {
        self.repeats.get(idx.0 as usize).copied().unwrap_or(0)
    }

    /// Source indices that contribute at least one output frame, ascending.
    pub fn contributing(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.repeats
            .iter()
            .enumerate()
            .filter(|(_, r)| **r > 0)
            .map(|(k, _)| FrameIndex(k as u64))
    }

    /// Number of source frames that must be rendered.
    pub fn contributing_count(&self) -> usize {
        self.repeats.iter().filter(|r| **r > 0).count()
    }

    /// First contributing index, if any.
    pub fn first_contributing(&self) -> Option<FrameIndex> {
        self.next_contributing_from(0)
    }

    /// The next contributing index strictly after `idx`.
    pub fn next_contributing(&self, idx: FrameIndex) -> Option<FrameIndex> {
        self.next_contributing_from(idx.0.saturating_add(1))
    }

    fn next_contributing_from(&self, start: u64) -> Option<FrameIndex> {
        let start = usize::try_from(start).ok()?;
        self.repeats
            .get(start..)?
            .iter()
            .position(|r| *r > 0)
            .map(|off| FrameIndex((start + off) as u64))
    }
}

/// Round and clamp a requested output rate to the supported integer range.
pub fn normalize_output_fps(fps: f64) -> u32 {
    if !fps.is_finite() {
        return MIN_OUTPUT_FPS;
    }
    (fps.round().clamp(f64::from(MIN_OUTPUT_FPS), f64::from(MAX_OUTPUT_FPS))) as u32
}

#[cfg(test)]
#[path = "../../tests/unit/plan/resample.rs"]
mod tests;
