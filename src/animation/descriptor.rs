use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;

use crate::foundation::core::{Canvas, MAX_DIMENSION};
use crate::foundation::error::{ReelError, ReelResult};
use crate::plan::resample::MAX_SOURCE_FRAMES;

/// Where an animation payload comes from.
#[derive(Clone, Debug)]
pub enum AnimationSource {
    /// A Lottie JSON file on disk.
    Path(PathBuf),
    /// Lottie JSON text.
    Text(String),
    /// An already-parsed Lottie JSON document.
    Json(serde_json::Value),
}

/// The subset of Lottie top-level fields the pipeline needs.
#[derive(Debug, Default, serde::Deserialize)]
struct RawMeta {
    w: Option<f64>,
    h: Option<f64>,
    ip: Option<f64>,
    op: Option<f64>,
    fr: Option<f64>,
    fps: Option<f64>,
    #[serde(rename = "totalFrames")]
    total_frames: Option<f64>,
}

/// Immutable animation payload plus the timing/size metadata derived from it.
///
/// The payload is never interpreted beyond its top-level metadata; drawing is the rasterizer's
/// job. Cloning is cheap: the payload is shared read-only between render workers.
#[derive(Clone, Debug)]
pub struct AnimationDescriptor {
    data: Arc<str>,
    frame_rate: f64,
    frame_count: u64,
    size: Option<Canvas>,
}

impl AnimationDescriptor {
    /// Load a payload from any [`AnimationSource`].
    pub fn load(source: AnimationSource) -> ReelResult<Self> {
        match source {
            AnimationSource::Path(path) => Self::from_path(&path),
            AnimationSource::Text(text) => Self::from_json_str(text),
            AnimationSource::Json(value) => {
                let text = serde_json::to_string(&value)
                    .map_err(|e| ReelError::invalid_animation(e.to_string()))?;
                Self::from_json_str(text)
            }
        }
    }

    /// Read and parse a Lottie JSON file.
    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read animation '{}'", path.display()))?;
        Self::from_json_str(text)
    }

    /// Parse Lottie JSON text and derive its metadata.
    pub fn from_json_str(text: impl Into<String>) -> ReelResult<Self> {
        let text = text.into();
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ReelError::invalid_animation(format!("malformed JSON: {e}")))?;
        if !value.is_object() {
            return Err(ReelError::invalid_animation(
                "animation JSON must be an object",
            ));
        }
        let meta: RawMeta = serde_json::from_value(value)
            .map_err(|e| ReelError::invalid_animation(format!("bad metadata: {e}")))?;

        let frame_rate = meta
            .fr
            .or(meta.fps)
            .ok_or_else(|| ReelError::invalid_animation("missing frame rate ('fr')"))?;
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(ReelError::invalid_animation(format!(
                "frame rate must be positive, got {frame_rate}"
            )));
        }

        let ip = meta.ip.filter(|v| v.is_finite()).unwrap_or(0.0);
        let op = meta
            .op
            .filter(|v| v.is_finite())
            .or(meta.total_frames)
            .ok_or_else(|| ReelError::invalid_animation("missing out point ('op')"))?;
        let span = (op - ip).ceil();
        if !span.is_finite() || span < 1.0 {
            return Err(ReelError::invalid_animation(format!(
                "animation has no frames (ip={ip}, op={op})"
            )));
        }
        if span > MAX_SOURCE_FRAMES as f64 {
            return Err(ReelError::invalid_animation(format!(
                "animation spans {span} frames, more than the limit of {MAX_SOURCE_FRAMES}"
            )));
        }

        let dim = |v: Option<f64>| {
            v.filter(|d| d.is_finite() && *d >= 1.0)
                .map(|d| d.round())
        };
        let limit = f64::from(MAX_DIMENSION);
        let size = match (dim(meta.w), dim(meta.h)) {
            (Some(w), Some(h)) if w > limit || h > limit => {
                return Err(ReelError::invalid_animation(format!(
                    "animation size {w}x{h} exceeds the {MAX_DIMENSION}px limit"
                )));
            }
            (Some(w), Some(h)) => Some(Canvas {
                width: w as u32,
                height: h as u32,
            }),
            _ => None,
        };

        Ok(Self {
            data: Arc::from(text),
            frame_rate,
            frame_count: span as u64,
            size,
        })
    }

    /// Native frames per second.
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Native frame count, `ceil(op - ip)`.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Native duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate
    }

    /// Native pixel size, when the payload declares one.
    pub fn native_size(&self) -> Option<Canvas> {
        self.size
    }

    /// Resolve the output canvas from optional overrides, falling back to the native size.
    ///
    /// A single override keeps the native value for the other axis.
    pub fn output_canvas(&self, width: Option<u32>, height: Option<u32>) -> ReelResult<Canvas> {
        let native = self.size;
        let width = width
            .filter(|w| *w > 0)
            .or(native.map(|c| c.width))
            .ok_or_else(|| ReelError::invalid_animation("missing width ('w')"))?;
        let height = height
            .filter(|h| *h > 0)
            .or(native.map(|c| c.height))
            .ok_or_else(|| ReelError::invalid_animation("missing height ('h')"))?;
        Canvas::new(width, height)
    }

    /// The raw payload, shared read-only.
    pub fn data(&self) -> &Arc<str> {
        &self.data
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/descriptor.rs"]
mod tests;
