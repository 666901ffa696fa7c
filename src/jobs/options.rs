use serde_json::Value;

use crate::animation::descriptor::AnimationSource;
use crate::encode::ffmpeg::EncoderOpts;
use crate::foundation::core::Rgb8;
use crate::foundation::error::{ReelError, ReelResult};
use crate::session::pipeline::RenderOpts;

/// Render and encoder options carried by a job request.
///
/// Decoding is lenient: numeric fields accept JSON numbers or numeric strings, and
/// `extraFfmpegArgs` (alias `extraEncoderArgs`) accepts an array of strings or a string holding
/// a JSON array. A field that fails to decode is treated as absent.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Output width override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Output height override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Output frame rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Background colour as `#RRGGBB`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    /// Encoder constant rate factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<f32>,
    /// Encoder preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Encoder thread count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    /// Render worker count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Extra encoder arguments, inserted before the output path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_ffmpeg_args: Option<Vec<String>>,
}

impl JobOptions {
    /// Decode options from a request object. Unknown keys are ignored.
    pub fn decode(src: &Value) -> Self {
        let field = |key: &str| src.get(key).filter(|v| !v.is_null());
        Self {
            width: field("width").and_then(to_number).and_then(to_dimension),
            height: field("height").and_then(to_number).and_then(to_dimension),
            fps: field("fps").and_then(to_number).filter(|f| *f > 0.0),
            bg_color: field("bgColor").and_then(to_string),
            crf: field("crf").and_then(to_number).map(|c| c as f32),
            preset: field("preset").and_then(to_string),
            threads: field("threads")
                .and_then(to_number)
                .filter(|t| *t >= 0.0 && *t <= f64::from(u32::MAX))
                .map(|t| t.round() as u32),
            workers: field("workers")
                .and_then(to_number)
                .filter(|w| *w >= 1.0)
                .map(|w| w.round() as usize),
            extra_ffmpeg_args: field("extraFfmpegArgs")
                .or_else(|| field("extraEncoderArgs"))
                .and_then(to_string_array),
        }
    }

    /// Render options, with the background parsed from `bg_color`.
    pub fn render_opts(&self) -> ReelResult<RenderOpts> {
        let background = match self.bg_color.as_deref() {
            Some(hex) => Rgb8::parse_hex(hex)?,
            None => Rgb8::BLACK,
        };
        Ok(RenderOpts {
            width: self.width,
            height: self.height,
            fps: self.fps,
            background,
            workers: self.workers,
            channel_capacity: None,
        })
    }

    /// Encoder options layered over service defaults.
    pub fn encoder_opts(&self, defaults: &EncoderOpts) -> EncoderOpts {
        let mut opts = defaults.clone();
        if let Some(crf) = self.crf {
            opts.crf = crf;
        }
        if let Some(preset) = &self.preset {
            opts.preset.clone_from(preset);
        }
        if self.threads.is_some() {
            opts.threads = self.threads;
        }
        if let Some(extra) = &self.extra_ffmpeg_args {
            opts.extra_args.clone_from(extra);
        }
        opts
    }
}

/// A decoded job submission.
#[derive(Clone, Debug)]
pub struct JobRequest {
    /// Animation payload.
    pub input: AnimationSource,
    /// Render and encoder options.
    pub options: JobOptions,
}

impl JobRequest {
    /// Decode a request body of the form `{ input, ...options }`.
    ///
    /// `input` is either a Lottie object or a string holding Lottie JSON.
    pub fn from_json(body: &Value) -> ReelResult<Self> {
        if !body.is_object() {
            return Err(ReelError::validation("request body must be a JSON object"));
        }
        let input = match body.get("input") {
            Some(Value::Object(_)) => AnimationSource::Json(body["input"].clone()),
            Some(Value::String(s)) if !s.trim().is_empty() => AnimationSource::Text(s.clone()),
            Some(Value::Null) | None => return Err(ReelError::validation("missing input")),
            Some(_) => {
                return Err(ReelError::validation(
                    "input must be a Lottie object or JSON string",
                ));
            }
        };
        Ok(Self {
            input,
            options: JobOptions::decode(body),
        })
    }
}

fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn to_dimension(v: f64) -> Option<u32> {
    (v >= 1.0 && v <= f64::from(u32::MAX)).then(|| v.round() as u32)
}

fn to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_string_array(v: &Value) -> Option<Vec<String>> {
    match v {
        Value::Array(items) => items.iter().map(|i| i.as_str().map(str::to_owned)).collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Array(_)) => to_string_array(&parsed),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/jobs/options.rs"]
mod tests;
