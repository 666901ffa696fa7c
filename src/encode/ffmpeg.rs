use std::ffi::{OsStr, OsString};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context as _;

use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::handle::FrameBuffer;

/// Environment variable that overrides encoder binary discovery.
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Raw pixel layout written to the encoder's stdin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// 4 bytes per pixel, as produced by the rasterizer.
    #[default]
    Rgba,
    /// 3 bytes per pixel; alpha is dropped before writing.
    Rgb24,
}

impl PixelLayout {
    /// The `-pixel_format` value for this layout.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Rgba => "rgba",
            Self::Rgb24 => "rgb24",
        }
    }
}

/// Codec and quality settings for [`FfmpegSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderOpts {
    /// Explicit encoder binary; bypasses discovery when set.
    pub binary: Option<PathBuf>,
    /// Video codec (`-c:v`).
    pub codec: String,
    /// Encoder preset (`-preset`).
    pub preset: String,
    /// Constant rate factor (`-crf`).
    pub crf: f32,
    /// Keyframe interval (`-g`); defaults to `fps * 12`.
    pub gop: Option<u32>,
    /// Encoder thread count (`-threads`), omitted when `None`.
    pub threads: Option<u32>,
    /// Extra arguments inserted right before the output path.
    pub extra_args: Vec<String>,
    /// Raw layout written to stdin.
    pub pixel_layout: PixelLayout,
}

impl Default for EncoderOpts {
    fn default() -> Self {
        Self {
            binary: None,
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 18.0,
            gop: None,
            threads: None,
            extra_args: Vec::new(),
            pixel_layout: PixelLayout::Rgba,
        }
    }
}

/// Build the full encoder argument list for one render.
pub fn build_args(cfg: &SinkConfig, opts: &EncoderOpts, out_path: &Path) -> Vec<OsString> {
    let gop = opts.gop.unwrap_or(cfg.fps.saturating_mul(12)).max(1);
    let mut args: Vec<OsString> = [
        "-y",
        "-f",
        "rawvideo",
        "-pixel_format",
        opts.pixel_layout.ffmpeg_name(),
        "-video_size",
        format!("{}x{}", cfg.canvas.width, cfg.canvas.height).as_str(),
        "-framerate",
        cfg.fps.to_string().as_str(),
        "-i",
        "pipe:0",
        "-an",
        "-c:v",
        opts.codec.as_str(),
        "-preset",
        opts.preset.as_str(),
        "-crf",
        opts.crf.to_string().as_str(),
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+faststart",
        "-g",
        gop.to_string().as_str(),
    ]
    .iter()
    .map(OsString::from)
    .collect();

    if let Some(threads) = opts.threads {
        args.push("-threads".into());
        args.push(threads.to_string().into());
    }
    args.extend(opts.extra_args.iter().map(OsString::from));
    args.push(out_path.as_os_str().to_owned());
    args
}

/// Locate the encoder: explicit path, then `FFMPEG_PATH`, then `PATH`, then a copy bundled next to
/// the running executable, then a bare `ffmpeg` left to the OS.
pub fn resolve_encoder_binary(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let bundled_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    resolve_from(
        std::env::var_os(FFMPEG_PATH_ENV),
        std::env::var_os("PATH"),
        bundled_dir,
    )
}

fn resolve_from(
    env_override: Option<OsString>,
    path_var: Option<OsString>,
    bundled_dir: Option<PathBuf>,
) -> PathBuf {
    if let Some(p) = env_override.filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }

    let exe = encoder_file_name();
    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(exe);
            if is_executable(&candidate) {
                return candidate;
            }
        }
    }

    if let Some(dir) = bundled_dir {
        let candidate = dir.join(exe);
        if is_executable(&candidate) {
            return candidate;
        }
    }

    PathBuf::from(exe)
}

fn encoder_file_name() -> &'static OsStr {
    OsStr::new(if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt as _;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Sink that spawns the encoder and streams raw frames into its stdin.
///
/// Writes go straight to the pipe and block while it is full, so the encoder's pace bounds how
/// many rendered frames can pile up upstream.
pub struct FfmpegSink {
    out_path: PathBuf,
    opts: EncoderOpts,

    child: Option<Child>,
    stdin: Option<ChildStdin>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    frames_written: u64,
}

impl FfmpegSink {
    /// Create a sink that encodes to `out_path`.
    pub fn new(out_path: impl Into<PathBuf>, opts: EncoderOpts) -> Self {
        Self {
            out_path: out_path.into(),
            opts,
            child: None,
            stdin: None,
            scratch: Vec::new(),
            cfg: None,
            frames_written: 0,
        }
    }

    /// Output file path.
    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    /// Output frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn reap(&mut self, context: &str) -> ReelError {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return ReelError::encoding(None, format!("{context}: encoder not running"));
        };
        match child.wait() {
            Ok(status) => ReelError::encoding(status.code(), format!("{context} ({status})")),
            Err(e) => ReelError::encoding(None, format!("{context}: {e}")),
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if self.child.is_some() {
            return Err(ReelError::validation("ffmpeg sink already started"));
        }
        if cfg.fps == 0 {
            return Err(ReelError::validation("fps must be non-zero"));
        }
        if cfg.canvas.width == 0 || cfg.canvas.height == 0 {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.canvas.width.is_multiple_of(2) || !cfg.canvas.height.is_multiple_of(2) {
            tracing::warn!(
                width = cfg.canvas.width,
                height = cfg.canvas.height,
                "odd dimensions; yuv420p output may be rejected by the encoder"
            );
        }
        ensure_parent_dir(&self.out_path)?;

        let binary = resolve_encoder_binary(self.opts.binary.as_deref());
        let args = build_args(&cfg, &self.opts, &self.out_path);
        tracing::info!(binary = %binary.display(), ?args, "spawning encoder");

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ReelError::encoding(
                    None,
                    format!("failed to spawn encoder '{}': {e}", binary.display()),
                )
            })?;
        let stdin = child.stdin.take();
        self.child = Some(child);
        if stdin.is_none() {
            return Err(self.reap("encoder stdin unavailable"));
        }

        self.stdin = stdin;
        self.cfg = Some(cfg);
        self.frames_written = 0;
        Ok(())
    }

    fn push_frame(&mut self, out_idx: u64, frame: &FrameBuffer) -> ReelResult<()> {
        let cfg = self
            .cfg
            .ok_or_else(|| ReelError::validation("ffmpeg sink not started"))?;
        if frame.width != cfg.canvas.width || frame.height != cfg.canvas.height {
            return Err(ReelError::validation(format!(
                "frame {} is {}x{}, expected {}x{}",
                frame.index, frame.width, frame.height, cfg.canvas.width, cfg.canvas.height
            )));
        }

        let payload: &[u8] = match self.opts.pixel_layout {
            PixelLayout::Rgba => &frame.data,
            PixelLayout::Rgb24 => {
                pack_rgb24(&mut self.scratch, &frame.data);
                &self.scratch
            }
        };

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::validation("ffmpeg sink not started"));
        };
        if let Err(e) = stdin.write_all(payload) {
            return Err(self.reap(&format!(
                "encoder stopped accepting frames at output frame {out_idx}: {e}"
            )));
        }
        self.frames_written += 1;
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Err(ReelError::validation("ffmpeg sink not started"));
        };
        let status = child
            .wait()
            .map_err(|e| ReelError::encoding(None, format!("failed to wait for encoder: {e}")))?;
        if !status.success() {
            return Err(ReelError::encoding(
                status.code(),
                format!("encoder exited with {status}"),
            ));
        }
        tracing::info!(
            frames = self.frames_written,
            out = %self.out_path.display(),
            "encoder finished"
        );
        Ok(())
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Drop the alpha channel of tightly packed RGBA8 into `dst`.
pub fn pack_rgb24(dst: &mut Vec<u8>, rgba: &[u8]) {
    dst.clear();
    dst.reserve(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        dst.extend_from_slice(&px[..3]);
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
