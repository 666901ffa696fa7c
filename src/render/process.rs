//! Rasterizer backed by an external subprocess.
//!
//! Protocol, one process per render worker:
//!
//! - spawned as `<binary> [args...] --width W --height H --background #RRGGBB <animation.json>`
//! - prints a single `ready` line on stdout once the animation is loaded
//! - for each `frame <k>` line read from stdin, writes exactly `W*H*4` RGBA8 bytes to stdout
//! - exits when stdin is closed
//!
//! stderr is inherited so rasterizer diagnostics reach the service log.

use std::ffi::OsString;
use std::io::{BufRead as _, BufReader, Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::time::Duration;

use anyhow::Context as _;

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{ReelError, ReelResult};
use crate::render::rasterizer::{Interrupt, Rasterizer, RasterizerConfig, RasterizerFactory};

/// Environment variable naming the rasterizer binary.
pub const RASTERIZER_ENV: &str = "LOTTIEREEL_RASTERIZER";

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns one rasterizer subprocess per [`RasterizerFactory::create`] call.
#[derive(Clone, Debug)]
pub struct ProcessRasterizerFactory {
    binary: PathBuf,
    args: Vec<OsString>,
    ready_timeout: Option<Duration>,
    scratch_dir: PathBuf,
}

impl ProcessRasterizerFactory {
    /// Use `binary` as the rasterizer executable.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            ready_timeout: Some(DEFAULT_READY_TIMEOUT),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Resolve the binary from [`RASTERIZER_ENV`].
    pub fn from_env() -> ReelResult<Self> {
        let binary = std::env::var_os(RASTERIZER_ENV)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ReelError::renderer_init(format!("no rasterizer configured; set {RASTERIZER_ENV}"))
            })?;
        Ok(Self::new(binary))
    }

    /// Arguments placed before the protocol arguments, e.g. a script for an interpreter.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Limit how long `wait_ready` blocks. `None` waits indefinitely.
    pub fn with_ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Directory where per-worker payload copies are written.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Configured executable.
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl RasterizerFactory for ProcessRasterizerFactory {
    fn create(&self, cfg: &RasterizerConfig) -> ReelResult<Box<dyn Rasterizer>> {
        std::fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!(
                "failed to create scratch directory '{}'",
                self.scratch_dir.display()
            )
        })?;
        let payload_path = self
            .scratch_dir
            .join(format!("lottiereel-anim-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&payload_path, cfg.animation.as_bytes()).with_context(|| {
            format!("failed to write animation '{}'", payload_path.display())
        })?;
        let payload = TempFileGuard(Some(payload_path.clone()));

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .arg("--width")
            .arg(cfg.canvas.width.to_string())
            .arg("--height")
            .arg(cfg.canvas.height.to_string())
            .arg("--background")
            .arg(cfg.background.to_hex())
            .arg(&payload_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ReelError::renderer_init(format!(
                    "failed to spawn rasterizer '{}': {e}",
                    self.binary.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().map(BufReader::new);
        if stdin.is_none() || stdout.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ReelError::renderer_init("rasterizer pipes unavailable"));
        }

        tracing::debug!(pid = child.id(), binary = %self.binary.display(), "spawned rasterizer");
        Ok(Box::new(ProcessRasterizer {
            child: Arc::new(Mutex::new(child)),
            stdin,
            stdout,
            pixels: vec![0; cfg.canvas.rgba_len()],
            ready_timeout: self.ready_timeout,
            _payload: payload,
        }))
    }
}

struct ProcessRasterizer {
    // Shared with the interrupt hook; the pipes live outside so a blocked read never holds it.
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    pixels: Vec<u8>,
    ready_timeout: Option<Duration>,
    _payload: TempFileGuard,
}

impl ProcessRasterizer {
    fn child(&self) -> MutexGuard<'_, Child> {
        lock_child(&self.child)
    }

    fn exit_detail(&mut self) -> String {
        match self.child().try_wait() {
            Ok(Some(status)) => format!("rasterizer exited with {status}"),
            Ok(None) => "rasterizer closed its output".to_string(),
            Err(e) => format!("rasterizer state unknown: {e}"),
        }
    }
}

impl Rasterizer for ProcessRasterizer {
    fn wait_ready(&mut self) -> ReelResult<()> {
        let mut stdout = self
            .stdout
            .take()
            .ok_or_else(|| ReelError::renderer_init("rasterizer output unavailable"))?;

        let line = match self.ready_timeout {
            None => {
                let line = read_ready_line(&mut stdout);
                self.stdout = Some(stdout);
                line
            }
            Some(timeout) => {
                let (tx, rx) = mpsc::channel();
                std::thread::spawn(move || {
                    let line = read_ready_line(&mut stdout);
                    let _ = tx.send((stdout, line));
                });
                match rx.recv_timeout(timeout) {
                    Ok((stdout, line)) => {
                        self.stdout = Some(stdout);
                        line
                    }
                    Err(_) => {
                        let _ = self.child().kill();
                        return Err(ReelError::renderer_init(format!(
                            "rasterizer not ready after {timeout:?}"
                        )));
                    }
                }
            }
        };

        match line {
            Ok(Some(l)) if l.trim().eq_ignore_ascii_case("ready") => Ok(()),
            Ok(Some(l)) => Err(ReelError::renderer_init(format!(
                "rasterizer rejected animation: {}",
                l.trim()
            ))),
            Ok(None) => {
                let detail = self.exit_detail();
                Err(ReelError::renderer_init(detail))
            }
            Err(e) => Err(ReelError::renderer_init(format!(
                "failed to read rasterizer output: {e}"
            ))),
        }
    }

    fn draw(&mut self, frame: FrameIndex) -> ReelResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReelError::render("rasterizer input closed"))?;
        if let Err(e) = writeln!(stdin, "frame {}", frame.0).and_then(|()| stdin.flush()) {
            let detail = self.exit_detail();
            return Err(ReelError::render(format!(
                "failed to request frame {frame}: {e} ({detail})"
            )));
        }

        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| ReelError::render("rasterizer output unavailable"))?;
        if let Err(e) = stdout.read_exact(&mut self.pixels) {
            let detail = self.exit_detail();
            return Err(ReelError::render(format!(
                "failed to read frame {frame}: {e} ({detail})"
            )));
        }
        Ok(())
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn interrupt_handle(&self) -> Option<Interrupt> {
        let child = Arc::clone(&self.child);
        Some(Arc::new(move || {
            // Killing closes stdout, so a blocked `draw` fails with EOF.
            let _ = lock_child(&child).kill();
        }))
    }
}

impl Drop for ProcessRasterizer {
    fn drop(&mut self) {
        drop(self.stdin.take());
        let mut child = self.child();
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_ready_line(stdout: &mut BufReader<ChildStdout>) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let n = stdout.read_line(&mut line)?;
    Ok(if n == 0 { None } else { Some(line) })
}

struct TempFileGuard(Option<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(all(test, unix))]
#[path = "../../tests/unit/render/process.rs"]
mod tests;
