use super::*;
use crate::foundation::core::{Canvas, Rgb8};
use std::sync::Arc;

fn script(name: &str, body: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("process_rasterizer_unit");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn cfg() -> RasterizerConfig {
    RasterizerConfig {
        animation: Arc::from(r#"{"fr":30,"op":2}"#),
        canvas: Canvas {
            width: 2,
            height: 1,
        },
        background: Rgb8::BLACK,
    }
}

fn factory(script_path: &Path) -> ProcessRasterizerFactory {
    ProcessRasterizerFactory::new("/bin/sh")
        .with_args([script_path.as_os_str().to_owned()])
        .with_scratch_dir(PathBuf::from("target").join("process_rasterizer_unit"))
}

#[test]
fn speaks_the_frame_protocol() {
    let path = script(
        "echo_frames.sh",
        "echo ready\nwhile read cmd idx; do printf \"${idx}bcdefgh\"; done\n",
    );
    let mut r = factory(&path).create(&cfg()).unwrap();
    r.wait_ready().unwrap();
    r.draw(FrameIndex(3)).unwrap();
    assert_eq!(r.pixels(), b"3bcdefgh");
    r.draw(FrameIndex(7)).unwrap();
    assert_eq!(r.pixels(), b"7bcdefgh");
}

#[test]
fn rejection_line_is_an_init_error() {
    let path = script("reject.sh", "echo 'error: unsupported version'\n");
    let mut r = factory(&path).create(&cfg()).unwrap();
    let err = r.wait_ready().unwrap_err();
    assert!(matches!(err, ReelError::RendererInit(_)), "{err}");
    assert!(err.to_string().contains("unsupported version"));
}

#[test]
fn readiness_timeout_is_an_init_error() {
    let path = script("slow.sh", "sleep 5\necho ready\n");
    let mut r = factory(&path)
        .with_ready_timeout(Some(Duration::from_millis(100)))
        .create(&cfg())
        .unwrap();
    let err = r.wait_ready().unwrap_err();
    assert!(err.to_string().contains("not ready"), "{err}");
}

#[test]
fn early_exit_during_draw_is_a_render_error() {
    let path = script("one_shot.sh", "echo ready\nread cmd idx\nexit 3\n");
    let mut r = factory(&path).create(&cfg()).unwrap();
    r.wait_ready().unwrap();
    let err = r.draw(FrameIndex(0)).unwrap_err();
    assert!(matches!(err, ReelError::Render(_)), "{err}");
}

#[test]
fn missing_binary_fails_to_spawn() {
    let f = ProcessRasterizerFactory::new("/definitely/not/a/rasterizer")
        .with_scratch_dir(PathBuf::from("target").join("process_rasterizer_unit"));
    let err = f.create(&cfg()).err().unwrap();
    assert!(matches!(err, ReelError::RendererInit(_)), "{err}");
}

#[test]
fn interrupt_unblocks_a_stalled_draw() {
    // `exec` keeps the stalled process the one that gets killed.
    let path = script(
        "stall.sh",
        "echo ready\nwhile read cmd idx; do exec sleep 30; done\n",
    );
    let mut r = factory(&path).create(&cfg()).unwrap();
    r.wait_ready().unwrap();
    let interrupt = r.interrupt_handle().unwrap();

    let started = std::time::Instant::now();
    let killer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        interrupt();
    });
    let err = r.draw(FrameIndex(0)).unwrap_err();
    killer.join().unwrap();

    assert!(matches!(err, ReelError::Render(_)), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));
}
