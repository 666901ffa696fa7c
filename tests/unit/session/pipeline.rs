use super::*;
use crate::encode::sink::InMemorySink;
use crate::render::rasterizer::Rasterizer;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

struct Marker {
    pixels: Vec<u8>,
    len: usize,
    fail_on: Option<u64>,
    stall_on: Option<u64>,
    slow_below: u64,
    draws: Arc<AtomicUsize>,
    stall_done: Arc<AtomicBool>,
}

impl Rasterizer for Marker {
    fn wait_ready(&mut self) -> ReelResult<()> {
        Ok(())
    }

    fn draw(&mut self, frame: FrameIndex) -> ReelResult<()> {
        if self.fail_on == Some(frame.0) {
            return Err(ReelError::render(format!("cannot draw {frame}")));
        }
        if self.stall_on == Some(frame.0) {
            std::thread::sleep(Duration::from_millis(500));
            self.stall_done.store(true, Ordering::SeqCst);
        }
        if frame.0 < self.slow_below {
            std::thread::sleep(Duration::from_millis(20));
        }
        self.pixels = vec![frame.0 as u8; self.len];
        self.draws.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[derive(Default)]
struct MarkerFactory {
    created: AtomicUsize,
    fail_on: Option<u64>,
    stall_on: Option<u64>,
    slow_below: u64,
    draws: Arc<AtomicUsize>,
    stall_done: Arc<AtomicBool>,
}

impl RasterizerFactory for MarkerFactory {
    fn create(&self, cfg: &RasterizerConfig) -> ReelResult<Box<dyn Rasterizer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Marker {
            pixels: Vec::new(),
            len: cfg.canvas.rgba_len(),
            fail_on: self.fail_on,
            stall_on: self.stall_on,
            slow_below: self.slow_below,
            draws: Arc::clone(&self.draws),
            stall_done: Arc::clone(&self.stall_done),
        }))
    }
}

fn anim(frames: u64, fr: f64) -> AnimationDescriptor {
    AnimationDescriptor::from_json_str(format!(
        r#"{{"v":"5.7.0","fr":{fr},"ip":0,"op":{frames},"w":4,"h":2,"layers":[]}}"#
    ))
    .unwrap()
}

#[test]
fn plan_render_uses_native_size_and_rate_by_default() {
    let (canvas, plan) = plan_render(&anim(30, 30.0), &RenderOpts::default()).unwrap();
    assert_eq!((canvas.width, canvas.height), (4, 2));
    assert_eq!(plan.output_fps(), 30);
    assert_eq!(plan.total_out(), 30);
}

#[test]
fn render_streams_every_output_frame() {
    let factory = MarkerFactory::default();
    let mut sink = InMemorySink::new();
    let opts = RenderOpts {
        workers: Some(2),
        ..RenderOpts::default()
    };
    let stats = render_animation(&anim(6, 6.0), &opts, &factory, &mut sink).unwrap();

    assert_eq!(stats.frames_out, 6);
    assert_eq!(stats.frames_rendered, 6);
    assert_eq!(stats.frames_skipped, 0);
    assert!(sink.ended());
    let cfg = sink.config().unwrap();
    assert_eq!(cfg.total_frames, 6);
    let order: Vec<u8> = sink.frames().iter().map(|(_, f)| f.data[0]).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(factory.created.load(Ordering::SeqCst), stats.workers);
}

#[test]
fn zero_output_plan_is_rejected_before_the_sink_starts() {
    let factory = MarkerFactory::default();
    let mut sink = InMemorySink::new();
    let opts = RenderOpts {
        fps: Some(1.0),
        ..RenderOpts::default()
    };
    let err = render_animation(&anim(1, 240.0), &opts, &factory, &mut sink).unwrap_err();
    assert!(matches!(err, ReelError::Validation(_)));
    assert!(sink.config().is_none());
}

#[test]
fn worker_error_aborts_the_sink() {
    let factory = MarkerFactory {
        fail_on: Some(0),
        ..MarkerFactory::default()
    };
    let mut sink = InMemorySink::new();
    let err = render_animation(&anim(4, 4.0), &RenderOpts::default(), &factory, &mut sink)
        .unwrap_err();
    assert!(matches!(err, ReelError::WorkerFailure { .. }), "{err}");
    assert!(sink.aborted());
    assert!(!sink.ended());
    assert!(sink.frames().is_empty());
}

#[test]
fn still_frames_are_bounded_by_the_animation() {
    let factory = MarkerFactory::default();
    let a = anim(3, 3.0);
    let frame = render_still(&a, &RenderOpts::default(), &factory, FrameIndex(2)).unwrap();
    assert_eq!(frame.data[0], 2);
    assert!(render_still(&a, &RenderOpts::default(), &factory, FrameIndex(3)).is_err());
}

fn explicit_pool<'a>(
    factory: &'a MarkerFactory,
    a: &AnimationDescriptor,
    plan: &ResamplePlan,
    workers: usize,
) -> RenderWorkerPool<'a> {
    let cfg = RasterizerConfig {
        animation: a.data().clone(),
        canvas: a.output_canvas(None, None).unwrap(),
        background: Rgb8::BLACK,
    };
    let indices: Vec<FrameIndex> = plan.contributing().collect();
    RenderWorkerPool::new(factory, cfg, &indices, workers)
}

#[test]
fn three_workers_with_a_slow_first_chunk_stay_in_order() {
    let a = anim(12, 12.0);
    let plan = ResamplePlan::new(12, 12.0, None).unwrap();
    let factory = MarkerFactory {
        slow_below: 4,
        ..MarkerFactory::default()
    };
    let pool = explicit_pool(&factory, &a, &plan, 3);
    assert_eq!(pool.worker_count(), 3);

    let mut sink = InMemorySink::new();
    let written = pool
        .run(|rx, cancel| consume_ordered(rx, cancel, &plan, &mut sink))
        .unwrap()
        .unwrap();

    assert_eq!(written, 12);
    let order: Vec<u8> = sink.frames().iter().map(|(_, f)| f.data[0]).collect();
    assert_eq!(order, (0..12).collect::<Vec<u8>>());
    assert!(!sink.aborted());
}

/// Records whether the stalled sibling had finished its draw when `abort` ran.
#[derive(Default)]
struct AbortWatch {
    stall_done: Arc<AtomicBool>,
    sibling_done_at_abort: Option<bool>,
}

impl FrameSink for AbortWatch {
    fn begin(&mut self, _cfg: SinkConfig) -> ReelResult<()> {
        Ok(())
    }

    fn push_frame(&mut self, _out_idx: u64, _frame: &FrameBuffer) -> ReelResult<()> {
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        Ok(())
    }

    fn abort(&mut self) {
        if self.sibling_done_at_abort.is_none() {
            self.sibling_done_at_abort = Some(self.stall_done.load(Ordering::SeqCst));
        }
    }
}

#[test]
fn worker_failure_aborts_the_sink_before_siblings_finish() {
    // Chunks are [0, 1] and [2, 3]: frame 0 fails while frame 2 takes 500ms.
    let a = anim(4, 4.0);
    let plan = ResamplePlan::new(4, 4.0, None).unwrap();
    let factory = MarkerFactory {
        fail_on: Some(0),
        stall_on: Some(2),
        ..MarkerFactory::default()
    };
    let pool = explicit_pool(&factory, &a, &plan, 2);

    let mut sink = AbortWatch {
        stall_done: Arc::clone(&factory.stall_done),
        ..AbortWatch::default()
    };
    let err = pool
        .run(|rx, cancel| consume_ordered(rx, cancel, &plan, &mut sink))
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, ReelError::WorkerFailure { worker: 0, .. }), "{err}");
    assert_eq!(sink.sibling_done_at_abort, Some(false));
}

/// Sink that takes a while per frame, like an encoder whose pipe is full.
struct SlowSink {
    inner: InMemorySink,
    delay: Duration,
}

impl FrameSink for SlowSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.inner.begin(cfg)
    }

    fn push_frame(&mut self, out_idx: u64, frame: &FrameBuffer) -> ReelResult<()> {
        std::thread::sleep(self.delay);
        self.inner.push_frame(out_idx, frame)
    }

    fn end(&mut self) -> ReelResult<()> {
        self.inner.end()
    }
}

#[test]
fn slow_sink_throttles_workers_through_the_bounded_channel() {
    const WORKERS: usize = 3;
    const CAPACITY: usize = 1;

    let a = anim(30, 30.0);
    let plan = ResamplePlan::new(30, 30.0, None).unwrap();
    let factory = MarkerFactory::default();
    let pool = explicit_pool(&factory, &a, &plan, WORKERS).with_channel_capacity(CAPACITY);
    let draws = Arc::clone(&factory.draws);

    let mut sink = SlowSink {
        inner: InMemorySink::new(),
        delay: Duration::from_millis(3),
    };
    let mut max_ahead = 0usize;
    let written = pool
        .run(|rx, _cancel| -> ReelResult<u64> {
            let mut seq = Sequencer::new(&plan);
            while !seq.is_complete() {
                let Ok(WorkerEvent::Frame { frame, .. }) = rx.recv() else {
                    return Err(ReelError::render("unexpected worker event"));
                };
                seq.accept(frame, &mut sink)?;
                // Frames drawn but not yet accepted sit in the channel or in a worker's hand.
                let accepted = seq.frames_released() as usize + seq.pending_len();
                let drawn = draws.load(Ordering::SeqCst);
                max_ahead = max_ahead.max(drawn.saturating_sub(accepted));
            }
            Ok(seq.frames_written())
        })
        .unwrap()
        .unwrap();

    assert_eq!(written, 30);
    assert!(
        max_ahead <= CAPACITY + WORKERS,
        "workers ran {max_ahead} frames ahead of the sequencer"
    );
    let order: Vec<u8> = sink.inner.frames().iter().map(|(_, f)| f.data[0]).collect();
    assert_eq!(order, (0..30).collect::<Vec<u8>>());
}
