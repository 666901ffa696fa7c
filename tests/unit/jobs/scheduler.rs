use super::*;
use crate::animation::descriptor::AnimationSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

enum Outcome {
    Succeed,
    Fail,
    Panic,
}

struct GatedRunner {
    release: Mutex<mpsc::Receiver<Outcome>>,
    started: AtomicUsize,
}

impl JobRunner for GatedRunner {
    fn run(
        &self,
        _anim: &AnimationDescriptor,
        _options: &JobOptions,
        output: &Path,
    ) -> ReelResult<RenderStats> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .release
            .lock()
            .unwrap()
            .recv()
            .unwrap_or(Outcome::Fail);
        std::fs::write(output, b"mp4-bytes").unwrap();
        match outcome {
            Outcome::Succeed => Ok(RenderStats {
                frames_out: 3,
                ..RenderStats::default()
            }),
            Outcome::Fail => Err(ReelError::encoding(Some(1), "encoder exited with 1")),
            Outcome::Panic => panic!("runner exploded"),
        }
    }
}

fn scheduler(name: &str, concurrency: usize) -> (JobScheduler, mpsc::Sender<Outcome>, PathBuf) {
    let root = PathBuf::from("target").join("scheduler_unit").join(name);
    let _ = std::fs::remove_dir_all(&root);
    let (tx, rx) = mpsc::channel();
    let runner = Arc::new(GatedRunner {
        release: Mutex::new(rx),
        started: AtomicUsize::new(0),
    });
    let sched = JobScheduler::new(
        SchedulerConfig {
            concurrency,
            work_root: root.clone(),
        },
        runner,
    );
    (sched, tx, root)
}

fn request() -> JobRequest {
    JobRequest {
        input: AnimationSource::Text(r#"{"fr":10,"ip":0,"op":10,"w":8,"h":8}"#.to_string()),
        options: JobOptions::default(),
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

const LONG: Option<Duration> = Some(Duration::from_secs(10));

#[test]
fn ceiling_limits_running_jobs_and_admits_one_per_completion() {
    let (sched, release, _root) = scheduler("ceiling", 2);
    let a = sched.submit(request()).unwrap();
    let b = sched.submit(request()).unwrap();
    let c = sched.submit(request()).unwrap();

    assert_eq!(sched.running_count(), 2);
    assert_eq!(sched.queued_count(), 1);
    assert_eq!(sched.status(c).unwrap().status, JobStatus::Queued);
    assert!(sched.status(c).unwrap().started_at.is_none());

    release.send(Outcome::Succeed).unwrap();
    wait_until(|| sched.queued_count() == 0);
    assert_eq!(sched.running_count(), 2);
    assert_eq!(sched.status(c).unwrap().status, JobStatus::Running);
    let done = [a, b]
        .iter()
        .filter(|id| sched.status(**id).unwrap().status == JobStatus::Done)
        .count();
    assert_eq!(done, 1);

    release.send(Outcome::Succeed).unwrap();
    release.send(Outcome::Succeed).unwrap();
    for id in [a, b, c] {
        let snap = sched.wait(id, LONG).unwrap();
        assert_eq!(snap.status, JobStatus::Done);
        assert!(snap.started_at.is_some() && snap.ended_at.is_some());
        assert_eq!(snap.stats.map(|s| s.frames_out), Some(3));
    }
    assert_eq!(sched.running_count(), 0);
}

#[test]
fn result_is_taken_once_and_storage_removed_on_drop() {
    let (sched, release, root) = scheduler("result", 1);
    let id = sched.submit(request()).unwrap();
    let work_dir = root.join(format!("job-{id}"));
    assert!(work_dir.is_dir());

    assert!(matches!(sched.take_result(id), Err(ReelError::NotReady(_))));
    release.send(Outcome::Succeed).unwrap();
    assert_eq!(sched.wait(id, LONG).unwrap().status, JobStatus::Done);

    let mut artifact = sched.take_result(id).unwrap();
    assert_eq!(artifact.len(), 9);
    let mut bytes = Vec::new();
    artifact.read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, b"mp4-bytes");
    assert!(work_dir.is_dir());
    drop(artifact);

    assert!(!work_dir.exists());
    assert!(matches!(sched.take_result(id), Err(ReelError::NotFound(_))));
    assert!(matches!(sched.status(id), Err(ReelError::NotFound(_))));
}

#[test]
fn failed_job_records_error_and_drops_partial_output() {
    let (sched, release, root) = scheduler("failure", 1);
    let id = sched.submit(request()).unwrap();
    release.send(Outcome::Fail).unwrap();

    let snap = sched.wait(id, LONG).unwrap();
    assert_eq!(snap.status, JobStatus::Error);
    assert!(snap.error.unwrap().contains("encoding failure"));
    assert!(!root.join(format!("job-{id}")).join("out.mp4").exists());
    assert!(matches!(sched.take_result(id), Err(ReelError::NotReady(_))));
    assert_eq!(sched.running_count(), 0);

    sched.cleanup(id).unwrap();
    assert!(!root.join(format!("job-{id}")).exists());
}

#[test]
fn runner_panic_is_recorded_and_slot_freed() {
    let (sched, release, _root) = scheduler("panic", 1);
    let first = sched.submit(request()).unwrap();
    let second = sched.submit(request()).unwrap();
    release.send(Outcome::Panic).unwrap();

    let snap = sched.wait(first, LONG).unwrap();
    assert_eq!(snap.status, JobStatus::Error);
    assert!(snap.error.unwrap().contains("panicked"));

    wait_until(|| sched.status(second).unwrap().status == JobStatus::Running);
    release.send(Outcome::Succeed).unwrap();
    assert_eq!(sched.wait(second, LONG).unwrap().status, JobStatus::Done);
}

#[test]
fn cleanup_rules_follow_job_state() {
    let (sched, release, root) = scheduler("cleanup", 1);
    let running = sched.submit(request()).unwrap();
    let queued = sched.submit(request()).unwrap();

    assert!(matches!(sched.cleanup(running), Err(ReelError::NotReady(_))));
    sched.cleanup(queued).unwrap();
    assert_eq!(sched.queued_count(), 0);
    assert!(!root.join(format!("job-{queued}")).exists());
    assert!(matches!(sched.cleanup(queued), Err(ReelError::NotFound(_))));

    release.send(Outcome::Succeed).unwrap();
    assert_eq!(sched.wait(running, LONG).unwrap().status, JobStatus::Done);
    sched.cleanup(running).unwrap();
    assert!(sched.list().is_empty());
}

#[test]
fn wait_with_deadline_returns_current_state() {
    let (sched, release, _root) = scheduler("deadline", 1);
    let id = sched.submit(request()).unwrap();
    let snap = sched.wait(id, Some(Duration::from_millis(20))).unwrap();
    assert_eq!(snap.status, JobStatus::Running);
    release.send(Outcome::Succeed).unwrap();
    assert_eq!(sched.wait(id, LONG).unwrap().status, JobStatus::Done);
}

#[test]
fn malformed_requests_never_enter_the_queue() {
    let (sched, _release, _root) = scheduler("malformed", 1);
    let bad_anim = JobRequest {
        input: AnimationSource::Text("{\"w\":8}".to_string()),
        options: JobOptions::default(),
    };
    assert!(matches!(
        sched.submit(bad_anim),
        Err(ReelError::InvalidAnimation(_))
    ));

    let bad_color = JobRequest {
        options: JobOptions {
            bg_color: Some("nope".to_string()),
            ..JobOptions::default()
        },
        ..request()
    };
    assert!(matches!(sched.submit(bad_color), Err(ReelError::Validation(_))));
    assert!(sched.list().is_empty());
    assert_eq!(sched.running_count(), 0);
}

#[test]
fn unknown_ids_are_not_found() {
    let (sched, _release, _root) = scheduler("unknown", 1);
    let id = JobId::new();
    assert!(matches!(sched.status(id), Err(ReelError::NotFound(_))));
    assert!(matches!(sched.wait(id, None), Err(ReelError::NotFound(_))));
    assert!(matches!(sched.cleanup(id), Err(ReelError::NotFound(_))));
}
