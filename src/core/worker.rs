use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to do when a macro is triggered while a previous run is still going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Drop the new trigger.
    #[default]
    Reject,
    /// Run it once the current run finishes.
    Queue,
    /// Start another run on its own thread.
    AllowOverlap,
}

/// Outcome of submitting a run to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    Queued,
    Rejected,
}

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct WorkerState {
    active: usize,
    queue: VecDeque<Task>,
    status: String,
}

struct Shared {
    state: Mutex<WorkerState>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs one kind of task on background threads and tracks its runs.
#[derive(Clone)]
pub struct Worker {
    name: String,
    shared: Arc<Shared>,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(WorkerState {
                    status: "Ready".to_string(),
                    ..WorkerState::default()
                }),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start `task`, queue it behind the current run, or drop it, per `policy`.
    pub fn submit<F>(&self, policy: ReentryPolicy, task: F) -> Admission
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(task);
        let mut state = self.shared.lock();

        if state.active > 0 {
            match policy {
                ReentryPolicy::Reject => return Admission::Rejected,
                ReentryPolicy::Queue => {
                    state.queue.push_back(task);
                    return Admission::Queued;
                }
                ReentryPolicy::AllowOverlap => {}
            }
        }

        state.active += 1;
        drop(state);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("macro-{}", self.name))
            .spawn(move || {
                let mut task = task;
                loop {
                    task();

                    let mut state = shared.lock();
                    if let Some(next) = state.queue.pop_front() {
                        task = next;
                        continue;
                    }
                    state.active -= 1;
                    if state.active == 0 {
                        shared.idle.notify_all();
                    }
                    break;
                }
            });

        match spawned {
            Ok(_) => Admission::Started,
            Err(e) => {
                warn!(worker = %self.name, error = %e, "failed to spawn worker thread");
                let mut state = self.shared.lock();
                state.active -= 1;
                if state.active == 0 {
                    self.shared.idle.notify_all();
                }
                Admission::Rejected
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().active > 0
    }

    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Drop runs that were queued but not started yet.
    pub fn clear_queue(&self) {
        self.shared.lock().queue.clear();
    }

    pub fn get_status(&self) -> String {
        self.shared.lock().status.clone()
    }

    pub fn set_status(&self, text: &str) {
        self.shared.lock().status = text.to_string();
    }

    /// Block until no run is active. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.active > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .shared
                .idle
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    /// A task that blocks until `release` is sent, counting completed runs.
    fn gated_task(runs: Arc<AtomicUsize>) -> (impl Fn() + Send + Sync + 'static, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);
        let task = move || {
            let _ = rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
            runs.fetch_add(1, Ordering::SeqCst);
        };
        (task, tx)
    }

    #[test]
    fn reject_drops_second_trigger() {
        let worker = Worker::new("combo");
        let runs = Arc::new(AtomicUsize::new(0));
        let (task, release) = gated_task(Arc::clone(&runs));
        let task = Arc::new(task);

        let t = Arc::clone(&task);
        assert_eq!(worker.submit(ReentryPolicy::Reject, move || t()), Admission::Started);
        let t = Arc::clone(&task);
        assert_eq!(worker.submit(ReentryPolicy::Reject, move || t()), Admission::Rejected);

        release.send(()).unwrap();
        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn queue_runs_pending_triggers_in_sequence() {
        let worker = Worker::new("combo");
        let runs = Arc::new(AtomicUsize::new(0));
        let (task, release) = gated_task(Arc::clone(&runs));
        let task = Arc::new(task);

        for expected in [Admission::Started, Admission::Queued, Admission::Queued] {
            let t = Arc::clone(&task);
            assert_eq!(worker.submit(ReentryPolicy::Queue, move || t()), expected);
        }
        assert_eq!(worker.queued(), 2);

        for _ in 0..3 {
            release.send(()).unwrap();
        }
        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(worker.queued(), 0);
    }

    #[test]
    fn queued_runs_execute_their_own_tasks_in_order() {
        let worker = Worker::new("find-image");
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel::<()>();

        let log = Arc::clone(&order);
        worker.submit(ReentryPolicy::Queue, move || {
            let _ = rx.recv_timeout(Duration::from_secs(5));
            log.lock().unwrap().push("first");
        });
        for name in ["second", "third"] {
            let log = Arc::clone(&order);
            let admission = worker.submit(ReentryPolicy::Queue, move || log.lock().unwrap().push(name));
            assert_eq!(admission, Admission::Queued);
        }

        tx.send(()).unwrap();
        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn cleared_queue_never_runs() {
        let worker = Worker::new("find-image");
        let runs = Arc::new(AtomicUsize::new(0));
        let (task, release) = gated_task(Arc::clone(&runs));
        worker.submit(ReentryPolicy::Queue, task);

        let counted = Arc::clone(&runs);
        worker.submit(ReentryPolicy::Queue, move || {
            counted.fetch_add(10, Ordering::SeqCst);
        });
        worker.clear_queue();
        release.send(()).unwrap();

        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overlap_starts_concurrent_runs() {
        let worker = Worker::new("heal");
        let inside = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<()>();
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..2 {
            let inside = Arc::clone(&inside);
            let overlapped = Arc::clone(&overlapped);
            let rx = Arc::clone(&rx);
            let admission = worker.submit(ReentryPolicy::AllowOverlap, move || {
                if inside.fetch_add(1, Ordering::SeqCst) == 1 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                let _ = rx.lock().unwrap().recv_timeout(Duration::from_secs(5));
                inside.fetch_sub(1, Ordering::SeqCst);
            });
            assert_eq!(admission, Admission::Started);
        }

        // Let both threads enter before releasing them
        let deadline = Instant::now() + Duration::from_secs(5);
        while !overlapped.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        tx.send(()).unwrap();
        tx.send(()).unwrap();

        assert!(worker.wait_idle(Duration::from_secs(5)));
        assert!(overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn status_is_shared_between_clones() {
        let worker = Worker::new("buff");
        let clone = worker.clone();
        assert_eq!(worker.get_status(), "Ready");
        clone.set_status("Running buff");
        assert_eq!(worker.get_status(), "Running buff");
    }
}
