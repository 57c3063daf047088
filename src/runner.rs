use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::warn;

/// A unit of background work submitted to a [`TaskRunner`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Executes queue background work on a thread separate from callers.
///
/// The queue only depends on being able to submit a task and to shut the
/// runner down; thread-pool sizing is the runner's business. The queue
/// guarantees it never has more than one task in flight per queue instance.
pub trait TaskRunner: Send + Sync {
    /// Submits a task for execution.
    ///
    /// Returns `false` if the runner has been shut down and the task was
    /// rejected.
    fn submit(&self, task: Task) -> bool;

    /// Stops accepting new tasks.
    ///
    /// Tasks already running are not interrupted; shutdown is cooperative.
    fn shutdown(&self);
}

/// A [`TaskRunner`] that runs each accepted task on its own named thread.
///
/// Combined with the queue's single-active-worker guarantee this behaves as a
/// single-threaded executor.
#[derive(Debug, Default)]
pub struct ThreadRunner {
    stopped: AtomicBool,
}

impl ThreadRunner {
    /// Creates a runner that accepts tasks until [`TaskRunner::shutdown`] is
    /// called.
    pub fn new() -> ThreadRunner {
        ThreadRunner {
            stopped: AtomicBool::new(false),
        }
    }
}

impl TaskRunner for ThreadRunner {
    fn submit(&self, task: Task) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }

        match thread::Builder::new()
            .name("deferred-queue-release".into())
            .spawn(task)
        {
            Ok(_) => true,
            Err(err) => {
                warn!(%err, "failed to spawn release worker thread");
                false
            }
        }
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::{TaskRunner, ThreadRunner};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_submitted_task() {
        let runner = ThreadRunner::new();
        let (tx, rx) = mpsc::channel();

        assert!(runner.submit(Box::new(move || tx.send(42).unwrap())));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 42);
    }

    #[test]
    fn rejects_after_shutdown() {
        let runner = ThreadRunner::new();
        runner.shutdown();

        assert!(!runner.submit(Box::new(|| panic!("must not run"))));
    }
}
