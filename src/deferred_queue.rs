use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::runner::{TaskRunner, ThreadRunner};
use crate::timed_item::TimedItem;

/// Handler invoked with each released value.
///
/// The queue holds one callback per release channel ("expired" and "forced"),
/// each defaulting to a no-op so the queue is usable before a consumer is
/// attached. Callbacks run on the thread that triggered the release: the
/// caller's thread for forced pulls and evictions, the background worker's
/// thread for time-based releases. Delivery happens outside the queue lock, so
/// a callback may re-enter the queue.
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A bounded queue that holds each value until its delay expires, then
/// delivers it to a callback.
///
/// Values are ordered by expiry instant. A single background release worker
/// sleeps until the nearest expiry and delivers due values to the "expired"
/// callback. [`force_pull`](DeferredQueue::force_pull) and
/// [`force_time_pull`](DeferredQueue::force_time_pull) release the earliest
/// value early, and inserting into a full queue evicts the earliest value
/// through the "forced" callback to make room. Every value is delivered at
/// most once, to exactly one callback.
///
/// Cloning the queue produces a handle to the same underlying queue, so it can
/// be shared between threads.
///
/// # Examples
///
/// Basic usage:
///
/// ```no_run
/// use deferred_queue::DeferredQueue;
/// use std::time::Duration;
///
/// let queue = DeferredQueue::new(10);
/// queue.set_on_time_expired_callback(|value| println!("expired: {}", value));
/// queue.set_on_force_deque_callback(|value| println!("forced: {}", value));
///
/// queue.insert("soon", Duration::from_millis(100));
/// std::thread::sleep(Duration::from_millis(200));
/// // "expired: soon" has been printed by the background worker.
/// ```
pub struct DeferredQueue<T> {
    /// State shared between handles of the same queue and its release worker.
    shared: Arc<Shared<T>>,
    runner: Arc<dyn TaskRunner>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,

    /// Signals the sleeping worker that the head of the queue changed or that
    /// shutdown was requested.
    wakeup: Condvar,
}

struct Inner<T> {
    capacity: usize,
    storage: BinaryHeap<Entry<T>>,

    /// Monotonic counter stamped onto entries so equal expiry instants
    /// release in insertion order.
    next_seq: u64,

    on_expired: Callback<T>,
    on_forced: Callback<T>,
    worker: WorkerState,
}

/// Status of the background release worker, guarded by the storage lock and
/// transitioned together with insert/drain decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerState {
    /// No worker is active; the next insert into the queue launches one.
    Idle,
    /// Exactly one worker is draining the queue by time.
    Running,
    /// Shutdown was requested; the worker exits on its next iteration and no
    /// new worker is launched.
    Stopping,
}

/// Outcome of one locked inspection of the queue head by the release worker.
enum ReleaseStep<T> {
    /// The queue is empty; the worker exits.
    Drained,
    /// The head is due; deliver it and re-check without sleeping.
    Deliver(TimedItem<T>, Callback<T>),
    /// The head expires in the future; wait for it or for a wakeup.
    Wait(Duration),
}

impl<T: Send + 'static> DeferredQueue<T> {
    /// Creates a queue holding at most `capacity` values, draining by time on
    /// a [`ThreadRunner`].
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use deferred_queue::DeferredQueue;
    ///
    /// let queue: DeferredQueue<i32> = DeferredQueue::new(10);
    /// ```
    pub fn new(capacity: usize) -> DeferredQueue<T> {
        DeferredQueue::with_runner(capacity, Arc::new(ThreadRunner::new()))
    }

    /// Creates a queue that launches its release worker on the given runner.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_runner(capacity: usize, runner: Arc<dyn TaskRunner>) -> DeferredQueue<T> {
        assert!(capacity > 0, "capacity must be at least 1");
        DeferredQueue {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    capacity,
                    storage: BinaryHeap::with_capacity(capacity),
                    next_seq: 0,
                    on_expired: Arc::new(|_| {}),
                    on_forced: Arc::new(|_| {}),
                    worker: WorkerState::Idle,
                }),
                wakeup: Condvar::new(),
            }),
            runner,
        }
    }

    /// Inserts `value`, to be released through the expired callback once
    /// `delay` has elapsed.
    ///
    /// If the queue is full, the current earliest value is first evicted and
    /// delivered synchronously through the forced callback, so the queue
    /// never exceeds its capacity. A zero delay means the value is already
    /// due and is released on the worker's next pass.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use deferred_queue::DeferredQueue;
    /// use std::time::Duration;
    ///
    /// let queue = DeferredQueue::new(10);
    /// queue.insert("abc", Duration::from_secs(5));
    /// assert_eq!(queue.len(), 1);
    /// ```
    pub fn insert(&self, value: T, delay: Duration) {
        self.enqueue(TimedItem::new(value, delay));
    }

    /// Inserts `value` with an explicit expiry `Instant` instead of a delay.
    pub fn insert_at(&self, value: T, expires_at: Instant) {
        self.enqueue(TimedItem::until_instant(value, expires_at));
    }

    fn enqueue(&self, item: TimedItem<T>) {
        let mut inner = self.shared.inner.lock();

        let evicted = if inner.storage.len() == inner.capacity {
            inner
                .pop_earliest()
                .map(|evicted| (evicted, Arc::clone(&inner.on_forced)))
        } else {
            None
        };

        // If the new item becomes the head, a sleeping worker must wake and
        // recompute its wait from the new nearest expiry.
        let is_new_head = inner
            .storage
            .peek()
            .map_or(true, |head| item < head.item);
        inner.push(item);

        match inner.worker {
            WorkerState::Idle => {
                let shared = Arc::clone(&self.shared);
                if self.runner.submit(Box::new(move || release_loop(&shared))) {
                    inner.worker = WorkerState::Running;
                } else {
                    debug!("task runner rejected release worker, queue will not drain by time");
                }
            }
            WorkerState::Running => {
                if is_new_head {
                    self.shared.wakeup.notify_one();
                }
            }
            WorkerState::Stopping => {}
        }

        drop(inner);

        if let Some((evicted, on_forced)) = evicted {
            deliver(on_forced, evicted.value, "forced");
        }
    }

    /// Removes the earliest value and delivers it through the expired
    /// callback, as if its delay had elapsed.
    ///
    /// Calling this on an empty queue is a no-op; no callback is invoked.
    pub fn force_time_pull(&self) {
        let mut inner = self.shared.inner.lock();
        let pulled = inner
            .pop_earliest()
            .map(|item| (item, Arc::clone(&inner.on_expired)));
        drop(inner);

        if let Some((item, on_expired)) = pulled {
            deliver(on_expired, item.value, "expired");
        }
    }

    /// Removes the earliest value and delivers it through the forced
    /// callback.
    ///
    /// Calling this on an empty queue is a no-op; no callback is invoked.
    pub fn force_pull(&self) {
        let mut inner = self.shared.inner.lock();
        let pulled = inner
            .pop_earliest()
            .map(|item| (item, Arc::clone(&inner.on_forced)));
        drop(inner);

        if let Some((item, on_forced)) = pulled {
            deliver(on_forced, item.value, "forced");
        }
    }

    /// Replaces the callback invoked when a value's delay expires or
    /// [`force_time_pull`](DeferredQueue::force_time_pull) is called.
    ///
    /// Takes effect for subsequent releases; a delivery already in flight
    /// completes with the callback it started with.
    pub fn set_on_time_expired_callback(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        self.shared.inner.lock().on_expired = Arc::new(callback);
    }

    /// Replaces the callback invoked when a value is forced out, either by
    /// [`force_pull`](DeferredQueue::force_pull) or by capacity eviction.
    ///
    /// Takes effect for subsequent releases; a delivery already in flight
    /// completes with the callback it started with.
    pub fn set_on_force_deque_callback(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        self.shared.inner.lock().on_forced = Arc::new(callback);
    }

    /// Shuts down the background release worker and its task runner.
    ///
    /// A sleeping worker is woken and exits without releasing further values;
    /// values still in the queue stay there and remain reachable through the
    /// force-pull operations. Time-based release never resumes on this queue.
    pub fn stop_service(&self) {
        let mut inner = self.shared.inner.lock();
        inner.worker = WorkerState::Stopping;
        drop(inner);

        self.shared.wakeup.notify_one();
        self.runner.shutdown();
    }

    /// Returns the number of values currently held.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().storage.len()
    }

    /// Checks if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.shared.inner.lock().storage.is_empty()
    }

    /// Returns the maximum number of values the queue holds.
    pub fn capacity(&self) -> usize {
        self.shared.inner.lock().capacity
    }
}

impl<T> Clone for DeferredQueue<T> {
    /// Returns a new handle to the same underlying queue.
    ///
    /// This is how a queue is shared between producer threads.
    fn clone(&self) -> DeferredQueue<T> {
        DeferredQueue {
            shared: Arc::clone(&self.shared),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<T> fmt::Debug for DeferredQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("DeferredQueue")
            .field("capacity", &inner.capacity)
            .field("len", &inner.storage.len())
            .field("worker", &inner.worker)
            .finish()
    }
}

impl<T> Inner<T> {
    fn push(&mut self, item: TimedItem<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.storage.push(Entry { item, seq });
    }

    fn pop_earliest(&mut self) -> Option<TimedItem<T>> {
        self.storage.pop().map(|entry| entry.item)
    }

    /// One release-loop inspection of the queue head.
    fn release_step(&mut self, now: Instant) -> ReleaseStep<T> {
        let due = match self.storage.peek_mut() {
            None => return ReleaseStep::Drained,
            Some(head) if head.item.is_due(now) => PeekMut::pop(head),
            Some(head) => return ReleaseStep::Wait(head.item.expires_at() - now),
        };
        ReleaseStep::Deliver(due.item, Arc::clone(&self.on_expired))
    }
}

/// Body of the background release worker.
///
/// One logical instance runs per queue while it is non-empty. The lock is
/// dropped for every delivery and released by the condvar for every wait;
/// each wake re-inspects the head from scratch, so spurious wakeups, early
/// wakeups and a head changed by concurrent inserts or pulls are all handled
/// the same way.
fn release_loop<T>(shared: &Shared<T>) {
    let mut inner = shared.inner.lock();
    loop {
        if inner.worker == WorkerState::Stopping {
            debug!("release worker observed shutdown, exiting");
            return;
        }

        match inner.release_step(Instant::now()) {
            ReleaseStep::Drained => {
                inner.worker = WorkerState::Idle;
                return;
            }
            ReleaseStep::Deliver(item, on_expired) => {
                drop(inner);
                deliver(on_expired, item.value, "expired");
                inner = shared.inner.lock();
            }
            ReleaseStep::Wait(timeout) => {
                let _ = shared.wakeup.wait_for(&mut inner, timeout);
            }
        }
    }
}

/// Invokes a callback, isolating panics so a failing consumer cannot kill the
/// release worker or abort a caller mid-operation.
fn deliver<T>(callback: Callback<T>, value: T, channel: &'static str) {
    if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        warn!(channel, "release callback panicked, value dropped by consumer");
    }
}

/// An entry in the queue's heap.
///
/// Orders by expiry instant ascending with insertion order breaking ties, and
/// is reversed so that `BinaryHeap` (a max-heap) pops the earliest entry
/// first.
#[derive(Debug)]
struct Entry<T> {
    item: TimedItem<T>,
    seq: u64,
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Entry<T>) -> Ordering {
        other
            .item
            .cmp(&self.item)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Entry<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Entry<T>) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}
