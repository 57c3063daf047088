//! A bounded concurrent queue that releases each value to a callback when its
//! delay expires or when it is forced out.
//!
//! Values are inserted together with a delay. A single background release loop
//! sleeps until the nearest expiry and delivers each value to the "expired"
//! callback once its instant is reached. A value can also leave the queue
//! early: explicitly, via [`DeferredQueue::force_pull`] or
//! [`DeferredQueue::force_time_pull`], or implicitly when an insert into a
//! full queue evicts the earliest value to make room. Forced and evicted
//! values are delivered to the "forced" callback, so a consumer can always
//! tell queue pressure apart from elapsed time.
//!
//! Every inserted value is delivered at most once, to exactly one of the two
//! callbacks.

#![warn(missing_docs)]

mod deferred_queue;
mod runner;
mod timed_item;

pub use deferred_queue::{Callback, DeferredQueue};
pub use runner::{Task, TaskRunner, ThreadRunner};
pub use timed_item::TimedItem;
