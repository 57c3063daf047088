use std::thread;
use std::time::Duration;

use deferred_queue::DeferredQueue;

fn main() {
    // A queue holding at most two values.
    let queue = DeferredQueue::new(2);

    queue.set_on_time_expired_callback(|value| println!("expired: {}", value));
    queue.set_on_force_deque_callback(|value| println!("forced: {}", value));

    // The second value expires first, even though it was inserted later.
    queue.insert("slow", Duration::from_millis(500));
    queue.insert("fast", Duration::from_millis(100));

    // A third insert overflows the queue: the earliest pending value ("fast")
    // is evicted through the forced callback to make room.
    queue.insert("extra", Duration::from_millis(300));

    // Let the background worker release the rest by time.
    thread::sleep(Duration::from_secs(1));
    assert!(queue.is_empty());

    queue.stop_service();
}
