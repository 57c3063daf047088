use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// A value paired with the absolute `Instant` at which it expires.
///
/// The expiry instant is captured once, at construction time. Equality and
/// ordering consider only the expiry instant: two items expiring at the same
/// instant compare equal regardless of their values.
///
/// # Examples
///
/// Basic usage:
///
/// ```
/// use deferred_queue::TimedItem;
/// use std::time::{Duration, Instant};
///
/// let in_one_hour = TimedItem::new(123, Duration::from_secs(3600));
/// let due_now = TimedItem::until_instant("abc", Instant::now());
///
/// assert!(in_one_hour.expires_at() > due_now.expires_at());
/// assert_eq!(in_one_hour.value, 123);
/// ```
#[derive(Debug, Clone)]
pub struct TimedItem<T> {
    /// The deferred value.
    pub value: T,

    /// The `Instant` at which `value` becomes eligible for time-based release.
    expires_at: Instant,
}

impl<T> TimedItem<T> {
    /// Creates a `TimedItem` that expires once `delay` has elapsed from now.
    ///
    /// A zero delay produces an item that is already due.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use deferred_queue::TimedItem;
    /// use std::time::Duration;
    ///
    /// let item = TimedItem::new("abc", Duration::from_secs(5));
    /// ```
    pub fn new(value: T, delay: Duration) -> TimedItem<T> {
        TimedItem::until_instant(value, Instant::now() + delay)
    }

    /// Creates a `TimedItem` that expires at the given `Instant`.
    ///
    /// # Examples
    ///
    /// Basic usage:
    ///
    /// ```
    /// use deferred_queue::TimedItem;
    /// use std::time::Instant;
    ///
    /// let item = TimedItem::until_instant("abc", Instant::now());
    /// ```
    pub fn until_instant(value: T, expires_at: Instant) -> TimedItem<T> {
        TimedItem { value, expires_at }
    }

    /// Returns the `Instant` at which this item expires.
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` if this item has expired as of `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

impl<T> PartialEq for TimedItem<T> {
    fn eq(&self, other: &TimedItem<T>) -> bool {
        self.expires_at == other.expires_at
    }
}

impl<T> Eq for TimedItem<T> {}

impl<T> PartialOrd for TimedItem<T> {
    fn partial_cmp(&self, other: &TimedItem<T>) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TimedItem<T> {
    fn cmp(&self, other: &TimedItem<T>) -> Ordering {
        self.expires_at.cmp(&other.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::TimedItem;
    use std::time::{Duration, Instant};

    #[test]
    fn later_delay_expires_later() {
        let in_one_hour = TimedItem::new(123, Duration::from_secs(3600));
        let due_now = TimedItem::until_instant("abc", Instant::now());

        assert!(in_one_hour.expires_at() > due_now.expires_at());
    }

    #[test]
    fn correct_value() {
        let in_one_hour = TimedItem::new(123, Duration::from_secs(3600));
        let due_now = TimedItem::until_instant("abc", Instant::now());

        assert_eq!(in_one_hour.value, 123);
        assert_eq!(due_now.value, "abc");
    }

    #[test]
    fn ordering_ignores_value() {
        let at = Instant::now() + Duration::from_secs(60);
        let first = TimedItem::until_instant(1, at);
        let second = TimedItem::until_instant(2, at);
        let later = TimedItem::until_instant(3, at + Duration::from_secs(1));

        assert_eq!(first, second);
        assert!(first < later);
        assert!(later > second);
    }

    #[test]
    fn zero_delay_is_due() {
        let item = TimedItem::new("abc", Duration::from_secs(0));

        assert!(item.is_due(Instant::now()));
        assert!(!TimedItem::new("def", Duration::from_secs(3600)).is_due(Instant::now()));
    }
}
