use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window of failure timestamps, ordered by completion time.
///
/// Trips at most once: after the retained count first reaches the
/// threshold, later crossings report nothing.
#[derive(Debug)]
pub struct ErrorWindow {
    width: Duration,
    threshold: usize,
    events: VecDeque<Instant>,
    tripped: bool,
}

impl ErrorWindow {
    pub fn new(width: Duration, threshold: usize) -> ErrorWindow {
        ErrorWindow {
            width,
            threshold,
            events: VecDeque::new(),
            tripped: false,
        }
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Records a failure at `at` and evaluates the window as of `now`.
    /// Returns `true` only when this call trips the window.
    pub fn record(&mut self, at: Instant, now: Instant) -> bool {
        // results can reach us slightly out of completion order
        let idx = self.events.partition_point(|t| *t <= at);
        self.events.insert(idx, at);
        self.check(now)
    }

    /// Prunes and evaluates without recording anything.
    pub fn check(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.tripped || self.events.len() < self.threshold {
            return false;
        }
        self.tripped = true;
        true
    }

    /// Drops every event older than `now - width`.
    pub fn prune(&mut self, now: Instant) {
        let cutoff = match now.checked_sub(self.width) {
            Some(cutoff) => cutoff,
            None => return,
        };
        while let Some(&oldest) = self.events.front() {
            if oldest >= cutoff {
                break;
            }
            self.events.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn trips_once_at_threshold() {
        let base = Instant::now();
        let mut window = ErrorWindow::new(secs(10.0), 3);

        assert!(!window.record(base, base));
        assert!(!window.record(base + secs(4.0), base + secs(4.0)));
        assert!(window.record(base + secs(9.0), base + secs(9.0)));
        assert_eq!(3, window.len());

        assert!(!window.record(base + secs(9.5), base + secs(9.5)));
        assert!(window.is_tripped());
    }

    #[test]
    fn prune_keeps_only_recent_events() {
        let base = Instant::now();
        let mut window = ErrorWindow::new(secs(10.0), 100);

        for s in [0.0, 1.0, 5.0, 11.0, 14.0] {
            window.record(base + secs(s), base + secs(s));
        }

        let now = base + secs(15.0);
        window.prune(now);

        let cutoff = now - secs(10.0);
        assert!(window.iter().all(|t| *t >= cutoff));
        assert_eq!(3, window.len());
    }

    #[test]
    fn boundary_event_is_retained() {
        let base = Instant::now();
        let mut window = ErrorWindow::new(secs(10.0), 100);

        window.record(base, base);
        window.prune(base + secs(10.0));
        assert_eq!(1, window.len());

        window.prune(base + secs(10.001));
        assert!(window.is_empty());
    }

    #[test]
    fn stale_events_do_not_trip() {
        let base = Instant::now();
        let mut window = ErrorWindow::new(secs(2.0), 3);

        assert!(!window.record(base, base));
        assert!(!window.record(base + secs(1.0), base + secs(1.0)));
        assert!(!window.record(base + secs(5.0), base + secs(5.0)));
        assert_eq!(1, window.len());
        assert!(!window.is_tripped());
    }

    #[test]
    fn out_of_order_events_stay_sorted() {
        let base = Instant::now();
        let mut window = ErrorWindow::new(secs(10.0), 100);

        window.record(base + secs(3.0), base + secs(3.0));
        window.record(base + secs(1.0), base + secs(3.0));
        window.record(base + secs(2.0), base + secs(3.0));

        let ordered: Vec<_> = window.iter().copied().collect();
        let mut sorted = ordered.clone();
        sorted.sort();
        assert_eq!(sorted, ordered);
    }
}
