//! In-flight side-operation tracking.

use std::sync::Mutex;

type DrainWaiter = Box<dyn FnOnce() + Send>;

/// Counts outstanding tracked operations (listener notifications, progress
/// writes). Teardown parks on `wait_for_ops` until the counter drains.
#[derive(Default)]
pub struct InFlightTracker {
    inner: Mutex<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    in_flight: u64,
    waiters: Vec<DrainWaiter>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_op(&self) {
        let mut inner = self.inner.lock().expect("tracker lock");
        inner.in_flight += 1;
    }

    pub fn finish_op(&self) {
        let waiters = {
            let mut inner = self.inner.lock().expect("tracker lock");
            assert!(inner.in_flight > 0, "finish_op without matching start_op");
            inner.in_flight -= 1;
            if inner.in_flight == 0 {
                std::mem::take(&mut inner.waiters)
            } else {
                Vec::new()
            }
        };
        for waiter in waiters {
            waiter();
        }
    }

    /// Invoke `on_drained` once no operations are in flight. Fires
    /// immediately (on the calling thread) when the counter is already
    /// zero, otherwise from the thread completing the final operation.
    pub fn wait_for_ops(&self, on_drained: DrainWaiter) {
        let fire = {
            let mut inner = self.inner.lock().expect("tracker lock");
            if inner.in_flight == 0 {
                true
            } else {
                inner.waiters.push(on_drained);
                return;
            }
        };
        if fire {
            on_drained();
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.inner.lock().expect("tracker lock").in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn waiter_fires_immediately_when_idle() {
        let tracker = InFlightTracker::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&fired);
        tracker.wait_for_ops(Box::new(move || {
            observer.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiter_deferred_until_all_ops_finish() {
        let tracker = InFlightTracker::new();
        tracker.start_op();
        tracker.start_op();

        let fired = Arc::new(AtomicUsize::new(0));
        let observer = Arc::clone(&fired);
        tracker.wait_for_ops(Box::new(move || {
            observer.fetch_add(1, Ordering::SeqCst);
        }));

        tracker.finish_op();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tracker.finish_op();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn multiple_waiters_all_fire() {
        let tracker = InFlightTracker::new();
        tracker.start_op();

        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let observer = Arc::clone(&fired);
            tracker.wait_for_ops(Box::new(move || {
                observer.fetch_add(1, Ordering::SeqCst);
            }));
        }
        tracker.finish_op();
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }
}
