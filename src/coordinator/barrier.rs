// Counting completion barrier
// Released every time the outstanding-unit counter drops to zero, re-armed by any later add

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Outstanding-unit counter paired with the waiters blocked on it.
///
/// The counter is the single source of truth: the barrier is "released" exactly
/// when it reads zero, so the two can never drift apart. Each transition to zero
/// bumps a generation number under `generation`'s lock. A waiter that started
/// while units were outstanding returns on the next bump even if new units were
/// added before it got scheduled again.
pub(crate) struct CompletionBarrier {
    outstanding: AtomicUsize,
    generation: Mutex<u64>,
    /// Wakes threads parked in `wait_blocking`
    released: Condvar,
    /// Wakes tasks suspended in `wait`
    notify: Notify,
}

impl CompletionBarrier {
    pub(crate) fn new() -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            generation: Mutex::new(0),
            released: Condvar::new(),
            notify: Notify::new(),
        }
    }

    #[inline]
    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Add `n` units, returning the new outstanding total
    pub(crate) fn add(&self, n: usize) -> usize {
        self.outstanding.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Remove up to `n` units with a single compare-and-swap loop.
    ///
    /// Returns `(removed, remaining)`. Concurrent callers near zero can never
    /// remove more than was actually there.
    pub(crate) fn remove(&self, n: usize) -> (usize, usize) {
        let update = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current > 0).then(|| current - current.min(n))
            });

        match update {
            Ok(previous) => {
                let removed = previous.min(n);
                let remaining = previous - removed;
                if removed > 0 && remaining == 0 {
                    self.release();
                }
                (removed, remaining)
            }
            // Already idle
            Err(_) => (0, 0),
        }
    }

    /// Zero the counter in one step, returning how many units were dropped
    pub(crate) fn drain(&self) -> usize {
        let previous = self.outstanding.swap(0, Ordering::AcqRel);
        if previous > 0 {
            self.release();
        }
        previous
    }

    fn release(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.released.notify_all();
        drop(generation);

        self.notify.notify_waiters();
    }

    /// Suspend the current task until the counter reaches zero
    pub(crate) async fn wait(&self) {
        let start = *self.generation.lock();

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and the
            // await is not lost
            notified.as_mut().enable();

            if self.released_since(start) {
                return;
            }

            notified.await;
        }
    }

    /// Park the current thread until the counter reaches zero
    pub(crate) fn wait_blocking(&self) {
        let mut generation = self.generation.lock();
        let start = *generation;

        while self.outstanding() != 0 && *generation == start {
            self.released.wait(&mut generation);
        }
    }

    fn released_since(&self, start: u64) -> bool {
        self.outstanding() == 0 || *self.generation.lock() != start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_remove_is_clamped() {
        let barrier = CompletionBarrier::new();
        assert_eq!(barrier.add(3), 3);
        assert_eq!(barrier.remove(10), (3, 0));
        assert_eq!(barrier.remove(1), (0, 0));
        assert_eq!(barrier.outstanding(), 0);
    }

    #[test]
    fn test_remove_zero_keeps_units() {
        let barrier = CompletionBarrier::new();
        barrier.add(2);
        assert_eq!(barrier.remove(0), (0, 2));
    }

    #[test]
    fn test_drain_reports_dropped_units() {
        let barrier = CompletionBarrier::new();
        barrier.add(7);
        assert_eq!(barrier.drain(), 7);
        assert_eq!(barrier.drain(), 0);
    }

    #[test]
    fn test_blocking_wait_on_idle_returns() {
        let barrier = CompletionBarrier::new();
        barrier.wait_blocking();
    }

    #[test]
    fn test_blocking_waiter_survives_rearm() {
        let barrier = Arc::new(CompletionBarrier::new());
        barrier.add(1);

        let waiter = {
            let barrier = barrier.clone();
            std::thread::spawn(move || barrier.wait_blocking())
        };

        std::thread::sleep(Duration::from_millis(50));
        // Release and immediately re-arm; the parked waiter still saw a release
        barrier.remove(1);
        barrier.add(1);

        waiter.join().unwrap();
        assert_eq!(barrier.outstanding(), 1);
    }

    #[test]
    fn test_wait_pending_until_released() {
        let barrier = CompletionBarrier::new();
        barrier.add(2);

        let mut wait = tokio_test::task::spawn(barrier.wait());
        tokio_test::assert_pending!(wait.poll());

        barrier.remove(1);
        tokio_test::assert_pending!(wait.poll());

        barrier.remove(1);
        assert!(wait.is_woken());
        tokio_test::assert_ready!(wait.poll());
    }

    #[test]
    fn test_async_waiter_survives_rearm() {
        let barrier = CompletionBarrier::new();
        barrier.add(1);

        let mut wait = tokio_test::task::spawn(barrier.wait());
        tokio_test::assert_pending!(wait.poll());

        barrier.remove(1);
        barrier.add(1);
        tokio_test::assert_ready!(wait.poll());
    }

    #[tokio::test]
    async fn test_async_wait_released_by_remove() {
        let barrier = Arc::new(CompletionBarrier::new());
        barrier.add(2);

        let remover = barrier.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remover.remove(1);
            remover.remove(1);
        });

        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("barrier never released");
    }
}
