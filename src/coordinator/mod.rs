// Shutdown Coordinator
// Tracks outstanding shutdown-sensitive work and lets a controller wait for it to drain

mod barrier;
mod guard;

pub use guard::Subscription;

use async_trait::async_trait;
use barrier::CompletionBarrier;
use guard::DeferredRelease;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Capability set of a shutdown tracker
///
/// Object safe, so controllers can hold a `dyn ShutdownTracker` and tests can
/// substitute their own implementation.
#[async_trait]
pub trait ShutdownTracker: Send + Sync {
    /// Register `n` outstanding units
    fn subscribe_n(&self, n: usize);

    /// Register one outstanding unit
    fn subscribe(&self) {
        self.subscribe_n(1)
    }

    /// Complete up to `n` units, returning how many were actually removed
    fn unsubscribe_n(&self, n: usize) -> usize;

    /// Complete one unit
    fn unsubscribe(&self) -> usize {
        self.unsubscribe_n(1)
    }

    /// Snapshot of the outstanding units
    fn count(&self) -> usize;

    /// Run `clean_fn` on the current thread, then complete one unit.
    /// Returns `false` without calling it when nothing is subscribed.
    fn unsubscribe_fn_boxed(&self, clean_fn: Box<dyn FnOnce() + '_>) -> bool;

    /// Run `clean_fn` off the runtime workers and complete one unit when it
    /// finishes or `duration` elapses
    async fn unsubscribe_fn_with_timeout_boxed(
        &self,
        clean_fn: Box<dyn FnOnce() + Send + 'static>,
        duration: Duration,
    ) -> CleanupOutcome;

    /// Wait until no units are outstanding
    async fn wait(&self);

    /// Wait until no units are outstanding, forcing completion after `duration`
    async fn wait_with_timeout(&self, duration: Duration) -> WaitOutcome;
}

/// How a bounded wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every outstanding unit reported completion in time
    Drained,
    /// The timer fired and the remaining units were zeroed
    Forced { abandoned: usize },
}

/// How a timed cleanup ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Nothing was subscribed; the cleanup was never started
    Skipped,
    /// The cleanup finished before the timer
    Completed,
    /// The timer fired first; the cleanup keeps running detached
    TimedOut,
}

/// Shutdown coordinator
///
/// Cheap to clone: clones share the same counter and barrier. Independently
/// constructed coordinators share nothing.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    barrier: CompletionBarrier,
}

impl Coordinator {
    /// Create an idle coordinator
    pub fn new() -> Self {
        Self::named("coordinator")
    }

    /// Create an idle coordinator labelled `name` in log output
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                barrier: CompletionBarrier::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Register one outstanding unit
    pub fn subscribe(&self) {
        self.subscribe_n(1);
    }

    /// Register `n` outstanding units; re-arms the barrier if it was released
    pub fn subscribe_n(&self, n: usize) {
        if n == 0 {
            return;
        }

        let count = self.inner.barrier.add(n);
        trace!(coordinator = %self.inner.name, added = n, count, "subscribed");
    }

    /// Register one unit and hold it until the returned guard drops
    pub fn enter(&self) -> Subscription {
        Subscription::new(self.clone())
    }

    /// Complete one unit. No-op when idle.
    pub fn unsubscribe(&self) -> usize {
        self.unsubscribe_n(1)
    }

    /// Complete up to `n` units.
    ///
    /// Asking for more than is outstanding clamps to the outstanding count.
    /// Returns the number of units actually removed.
    pub fn unsubscribe_n(&self, n: usize) -> usize {
        let (removed, count) = self.inner.barrier.remove(n);

        if removed > 0 {
            trace!(coordinator = %self.inner.name, removed, count, "unsubscribed");
            if count == 0 {
                debug!(coordinator = %self.inner.name, "all subscriptions released");
            }
        }

        removed
    }

    /// Run `clean_fn` on the current thread, then complete one unit.
    ///
    /// Returns `None` without calling `clean_fn` when nothing is subscribed.
    /// The unit is completed even if `clean_fn` panics; the panic then carries
    /// on unwinding into the caller.
    pub fn unsubscribe_fn<F, R>(&self, clean_fn: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        if self.is_idle() {
            return None;
        }

        let _release = DeferredRelease::new(self);
        Some(clean_fn())
    }

    /// Run `clean_fn` on the blocking pool and complete one unit once it
    /// finishes or `duration` elapses, whichever comes first.
    ///
    /// The cleanup never occupies a runtime worker, so the timer fires on time
    /// even on a current-thread runtime and even if `clean_fn` blocks. On
    /// timeout the cleanup is not cancelled: it keeps running until it finishes
    /// on its own, detached from the caller. A panic inside a cleanup that
    /// finished in time is resumed on the calling task after the unit has been
    /// completed.
    pub async fn unsubscribe_fn_with_timeout<F>(
        &self,
        clean_fn: F,
        duration: Duration,
    ) -> CleanupOutcome
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_idle() {
            return CleanupOutcome::Skipped;
        }

        let _release = DeferredRelease::new(self);
        self.race_cleanup(tokio::task::spawn_blocking(clean_fn), duration)
            .await
    }

    /// Like [`Coordinator::unsubscribe_fn_with_timeout`], for async cleanup.
    ///
    /// The future is spawned onto the runtime, so it must yield rather than
    /// block for the timer to win.
    pub async fn unsubscribe_future_with_timeout<F>(
        &self,
        cleanup: F,
        duration: Duration,
    ) -> CleanupOutcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_idle() {
            return CleanupOutcome::Skipped;
        }

        let _release = DeferredRelease::new(self);
        self.race_cleanup(tokio::spawn(cleanup), duration).await
    }

    async fn race_cleanup(&self, mut cleanup: JoinHandle<()>, duration: Duration) -> CleanupOutcome {
        tokio::select! {
            biased;

            joined = &mut cleanup => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        std::panic::resume_unwind(err.into_panic());
                    }
                    debug!(coordinator = %self.inner.name, "cleanup task cancelled by runtime");
                }
                CleanupOutcome::Completed
            }
            _ = tokio::time::sleep(duration) => {
                warn!(
                    coordinator = %self.inner.name,
                    timeout_ms = millis(duration),
                    "cleanup did not finish in time, leaving it running"
                );
                // Dropping the JoinHandle detaches the task without aborting it
                CleanupOutcome::TimedOut
            }
        }
    }

    /// Snapshot of the outstanding units; may be stale as soon as it returns
    pub fn count(&self) -> usize {
        self.inner.barrier.outstanding()
    }

    pub fn is_idle(&self) -> bool {
        self.count() == 0
    }

    /// Suspend until every outstanding unit has completed
    pub async fn wait(&self) {
        self.inner.barrier.wait().await;
    }

    /// Park the current thread until every outstanding unit has completed.
    ///
    /// For callers outside an async runtime. Do not call from a runtime worker.
    pub fn wait_blocking(&self) {
        self.inner.barrier.wait_blocking();
    }

    /// Wait for completion, giving up after `duration`.
    ///
    /// When the timer wins, the counter is zeroed in one step, which releases
    /// every waiter, and this call returns only once its own waiter has
    /// observed that release. The work behind the abandoned units is neither
    /// signalled nor stopped.
    pub async fn wait_with_timeout(&self, duration: Duration) -> WaitOutcome {
        let waiter = self.inner.barrier.wait();
        tokio::pin!(waiter);

        let abandoned = tokio::select! {
            biased;

            _ = &mut waiter => return WaitOutcome::Drained,
            _ = tokio::time::sleep(duration) => self.inner.barrier.drain(),
        };

        waiter.await;

        if abandoned == 0 {
            // Drained on its own right as the timer fired
            return WaitOutcome::Drained;
        }

        warn!(
            coordinator = %self.inner.name,
            abandoned,
            timeout_ms = millis(duration),
            "shutdown wait timed out, forcing completion"
        );
        WaitOutcome::Forced { abandoned }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.inner.name)
            .field("count", &self.count())
            .finish()
    }
}

#[async_trait]
impl ShutdownTracker for Coordinator {
    fn subscribe_n(&self, n: usize) {
        Coordinator::subscribe_n(self, n)
    }

    fn unsubscribe_n(&self, n: usize) -> usize {
        Coordinator::unsubscribe_n(self, n)
    }

    fn count(&self) -> usize {
        Coordinator::count(self)
    }

    fn unsubscribe_fn_boxed(&self, clean_fn: Box<dyn FnOnce() + '_>) -> bool {
        Coordinator::unsubscribe_fn(self, clean_fn).is_some()
    }

    async fn unsubscribe_fn_with_timeout_boxed(
        &self,
        clean_fn: Box<dyn FnOnce() + Send + 'static>,
        duration: Duration,
    ) -> CleanupOutcome {
        Coordinator::unsubscribe_fn_with_timeout(self, clean_fn, duration).await
    }

    async fn wait(&self) {
        Coordinator::wait(self).await
    }

    async fn wait_with_timeout(&self, duration: Duration) -> WaitOutcome {
        Coordinator::wait_with_timeout(self, duration).await
    }
}
