// Scoped subscription handling
// Guarantees the matching unsubscribe runs exactly once, including during unwinding

use super::Coordinator;

/// One outstanding unit held for as long as this guard lives.
///
/// Created by [`Coordinator::enter`]. Dropping the guard (or calling
/// [`Subscription::done`]) unsubscribes the unit.
#[must_use = "dropping a Subscription immediately unsubscribes it"]
pub struct Subscription {
    coordinator: Coordinator,
    active: bool,
}

impl Subscription {
    pub(super) fn new(coordinator: Coordinator) -> Self {
        coordinator.subscribe();
        Self {
            coordinator,
            active: true,
        }
    }

    /// Mark the unit complete now instead of at drop
    pub fn done(mut self) {
        self.finish();
    }

    /// Coordinator this unit is registered with
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    fn finish(&mut self) {
        if std::mem::take(&mut self.active) {
            self.coordinator.unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("coordinator", &self.coordinator.name())
            .field("active", &self.active)
            .finish()
    }
}

/// Deferred `unsubscribe()` for the closure-wrapping operations
pub(super) struct DeferredRelease<'a> {
    coordinator: &'a Coordinator,
}

impl<'a> DeferredRelease<'a> {
    pub(super) fn new(coordinator: &'a Coordinator) -> Self {
        Self { coordinator }
    }
}

impl Drop for DeferredRelease<'_> {
    fn drop(&mut self) {
        self.coordinator.unsubscribe();
    }
}
