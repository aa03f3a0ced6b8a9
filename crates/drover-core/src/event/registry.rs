//! Observer-list registry for workflow lifecycle events.
//!
//! Each `on_*` method registers a listener and returns a `Subscription`
//! whose `unsubscribe()` removes it. Emission is synchronous and follows
//! registration order. Every listener call is wrapped in `catch_unwind`:
//! a panicking listener is logged and dropped from the emission, never
//! propagated into the execution loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use drover_types::workflow::WorkflowResult;

// ---------------------------------------------------------------------------
// Listener storage
// ---------------------------------------------------------------------------

/// One ordered list of listeners sharing a call signature.
struct Listeners<F: ?Sized> {
    entries: Mutex<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> Listeners<F> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
        })
    }

    fn add(&self, id: u64, listener: Arc<F>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push((id, listener));
    }

    fn remove(&self, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// Registration-order snapshot; emission runs outside the lock so
    /// listeners may themselves subscribe/unsubscribe without deadlocking.
    fn snapshot(&self) -> Vec<Arc<F>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Handle returned by every `on_*` registration.
///
/// Calling `unsubscribe` removes the listener; dropping the handle without
/// calling it leaves the listener registered.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new<F: ?Sized + Send + Sync + 'static>(listeners: &Arc<Listeners<F>>, id: u64) -> Self {
        let weak: Weak<Listeners<F>> = Arc::downgrade(listeners);
        Self {
            cancel: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    listeners.remove(id);
                }
            })),
        }
    }

    /// Remove the listener this subscription registered.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listener signatures
// ---------------------------------------------------------------------------

type WorkflowStartFn = dyn Fn(&str, &str) + Send + Sync;
type WorkflowCompleteFn = dyn Fn(&str, &WorkflowResult) + Send + Sync;
type WorkflowFailedFn = dyn Fn(&str, &str) + Send + Sync;
type StepStartFn = dyn Fn(&str, &str) + Send + Sync;
type StepCompleteFn = dyn Fn(&str, &str) + Send + Sync;
type StepFailedFn = dyn Fn(&str, &str, &str) + Send + Sync;

/// Run a single listener with panic isolation.
fn guarded(event: &'static str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        tracing::error!(event, "event listener panicked; continuing");
    }
}

// ---------------------------------------------------------------------------
// WorkflowEvents
// ---------------------------------------------------------------------------

/// Registry of workflow lifecycle listeners.
pub struct WorkflowEvents {
    next_id: AtomicU64,
    workflow_start: Arc<Listeners<WorkflowStartFn>>,
    workflow_complete: Arc<Listeners<WorkflowCompleteFn>>,
    workflow_failed: Arc<Listeners<WorkflowFailedFn>>,
    step_start: Arc<Listeners<StepStartFn>>,
    step_complete: Arc<Listeners<StepCompleteFn>>,
    step_failed: Arc<Listeners<StepFailedFn>>,
}

impl WorkflowEvents {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            workflow_start: Listeners::new(),
            workflow_complete: Listeners::new(),
            workflow_failed: Listeners::new(),
            step_start: Listeners::new(),
            step_complete: Listeners::new(),
            step_failed: Listeners::new(),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Listener args: `(execution_id, workflow_id)`.
    pub fn on_workflow_start(
        &self,
        listener: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.workflow_start.add(id, Arc::new(listener));
        Subscription::new(&self.workflow_start, id)
    }

    /// Listener args: `(execution_id, result)`.
    pub fn on_workflow_complete(
        &self,
        listener: impl Fn(&str, &WorkflowResult) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.workflow_complete.add(id, Arc::new(listener));
        Subscription::new(&self.workflow_complete, id)
    }

    /// Listener args: `(execution_id, error)`.
    pub fn on_workflow_failed(
        &self,
        listener: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.workflow_failed.add(id, Arc::new(listener));
        Subscription::new(&self.workflow_failed, id)
    }

    /// Listener args: `(execution_id, step_id)`.
    pub fn on_step_start(
        &self,
        listener: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.step_start.add(id, Arc::new(listener));
        Subscription::new(&self.step_start, id)
    }

    /// Listener args: `(execution_id, step_id)`.
    pub fn on_step_complete(
        &self,
        listener: impl Fn(&str, &str) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.step_complete.add(id, Arc::new(listener));
        Subscription::new(&self.step_complete, id)
    }

    /// Listener args: `(execution_id, step_id, error)`.
    pub fn on_step_failed(
        &self,
        listener: impl Fn(&str, &str, &str) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id();
        self.step_failed.add(id, Arc::new(listener));
        Subscription::new(&self.step_failed, id)
    }

    // -----------------------------------------------------------------------
    // Emission (crate-internal)
    // -----------------------------------------------------------------------

    pub(crate) fn emit_workflow_start(&self, execution_id: &str, workflow_id: &str) {
        for listener in self.workflow_start.snapshot() {
            guarded("workflow_start", || listener(execution_id, workflow_id));
        }
    }

    pub(crate) fn emit_workflow_complete(&self, execution_id: &str, result: &WorkflowResult) {
        for listener in self.workflow_complete.snapshot() {
            guarded("workflow_complete", || listener(execution_id, result));
        }
    }

    pub(crate) fn emit_workflow_failed(&self, execution_id: &str, error: &str) {
        for listener in self.workflow_failed.snapshot() {
            guarded("workflow_failed", || listener(execution_id, error));
        }
    }

    pub(crate) fn emit_step_start(&self, execution_id: &str, step_id: &str) {
        for listener in self.step_start.snapshot() {
            guarded("step_start", || listener(execution_id, step_id));
        }
    }

    pub(crate) fn emit_step_complete(&self, execution_id: &str, step_id: &str) {
        for listener in self.step_complete.snapshot() {
            guarded("step_complete", || listener(execution_id, step_id));
        }
    }

    pub(crate) fn emit_step_failed(&self, execution_id: &str, step_id: &str, error: &str) {
        for listener in self.step_failed.snapshot() {
            guarded("step_failed", || listener(execution_id, step_id, error));
        }
    }
}

impl Default for WorkflowEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkflowEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEvents").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let events = WorkflowEvents::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log1 = Arc::clone(&log);
        let _s1 = events.on_step_start(move |_, step| {
            log1.lock().unwrap().push(format!("first:{step}"));
        });
        let log2 = Arc::clone(&log);
        let _s2 = events.on_step_start(move |_, step| {
            log2.lock().unwrap().push(format!("second:{step}"));
        });

        events.emit_step_start("exec-1", "build");

        let entries = log.lock().unwrap();
        assert_eq!(*entries, vec!["first:build", "second:build"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let events = WorkflowEvents::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let subscription = events.on_workflow_start(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.emit_workflow_start("exec-1", "wf");
        subscription.unsubscribe();
        events.emit_workflow_start("exec-1", "wf");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_subscription_keeps_listener() {
        let events = WorkflowEvents::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        drop(events.on_workflow_failed(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        events.emit_workflow_failed("exec-1", "boom");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let events = WorkflowEvents::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _panicky = events.on_step_failed(|_, _, _| panic!("listener bug"));
        let counter = Arc::clone(&count);
        let _healthy = events.on_step_failed(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Must not panic, and the healthy listener still runs.
        events.emit_step_failed("exec-1", "build", "compile error");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_only_removes_own_listener() {
        let events = WorkflowEvents::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let s1 = events.on_step_complete(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&count);
        let _s2 = events.on_step_complete(move |_, _| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        s1.unsubscribe();
        events.emit_step_complete("exec-1", "build");
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_emit_with_no_listeners_is_noop() {
        let events = WorkflowEvents::new();
        events.emit_workflow_start("exec-1", "wf");
        events.emit_step_complete("exec-1", "s");
    }
}
