//! Ordered fan-out of snapshots to stateful consumers.
//!
//! Consumers run synchronously, in registration order, once per dispatch cycle. Each call is
//! isolated: a consumer that returns an error or panics is logged and skipped for that cycle
//! while the rest still run.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, trace};

use crate::metrics::ClassPalette;
use crate::types::Snapshot;

/// Identifies one registration. Handles are never reused within a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a consumer may read during one dispatch cycle.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub snapshot: &'a Snapshot,
    pub palette: &'a ClassPalette,
}

/// A stateful update callback.
pub trait Consumer: Send {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Process one snapshot.
    fn update(&mut self, cx: &UpdateContext<'_>) -> anyhow::Result<()>;
}

/// Summary of one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Hands out handles for one dispatcher. Clones share the same counter, so a handle can be
/// allocated away from the task that owns the dispatcher.
#[derive(Debug, Clone)]
pub struct HandleAllocator {
    next: Arc<AtomicU64>,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self { next: Arc::new(AtomicU64::new(1)) }
    }
}

impl HandleAllocator {
    pub fn allocate(&self) -> SubscriptionHandle {
        SubscriptionHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Registration-ordered list of consumers.
#[derive(Default)]
pub struct Dispatcher {
    consumers: Vec<(SubscriptionHandle, Box<dyn Consumer>)>,
    handles: HandleAllocator,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator shared with this dispatcher, for handles handed out before registration.
    pub fn handles(&self) -> HandleAllocator {
        self.handles.clone()
    }

    /// Register a consumer at the end of the queue.
    pub fn register(&mut self, consumer: Box<dyn Consumer>) -> SubscriptionHandle {
        let handle = self.handles.allocate();
        self.register_with(handle, consumer);
        handle
    }

    /// Register under a handle allocated up front.
    pub fn register_with(&mut self, handle: SubscriptionHandle, consumer: Box<dyn Consumer>) {
        trace!(%handle, consumer = consumer.name(), "registered");
        self.consumers.push((handle, consumer));
    }

    /// Remove a consumer. Unknown or already removed handles are ignored.
    pub fn unregister(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|(h, _)| *h != handle);
        let removed = self.consumers.len() != before;
        if removed {
            trace!(%handle, "unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Invoke every consumer once, in registration order.
    pub fn dispatch(&mut self, cx: &UpdateContext<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (handle, consumer) in self.consumers.iter_mut() {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| consumer.update(cx))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(%handle, consumer = consumer.name(), error = %e, "consumer failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%handle, consumer = consumer.name(), panic = %message, "consumer panicked");
                }
            }
        }

        report
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.consumers.iter().map(|(h, c)| (h, c.name()))).finish()
    }
}

/// Adapts a closure into a [`Consumer`].
pub struct FnConsumer<F> {
    name: String,
    f: F,
}

impl<F> FnConsumer<F>
where
    F: FnMut(&UpdateContext<'_>) -> anyhow::Result<()> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Consumer for FnConsumer<F>
where
    F: FnMut(&UpdateContext<'_>) -> anyhow::Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> anyhow::Result<()> {
        (self.f)(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn snapshot() -> Snapshot {
        Snapshot::from_json(r#"{"DriverData":[]}"#).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Box<dyn Consumer> {
        let log = Arc::clone(log);
        Box::new(FnConsumer::new(tag, move |_| {
            log.lock().unwrap().push(tag);
            Ok(())
        }))
    }

    #[test]
    fn consumers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(recorder(&log, "a"));
        dispatcher.register(recorder(&log, "b"));
        dispatcher.register(recorder(&log, "c"));

        let snapshot = snapshot();
        let palette = ClassPalette::default();
        let report = dispatcher.dispatch(&UpdateContext { snapshot: &snapshot, palette: &palette });

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(report, DispatchReport { invoked: 3, failed: 0 });
    }

    #[test]
    fn unregister_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let a = dispatcher.register(recorder(&log, "a"));
        dispatcher.register(recorder(&log, "b"));

        assert!(dispatcher.unregister(a));
        assert!(!dispatcher.unregister(a));
        assert!(!dispatcher.unregister(dispatcher.handles().allocate()));
        assert_eq!(dispatcher.len(), 1);

        let snapshot = snapshot();
        let palette = ClassPalette::default();
        dispatcher.dispatch(&UpdateContext { snapshot: &snapshot, palette: &palette });
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn failing_consumers_do_not_starve_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(FnConsumer::new("err", |_| anyhow::bail!("boom"))));
        dispatcher.register(Box::new(FnConsumer::new("panic", |_| panic!("kaboom"))));
        dispatcher.register(recorder(&log, "last"));

        let snapshot = snapshot();
        let palette = ClassPalette::default();
        let report = dispatcher.dispatch(&UpdateContext { snapshot: &snapshot, palette: &palette });

        assert_eq!(report, DispatchReport { invoked: 3, failed: 2 });
        assert_eq!(*log.lock().unwrap(), vec!["last"]);
    }

    #[test]
    fn handles_are_unique_per_dispatcher() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let early = dispatcher.handles().allocate();
        let registered = dispatcher.register(recorder(&log, "a"));
        assert_ne!(early, registered);
        assert!(registered.id() > early.id());

        // A second dispatcher counts on its own
        let other = Dispatcher::new();
        assert_eq!(other.handles().allocate().id(), 1);
    }
}
