//! The dash context: everything one ingestion pipeline owns.
//!
//! Replaces process-wide state with one explicit object: the snapshot store, the
//! consumer list, the class palette and the persistence backend travel together and are
//! owned by whichever task drives ingestion.

use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::{
    Consumer, DispatchReport, Dispatcher, HandleAllocator, SubscriptionHandle, UpdateContext,
};
use crate::metrics::ClassPalette;
use crate::persistence::{KeyValueStore, MemoryStorage, STATE_JSON_KEY};
use crate::store::{Ingest, PauseState, SnapshotStore, VersionStatus};
use crate::types::{ProtocolVersion, Snapshot};
use crate::Result;

pub struct DashContext {
    store: SnapshotStore,
    dispatcher: Dispatcher,
    palette: ClassPalette,
    storage: Arc<dyn KeyValueStore>,
    expected_version: ProtocolVersion,
    last_version_status: VersionStatus,
}

impl DashContext {
    /// Create a context, restoring a persisted debug override from `storage`.
    pub fn new(storage: Arc<dyn KeyValueStore>, expected_version: ProtocolVersion) -> Self {
        let mut store = SnapshotStore::new();

        match storage.get(STATE_JSON_KEY) {
            Ok(Some(text)) => {
                if !store.restore_override(&text) {
                    // Invalid content is dropped so the next start is clean
                    if let Err(e) = storage.remove(STATE_JSON_KEY) {
                        warn!(error = %e, "could not remove invalid persisted override");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not read persisted override"),
        }

        Self {
            store,
            dispatcher: Dispatcher::new(),
            palette: ClassPalette::new(),
            storage,
            expected_version,
            last_version_status: VersionStatus::Unknown,
        }
    }

    /// Context with in-memory storage and the compiled-in protocol version.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), ProtocolVersion::default())
    }

    pub fn register(&mut self, consumer: Box<dyn Consumer>) -> SubscriptionHandle {
        self.dispatcher.register(consumer)
    }

    /// Allocator for handles registered later through [`register_with`](Self::register_with).
    pub fn handles(&self) -> HandleAllocator {
        self.dispatcher.handles()
    }

    pub fn register_with(&mut self, handle: SubscriptionHandle, consumer: Box<dyn Consumer>) {
        self.dispatcher.register_with(handle, consumer);
    }

    pub fn unregister(&mut self, handle: SubscriptionHandle) -> bool {
        self.dispatcher.unregister(handle)
    }

    /// Process one inbound payload and run a dispatch cycle.
    ///
    /// Returns `None` when the payload was dropped.
    pub fn handle_message(&mut self, payload: &str) -> Option<DispatchReport> {
        let outcome = self.store.ingest(payload);
        if let Ingest::Live(_) = outcome {
            self.check_version();
        }

        let snapshot = outcome.snapshot()?;
        self.palette.observe_snapshot(snapshot);
        let cx = UpdateContext { snapshot, palette: &self.palette };
        Some(self.dispatcher.dispatch(&cx))
    }

    fn check_version(&mut self) {
        let status = self.store.version_status(self.expected_version);
        if status == self.last_version_status {
            return;
        }

        match status.check() {
            Err(e) => warn!(error = %e, "incompatible bridge"),
            Ok(()) if status == VersionStatus::Compatible => {
                info!(version = %self.expected_version, "protocol compatible");
            }
            Ok(()) => {}
        }
        self.last_version_status = status;
    }

    /// Install a debug override from JSON text and persist it.
    pub fn install_override(&mut self, text: &str) -> Result<()> {
        self.store.install_override(text)?;
        self.persist_override();
        Ok(())
    }

    /// Drop the override and its persisted copy.
    pub fn clear_override(&mut self) -> Result<bool> {
        let cleared = self.store.clear_override();
        self.storage.remove(STATE_JSON_KEY)?;
        Ok(cleared)
    }

    /// Freeze on the current snapshot or resume live updates.
    pub fn toggle_pause(&mut self) -> Result<PauseState> {
        let state = self.store.toggle_pause()?;
        match state {
            PauseState::Paused => self.persist_override(),
            PauseState::Resumed => self.storage.remove(STATE_JSON_KEY)?,
        }
        Ok(state)
    }

    fn persist_override(&self) {
        let Some(envelope) = self.store.persisted_override() else {
            return;
        };
        if let Err(e) = self.storage.set(STATE_JSON_KEY, &envelope) {
            warn!(error = %e, "could not persist debug override");
        }
    }

    /// Current snapshot as JSON text, `{}` before the first snapshot.
    pub fn dump_state(&self) -> String {
        self.store.dump_json()
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn palette(&self) -> &ClassPalette {
        &self.palette
    }

    pub fn consumer_count(&self) -> usize {
        self.dispatcher.len()
    }

    pub fn version_status(&self) -> VersionStatus {
        self.store.version_status(self.expected_version)
    }
}

impl std::fmt::Debug for DashContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashContext")
            .field("store", &self.store)
            .field("dispatcher", &self.dispatcher)
            .field("palette", &self.palette)
            .field("expected_version", &self.expected_version)
            .finish_non_exhaustive()
    }
}
