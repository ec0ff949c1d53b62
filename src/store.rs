//! Latest-snapshot store with a debug override.
//!
//! The store keeps exactly one current snapshot. Every accepted payload replaces it
//! wholesale. A debug override freezes the store on a chosen snapshot: live payloads are
//! still received (and still drive a dispatch cycle) but the frozen snapshot is what
//! consumers see.
//!
//! Overrides are persisted as a small versioned envelope so a restarted dash comes back
//! frozen on the same snapshot:
//!
//! ```json
//! {"format":1,"snapshot":{"DriverData":[]}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::types::{ProtocolVersion, Snapshot};
use crate::{Result, TelemetryError};

/// Envelope format written by [`SnapshotStore::persisted_override`].
pub const OVERRIDE_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct OverrideEnvelope {
    format: u32,
    snapshot: Value,
}

/// Outcome of feeding one payload to the store.
#[derive(Debug, Clone)]
pub enum Ingest {
    /// The payload decoded and is now current.
    Live(Arc<Snapshot>),
    /// An override is installed; the payload was ignored in favour of the frozen snapshot.
    Frozen(Arc<Snapshot>),
    /// The payload failed to decode; nothing changed.
    Dropped,
}

impl Ingest {
    /// Snapshot consumers should see for this tick, if any.
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Ingest::Live(snapshot) | Ingest::Frozen(snapshot) => Some(snapshot),
            Ingest::Dropped => None,
        }
    }
}

/// Result of [`SnapshotStore::toggle_pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Paused,
    Resumed,
}

/// Compatibility of the received protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// No snapshot received yet
    Unknown,
    Compatible,
    Mismatch { expected: ProtocolVersion, found: ProtocolVersion },
}

impl VersionStatus {
    /// `Err(TelemetryError::Version)` on a mismatch, `Ok` otherwise.
    pub fn check(self) -> Result<()> {
        match self {
            VersionStatus::Mismatch { expected, found } => Err(TelemetryError::Version {
                expected_major: expected.major,
                expected_minor: expected.minor,
                found_major: found.major,
                found_minor: found.minor,
            }),
            VersionStatus::Unknown | VersionStatus::Compatible => Ok(()),
        }
    }
}

/// Holds the current snapshot and the optional frozen override.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Option<Arc<Snapshot>>,
    frozen: Option<Arc<Snapshot>>,
    last_update: Option<Instant>,
    received: u64,
    dropped: u64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound payload.
    ///
    /// With an override installed the payload is not even decoded.
    pub fn ingest(&mut self, payload: &str) -> Ingest {
        self.received += 1;

        if let Some(frozen) = &self.frozen {
            trace!(received = self.received, "override active, ignoring live payload");
            self.current = Some(Arc::clone(frozen));
            return Ingest::Frozen(Arc::clone(frozen));
        }

        match Snapshot::from_json(payload) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.current = Some(Arc::clone(&snapshot));
                self.last_update = Some(Instant::now());
                trace!(received = self.received, drivers = snapshot.driver_data.len(), "snapshot");
                Ingest::Live(snapshot)
            }
            Err(e) => {
                self.dropped += 1;
                debug!(error = %e, dropped = self.dropped, "dropping undecodable payload");
                Ingest::Dropped
            }
        }
    }

    /// Freeze the store on a snapshot given as JSON text.
    ///
    /// Accepts the raw snapshot object produced by [`dump_json`](Self::dump_json) or the
    /// persisted envelope. Invalid input leaves the store untouched.
    pub fn install_override(&mut self, text: &str) -> Result<()> {
        let snapshot = parse_override(text)?;
        info!(drivers = snapshot.driver_data.len(), "debug override installed");
        self.frozen = Some(Arc::new(snapshot));
        Ok(())
    }

    /// Drop the override and resume live updates.
    pub fn clear_override(&mut self) -> bool {
        let cleared = self.frozen.take().is_some();
        if cleared {
            info!("debug override cleared");
        }
        cleared
    }

    /// Freeze on the current snapshot, or resume if already frozen.
    pub fn toggle_pause(&mut self) -> Result<PauseState> {
        if self.clear_override() {
            return Ok(PauseState::Resumed);
        }

        let current = self
            .current
            .as_ref()
            .ok_or_else(|| TelemetryError::debug_override("no snapshot received yet"))?;
        self.frozen = Some(Arc::clone(current));
        info!("updates paused");
        Ok(PauseState::Paused)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// The snapshot consumers saw last.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.clone()
    }

    /// The current snapshot as JSON text, `{}` before the first one arrives.
    pub fn dump_json(&self) -> String {
        match &self.current {
            Some(snapshot) => snapshot.to_json(),
            None => "{}".to_string(),
        }
    }

    /// Envelope to persist for the installed override, if any.
    pub fn persisted_override(&self) -> Option<String> {
        let frozen = self.frozen.as_ref()?;
        let envelope =
            OverrideEnvelope { format: OVERRIDE_FORMAT, snapshot: frozen.raw().clone() };
        serde_json::to_string(&envelope).ok()
    }

    /// Reinstall a persisted override. Invalid content falls back to no override.
    pub fn restore_override(&mut self, text: &str) -> bool {
        match parse_override(text) {
            Ok(snapshot) => {
                info!("restored debug override");
                self.frozen = Some(Arc::new(snapshot));
                true
            }
            Err(e) => {
                warn!(error = %e, "discarding persisted override");
                self.frozen = None;
                false
            }
        }
    }

    /// Time of the last live snapshot.
    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Returns `true` when no live snapshot arrived within `threshold`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        match self.last_update {
            Some(at) => at.elapsed() > threshold,
            None => true,
        }
    }

    /// Number of payloads received and dropped so far.
    pub fn counters(&self) -> (u64, u64) {
        (self.received, self.dropped)
    }

    /// Compare the current snapshot's protocol version with `expected`.
    pub fn version_status(&self, expected: ProtocolVersion) -> VersionStatus {
        let Some(current) = &self.current else {
            return VersionStatus::Unknown;
        };

        let found = current.version();
        if found.major == expected.major && found.minor >= expected.minor {
            VersionStatus::Compatible
        } else {
            VersionStatus::Mismatch { expected, found }
        }
    }
}

fn parse_override(text: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| TelemetryError::debug_override(format!("not JSON: {e}")))?;

    let object =
        value.as_object().ok_or_else(|| TelemetryError::debug_override("not a JSON object"))?;

    let raw = if object.contains_key("format") && !object.contains_key("DriverData") {
        let envelope: OverrideEnvelope = serde_json::from_value(value)
            .map_err(|e| TelemetryError::debug_override(format!("bad envelope: {e}")))?;
        if envelope.format != OVERRIDE_FORMAT {
            return Err(TelemetryError::debug_override(format!(
                "unsupported envelope format {}",
                envelope.format
            )));
        }
        envelope.snapshot
    } else {
        value
    };

    Snapshot::from_value(raw).map_err(|e| TelemetryError::debug_override(e.to_string()))
}
