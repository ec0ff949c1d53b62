//! Telemetry ingestion and derived racing metrics for RaceRoom dash overlays.
//!
//! racedash talks to the RaceRoom shared memory WebSocket bridge, keeps the latest decoded
//! snapshot and fans every update out to independent consumers. The bundled engines turn
//! snapshots into ready-to-render views: relative and absolute position bars, lap-delta
//! trend with estimated lap time, proximity warnings with stereo cues, fuel state and
//! rolling statistics of arbitrary telemetry fields.
//!
//! # Features
//!
//! - **Resilient transport**: reconnects on a fixed interval, forever, until closed
//! - **Sentinel safety**: `-1` "no data" values never leak into calculations
//! - **Isolated consumers**: a failing or panicking consumer never stops the others
//! - **Debug overrides**: freeze the pipeline on a pasted snapshot, persisted across restarts
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use racedash::{DashConfig, Racedash};
//! use racedash::metrics::{BarMode, PositionBarEngine};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> racedash::Result<()> {
//!     let client = Racedash::connect(&DashConfig::default()).await?;
//!     let (_handle, mut bar) = client.register_engine(PositionBarEngine::new(BarMode::Relative));
//!
//!     while bar.changed().await.is_ok() {
//!         for driver in &bar.borrow().drivers {
//!             println!("{} {}", driver.display_name, driver.gap_text.as_deref().unwrap_or(""));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod format;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Ingestion pipeline
pub mod client;
pub mod context;
pub mod dispatch;
pub mod store;
pub mod transport;

// Derived metrics
pub mod metrics;
pub mod tracker;

// Collaborator seams
pub mod audio;
pub mod config;
pub mod persistence;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use client::DashClient;
pub use config::DashConfig;
pub use context::DashContext;
pub use dispatch::{Consumer, DispatchReport, SubscriptionHandle, UpdateContext};
pub use store::{PauseState, SnapshotStore, VersionStatus};
pub use transport::{ChannelEvent, ReadyState, ReconnectingChannel};

use std::sync::Arc;

use persistence::{FileStorage, KeyValueStore, MemoryStorage};

/// Unified entry point for dash pipelines.
///
/// # Examples
///
/// ```rust,no_run
/// use racedash::Racedash;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> racedash::Result<()> {
///     let client = Racedash::open("dash.yaml").await?;
///     // Register engines on the client...
///     # drop(client);
///     Ok(())
/// }
/// ```
pub struct Racedash;

impl Racedash {
    /// Storage backend for `config`: files under `storage_dir` when set, memory otherwise.
    pub fn storage(config: &DashConfig) -> Result<Arc<dyn KeyValueStore>> {
        let storage: Arc<dyn KeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::open(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };
        Ok(storage)
    }

    /// Build the context described by `config`, restoring a persisted debug override.
    pub fn context(config: &DashConfig) -> Result<DashContext> {
        Ok(DashContext::new(Self::storage(config)?, config.expected_version))
    }

    /// Start polling the bridge described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created. Connection problems
    /// are not errors: the client keeps reconnecting until it is closed.
    pub async fn connect(config: &DashConfig) -> Result<DashClient> {
        let context = Self::context(config)?;
        Ok(DashClient::spawn(config, context))
    }

    /// Load a YAML configuration file and connect with it.
    pub async fn open<P: AsRef<std::path::Path>>(path: P) -> Result<DashClient> {
        let config = DashConfig::load(path)?;
        Self::connect(&config).await
    }
}
