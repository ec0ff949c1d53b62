//! Derived racing metrics.
//!
//! Every widget of the dash boils down to an [`Engine`]: a small state machine fed one
//! snapshot per dispatch cycle that produces a plain view struct. Engines never touch I/O;
//! [`Published`] wraps an engine into a [`Consumer`] and hands each view to renderers over a
//! `tokio::sync::watch` channel.
//!
//! ## Engines
//!
//! - [`PositionBarEngine`]: relative or absolute driver ordering with gap texts
//! - [`ProgressEngine`]: lap-delta trend, estimated lap time and position, sector marks
//! - [`SpottingEngine`]: proximity radar and stereo beep cues
//! - [`FuelEngine`]: fuel usage and remaining laps
//! - [`GraphsEngine`](crate::tracker::GraphsEngine): rolling statistics of selected fields
//!
//! ## Example
//!
//! ```rust
//! use racedash::dispatch::{Consumer, UpdateContext};
//! use racedash::metrics::{ClassPalette, FuelEngine, Published};
//! use racedash::types::Snapshot;
//!
//! let (mut consumer, views) = Published::new(FuelEngine::new());
//! let snapshot = Snapshot::from_json(r#"{
//!     "FuelUseActive": 1, "FuelLeft": 30.0, "FuelCapacity": 60.0, "FuelPerLap": 3.0,
//!     "DriverData": []
//! }"#).unwrap();
//! let palette = ClassPalette::new();
//!
//! consumer.update(&UpdateContext { snapshot: &snapshot, palette: &palette }).unwrap();
//! assert_eq!(views.borrow().laps_remaining, Some(10.0));
//! ```

mod fuel;
pub mod gaps;
mod palette;
mod position_bar;
mod progress;
mod spotting;

pub use fuel::{FuelEngine, FuelView};
pub use palette::{ClassPalette, UNKNOWN_CLASS_COLOR};
pub use position_bar::{
    BarMode, DriverView, LapRelation, PositionBarEngine, PositionBarHeader, PositionBarView,
};
pub use progress::{ProgressEngine, ProgressView, SectorMark, Trend, TrendTracker};
pub use spotting::{RadarBlip, SideWarning, SpottingConfig, SpottingEngine, SpottingView};

use tokio::sync::watch;

use crate::dispatch::{Consumer, UpdateContext};

/// A stateful derived-metric calculation.
pub trait Engine: Send + 'static {
    /// Output handed to renderers after each cycle.
    type View: Clone + Default + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    /// Process one snapshot and produce the current view.
    fn update(&mut self, cx: &UpdateContext<'_>) -> Self::View;
}

/// Publishes an engine's views on a watch channel.
pub struct Published<E: Engine> {
    engine: E,
    tx: watch::Sender<E::View>,
}

impl<E: Engine> Published<E> {
    /// Wrap `engine`. The receiver starts with the default view.
    pub fn new(engine: E) -> (Self, watch::Receiver<E::View>) {
        let (tx, rx) = watch::channel(E::View::default());
        (Self { engine, tx }, rx)
    }

    /// Another receiver for the same views.
    pub fn subscribe(&self) -> watch::Receiver<E::View> {
        self.tx.subscribe()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: Engine> Consumer for Published<E> {
    fn name(&self) -> &str {
        self.engine.name()
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> anyhow::Result<()> {
        let view = self.engine.update(cx);
        // Views are published even with no receiver left; a renderer may subscribe later
        self.tx.send_replace(view);
        Ok(())
    }
}
