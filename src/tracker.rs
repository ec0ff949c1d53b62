//! Rolling statistics for arbitrary telemetry fields.
//!
//! Any numeric field of the snapshot can be tracked by its dotted path. Each tracked series
//! keeps a fixed window of recent samples for plotting plus running min, max and an
//! approximate average.
//!
//! Selecting an object path tracks every numeric leaf below it, so `TireTemp.FrontLeft`
//! expands into its individual temperatures. Paths that do not resolve yet (no snapshot, or
//! the field only appears later in a session) stay pending and are retried every update.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, LazyLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatch::UpdateContext;
use crate::metrics::Engine;
use crate::persistence::{GRAPH_KEYS_KEY, KeyValueStore};
use crate::types::Snapshot;

/// Default number of samples kept per series.
pub const DEFAULT_CAPACITY: usize = 300;

/// Paths never offered or tracked.
static IGNORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)DriverData|Unused|Id$|Name").expect("static pattern is valid")
});

/// Returns `true` for paths excluded from tracking.
pub fn is_ignored(path: &str) -> bool {
    IGNORE.is_match(path)
}

/// Fixed-capacity FIFO. Pushing into a full buffer evicts the oldest element.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// A buffer holding at most `capacity` elements (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append `item`, returning the evicted element if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity { self.items.pop_front() } else { None };
        self.items.push_back(item);
        evicted
    }

    /// Elements in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// `avg - avg / n + sample / n`
pub fn approx_rolling_average(avg: f64, sample: f64, n: f64) -> f64 {
    avg - avg / n + sample / n
}

/// Statistics of one tracked path.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedSeries {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Divisor used for the average; advances by two per sample
    pub total: u64,
    data: RingBuffer<f64>,
}

impl TrackedSeries {
    pub fn new(capacity: usize) -> Self {
        Self { min: f64::MAX, max: f64::MIN, avg: 0.0, total: 0, data: RingBuffer::new(capacity) }
    }

    /// Add one sample.
    pub fn record(&mut self, sample: f64) {
        self.data.push(sample);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);

        // NOTE: the divisor is bumped both before and after the average update, so the k-th
        // sample is weighted 1/(2k-1) instead of 1/k and the average drifts from the true
        // mean. Existing readouts rely on this.
        self.total += 1;
        self.avg = approx_rolling_average(self.avg, sample, self.total as f64);
        self.total += 1;
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied()
    }

    pub fn latest(&self) -> Option<f64> {
        self.data.latest().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One entry of [`RollingTracker::available_paths`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPath {
    pub path: String,
    pub name: String,
    pub depth: usize,
}

/// Tracks a user-selected set of snapshot paths.
#[derive(Debug, Clone)]
pub struct RollingTracker {
    capacity: usize,
    selected: Vec<String>,
    pending: Vec<String>,
    series: BTreeMap<String, TrackedSeries>,
}

impl Default for RollingTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RollingTracker {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, selected: Vec::new(), pending: Vec::new(), series: BTreeMap::new() }
    }

    /// Replace the selection and start tracking it from scratch.
    pub fn select(&mut self, paths: Vec<String>, snapshot: Option<&Snapshot>) {
        self.series.clear();
        self.pending.clear();
        self.selected = paths;
        for path in self.selected.clone() {
            self.track(&path, snapshot);
        }
    }

    /// Start tracking `path`, expanding objects into their numeric leaves.
    ///
    /// Returns the number of series created. Unresolvable paths are kept pending.
    pub fn track(&mut self, path: &str, snapshot: Option<&Snapshot>) -> usize {
        let value = snapshot.and_then(|s| s.lookup(path));
        match value {
            Some(value) => self.track_value(path, value),
            None => {
                if !self.pending.iter().any(|p| p == path) {
                    debug!(path, "graph path not resolvable yet");
                    self.pending.push(path.to_string());
                }
                0
            }
        }
    }

    fn track_value(&mut self, path: &str, value: &Value) -> usize {
        match value {
            Value::Object(map) => {
                map.iter().map(|(key, child)| self.track_value(&format!("{path}.{key}"), child)).sum()
            }
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, child)| self.track_value(&format!("{path}.{i}"), child))
                .sum(),
            Value::Number(_) => {
                if self.series.contains_key(path) || is_ignored(path) {
                    return 0;
                }
                self.series.insert(path.to_string(), TrackedSeries::new(self.capacity));
                1
            }
            _ => {
                debug!(path, "graph path is not numeric");
                0
            }
        }
    }

    /// Record one sample per tracked series from `snapshot`.
    pub fn update(&mut self, snapshot: &Snapshot) {
        if !self.pending.is_empty() {
            for path in std::mem::take(&mut self.pending) {
                self.track(&path, Some(snapshot));
            }
        }

        for (path, series) in self.series.iter_mut() {
            if let Some(sample) = snapshot.lookup(path).and_then(Value::as_f64) {
                series.record(sample);
            }
        }
    }

    /// Drop all series and re-track the current selection.
    pub fn reset(&mut self, snapshot: Option<&Snapshot>) {
        let selected = std::mem::take(&mut self.selected);
        self.select(selected, snapshot);
    }

    /// Drop all series and the selection.
    pub fn clear(&mut self) {
        self.series.clear();
        self.pending.clear();
        self.selected.clear();
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn series(&self) -> &BTreeMap<String, TrackedSeries> {
        &self.series
    }

    pub fn get(&self, path: &str) -> Option<&TrackedSeries> {
        self.series.get(path)
    }

    /// Numeric and object paths up to depth one, sorted, ignore pattern applied.
    pub fn available_paths(snapshot: &Snapshot) -> Vec<GraphPath> {
        fn walk(value: &Value, prefix: &str, depth: usize, out: &mut Vec<GraphPath>) {
            if depth > 1 {
                return;
            }
            let Value::Object(map) = value else {
                return;
            };
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                match child {
                    Value::Number(_) => {
                        out.push(GraphPath { path, name: key.clone(), depth });
                    }
                    Value::Object(_) => {
                        out.push(GraphPath { path: path.clone(), name: key.clone(), depth });
                        walk(child, &path, depth + 1, out);
                    }
                    _ => {}
                }
            }
        }

        let mut paths = Vec::new();
        walk(snapshot.raw(), "", 0, &mut paths);
        paths.retain(|p| !is_ignored(&p.path));
        paths.sort_by(|a, b| a.path.cmp(&b.path));
        paths
    }
}

/// Commands accepted by a [`GraphsEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCommand {
    /// Replace the selection and persist it
    Select(Vec<String>),
    /// Restart all series, keeping the selection
    Reset,
    /// Drop the selection and forget the persisted one
    Clear,
}

/// Handle for changing what a [`GraphsEngine`] tracks.
#[derive(Debug, Clone)]
pub struct GraphControl {
    tx: mpsc::UnboundedSender<GraphCommand>,
}

impl GraphControl {
    /// Returns `false` once the engine is gone.
    pub fn send(&self, command: GraphCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn select(&self, paths: Vec<String>) -> bool {
        self.send(GraphCommand::Select(paths))
    }

    pub fn reset(&self) -> bool {
        self.send(GraphCommand::Reset)
    }

    pub fn clear(&self) -> bool {
        self.send(GraphCommand::Clear)
    }
}

/// Published form of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesView {
    pub path: String,
    /// Last two path segments
    pub short_name: String,
    pub latest: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphsView {
    pub series: Vec<SeriesView>,
    pub selected: Vec<String>,
    pub pending: Vec<String>,
}

fn short_name(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();
    parts[parts.len().saturating_sub(2)..].join(".")
}

/// Engine wrapper around [`RollingTracker`] with persisted selection.
pub struct GraphsEngine {
    tracker: RollingTracker,
    commands: mpsc::UnboundedReceiver<GraphCommand>,
    storage: Option<Arc<dyn KeyValueStore>>,
}

impl GraphsEngine {
    pub fn new(capacity: usize) -> (Self, GraphControl) {
        let (tx, commands) = mpsc::unbounded_channel();
        let engine = Self { tracker: RollingTracker::new(capacity), commands, storage: None };
        (engine, GraphControl { tx })
    }

    /// Engine whose selection is persisted in `storage` and restored from it now.
    pub fn with_storage(capacity: usize, storage: Arc<dyn KeyValueStore>) -> (Self, GraphControl) {
        let (mut engine, control) = Self::new(capacity);

        match storage.get(GRAPH_KEYS_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<Vec<String>>(&text) {
                Ok(paths) => {
                    debug!(count = paths.len(), "restored graph selection");
                    engine.tracker.select(paths, None);
                }
                Err(e) => warn!(error = %e, "ignoring malformed graph selection"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not read graph selection"),
        }

        engine.storage = Some(storage);
        (engine, control)
    }

    pub fn tracker(&self) -> &RollingTracker {
        &self.tracker
    }

    fn apply(&mut self, command: GraphCommand, snapshot: &Snapshot) {
        match command {
            GraphCommand::Select(paths) => {
                if let Some(storage) = &self.storage {
                    let persisted = serde_json::to_string(&paths)
                        .map_err(crate::TelemetryError::from)
                        .and_then(|json| storage.set(GRAPH_KEYS_KEY, &json));
                    if let Err(e) = persisted {
                        warn!(error = %e, "could not persist graph selection");
                    }
                }
                self.tracker.select(paths, Some(snapshot));
            }
            GraphCommand::Reset => self.tracker.reset(Some(snapshot)),
            GraphCommand::Clear => {
                if let Some(Err(e)) = self.storage.as_ref().map(|s| s.remove(GRAPH_KEYS_KEY)) {
                    warn!(error = %e, "could not forget graph selection");
                }
                self.tracker.clear();
            }
        }
    }
}

impl Engine for GraphsEngine {
    type View = GraphsView;

    fn name(&self) -> &'static str {
        "graphs"
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> GraphsView {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command, cx.snapshot);
        }

        self.tracker.update(cx.snapshot);

        GraphsView {
            series: self
                .tracker
                .series()
                .iter()
                .map(|(path, series)| SeriesView {
                    path: path.clone(),
                    short_name: short_name(path),
                    latest: series.latest(),
                    min: series.min,
                    max: series.max,
                    avg: series.avg,
                    samples: series.samples().collect(),
                })
                .collect(),
            selected: self.tracker.selected().to_vec(),
            pending: self.tracker.pending().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ClassPalette;
    use crate::persistence::MemoryStorage;
    use proptest::prelude::*;
    use serde_json::json;

    fn snapshot(value: Value) -> Snapshot {
        Snapshot::from_value(value).unwrap()
    }

    #[test]
    fn ring_buffer_keeps_most_recent() {
        let mut buffer = RingBuffer::new(5);
        for i in 1..=8 {
            buffer.push(i);
        }
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![4, 5, 6, 7, 8]);
        assert_eq!(buffer.latest(), Some(&8));
    }

    #[test]
    fn rolling_average_formula() {
        assert_eq!(approx_rolling_average(10.0, 20.0, 2.0), 15.0);
        assert_eq!(approx_rolling_average(0.0, 7.0, 1.0), 7.0);
    }

    #[test]
    fn series_average_drifts_with_double_increment() {
        let mut series = TrackedSeries::new(10);
        series.record(10.0);
        assert_eq!(series.avg, 10.0);
        assert_eq!(series.total, 2);

        series.record(40.0);
        // n = 3: 10 - 10/3 + 40/3 = 20
        assert!((series.avg - 20.0).abs() < 1e-9);
        assert_eq!(series.total, 4);
        assert_eq!(series.min, 10.0);
        assert_eq!(series.max, 40.0);
    }

    #[test]
    fn reference_sequence_reproduces_drifted_average() {
        let mut series = TrackedSeries::new(10);
        for sample in [4.0, 8.0, 12.0] {
            series.record(sample);
        }

        // n = 1: 0 - 0 + 4 = 4
        // n = 3: 4 - 4/3 + 8/3 = 16/3
        // n = 5: 16/3 - 16/15 + 12/5 = 20/3
        assert!((series.avg - 20.0 / 3.0).abs() < 1e-9);
        assert!((series.avg - 8.0).abs() > 1.0, "must not be the true mean");
        assert_eq!(series.total, 6);
        assert_eq!(series.samples().collect::<Vec<_>>(), vec![4.0, 8.0, 12.0]);
    }

    #[test]
    fn objects_expand_to_numeric_leaves() {
        let snap = snapshot(json!({
            "TireTemp": { "FrontLeft": { "Center": 80.0, "Name": 1 }, "FrontRight": { "Center": 82.0 } },
            "TrackName": "Spa",
            "DriverData": []
        }));

        let mut tracker = RollingTracker::new(300);
        assert_eq!(tracker.track("TireTemp", Some(&snap)), 2);
        assert!(tracker.get("TireTemp.FrontLeft.Center").is_some());
        assert!(tracker.get("TireTemp.FrontLeft.Name").is_none());
        assert_eq!(tracker.track("TrackName", Some(&snap)), 0);
    }

    #[test]
    fn pending_paths_resolve_later() {
        let mut tracker = RollingTracker::new(300);
        tracker.select(vec!["EngineRps".to_string()], None);
        assert_eq!(tracker.pending(), &["EngineRps".to_string()]);

        tracker.update(&snapshot(json!({ "DriverData": [] })));
        assert!(tracker.series().is_empty());

        tracker.update(&snapshot(json!({ "EngineRps": 600.0, "DriverData": [] })));
        assert!(tracker.pending().is_empty());
        assert_eq!(tracker.get("EngineRps").unwrap().latest(), Some(600.0));
    }

    #[test]
    fn available_paths_are_shallow_sorted_and_filtered() {
        let snap = snapshot(json!({
            "Gear": 3,
            "CarCgLocation": { "X": 1.0, "Y": 2.0 },
            "TireTemp": { "FrontLeft": { "Center": 80.0 } },
            "VehicleInfo": { "SlotId": 1, "Name": "x" },
            "PlayerName": "abc",
            "DriverData": [{}]
        }));

        let paths: Vec<String> =
            RollingTracker::available_paths(&snap).into_iter().map(|p| p.path).collect();
        assert_eq!(
            paths,
            vec![
                "CarCgLocation",
                "CarCgLocation.X",
                "CarCgLocation.Y",
                "Gear",
                "TireTemp",
                "TireTemp.FrontLeft",
                "VehicleInfo",
            ]
        );
    }

    #[test]
    fn reset_restarts_series_and_clear_drops_selection() {
        let snap = snapshot(json!({ "Gear": 3, "DriverData": [] }));
        let mut tracker = RollingTracker::new(300);
        tracker.select(vec!["Gear".to_string()], Some(&snap));
        tracker.update(&snap);
        tracker.update(&snap);
        assert_eq!(tracker.get("Gear").unwrap().len(), 2);

        tracker.reset(Some(&snap));
        assert_eq!(tracker.get("Gear").unwrap().len(), 0);
        assert_eq!(tracker.selected(), &["Gear".to_string()]);

        tracker.clear();
        assert!(tracker.series().is_empty());
        assert!(tracker.selected().is_empty());
    }

    #[test]
    fn engine_persists_and_restores_selection() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStorage::new());
        let snap = snapshot(json!({ "Gear": 3, "Throttle": 0.5, "DriverData": [] }));
        let palette = ClassPalette::new();
        let cx = UpdateContext { snapshot: &snap, palette: &palette };

        let (mut engine, control) = GraphsEngine::with_storage(10, Arc::clone(&storage));
        assert!(control.select(vec!["Gear".to_string()]));
        let view = engine.update(&cx);
        assert_eq!(view.series.len(), 1);
        assert_eq!(view.series[0].samples, vec![3.0]);
        assert_eq!(storage.get(GRAPH_KEYS_KEY).unwrap().as_deref(), Some(r#"["Gear"]"#));

        let (mut restored, _control) = GraphsEngine::with_storage(10, Arc::clone(&storage));
        assert_eq!(restored.tracker().pending(), &["Gear".to_string()]);
        let view = restored.update(&cx);
        assert_eq!(view.series[0].path, "Gear");

        control.clear();
        engine.update(&cx);
        assert_eq!(storage.get(GRAPH_KEYS_KEY).unwrap(), None);
    }

    #[test]
    fn short_names_keep_last_two_segments() {
        assert_eq!(short_name("TireTemp.FrontLeft.CurrentTemp.Center"), "CurrentTemp.Center");
        assert_eq!(short_name("Gear"), "Gear");
    }

    proptest! {
        #[test]
        fn ring_buffer_retains_last_capacity_items(
            capacity in 1usize..20,
            items in prop::collection::vec(any::<i32>(), 0..100),
        ) {
            let mut buffer = RingBuffer::new(capacity);
            for item in &items {
                buffer.push(*item);
            }
            let start = items.len().saturating_sub(capacity);
            prop_assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), items[start..].to_vec());
        }

        #[test]
        fn rolling_average_matches_formula(avg in -1e3f64..1e3, sample in -1e3f64..1e3, n in 1u32..1000) {
            let n = n as f64;
            let expected = avg - avg / n + sample / n;
            prop_assert_eq!(approx_rolling_average(avg, sample, n), expected);
        }

        #[test]
        fn min_max_bound_every_sample(samples in prop::collection::vec(-1e6f64..1e6, 1..50)) {
            let mut series = TrackedSeries::new(300);
            for s in &samples {
                series.record(*s);
            }
            for s in &samples {
                prop_assert!(series.min <= *s && *s <= series.max);
            }
            prop_assert_eq!(series.total, samples.len() as u64 * 2);
        }
    }
}
