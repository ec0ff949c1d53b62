use super::Engine;
use crate::dispatch::UpdateContext;
use crate::types::Sentinel;

/// Fuel state of the player's car.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuelView {
    /// Fuel use is enabled for this session
    pub visible: bool,
    pub per_lap: Option<f64>,
    pub left: Option<f64>,
    pub capacity: Option<f64>,
    /// Tank level from 0.0 to 1.0
    pub level: Option<f64>,
    pub laps_remaining: Option<f64>,
    /// Less than two laps of fuel left
    pub low: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FuelEngine;

impl FuelEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for FuelEngine {
    type View = FuelView;

    fn name(&self) -> &'static str {
        "fuel"
    }

    fn update(&mut self, cx: &UpdateContext<'_>) -> FuelView {
        let shared = cx.snapshot.data();
        let per_lap = shared.fuel_per_lap.known().filter(|v| *v > 0.0);
        let left = shared.fuel_left.known();
        let capacity = shared.fuel_capacity.known().filter(|v| *v > 0.0);

        FuelView {
            visible: shared.fuel_use_active.known().is_some_and(|active| active != 0),
            per_lap,
            left,
            capacity,
            level: left.zip(capacity).map(|(left, capacity)| left / capacity),
            laps_remaining: left.zip(per_lap).map(|(left, per_lap)| left / per_lap),
            low: left.zip(per_lap).is_some_and(|(left, per_lap)| left < per_lap * 2.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ClassPalette;
    use crate::types::Snapshot;

    fn run(json: &str) -> FuelView {
        let snapshot = Snapshot::from_json(json).unwrap();
        let palette = ClassPalette::new();
        FuelEngine::new().update(&UpdateContext { snapshot: &snapshot, palette: &palette })
    }

    #[test]
    fn fuel_levels() {
        let view = run(
            r#"{"FuelUseActive":1,"FuelLeft":5.0,"FuelCapacity":100.0,"FuelPerLap":2.5,"DriverData":[]}"#,
        );
        assert!(view.visible);
        assert_eq!(view.level, Some(0.05));
        assert_eq!(view.laps_remaining, Some(2.0));
        assert!(!view.low);

        let view = run(
            r#"{"FuelUseActive":1,"FuelLeft":4.9,"FuelCapacity":100.0,"FuelPerLap":2.5,"DriverData":[]}"#,
        );
        assert!(view.low);
    }

    #[test]
    fn inactive_or_unknown_fuel_use_hides() {
        assert!(!run(r#"{"FuelUseActive":0,"FuelLeft":5.0,"DriverData":[]}"#).visible);

        let view = run(r#"{"DriverData":[]}"#);
        assert!(!view.visible);
        assert_eq!(view.laps_remaining, None);
        assert!(!view.low);
    }
}
