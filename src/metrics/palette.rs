use std::collections::BTreeMap;

use crate::types::{INVALID, Snapshot};

/// Upper bound of the hue range handed out to classes.
const MAX_HUE: f64 = 250.0;

/// Colour used for unknown classes.
pub const UNKNOWN_CLASS_COLOR: &str = "#000";

/// Stable colour per car class.
///
/// Hues are spread evenly over the known class performance indices in ascending order, so
/// every new class re-spreads the palette.
#[derive(Debug, Clone, Default)]
pub struct ClassPalette {
    colors: BTreeMap<i32, String>,
}

impl ClassPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every class present in the snapshot.
    pub fn observe_snapshot(&mut self, snapshot: &Snapshot) {
        for driver in &snapshot.driver_data {
            self.observe(driver.driver_info.class_performance_index);
        }
    }

    /// Record one class. Returns `true` when the class was new.
    pub fn observe(&mut self, performance_index: i32) -> bool {
        if performance_index == INVALID || self.colors.contains_key(&performance_index) {
            return false;
        }

        self.colors.insert(performance_index, String::new());
        let step = MAX_HUE / (self.colors.len() as f64 - 1.0).max(1.0);
        for (i, color) in self.colors.values_mut().enumerate() {
            *color = format!("hsl({}, 100%, 60%)", step * i as f64);
        }
        true
    }

    /// Colour for a class, `#000` for unknown or unobserved classes.
    pub fn color(&self, performance_index: i32) -> &str {
        self.colors.get(&performance_index).map(String::as_str).unwrap_or(UNKNOWN_CLASS_COLOR)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
