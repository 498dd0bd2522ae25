//! Display window/level and the 8-bit lookup it implies

use serde::{Deserialize, Serialize};

/// Display window (width) and level (centre) of a volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub width: f64,
    pub level: f64,
}

impl WindowLevel {
    pub fn new(width: f64, level: f64) -> Self {
        Self { width, level }
    }

    /// Map an intensity to the 0..=255 display range.
    ///
    /// Values at or below the window floor map to 0 and values above the
    /// ceiling map to 255; the window is linear in between.
    pub fn lut(&self, value: f64) -> f64 {
        let span = (self.width - 1.0).max(1.0);
        let centre = self.level - 0.5;
        let lo = centre - span / 2.0;
        let hi = centre + span / 2.0;
        if value <= lo {
            0.0
        } else if value > hi {
            255.0
        } else {
            (((value - centre) / span + 0.5) * 255.0).clamp(0.0, 255.0)
        }
    }
}
