//! Price position within the recent range.

use serde::{Deserialize, Serialize};

use crate::domain::analysis::PriceLocation;
use crate::indicators::IndicatorFrame;

/// 1h candles considered for the range (4 days)
const RANGE_WINDOW: usize = 96;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionAnalysis {
    /// Percentile of the last close within the window range, 0–100
    pub pct: f64,
    pub location: PriceLocation,
    /// Longs are allowed below the top of the range
    pub allow_long: bool,
    /// Shorts are allowed above the bottom of the range
    pub allow_short: bool,
}

/// Locates the current price inside the trailing 96-bar 1h range and derives
/// the direction gates consumed by the decision core.
#[derive(Debug, Clone, Default)]
pub struct PositionAnalyzer;

impl PositionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, frame_1h: &IndicatorFrame) -> PositionAnalysis {
        let i = frame_1h.last_index();
        let lo = i.saturating_sub(RANGE_WINDOW - 1);
        let window = &frame_1h.close[lo..=i];

        let min = window.iter().copied().fold(f64::MAX, f64::min);
        let max = window.iter().copied().fold(f64::MIN, f64::max);
        let close = frame_1h.close[i];

        let pct = if max > min {
            ((close - min) / (max - min) * 100.0).clamp(0.0, 100.0)
        } else {
            50.0
        };

        PositionAnalysis {
            pct,
            location: PriceLocation::from_pct(pct),
            allow_long: pct < 70.0,
            allow_short: pct > 30.0,
        }
    }
}
