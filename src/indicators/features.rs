//! One-row feature summary consumed by the predictor.

use serde::{Deserialize, Serialize};

use crate::error::{HelixError, Result};

use super::frame::IndicatorFrame;

/// Length of [`FeatureSnapshot::to_vec`]; model files must declare the same
/// input dimension or the predictor refuses to load.
pub const FEATURE_DIM: usize = 15;

/// Version of the feature ordering and semantics below. Bumped whenever a
/// feature is added, removed, or changes meaning; model files trained
/// against another version are rejected at load.
pub const FEATURE_SET_VERSION: u32 = 2;

/// Compact numeric summary of the most recent closed candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Fractional close-to-close change over the trailing n candles
    pub change_1: f64,
    pub change_3: f64,
    pub change_5: f64,
    pub change_10: f64,
    pub change_20: f64,
    /// +1 when EMA(12) is above EMA(26), else −1
    pub ema_trend: f64,
    /// +1/−1 when the EMA pair crossed within the last 3 bars, 0 otherwise
    pub ema_cross: f64,
    /// +1 when MACD is above its signal line, else −1
    pub macd_above: f64,
    /// +1/−1 when MACD crossed its signal within the last 3 bars, 0 otherwise
    pub macd_cross: f64,
    /// RSI bucket: −2 oversold (≤25), −1 (≤30), +1 (≥70), +2 overbought (≥75)
    pub rsi_bucket: f64,
    pub rsi: f64,
    /// ATR(14) as a fraction of price
    pub atr_ratio: f64,
    /// Volume-ratio z-score over the trailing 20 rows
    pub volume_z: f64,
    /// Fractional distance from close up to the prior 20-bar high
    pub dist_high_20: f64,
    /// Fractional distance from the prior 20-bar low up to close
    pub dist_low_20: f64,
}

impl FeatureSnapshot {
    /// Extract features from the final (non-warmup) row of a frame.
    pub fn extract(frame: &IndicatorFrame) -> Result<Self> {
        let i = frame.last_index();
        if frame.is_warmup(i) {
            return Err(HelixError::InsufficientData(
                "feature extraction reached a warmup row".to_string(),
            ));
        }
        let close = frame.close[i];
        if !(close.is_finite() && close > 0.0) {
            return Err(HelixError::Validation(format!(
                "non-positive close {close} at feature row"
            )));
        }

        let change = |lag: usize| -> f64 {
            if i < lag {
                return 0.0;
            }
            let past = frame.close[i - lag];
            if past > 0.0 {
                (close - past) / past
            } else {
                0.0
            }
        };

        let ema_trend = if frame.ema_12[i] >= frame.ema_26[i] { 1.0 } else { -1.0 };
        let ema_cross = recent_cross(&frame.ema_12, &frame.ema_26, i, 3);
        let macd_above = if frame.macd[i] >= frame.macd_signal[i] { 1.0 } else { -1.0 };
        let macd_cross = recent_cross(&frame.macd, &frame.macd_signal, i, 3);

        let rsi = frame.rsi_14[i];
        let rsi_bucket = if rsi >= 75.0 {
            2.0
        } else if rsi >= 70.0 {
            1.0
        } else if rsi <= 25.0 {
            -2.0
        } else if rsi <= 30.0 {
            -1.0
        } else {
            0.0
        };

        let atr_ratio = frame.atr_14[i] / close;

        // z-score of the current volume ratio against its trailing window
        let lo = i.saturating_sub(20);
        let window = &frame.volume_ratio[lo..i];
        let volume_z = if window.is_empty() {
            0.0
        } else {
            let mean = window.iter().sum::<f64>() / window.len() as f64;
            let var = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / window.len() as f64;
            let sd = var.sqrt();
            if sd > 0.0 {
                (frame.volume_ratio[i] - mean) / sd
            } else {
                0.0
            }
        };

        // Extremes over the prior 20 bars, excluding the current one
        let lo = i.saturating_sub(20);
        let prior_high = frame.high[lo..i].iter().copied().fold(f64::MIN, f64::max);
        let prior_low = frame.low[lo..i].iter().copied().fold(f64::MAX, f64::min);
        let dist_high_20 = (prior_high - close) / close;
        let dist_low_20 = (close - prior_low) / close;

        Ok(Self {
            change_1: change(1),
            change_3: change(3),
            change_5: change(5),
            change_10: change(10),
            change_20: change(20),
            ema_trend,
            ema_cross,
            macd_above,
            macd_cross,
            rsi_bucket,
            rsi,
            atr_ratio,
            volume_z,
            dist_high_20,
            dist_low_20,
        })
    }

    /// Fixed-order vector for model input; length is [`FEATURE_DIM`].
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.change_1,
            self.change_3,
            self.change_5,
            self.change_10,
            self.change_20,
            self.ema_trend,
            self.ema_cross,
            self.macd_above,
            self.macd_cross,
            self.rsi_bucket,
            self.rsi,
            self.atr_ratio,
            self.volume_z,
            self.dist_high_20,
            self.dist_low_20,
        ]
    }
}

/// Sign of a fast/slow crossover within the last `lookback` bars, 0 if none.
fn recent_cross(fast: &[f64], slow: &[f64], i: usize, lookback: usize) -> f64 {
    let start = i.saturating_sub(lookback);
    for j in (start + 1..=i).rev() {
        let above_now = fast[j] >= slow[j];
        let above_prev = fast[j - 1] >= slow[j - 1];
        if above_now != above_prev {
            return if above_now { 1.0 } else { -1.0 };
        }
    }
    0.0
}
