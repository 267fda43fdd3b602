//! 1h market regime classification.

use serde::{Deserialize, Serialize};

use crate::domain::analysis::Regime;
use crate::indicators::IndicatorFrame;

/// Point-in-time regime reading with supporting data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: Regime,
    /// Confidence in the classification (0–100)
    pub confidence: f64,
    pub adx: f64,
    /// ATR(14) as a fraction of price
    pub atr_pct: f64,
    pub reason: String,
}

/// Classifies the 1h frame into trending / choppy / volatile / unknown.
///
/// Checks run in priority order: volatility first (it overrides everything),
/// then the choppy dead zone, then trend strength with monotone EMA
/// ordering. ADX 20–25 with nothing else conclusive stays unknown.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    /// ATR/price above this is volatile
    atr_volatile_ratio: f64,
    /// ADX at or above this is trending
    adx_trend_threshold: f64,
    /// ADX below this is choppy (given price hugs the mean)
    adx_choppy_threshold: f64,
    /// |close − EMA20|/close below this counts as hugging the mean
    choppy_ema_band: f64,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            atr_volatile_ratio: 0.015,
            adx_trend_threshold: 25.0,
            adx_choppy_threshold: 20.0,
            choppy_ema_band: 0.003,
        }
    }
}

impl RegimeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volatile_ratio(mut self, ratio: f64) -> Self {
        self.atr_volatile_ratio = ratio;
        self
    }

    pub fn detect(&self, frame_1h: &IndicatorFrame) -> RegimeReading {
        let i = frame_1h.last_index();
        debug_assert!(!frame_1h.is_warmup(i));

        let close = frame_1h.close[i];
        let adx = frame_1h.adx_14[i];
        let atr_pct = if close > 0.0 {
            frame_1h.atr_14[i] / close
        } else {
            f64::NAN
        };

        if atr_pct.is_finite() && atr_pct > self.atr_volatile_ratio {
            return RegimeReading {
                regime: Regime::Volatile,
                confidence: 80.0,
                adx,
                atr_pct,
                reason: format!(
                    "high volatility (ATR {:.2}% > {:.2}%)",
                    atr_pct * 100.0,
                    self.atr_volatile_ratio * 100.0
                ),
            };
        }

        let ema_20 = frame_1h.ema_20[i];
        let mean_distance = if close > 0.0 {
            ((close - ema_20) / close).abs()
        } else {
            f64::NAN
        };
        if adx < self.adx_choppy_threshold
            && mean_distance.is_finite()
            && mean_distance < self.choppy_ema_band
        {
            return RegimeReading {
                regime: Regime::Choppy,
                confidence: 70.0,
                adx,
                atr_pct,
                reason: format!(
                    "range-bound (ADX {adx:.1} < {:.0}, price {:.2}% off EMA20)",
                    self.adx_choppy_threshold,
                    mean_distance * 100.0
                ),
            };
        }

        if adx >= self.adx_trend_threshold {
            let (e12, e26, e50) = (frame_1h.ema_12[i], frame_1h.ema_26[i], frame_1h.ema_50[i]);
            let stacked_up = e12 > e26 && e26 > e50;
            let stacked_down = e12 < e26 && e26 < e50;
            if stacked_up || stacked_down {
                return RegimeReading {
                    regime: Regime::Trending,
                    confidence: 75.0,
                    adx,
                    atr_pct,
                    reason: format!(
                        "{} trend (ADX {adx:.1} >= {:.0}, EMAs stacked)",
                        if stacked_up { "up" } else { "down" },
                        self.adx_trend_threshold
                    ),
                };
            }
            return RegimeReading {
                regime: Regime::Unknown,
                confidence: 50.0,
                adx,
                atr_pct,
                reason: format!("strong ADX {adx:.1} but EMAs not stacked"),
            };
        }

        RegimeReading {
            regime: Regime::Unknown,
            confidence: 40.0,
            adx,
            atr_pct,
            reason: format!("inconclusive (ADX {adx:.1})"),
        }
    }
}
