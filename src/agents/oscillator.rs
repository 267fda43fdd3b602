//! RSI-based oscillation scoring.

use crate::domain::analysis::TimeframeScores;
use crate::domain::candle::Timeframe;
use crate::domain::snapshot::MarketSnapshot;

/// Scores overbought/oversold pressure per timeframe from RSI(14).
///
/// Deep extremes score ±80, the shoulder zones (70–75 / 25–30) ramp
/// linearly from ±40, anything in between is neutral. Positive scores
/// favor longs (oversold), negative favor shorts.
#[derive(Debug, Clone, Default)]
pub struct OscillatorSubAgent;

impl OscillatorSubAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, snapshot: &MarketSnapshot) -> TimeframeScores {
        TimeframeScores {
            m5: Self::score_rsi(last_rsi(snapshot, Timeframe::M5)),
            m15: Self::score_rsi(last_rsi(snapshot, Timeframe::M15)),
            h1: Self::score_rsi(last_rsi(snapshot, Timeframe::H1)),
        }
    }

    /// 30/30/40 blend across 5m/15m/1h, used by the quant composite
    pub fn weighted_total(scores: &TimeframeScores) -> f64 {
        (0.3 * scores.m5 + 0.3 * scores.m15 + 0.4 * scores.h1).clamp(-100.0, 100.0)
    }

    fn score_rsi(rsi: f64) -> f64 {
        if !rsi.is_finite() {
            return 0.0;
        }
        if rsi >= 75.0 {
            -80.0
        } else if rsi >= 70.0 {
            // −40 at 70 ramping to −80 at 75
            -40.0 - (rsi - 70.0) / 5.0 * 40.0
        } else if rsi <= 25.0 {
            80.0
        } else if rsi <= 30.0 {
            // +80 at 25 ramping to +40 at 30
            40.0 + (30.0 - rsi) / 5.0 * 40.0
        } else {
            0.0
        }
    }
}

fn last_rsi(snapshot: &MarketSnapshot, tf: Timeframe) -> f64 {
    let frame = &snapshot.view(tf).stable;
    frame.rsi_14[frame.last_index()]
}
