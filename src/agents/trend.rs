//! Per-timeframe trend scoring.

use crate::domain::analysis::TimeframeScores;
use crate::domain::candle::Timeframe;
use crate::domain::snapshot::{MarketSnapshot, TimeframeView};
use rust_decimal::prelude::ToPrimitive;

const CROSS_LOOKBACK: usize = 3;
const BREAKOUT_WINDOW: usize = 20;

const CROSS_POINTS: f64 = 40.0;
const MACD_POINTS: f64 = 30.0;
const BREAKOUT_POINTS: f64 = 30.0;
const LIVE_POINTS: f64 = 20.0;

/// Scores directional momentum per timeframe in [−100, +100].
///
/// Components: a recent EMA(12/26) crossover, a strictly expanding MACD
/// histogram, a close beyond the prior 20-bar extreme, and a live
/// correction from the in-progress candle. Indicators come from the stable
/// view only; the live candle contributes exactly the correction term.
#[derive(Debug, Clone, Default)]
pub struct TrendSubAgent;

impl TrendSubAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, snapshot: &MarketSnapshot) -> (TimeframeScores, Vec<String>) {
        let mut details = Vec::new();
        let scores = TimeframeScores {
            m5: self.score_view(snapshot.view(Timeframe::M5), Timeframe::M5, &mut details),
            m15: self.score_view(snapshot.view(Timeframe::M15), Timeframe::M15, &mut details),
            h1: self.score_view(snapshot.view(Timeframe::H1), Timeframe::H1, &mut details),
        };
        (scores, details)
    }

    fn score_view(&self, view: &TimeframeView, tf: Timeframe, details: &mut Vec<String>) -> f64 {
        let frame = &view.stable;
        let i = frame.last_index();
        debug_assert!(!frame.is_warmup(i));

        let mut score = 0.0;

        let cross = cross_sign(&frame.ema_12, &frame.ema_26, i, CROSS_LOOKBACK);
        if cross != 0 {
            score += CROSS_POINTS * cross as f64;
            details.push(format!(
                "{tf}: ema12/26 crossed {}",
                if cross > 0 { "up" } else { "down" }
            ));
        }

        let expansion = histogram_expansion(&frame.macd_hist, i);
        if expansion != 0 {
            score += MACD_POINTS * expansion as f64;
            details.push(format!(
                "{tf}: macd histogram expanding {}",
                if expansion > 0 { "bullish" } else { "bearish" }
            ));
        }

        let breakout = breakout_sign(frame, i);
        if breakout != 0 {
            score += BREAKOUT_POINTS * breakout as f64;
            details.push(format!(
                "{tf}: close broke prior {BREAKOUT_WINDOW}-bar {}",
                if breakout > 0 { "high" } else { "low" }
            ));
        }

        // Live correction: the only place the in-progress candle matters
        let live_close = view.live.close.to_f64().unwrap_or(f64::NAN);
        let stable_close = frame.last_close();
        if live_close.is_finite() {
            if live_close > stable_close {
                score += LIVE_POINTS;
            } else if live_close < stable_close {
                score -= LIVE_POINTS;
            }
        }

        score.clamp(-100.0, 100.0)
    }
}

/// Sign of a fast/slow crossover within the last `lookback` closed bars
fn cross_sign(fast: &[f64], slow: &[f64], i: usize, lookback: usize) -> i8 {
    let start = i.saturating_sub(lookback);
    for j in (start + 1..=i).rev() {
        let above_now = fast[j] >= slow[j];
        let above_prev = fast[j - 1] >= slow[j - 1];
        if above_now != above_prev {
            return if above_now { 1 } else { -1 };
        }
    }
    0
}

/// +1 when the MACD histogram is strictly rising over the last 3 bars and
/// positive, −1 when strictly falling and negative
fn histogram_expansion(hist: &[f64], i: usize) -> i8 {
    if i < 2 {
        return 0;
    }
    let (a, b, c) = (hist[i - 2], hist[i - 1], hist[i]);
    if c > b && b > a && c > 0.0 {
        1
    } else if c < b && b < a && c < 0.0 {
        -1
    } else {
        0
    }
}

/// +1 when the last close exceeds the prior 20-bar high, −1 below the low
fn breakout_sign(frame: &crate::indicators::IndicatorFrame, i: usize) -> i8 {
    if i < BREAKOUT_WINDOW {
        return 0;
    }
    let lo = i - BREAKOUT_WINDOW;
    let prior_high = frame.high[lo..i].iter().copied().fold(f64::MIN, f64::max);
    let prior_low = frame.low[lo..i].iter().copied().fold(f64::MAX, f64::min);
    let close = frame.close[i];
    if close > prior_high {
        1
    } else if close < prior_low {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_sign_picks_most_recent_cross() {
        let slow = [2.0; 5];
        // Crossed up then stayed up
        assert_eq!(cross_sign(&[1.0, 1.0, 3.0, 3.0, 3.0], &slow, 4, 3), 1);
        // Crossed down inside the lookback
        assert_eq!(cross_sign(&[3.0, 3.0, 3.0, 1.0, 1.0], &slow, 4, 3), -1);
        // Cross too old
        assert_eq!(cross_sign(&[1.0, 3.0, 3.0, 3.0, 3.0], &slow, 4, 3), 0);
    }

    #[test]
    fn histogram_expansion_requires_strict_monotonicity_and_sign() {
        assert_eq!(histogram_expansion(&[0.1, 0.2, 0.3], 2), 1);
        assert_eq!(histogram_expansion(&[-0.1, -0.2, -0.3], 2), -1);
        // Rising but still negative: not a bullish expansion
        assert_eq!(histogram_expansion(&[-0.3, -0.2, -0.1], 2), 0);
        assert_eq!(histogram_expansion(&[0.1, 0.1, 0.3], 2), 0);
    }
}
