//! Weighted-vote decision core.
//!
//! Fuses the quant analysis, the predictor, the regime label and the range
//! position into a discrete action. Missing signals drop out and the
//! remaining weights renormalize to 1; the regime/position gates and the
//! adversarial netflow audit run after the vote and can only make the
//! outcome more conservative.

use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::analysis::{
    AlignmentTier, PredictResult, PriceLocation, QuantAnalysis, Regime, SignalVote, TradeAction,
    VoteResult,
};

use super::position::PositionAnalysis;
use super::regime::RegimeReading;

/// Vote weights per signal; they sum to 1 when every signal is present.
#[derive(Debug, Clone, Copy)]
pub struct DecisionWeights {
    pub trend_5m: f64,
    pub trend_15m: f64,
    pub trend_1h: f64,
    pub osc_5m: f64,
    pub osc_15m: f64,
    pub osc_1h: f64,
    pub prophet: f64,
    pub sentiment: f64,
}

impl Default for DecisionWeights {
    fn default() -> Self {
        Self {
            trend_5m: 0.10,
            trend_15m: 0.15,
            trend_1h: 0.20,
            osc_5m: 0.05,
            osc_15m: 0.07,
            osc_1h: 0.08,
            prophet: 0.15,
            sentiment: 0.20,
        }
    }
}

/// Everything the decision core consumes for one cycle
pub struct VoteInput<'a> {
    pub quant: &'a QuantAnalysis,
    /// None when even the rule fallback could not run
    pub prediction: Option<&'a PredictResult>,
    pub regime: &'a RegimeReading,
    pub position: &'a PositionAnalysis,
    pub netflow_1h: Option<f64>,
}

/// Netflow magnitude that triggers the adversarial confidence decay (USD)
const NETFLOW_VETO_USD: f64 = 1_000_000.0;
/// Non-hold decisions must keep at least this much confidence after decay
const CONFIDENCE_FLOOR: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct DecisionCoreAgent {
    weights: DecisionWeights,
}

impl Default for DecisionCoreAgent {
    fn default() -> Self {
        Self::new(DecisionWeights::default())
    }
}

impl DecisionCoreAgent {
    pub fn new(weights: DecisionWeights) -> Self {
        Self { weights }
    }

    pub fn decide(&self, input: &VoteInput<'_>) -> VoteResult {
        let (weighted_score, vote_details) = self.weighted_vote(input);
        let alignment = alignment_tier(&input.quant.trend.into_signs());
        let fully = alignment == AlignmentTier::Fully;

        let (mut action, mut confidence, mut reason) = map_action(weighted_score, fully);

        // Gates are always evaluated in order; the first hit supplies the
        // reason and later hits only log.
        let mut gate_hits: Vec<String> = Vec::new();
        if input.regime.regime == Regime::Choppy && input.position.location == PriceLocation::Middle
        {
            gate_hits.push(format!(
                "CHOPPY-MIDDLE: {} at {:.0}% of range",
                input.regime.reason, input.position.pct
            ));
        }
        if action == TradeAction::Long && !input.position.allow_long {
            gate_hits.push(format!(
                "position gate: price at {:.0}% of range blocks longs",
                input.position.pct
            ));
        }
        if action == TradeAction::Short && !input.position.allow_short {
            gate_hits.push(format!(
                "position gate: price at {:.0}% of range blocks shorts",
                input.position.pct
            ));
        }
        if let Some(first) = gate_hits.first() {
            for later in gate_hits.iter().skip(1) {
                debug!(gate = %later, "secondary gate also fired");
            }
            action = TradeAction::Hold;
            confidence = hold_confidence(weighted_score);
            reason = first.clone();
        }

        // Adversarial audit: institutional flow against the trade halves
        // confidence; it never flips the direction.
        if let Some(netflow) = input.netflow_1h {
            let opposed = match action {
                TradeAction::Long => netflow < -NETFLOW_VETO_USD,
                TradeAction::Short => netflow > NETFLOW_VETO_USD,
                TradeAction::Hold => false,
            };
            if opposed {
                confidence *= 0.5;
                let side = if action == TradeAction::Long { "long" } else { "short" };
                let flow = if netflow < 0.0 { "outflow" } else { "inflow" };
                reason = format!("{reason}; technical {side} vs institutional {flow}");
                (action, confidence, reason) =
                    enforce_confidence_floor(action, confidence, weighted_score, reason);
            }
        }

        VoteResult {
            action,
            confidence,
            weighted_score,
            vote_details,
            multi_period_aligned: fully,
            alignment,
            regime: input.regime.regime,
            position_pct: input.position.pct,
            reason,
        }
    }

    /// Weighted sum over present signals with deterministic renormalization:
    /// absent signals lose their weight and the rest rescale to sum to 1.
    fn weighted_vote(&self, input: &VoteInput<'_>) -> (f64, BTreeMap<String, SignalVote>) {
        let w = &self.weights;
        let quant = input.quant;
        let prophet_score = input.prediction.map(|p| (p.p_up - 0.5) * 200.0);

        // Fixed signal order keeps renormalization deterministic
        let signals: [(&str, f64, Option<f64>); 8] = [
            ("trend_5m", w.trend_5m, Some(quant.trend.m5)),
            ("trend_15m", w.trend_15m, Some(quant.trend.m15)),
            ("trend_1h", w.trend_1h, Some(quant.trend.h1)),
            ("osc_5m", w.osc_5m, Some(quant.oscillator.m5)),
            ("osc_15m", w.osc_15m, Some(quant.oscillator.m15)),
            ("osc_1h", w.osc_1h, Some(quant.oscillator.h1)),
            ("prophet", w.prophet, prophet_score),
            ("sentiment", w.sentiment, quant.sentiment),
        ];

        let total_weight: f64 = signals
            .iter()
            .filter(|(_, _, score)| score.is_some())
            .map(|(_, weight, _)| weight)
            .sum();

        let mut details = BTreeMap::new();
        if total_weight <= 0.0 {
            return (0.0, details);
        }

        let mut weighted_score = 0.0;
        for (name, weight, score) in signals {
            let Some(score) = score else { continue };
            let score = score.clamp(-100.0, 100.0);
            let effective_weight = weight / total_weight;
            weighted_score += effective_weight * score;
            details.insert(
                name.to_string(),
                SignalVote {
                    score,
                    effective_weight,
                },
            );
        }

        (weighted_score.clamp(-100.0, 100.0), details)
    }
}

trait IntoSigns {
    fn into_signs(&self) -> (i8, i8, i8);
}

impl IntoSigns for crate::domain::analysis::TimeframeScores {
    fn into_signs(&self) -> (i8, i8, i8) {
        (sign(self.h1), sign(self.m15), sign(self.m5))
    }
}

fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

fn alignment_tier(signs: &(i8, i8, i8)) -> AlignmentTier {
    let (s1h, s15m, s5m) = *signs;
    if s1h != 0 && s1h == s15m && s15m == s5m {
        AlignmentTier::Fully
    } else if s1h != 0 && s1h == s15m {
        AlignmentTier::Partially
    } else {
        AlignmentTier::Divergent
    }
}

/// Score/alignment to action and base confidence.
///
/// Full cross-timeframe agreement with a meaningful score carries the
/// high-conviction confidence; otherwise confidence grows linearly from 60
/// at |score| 30 and caps at 75.
fn map_action(score: f64, fully_aligned: bool) -> (TradeAction, f64, String) {
    let magnitude = score.abs();
    let direction = if score > 0.0 {
        TradeAction::Long
    } else {
        TradeAction::Short
    };

    if magnitude > 30.0 {
        let confidence = if fully_aligned {
            85.0
        } else {
            (60.0 + (magnitude - 30.0) * 0.75).min(75.0)
        };
        let reason = format!(
            "weighted score {score:.1}, {}",
            if fully_aligned {
                "all timeframes aligned"
            } else {
                "partial alignment"
            }
        );
        (direction, confidence, reason)
    } else {
        (
            TradeAction::Hold,
            hold_confidence(score),
            format!("weighted score {score:.1} inside neutral band"),
        )
    }
}

/// Confidence of a hold: strongest near zero score, fading toward the band
/// edge.
fn hold_confidence(score: f64) -> f64 {
    50.0 + (30.0 - score.abs()).max(0.0)
}

/// Directional decisions whose confidence decayed under 30 downgrade to
/// hold. Applied after the adversarial audit and again after any advisor
/// modulation; it can only move a decision toward hold.
pub fn enforce_confidence_floor(
    action: TradeAction,
    confidence: f64,
    weighted_score: f64,
    reason: String,
) -> (TradeAction, f64, String) {
    if action != TradeAction::Hold && confidence < CONFIDENCE_FLOOR {
        (
            TradeAction::Hold,
            hold_confidence(weighted_score),
            format!("{reason} (confidence below floor)"),
        )
    } else {
        (action, confidence, reason)
    }
}
