//! Cycle-scoped analysis artifacts: quant scores, predictions, votes.
//!
//! All of these live for exactly one cycle and are owned by the
//! orchestrator; nothing mutates a prior cycle's values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Discrete trading decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Long,
    Short,
    Hold,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Long => write!(f, "long"),
            TradeAction::Short => write!(f, "short"),
            TradeAction::Hold => write!(f, "hold"),
        }
    }
}

/// Signed score per timeframe, each in [−100, +100]
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeframeScores {
    pub m5: f64,
    pub m15: f64,
    pub h1: f64,
}

impl TimeframeScores {
    pub fn avg(&self) -> f64 {
        (self.m5 + self.m15 + self.h1) / 3.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantLabel {
    Buy,
    Sell,
    Neutral,
}

/// Composite quantitative analysis from the trend/oscillator/sentiment
/// sub-agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantAnalysis {
    pub trend: TimeframeScores,
    pub oscillator: TimeframeScores,
    /// None when every sentiment input was missing this cycle
    pub sentiment: Option<f64>,
    /// 0.4·avg(trend) + 0.3·avg(oscillator) + 0.3·sentiment
    pub composite: f64,
    pub label: QuantLabel,
    pub details: Vec<String>,
}

impl QuantAnalysis {
    pub fn composite_of(trend: &TimeframeScores, osc: &TimeframeScores, sentiment: Option<f64>) -> f64 {
        0.4 * trend.avg() + 0.3 * osc.avg() + 0.3 * sentiment.unwrap_or(0.0)
    }

    pub fn label_of(composite: f64) -> QuantLabel {
        if composite > 30.0 {
            QuantLabel::Buy
        } else if composite < -30.0 {
            QuantLabel::Sell
        } else {
            QuantLabel::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictLabel {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorSource {
    Model,
    RuleFallback,
}

/// Output of the probabilistic predictor (or its rule fallback)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResult {
    /// Probability the next move is up, in [0, 1]
    pub p_up: f64,
    pub label: PredictLabel,
    /// Confidence in [0, 100]; capped at 50 for the rule fallback
    pub confidence: f64,
    pub source: PredictorSource,
}

impl PredictResult {
    pub fn label_for(p_up: f64) -> PredictLabel {
        if p_up > 0.55 {
            PredictLabel::Bullish
        } else if p_up < 0.45 {
            PredictLabel::Bearish
        } else {
            PredictLabel::Neutral
        }
    }
}

/// Coarse 1h market regime label used to gate action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trending,
    Choppy,
    Volatile,
    Unknown,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regime::Trending => write!(f, "trending"),
            Regime::Choppy => write!(f, "choppy"),
            Regime::Volatile => write!(f, "volatile"),
            Regime::Unknown => write!(f, "unknown"),
        }
    }
}

/// Where price sits in its recent range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceLocation {
    Bottom,
    Middle,
    Top,
}

impl PriceLocation {
    /// Bucket a range percentile: bottom < 30, top > 70
    pub fn from_pct(pct: f64) -> Self {
        if pct < 30.0 {
            PriceLocation::Bottom
        } else if pct > 70.0 {
            PriceLocation::Top
        } else {
            PriceLocation::Middle
        }
    }
}

/// Cross-timeframe trend agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentTier {
    /// 1h, 15m and 5m trend signs all equal and non-zero
    Fully,
    /// 1h and 15m agree (non-zero), 5m diverges or is flat
    Partially,
    Divergent,
}

/// Outcome of the weighted decision vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResult {
    pub action: TradeAction,
    /// Confidence in [0, 100]
    pub confidence: f64,
    /// Σ effective_weight · score, in [−100, +100]
    pub weighted_score: f64,
    /// Effective (renormalized) weight and raw score per contributing signal;
    /// BTreeMap keeps serialization order deterministic
    pub vote_details: BTreeMap<String, SignalVote>,
    pub multi_period_aligned: bool,
    pub alignment: AlignmentTier,
    pub regime: Regime,
    pub position_pct: f64,
    pub reason: String,
}

/// One signal's contribution to the vote
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalVote {
    pub score: f64,
    pub effective_weight: f64,
}

impl VoteResult {
    /// Sum of effective weights across contributing signals; 1.0 (within
    /// tolerance) whenever at least one signal was present.
    pub fn effective_weight_sum(&self) -> f64 {
        self.vote_details.values().map(|v| v.effective_weight).sum()
    }
}
