//! Optional LLM confidence advisor.
//!
//! The advisor can only scale a decision's confidence inside a bounded
//! band. It never flips an action, never resurrects a risk-blocked order,
//! and a slow or failing advisor degrades to identity.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::domain::analysis::{TradeAction, VoteResult};
use crate::error::{HelixError, Result};

use super::decision::enforce_confidence_floor;

/// Multiplier band the advisor is clamped into
pub const MODULATION_MIN: f64 = 0.5;
pub const MODULATION_MAX: f64 = 1.2;

/// External confidence modulator boundary
#[async_trait]
pub trait ConfidenceAdvisor: Send + Sync {
    /// Return a confidence multiplier for the vote; values outside the
    /// [0.5, 1.2] band are clamped by the caller.
    async fn review(&self, vote: &VoteResult) -> Result<f64>;
}

/// Advisor reachable over HTTP; posts the vote and expects
/// `{"multiplier": <f64>}`.
pub struct HttpAdvisor {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAdvisor {
    pub fn new(endpoint: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(HelixError::Http)?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl ConfidenceAdvisor for HttpAdvisor {
    async fn review(&self, vote: &VoteResult) -> Result<f64> {
        let response = self.http.post(&self.endpoint).json(vote).send().await?;
        if !response.status().is_success() {
            return Err(HelixError::Fetch(format!(
                "advisor returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await?;
        body.get("multiplier")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HelixError::Validation("advisor payload missing multiplier".to_string()))
    }
}

/// Apply an advisor review to a vote, bounded and floor-checked.
///
/// Holds pass through untouched; the quantitative floor re-applies after
/// scaling, so the advisor can talk a weak decision down into a hold but
/// can never override a veto in the other direction.
pub async fn modulate(
    advisor: &dyn ConfidenceAdvisor,
    vote: VoteResult,
    timeout: Duration,
) -> VoteResult {
    if vote.action == TradeAction::Hold {
        return vote;
    }

    let multiplier = match tokio::time::timeout(timeout, advisor.review(&vote)).await {
        Ok(Ok(m)) if m.is_finite() => m.clamp(MODULATION_MIN, MODULATION_MAX),
        Ok(Ok(m)) => {
            warn!(multiplier = m, "advisor returned non-finite multiplier, ignoring");
            return vote;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "advisor failed, keeping quantitative confidence");
            return vote;
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "advisor timed out");
            return vote;
        }
    };

    let mut vote = vote;
    vote.confidence = (vote.confidence * multiplier).clamp(0.0, 100.0);
    let (action, confidence, reason) = enforce_confidence_floor(
        vote.action,
        vote.confidence,
        vote.weighted_score,
        vote.reason,
    );
    vote.action = action;
    vote.confidence = confidence;
    vote.reason = reason;
    vote
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{AlignmentTier, Regime};
    use std::collections::BTreeMap;

    struct FixedAdvisor(f64);

    #[async_trait]
    impl ConfidenceAdvisor for FixedAdvisor {
        async fn review(&self, _vote: &VoteResult) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct BrokenAdvisor;

    #[async_trait]
    impl ConfidenceAdvisor for BrokenAdvisor {
        async fn review(&self, _vote: &VoteResult) -> Result<f64> {
            Err(HelixError::Fetch("advisor offline".to_string()))
        }
    }

    fn long_vote(confidence: f64) -> VoteResult {
        VoteResult {
            action: TradeAction::Long,
            confidence,
            weighted_score: 45.0,
            vote_details: BTreeMap::new(),
            multi_period_aligned: true,
            alignment: AlignmentTier::Fully,
            regime: Regime::Trending,
            position_pct: 40.0,
            reason: "fixture".to_string(),
        }
    }

    #[tokio::test]
    async fn multiplier_is_clamped_to_band() {
        let vote = modulate(&FixedAdvisor(5.0), long_vote(70.0), Duration::from_secs(1)).await;
        // 70 * 1.2 (clamped), not 70 * 5
        assert!((vote.confidence - 84.0).abs() < 1e-9);
        assert_eq!(vote.action, TradeAction::Long);
    }

    #[tokio::test]
    async fn advisor_can_talk_a_decision_down_into_hold() {
        let vote = modulate(&FixedAdvisor(0.4), long_vote(55.0), Duration::from_secs(1)).await;
        // 55 * 0.5 (clamped) = 27.5 < 30: floored to hold
        assert_eq!(vote.action, TradeAction::Hold);
        assert!(vote.reason.contains("confidence below floor"));
    }

    #[tokio::test]
    async fn broken_advisor_is_identity() {
        let vote = modulate(&BrokenAdvisor, long_vote(70.0), Duration::from_secs(1)).await;
        assert!((vote.confidence - 70.0).abs() < 1e-9);
        assert_eq!(vote.action, TradeAction::Long);
    }

    #[tokio::test]
    async fn holds_are_never_reviewed() {
        let mut vote = long_vote(80.0);
        vote.action = TradeAction::Hold;
        let out = modulate(&FixedAdvisor(1.2), vote, Duration::from_secs(1)).await;
        assert!((out.confidence - 80.0).abs() < 1e-9);
    }
}
