//! Probability-of-up prediction with rule fallback.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::analysis::{PredictResult, PredictorSource};
use crate::error::Result;
use crate::indicators::FeatureSnapshot;
use crate::ml::{sigmoid, PupModel};

/// External probabilistic predictor boundary
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, features: &FeatureSnapshot) -> Result<PredictResult>;
}

/// Predictor backed by the JSON p_up model exported by the training
/// pipeline; the model rejects any file whose feature contract does not
/// match this build. Inference is synchronous and cheap; the async surface
/// exists only to satisfy the boundary trait.
pub struct DensePredictor {
    model: PupModel,
}

impl DensePredictor {
    pub fn load(path: &str) -> Result<Self> {
        Ok(Self {
            model: PupModel::from_file(path)?,
        })
    }
}

#[async_trait]
impl Predictor for DensePredictor {
    async fn predict(&self, features: &FeatureSnapshot) -> Result<PredictResult> {
        let p_up = self.model.p_up(&features.to_vec())?;
        Ok(PredictResult {
            p_up,
            label: PredictResult::label_for(p_up),
            confidence: (p_up - 0.5).abs() * 200.0,
            source: PredictorSource::Model,
        })
    }
}

/// Wraps the injected predictor with a timeout and the rule fallback.
pub struct PredictAgent {
    predictor: Option<Arc<dyn Predictor>>,
    timeout: Duration,
}

impl PredictAgent {
    pub fn new(predictor: Option<Arc<dyn Predictor>>, timeout: Duration) -> Self {
        Self { predictor, timeout }
    }

    /// Predict from features, falling back to a sigmoid of the composite
    /// quant score whenever the model is absent, slow, or broken.
    pub async fn predict(
        &self,
        features: Option<&FeatureSnapshot>,
        composite_quant_score: f64,
    ) -> PredictResult {
        if let (Some(predictor), Some(features)) = (&self.predictor, features) {
            match tokio::time::timeout(self.timeout, predictor.predict(features)).await {
                Ok(Ok(result)) => return result,
                Ok(Err(e)) => warn!(error = %e, "predictor failed, using rule fallback"),
                Err(_) => warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "predictor timed out, using rule fallback"
                ),
            }
        }
        Self::rule_fallback(composite_quant_score)
    }

    /// Deterministic fallback: p_up = sigmoid(0.02 · composite), confidence
    /// capped at 50.
    pub fn rule_fallback(composite_quant_score: f64) -> PredictResult {
        let p_up = sigmoid(0.02 * composite_quant_score);
        PredictResult {
            p_up,
            label: PredictResult::label_for(p_up),
            confidence: ((p_up - 0.5).abs() * 200.0).min(50.0),
            source: PredictorSource::RuleFallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::PredictLabel;
    use crate::error::HelixError;

    struct FailingPredictor;

    #[async_trait]
    impl Predictor for FailingPredictor {
        async fn predict(&self, _features: &FeatureSnapshot) -> Result<PredictResult> {
            Err(HelixError::Predictor("model file corrupt".to_string()))
        }
    }

    struct SlowPredictor;

    #[async_trait]
    impl Predictor for SlowPredictor {
        async fn predict(&self, _features: &FeatureSnapshot) -> Result<PredictResult> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("sleep outlives the test timeout")
        }
    }

    fn features() -> FeatureSnapshot {
        let snap = crate::testutil::snapshot("BTCUSDT");
        FeatureSnapshot::extract(&snap.m5.stable).unwrap()
    }

    #[test]
    fn fallback_is_sigmoid_of_composite() {
        let neutral = PredictAgent::rule_fallback(0.0);
        assert!((neutral.p_up - 0.5).abs() < 1e-12);
        assert_eq!(neutral.label, PredictLabel::Neutral);
        assert_eq!(neutral.source, PredictorSource::RuleFallback);

        let bullish = PredictAgent::rule_fallback(50.0);
        assert!(bullish.p_up > 0.7);
        assert_eq!(bullish.label, PredictLabel::Bullish);
        assert!(bullish.confidence <= 50.0);

        let bearish = PredictAgent::rule_fallback(-50.0);
        assert_eq!(bearish.label, PredictLabel::Bearish);
    }

    #[tokio::test]
    async fn predictor_error_degrades_to_fallback() {
        let agent = PredictAgent::new(Some(Arc::new(FailingPredictor)), Duration::from_secs(2));
        let result = agent.predict(Some(&features()), 25.0).await;
        assert_eq!(result.source, PredictorSource::RuleFallback);
    }

    #[tokio::test(start_paused = true)]
    async fn predictor_timeout_degrades_to_fallback() {
        let agent = PredictAgent::new(Some(Arc::new(SlowPredictor)), Duration::from_millis(50));
        let result = agent.predict(Some(&features()), 0.0).await;
        assert_eq!(result.source, PredictorSource::RuleFallback);
    }

    #[tokio::test]
    async fn missing_predictor_uses_fallback() {
        let agent = PredictAgent::new(None, Duration::from_secs(2));
        let result = agent.predict(Some(&features()), 10.0).await;
        assert_eq!(result.source, PredictorSource::RuleFallback);
        assert!(result.p_up > 0.5);
    }
}
