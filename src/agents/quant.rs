//! Composite quantitative analysis.

use tracing::debug;

use crate::domain::analysis::QuantAnalysis;
use crate::domain::snapshot::MarketSnapshot;

use super::oscillator::OscillatorSubAgent;
use super::sentiment::SentimentSubAgent;
use super::trend::TrendSubAgent;

/// Composes the trend, oscillator and sentiment sub-agents into a single
/// quant analysis: composite = 0.4·trend + 0.3·oscillator + 0.3·sentiment.
#[derive(Debug, Clone, Default)]
pub struct QuantAnalystAgent {
    trend: TrendSubAgent,
    oscillator: OscillatorSubAgent,
    sentiment: SentimentSubAgent,
}

impl QuantAnalystAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(&self, snapshot: &MarketSnapshot) -> QuantAnalysis {
        let (trend, mut details) = self.trend.score(snapshot);
        let oscillator = self.oscillator.score(snapshot);
        let (sentiment, sentiment_details) = self.sentiment.score(snapshot);
        details.extend(sentiment_details);

        let composite = QuantAnalysis::composite_of(&trend, &oscillator, sentiment);
        let label = QuantAnalysis::label_of(composite);

        debug!(
            snapshot_id = %snapshot.snapshot_id,
            composite = format!("{composite:.1}"),
            ?label,
            "quant analysis"
        );

        QuantAnalysis {
            trend,
            oscillator,
            sentiment,
            composite,
            label,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::analysis::{QuantAnalysis, QuantLabel, TimeframeScores};

    #[test]
    fn composite_weighting() {
        let trend = TimeframeScores {
            m5: 30.0,
            m15: 60.0,
            h1: 90.0,
        };
        let osc = TimeframeScores {
            m5: -10.0,
            m15: -10.0,
            h1: -10.0,
        };
        // 0.4*60 + 0.3*(−10) + 0.3*20 = 27
        let composite = QuantAnalysis::composite_of(&trend, &osc, Some(20.0));
        assert!((composite - 27.0).abs() < 1e-9);
    }

    #[test]
    fn missing_sentiment_contributes_zero() {
        let trend = TimeframeScores {
            m5: 50.0,
            m15: 50.0,
            h1: 50.0,
        };
        let osc = TimeframeScores::default();
        let composite = QuantAnalysis::composite_of(&trend, &osc, None);
        assert!((composite - 20.0).abs() < 1e-9);
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(QuantAnalysis::label_of(35.0), QuantLabel::Buy);
        assert_eq!(QuantAnalysis::label_of(-35.0), QuantLabel::Sell);
        assert_eq!(QuantAnalysis::label_of(30.0), QuantLabel::Neutral);
        assert_eq!(QuantAnalysis::label_of(0.0), QuantLabel::Neutral);
    }
}
