//! Funding / open-interest / netflow sentiment scoring.

use crate::domain::candle::Timeframe;
use crate::domain::snapshot::MarketSnapshot;

/// Funding rate beyond ±0.03% marks a crowded side
const FUNDING_CROWDED: f64 = 0.0003;
/// Open-interest change considered significant over 24h
const OI_SIGNIFICANT_PCT: f64 = 10.0;
/// 1h bars spanned by the open-interest comparison window
const PRICE_DIRECTION_BARS: usize = 24;

const NETFLOW_POINTS: f64 = 30.0;
const FUNDING_POINTS: f64 = 30.0;
const OI_POINTS: f64 = 10.0;

/// Scores market positioning from auxiliary metrics.
///
/// Missing inputs contribute zero rather than being imputed; when every
/// input is missing the whole score is reported missing so the decision
/// core can renormalize its weights.
#[derive(Debug, Clone, Default)]
pub struct SentimentSubAgent;

impl SentimentSubAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, snapshot: &MarketSnapshot) -> (Option<f64>, Vec<String>) {
        let mut details = Vec::new();

        if snapshot.netflow_1h.is_none()
            && snapshot.funding_rate.is_none()
            && snapshot.open_interest.is_none()
        {
            details.push("sentiment: all inputs missing".to_string());
            return (None, details);
        }

        let mut score = 0.0;

        match snapshot.netflow_1h {
            Some(netflow) if netflow > 0.0 => {
                score += NETFLOW_POINTS;
                details.push(format!("institutional inflow {netflow:.0} USD"));
            }
            Some(netflow) if netflow < 0.0 => {
                score -= NETFLOW_POINTS;
                details.push(format!("institutional outflow {netflow:.0} USD"));
            }
            Some(_) => {}
            None => details.push("netflow missing".to_string()),
        }

        match snapshot.funding_rate {
            Some(rate) if rate > FUNDING_CROWDED => {
                score -= FUNDING_POINTS;
                details.push(format!("crowded longs (funding {:.4}%)", rate * 100.0));
            }
            Some(rate) if rate < -FUNDING_CROWDED => {
                score += FUNDING_POINTS;
                details.push(format!("crowded shorts (funding {:.4}%)", rate * 100.0));
            }
            Some(_) => {}
            None => details.push("funding missing".to_string()),
        }

        match snapshot.open_interest {
            Some(oi) if oi.change_pct() > OI_SIGNIFICANT_PCT => {
                // Rising interest amplifies the prevailing price direction
                let direction = price_direction_24h(snapshot);
                if direction != 0 {
                    score += OI_POINTS * direction as f64;
                    details.push(format!(
                        "open interest +{:.1}% with price {}",
                        oi.change_pct(),
                        if direction > 0 { "rising" } else { "falling" }
                    ));
                }
            }
            Some(_) => {}
            None => details.push("open interest missing".to_string()),
        }

        (Some(score.clamp(-100.0, 100.0)), details)
    }
}

/// Sign of the 1h close-to-close change over the OI comparison window
pub(crate) fn price_direction_24h(snapshot: &MarketSnapshot) -> i8 {
    let frame = &snapshot.view(Timeframe::H1).stable;
    let i = frame.last_index();
    if i < PRICE_DIRECTION_BARS {
        return 0;
    }
    let past = frame.close[i - PRICE_DIRECTION_BARS];
    let now = frame.close[i];
    if now > past {
        1
    } else if now < past {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn inflow_plus_cheap_funding_is_bullish() {
        let mut snap = testutil::snapshot("BTCUSDT");
        snap.netflow_1h = Some(5_000_000.0);
        snap.funding_rate = Some(-0.0005); // crowded shorts
        snap.open_interest = None;

        let (score, details) = SentimentSubAgent::new().score(&snap);
        assert_eq!(score, Some(60.0));
        assert!(details.iter().any(|d| d.contains("inflow")));
    }

    #[test]
    fn crowded_longs_penalized() {
        let mut snap = testutil::snapshot("BTCUSDT");
        snap.netflow_1h = Some(-2_000_000.0);
        snap.funding_rate = Some(0.0006);
        snap.open_interest = None;

        let (score, _) = SentimentSubAgent::new().score(&snap);
        assert_eq!(score, Some(-60.0));
    }

    #[test]
    fn oi_expansion_follows_price_direction() {
        // Fixture closes rise, so 24h price direction is up
        let mut snap = testutil::snapshot("BTCUSDT");
        snap.netflow_1h = Some(0.0);
        snap.funding_rate = Some(0.0);
        snap.open_interest = Some(crate::domain::snapshot::OpenInterest {
            current: 1_200_000.0,
            value_24h_ago: 1_000_000.0,
        });

        assert_eq!(price_direction_24h(&snap), 1);
        let (score, details) = SentimentSubAgent::new().score(&snap);
        assert_eq!(score, Some(10.0));
        assert!(details.iter().any(|d| d.contains("open interest")));
    }

    #[test]
    fn all_inputs_missing_yields_missing_score() {
        let mut snap = testutil::snapshot("BTCUSDT");
        snap.netflow_1h = None;
        snap.funding_rate = None;
        snap.open_interest = None;

        let (score, _) = SentimentSubAgent::new().score(&snap);
        assert!(score.is_none());
    }

    #[test]
    fn partially_missing_inputs_score_zero_not_imputed() {
        let mut snap = testutil::snapshot("BTCUSDT");
        snap.netflow_1h = None;
        snap.funding_rate = Some(0.0);
        snap.open_interest = None;

        let (score, details) = SentimentSubAgent::new().score(&snap);
        assert_eq!(score, Some(0.0));
        assert!(details.iter().any(|d| d.contains("netflow missing")));
    }
}
