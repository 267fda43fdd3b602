//! Point-in-time, cross-timeframe market snapshot.
//!
//! A snapshot is the pipeline's atomic unit: created once per cycle by the
//! data sync agent, immutable afterwards, and the key under which every
//! persisted artifact for the cycle is filed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorFrame;

use super::candle::{Candle, Timeframe};

/// One timeframe's contribution to a snapshot: the closed candles with their
/// indicator frame, plus the single still-forming candle.
#[derive(Debug, Clone)]
pub struct TimeframeView {
    pub stable: IndicatorFrame,
    pub live: Candle,
    /// Set when the exchange had not yet emitted a fresh live candle and the
    /// live view is the last closed row instead
    pub stale_live: bool,
}

/// Open interest reading: current value plus the value ~24h ago
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenInterest {
    pub current: f64,
    pub value_24h_ago: f64,
}

impl OpenInterest {
    /// Percentage change over the 24h window
    pub fn change_pct(&self) -> f64 {
        if self.value_24h_ago.abs() < f64::EPSILON {
            return 0.0;
        }
        (self.current - self.value_24h_ago) / self.value_24h_ago * 100.0
    }
}

/// Frozen multi-timeframe view used by every downstream component.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub m5: TimeframeView,
    pub m15: TimeframeView,
    pub h1: TimeframeView,
    /// Current funding rate (fraction, e.g. 0.0001 = 0.01%); None when the
    /// fetch failed or timed out
    pub funding_rate: Option<f64>,
    pub open_interest: Option<OpenInterest>,
    /// Net institutional flow over the last hour, USD; positive = inflow
    pub netflow_1h: Option<f64>,
    /// Wall time the snapshot was assembled
    pub timestamp: DateTime<Utc>,
    pub alignment_ok: bool,
    pub warnings: Vec<String>,
    /// Deterministic id: `{symbol}-{5m stable close ms}`
    pub snapshot_id: String,
}

impl MarketSnapshot {
    pub fn view(&self, tf: Timeframe) -> &TimeframeView {
        match tf {
            Timeframe::M5 => &self.m5,
            Timeframe::M15 => &self.m15,
            Timeframe::H1 => &self.h1,
        }
    }

    /// Deterministic id for a symbol and its aligned 5m close time
    pub fn make_id(symbol: &str, stable_5m_close: DateTime<Utc>) -> String {
        format!(
            "{}-{}",
            symbol.to_ascii_lowercase(),
            stable_5m_close.timestamp_millis()
        )
    }

    /// Verify the cross-timeframe alignment invariants against `now`.
    ///
    /// `T_s` is the 5m stable close; it must be within 10 minutes of `now`,
    /// with the 15m and 1h stable closes no further behind `T_s` than one of
    /// their own periods.
    pub fn check_alignment(
        stable_5m_close: DateTime<Utc>,
        stable_15m_close: DateTime<Utc>,
        stable_1h_close: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        let t_s = stable_5m_close;
        t_s >= now - Duration::minutes(10)
            && stable_15m_close >= t_s - Duration::minutes(15)
            && stable_1h_close >= t_s - Duration::minutes(60)
    }
}

/// Serialized per-cycle summary of a snapshot (the full frames are logged as
/// separate artifacts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub alignment_ok: bool,
    pub stable_close_5m: DateTime<Utc>,
    pub stable_close_15m: DateTime<Utc>,
    pub stable_close_1h: DateTime<Utc>,
    pub funding_rate: Option<f64>,
    pub netflow_1h: Option<f64>,
    pub open_interest_change_pct: Option<f64>,
    pub warnings: Vec<String>,
    pub processor_version: u32,
}

impl From<&MarketSnapshot> for SnapshotSummary {
    fn from(snap: &MarketSnapshot) -> Self {
        Self {
            snapshot_id: snap.snapshot_id.clone(),
            symbol: snap.symbol.clone(),
            timestamp: snap.timestamp,
            alignment_ok: snap.alignment_ok,
            stable_close_5m: snap.m5.stable.last_close_time(),
            stable_close_15m: snap.m15.stable.last_close_time(),
            stable_close_1h: snap.h1.stable.last_close_time(),
            funding_rate: snap.funding_rate,
            netflow_1h: snap.netflow_1h,
            open_interest_change_pct: snap.open_interest.map(|oi| oi.change_pct()),
            warnings: snap.warnings.clone(),
            processor_version: snap.m5.stable.processor_version,
        }
    }
}
