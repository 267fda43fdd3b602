//! Candles, timeframes, and series validation.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use crate::error::{HelixError, Result};

/// Minimum closed candles per series for indicator stability
pub const MIN_SERIES_LEN: usize = 200;

/// Candle bucket duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    M5,
    M15,
    H1,
}

impl Timeframe {
    /// All timeframes a snapshot carries, shortest first
    pub const ALL: [Timeframe; 3] = [Timeframe::M5, Timeframe::M15, Timeframe::H1];

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            _ => Err("invalid timeframe; expected 5m|15m|1h"),
        }
    }
}

/// A single candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    /// OHLC/volume sanity for a single row
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.high
            && self.volume >= Decimal::ZERO
            && self.close_time > self.open_time
    }

    /// Check if candle closed up (close >= open)
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// Rejects malformed candles and enforces series-level invariants.
///
/// Individually malformed rows are dropped with a warning; the series as a
/// whole fails only when too few valid rows remain or ordering is broken.
pub struct KlineValidator;

impl KlineValidator {
    /// Validate a raw series, returning the cleaned candles in order.
    pub fn validate(symbol: &str, tf: Timeframe, raw: Vec<Candle>) -> Result<Vec<Candle>> {
        let total = raw.len();
        let mut cleaned: Vec<Candle> = Vec::with_capacity(total);

        for candle in raw {
            if !candle.is_well_formed() {
                warn!(
                    symbol,
                    tf = %tf,
                    open_time = %candle.open_time,
                    "dropping malformed candle"
                );
                continue;
            }
            if let Some(prev) = cleaned.last() {
                if candle.open_time <= prev.open_time {
                    return Err(HelixError::Validation(format!(
                        "{symbol} {tf}: non-increasing open_time at {}",
                        candle.open_time
                    )));
                }
            }
            cleaned.push(candle);
        }

        if cleaned.len() < MIN_SERIES_LEN {
            return Err(HelixError::InsufficientData(format!(
                "{symbol} {tf}: {} valid candles of {total} raw, need {MIN_SERIES_LEN}",
                cleaned.len()
            )));
        }

        Ok(cleaned)
    }
}
