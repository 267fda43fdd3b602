//! Shared fixtures for unit tests.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::snapshot::{MarketSnapshot, OpenInterest, TimeframeView};
use crate::indicators::{IndicatorFrame, IndicatorProcessor};

/// Fixed wall time used across deterministic tests
pub fn anchor_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Candle series ending with a live candle that opened half a period before
/// `now`, so every snapshot built from it is fresh and aligned.
pub fn aligned_series(
    tf: Timeframe,
    len: usize,
    now: DateTime<Utc>,
    close_at: impl Fn(usize) -> f64,
) -> Vec<Candle> {
    let period = tf.duration();
    let live_open = now - period / 2;
    (0..len)
        .map(|k| {
            let open_time = live_open - period * (len - 1 - k) as i32;
            let close = close_at(k);
            let open = close_at(k.saturating_sub(1));
            let high = close.max(open) + close * 0.001;
            let low = close.min(open) - close * 0.001;
            Candle {
                open_time,
                open: dec_f64(open),
                high: dec_f64(high),
                low: dec_f64(low),
                close: dec_f64(close),
                volume: dec_f64(25.0 + (k % 7) as f64),
                close_time: open_time + period - Duration::milliseconds(1),
            }
        })
        .collect()
}

fn dec_f64(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

/// Build a timeframe view: all-but-last candles become the stable frame,
/// the final candle plays the live row.
pub fn view_from_candles(candles: Vec<Candle>) -> TimeframeView {
    let (live, stable) = candles.split_last().expect("need at least one candle");
    TimeframeView {
        stable: IndicatorProcessor::new()
            .process(stable)
            .expect("fixture series long enough"),
        live: live.clone(),
        stale_live: false,
    }
}

/// Fully aligned snapshot with gently rising prices and neutral aux inputs.
/// Tests mutate the public fields to shape the scenario they need.
pub fn snapshot(symbol: &str) -> MarketSnapshot {
    snapshot_with_closes(symbol, |k| 100.0 + k as f64 * 0.05)
}

pub fn snapshot_with_closes(symbol: &str, close_at: impl Fn(usize) -> f64 + Copy) -> MarketSnapshot {
    let now = anchor_time();
    let m5 = view_from_candles(aligned_series(Timeframe::M5, 221, now, close_at));
    let m15 = view_from_candles(aligned_series(Timeframe::M15, 221, now, close_at));
    let h1 = view_from_candles(aligned_series(Timeframe::H1, 221, now, close_at));

    let snapshot_id = MarketSnapshot::make_id(symbol, m5.stable.last_close_time());
    MarketSnapshot {
        symbol: symbol.to_string(),
        m5,
        m15,
        h1,
        funding_rate: Some(0.0001),
        open_interest: Some(OpenInterest {
            current: 1_000_000.0,
            value_24h_ago: 980_000.0,
        }),
        netflow_1h: Some(0.0),
        timestamp: now,
        alignment_ok: true,
        warnings: Vec::new(),
        snapshot_id,
    }
}

/// Bare frame with only the close column meaningful; indicator columns are
/// NaN and timestamps are spaced one hour apart.
pub fn frame_from_closes(closes: &[f64]) -> IndicatorFrame {
    let n = closes.len();
    let start = anchor_time() - Duration::hours(n as i64);
    let nan = vec![f64::NAN; n];
    IndicatorFrame {
        open_time: (0..n).map(|i| start + Duration::hours(i as i64)).collect(),
        close_time: (0..n)
            .map(|i| start + Duration::hours(i as i64 + 1) - Duration::milliseconds(1))
            .collect(),
        open: closes.to_vec(),
        high: closes.iter().map(|c| c + 0.5).collect(),
        low: closes.iter().map(|c| c - 0.5).collect(),
        close: closes.to_vec(),
        volume: vec![1.0; n],
        sma_20: nan.clone(),
        sma_50: nan.clone(),
        ema_12: nan.clone(),
        ema_20: nan.clone(),
        ema_26: nan.clone(),
        ema_50: nan.clone(),
        macd: nan.clone(),
        macd_signal: nan.clone(),
        macd_hist: nan.clone(),
        rsi_14: nan.clone(),
        atr_14: nan.clone(),
        adx_14: nan.clone(),
        bb_upper: nan.clone(),
        bb_middle: nan.clone(),
        bb_lower: nan.clone(),
        obv: nan.clone(),
        volume_ratio: nan.clone(),
        vwap: nan,
        processor_version: crate::indicators::PROCESSOR_VERSION,
    }
}
