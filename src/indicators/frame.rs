//! Indicator frame construction over a closed-candle series.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::candle::{Candle, MIN_SERIES_LEN};
use crate::error::{HelixError, Result};

use super::core::{Adx, Atr, Ema, Macd, RollingWindow, Rsi};

/// Leading rows whose indicator values are blanked to NaN
pub const WARMUP_ROWS: usize = 105;

/// Bumped on any schema or formula change; persisted artifacts from older
/// versions are treated as stale and recomputed.
pub const PROCESSOR_VERSION: u32 = 3;

/// Column-oriented indicator view of one series.
///
/// Price columns are always populated; indicator columns are NaN across the
/// warmup prefix and finite afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorFrame {
    pub open_time: Vec<DateTime<Utc>>,
    pub close_time: Vec<DateTime<Utc>>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,

    pub sma_20: Vec<f64>,
    pub sma_50: Vec<f64>,
    pub ema_12: Vec<f64>,
    pub ema_20: Vec<f64>,
    pub ema_26: Vec<f64>,
    pub ema_50: Vec<f64>,
    pub macd: Vec<f64>,
    pub macd_signal: Vec<f64>,
    pub macd_hist: Vec<f64>,
    pub rsi_14: Vec<f64>,
    pub atr_14: Vec<f64>,
    pub adx_14: Vec<f64>,
    pub bb_upper: Vec<f64>,
    pub bb_middle: Vec<f64>,
    pub bb_lower: Vec<f64>,
    pub obv: Vec<f64>,
    pub volume_ratio: Vec<f64>,
    pub vwap: Vec<f64>,

    pub processor_version: u32,
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Index of the most recent closed candle
    pub fn last_index(&self) -> usize {
        self.len() - 1
    }

    pub fn last_close(&self) -> f64 {
        self.close[self.last_index()]
    }

    pub fn last_close_time(&self) -> DateTime<Utc> {
        self.close_time[self.last_index()]
    }

    /// True when the row is inside the indicator warmup prefix
    pub fn is_warmup(&self, row: usize) -> bool {
        row < WARMUP_ROWS
    }
}

/// Computes the full indicator frame for a validated series.
///
/// Pure function of its input: same candles in, same frame out.
#[derive(Debug, Clone, Default)]
pub struct IndicatorProcessor;

impl IndicatorProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process(&self, candles: &[Candle]) -> Result<IndicatorFrame> {
        if candles.len() < MIN_SERIES_LEN {
            return Err(HelixError::InsufficientData(format!(
                "indicator frame needs {MIN_SERIES_LEN} candles, got {}",
                candles.len()
            )));
        }

        let n = candles.len();
        let mut frame = IndicatorFrame {
            open_time: Vec::with_capacity(n),
            close_time: Vec::with_capacity(n),
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            volume: Vec::with_capacity(n),
            sma_20: Vec::with_capacity(n),
            sma_50: Vec::with_capacity(n),
            ema_12: Vec::with_capacity(n),
            ema_20: Vec::with_capacity(n),
            ema_26: Vec::with_capacity(n),
            ema_50: Vec::with_capacity(n),
            macd: Vec::with_capacity(n),
            macd_signal: Vec::with_capacity(n),
            macd_hist: Vec::with_capacity(n),
            rsi_14: Vec::with_capacity(n),
            atr_14: Vec::with_capacity(n),
            adx_14: Vec::with_capacity(n),
            bb_upper: Vec::with_capacity(n),
            bb_middle: Vec::with_capacity(n),
            bb_lower: Vec::with_capacity(n),
            obv: Vec::with_capacity(n),
            volume_ratio: Vec::with_capacity(n),
            vwap: Vec::with_capacity(n),
            processor_version: PROCESSOR_VERSION,
        };

        let mut sma_20 = RollingWindow::new(20);
        let mut sma_50 = RollingWindow::new(50);
        let mut ema_12 = Ema::new(12);
        let mut ema_20 = Ema::new(20);
        let mut ema_26 = Ema::new(26);
        let mut ema_50 = Ema::new(50);
        let mut macd = Macd::new(12, 26, 9);
        let mut rsi = Rsi::new(14);
        let mut atr = Atr::new(14);
        let mut adx = Adx::new(14);
        let mut bb = RollingWindow::new(20);
        let mut vol_sma = RollingWindow::new(20);

        let mut obv = 0.0_f64;
        let mut prev_close: Option<f64> = None;
        let mut cum_pv = 0.0_f64;
        let mut cum_vol = 0.0_f64;

        for candle in candles {
            let open = candle.open.to_f64().unwrap_or(f64::NAN);
            let high = candle.high.to_f64().unwrap_or(f64::NAN);
            let low = candle.low.to_f64().unwrap_or(f64::NAN);
            let close = candle.close.to_f64().unwrap_or(f64::NAN);
            let volume = candle.volume.to_f64().unwrap_or(0.0);

            frame.open_time.push(candle.open_time);
            frame.close_time.push(candle.close_time);
            frame.open.push(open);
            frame.high.push(high);
            frame.low.push(low);
            frame.close.push(close);
            frame.volume.push(volume);

            sma_20.push(close);
            sma_50.push(close);
            bb.push(close);
            vol_sma.push(volume);

            frame.sma_20.push(sma_20.mean());
            frame.sma_50.push(sma_50.mean());
            frame.ema_12.push(ema_12.update(close));
            frame.ema_20.push(ema_20.update(close));
            frame.ema_26.push(ema_26.update(close));
            frame.ema_50.push(ema_50.update(close));

            let m = macd.update(close);
            frame.macd.push(m.macd);
            frame.macd_signal.push(m.signal);
            frame.macd_hist.push(m.histogram);

            frame.rsi_14.push(rsi.update(close));
            frame.atr_14.push(atr.update(high, low, close));
            frame.adx_14.push(adx.update(high, low, close));

            let mid = bb.mean();
            let dev = bb.std_dev();
            frame.bb_middle.push(mid);
            frame.bb_upper.push(mid + 2.0 * dev);
            frame.bb_lower.push(mid - 2.0 * dev);

            if let Some(prev) = prev_close {
                if close > prev {
                    obv += volume;
                } else if close < prev {
                    obv -= volume;
                }
            }
            prev_close = Some(close);
            frame.obv.push(obv);

            let vol_mean = vol_sma.mean();
            frame
                .volume_ratio
                .push(if vol_mean > 0.0 { volume / vol_mean } else { f64::NAN });

            let typical = (high + low + close) / 3.0;
            cum_pv += typical * volume;
            cum_vol += volume;
            frame
                .vwap
                .push(if cum_vol > 0.0 { cum_pv / cum_vol } else { f64::NAN });
        }

        frame.blank_warmup();
        Ok(frame)
    }
}

impl IndicatorFrame {
    fn blank_warmup(&mut self) {
        let cut = WARMUP_ROWS.min(self.len());
        for col in [
            &mut self.sma_20,
            &mut self.sma_50,
            &mut self.ema_12,
            &mut self.ema_20,
            &mut self.ema_26,
            &mut self.ema_50,
            &mut self.macd,
            &mut self.macd_signal,
            &mut self.macd_hist,
            &mut self.rsi_14,
            &mut self.atr_14,
            &mut self.adx_14,
            &mut self.bb_upper,
            &mut self.bb_middle,
            &mut self.bb_lower,
            &mut self.obv,
            &mut self.volume_ratio,
            &mut self.vwap,
        ] {
            for v in col.iter_mut().take(cut) {
                *v = f64::NAN;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn series(len: usize) -> Vec<Candle> {
        (0..len as i64)
            .map(|i| {
                let open_time = DateTime::from_timestamp(i * 300, 0).unwrap();
                // Gentle sine drift keeps every indicator well-defined
                let close = dec!(100) + Decimal::from(i % 7) - Decimal::from(i % 3);
                Candle {
                    open_time,
                    open: close - dec!(1),
                    high: close + dec!(2),
                    low: close - dec!(2),
                    close,
                    volume: dec!(50) + Decimal::from(i % 5),
                    close_time: open_time + Duration::minutes(5) - Duration::milliseconds(1),
                }
            })
            .collect()
    }

    #[test]
    fn rejects_short_input() {
        let err = IndicatorProcessor::new().process(&series(120)).unwrap_err();
        assert!(matches!(err, HelixError::InsufficientData(_)));
    }

    #[test]
    fn warmup_rows_are_nan_and_rest_finite() {
        let frame = IndicatorProcessor::new().process(&series(220)).unwrap();
        assert_eq!(frame.len(), 220);
        assert_eq!(frame.processor_version, PROCESSOR_VERSION);

        for row in 0..WARMUP_ROWS {
            assert!(frame.is_warmup(row));
            assert!(frame.rsi_14[row].is_nan());
            assert!(frame.macd_hist[row].is_nan());
            assert!(frame.adx_14[row].is_nan());
        }
        for row in WARMUP_ROWS..frame.len() {
            assert!(!frame.is_warmup(row));
            assert!(frame.rsi_14[row].is_finite(), "rsi NaN at {row}");
            assert!(frame.atr_14[row].is_finite(), "atr NaN at {row}");
            assert!(frame.bb_upper[row].is_finite(), "bb NaN at {row}");
            assert!(frame.vwap[row].is_finite(), "vwap NaN at {row}");
            assert!(frame.adx_14[row].is_finite(), "adx NaN at {row}");
        }
        // Price columns stay populated everywhere
        assert!(frame.close.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn deterministic_for_identical_input() {
        let candles = series(230);
        let a = IndicatorProcessor::new().process(&candles).unwrap();
        let b = IndicatorProcessor::new().process(&candles).unwrap();
        assert_eq!(a.last_close(), b.last_close());
        assert_eq!(a.rsi_14[229], b.rsi_14[229]);
        assert_eq!(a.macd[229], b.macd[229]);
    }

    #[test]
    fn bollinger_brackets_the_middle_band() {
        let frame = IndicatorProcessor::new().process(&series(220)).unwrap();
        let i = frame.last_index();
        assert!(frame.bb_lower[i] <= frame.bb_middle[i]);
        assert!(frame.bb_middle[i] <= frame.bb_upper[i]);
    }
}
