//! Replay data source and stub order sink for backtests.
//!
//! The replay source serves recorded candles up to a movable cursor, and its
//! `current_time` is the cursor itself, so the pipeline sees history exactly
//! as it would have seen live data — no lookahead leakage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::info;

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::order::Side;
use crate::domain::snapshot::OpenInterest;
use crate::error::{HelixError, Result};

use super::source::{MarketDataSource, OrderSink, PositionInfo};

/// Historical market data served behind the live trait.
pub struct ReplaySource {
    series: HashMap<(String, Timeframe), Vec<Candle>>,
    cursor: RwLock<DateTime<Utc>>,
    funding: HashMap<String, f64>,
    open_interest: HashMap<String, OpenInterest>,
    netflow: HashMap<String, f64>,
}

impl ReplaySource {
    pub fn new(cursor: DateTime<Utc>) -> Self {
        Self {
            series: HashMap::new(),
            cursor: RwLock::new(cursor),
            funding: HashMap::new(),
            open_interest: HashMap::new(),
            netflow: HashMap::new(),
        }
    }

    /// Load `<symbol>_<tf>.jsonl` candle files (one JSON candle per line)
    /// for each symbol from a directory. The cursor starts at the earliest
    /// last-candle open time so every series has data.
    pub fn load_dir<P: AsRef<Path>>(dir: P, symbols: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        let mut source = Self::new(DateTime::<Utc>::MIN_UTC);
        let mut cursor = DateTime::<Utc>::MAX_UTC;

        for symbol in symbols {
            for tf in Timeframe::ALL {
                let path = dir.join(format!("{}_{}.jsonl", symbol.to_ascii_lowercase(), tf));
                let file = std::fs::File::open(&path).map_err(|e| {
                    HelixError::ConfigInvalid(format!("replay data {}: {e}", path.display()))
                })?;
                let mut candles = Vec::new();
                for line in std::io::BufReader::new(file).lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    candles.push(serde_json::from_str::<Candle>(&line)?);
                }
                if let Some(last) = candles.last() {
                    cursor = cursor.min(last.open_time);
                }
                info!(symbol, tf = %tf, count = candles.len(), "loaded replay series");
                source.insert_series(symbol, tf, candles);
            }
        }

        *source.cursor.write().expect("cursor lock poisoned") = cursor;
        Ok(source)
    }

    pub fn insert_series(&mut self, symbol: &str, tf: Timeframe, candles: Vec<Candle>) {
        self.series.insert((symbol.to_string(), tf), candles);
    }

    pub fn set_funding_rate(&mut self, symbol: &str, rate: f64) {
        self.funding.insert(symbol.to_string(), rate);
    }

    pub fn set_open_interest(&mut self, symbol: &str, oi: OpenInterest) {
        self.open_interest.insert(symbol.to_string(), oi);
    }

    pub fn set_netflow(&mut self, symbol: &str, netflow: f64) {
        self.netflow.insert(symbol.to_string(), netflow);
    }

    /// Move the replay cursor forward
    pub fn advance_to(&self, cursor: DateTime<Utc>) {
        *self.cursor.write().expect("cursor lock poisoned") = cursor;
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        *self.cursor.read().expect("cursor lock poisoned")
    }
}

#[async_trait]
impl MarketDataSource for ReplaySource {
    async fn get_klines(&self, symbol: &str, tf: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let cursor = self.cursor();
        let candles = self
            .series
            .get(&(symbol.to_string(), tf))
            .ok_or_else(|| HelixError::Fetch(format!("{symbol} {tf}: no replay series")))?;

        // Everything opened at or before the cursor is visible; the last
        // visible row plays the in-progress candle.
        let visible: Vec<Candle> = candles
            .iter()
            .filter(|c| c.open_time <= cursor)
            .cloned()
            .collect();
        let start = visible.len().saturating_sub(limit);
        Ok(visible[start..].to_vec())
    }

    async fn get_funding_rate(&self, symbol: &str) -> Result<f64> {
        self.funding
            .get(symbol)
            .copied()
            .ok_or_else(|| HelixError::Fetch(format!("{symbol}: no replay funding rate")))
    }

    async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterest> {
        self.open_interest
            .get(symbol)
            .copied()
            .ok_or_else(|| HelixError::Fetch(format!("{symbol}: no replay open interest")))
    }

    async fn get_institutional_netflow(&self, symbol: &str) -> Result<f64> {
        self.netflow
            .get(symbol)
            .copied()
            .ok_or_else(|| HelixError::Fetch(format!("{symbol}: no replay netflow")))
    }

    fn current_time(&self) -> DateTime<Utc> {
        self.cursor()
    }
}

/// A single call recorded by the stub sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    SetLeverage {
        symbol: String,
        leverage: u32,
    },
    PlaceMarket {
        symbol: String,
        side: Side,
        quantity: Decimal,
        client_order_id: String,
    },
    AttachStops {
        symbol: String,
        order_id: String,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    },
}

/// Order sink that records calls instead of reaching an exchange.
pub struct StubOrderSink {
    balance: Decimal,
    calls: Mutex<Vec<SinkCall>>,
    orders_by_client_id: Mutex<HashMap<String, String>>,
    next_order: Mutex<u64>,
}

impl StubOrderSink {
    pub fn new(balance: Decimal) -> Self {
        Self {
            balance,
            calls: Mutex::new(Vec::new()),
            orders_by_client_id: Mutex::new(HashMap::new()),
            next_order: Mutex::new(1),
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn order_count(&self) -> usize {
        self.orders_by_client_id
            .lock()
            .expect("orders lock poisoned")
            .len()
    }
}

#[async_trait]
impl OrderSink for StubOrderSink {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(SinkCall::SetLeverage {
                symbol: symbol.to_string(),
                leverage,
            });
        Ok(())
    }

    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<String> {
        // Idempotent on retry: the same client id returns the same order
        let mut orders = self.orders_by_client_id.lock().expect("orders lock poisoned");
        if let Some(existing) = orders.get(client_order_id) {
            return Ok(existing.clone());
        }

        let mut next = self.next_order.lock().expect("next_order lock poisoned");
        let order_id = format!("stub-{}", *next);
        *next += 1;
        orders.insert(client_order_id.to_string(), order_id.clone());
        drop(orders);

        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(SinkCall::PlaceMarket {
                symbol: symbol.to_string(),
                side,
                quantity,
                client_order_id: client_order_id.to_string(),
            });
        Ok(order_id)
    }

    async fn attach_stops(
        &self,
        symbol: &str,
        order_id: &str,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(SinkCall::AttachStops {
                symbol: symbol.to_string(),
                order_id: order_id.to_string(),
                stop_loss,
                take_profit,
            });
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal> {
        Ok(self.balance)
    }

    async fn get_position(&self, _symbol: &str) -> Result<Option<PositionInfo>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn candle(open_minutes: i64) -> Candle {
        let open_time = DateTime::from_timestamp(open_minutes * 60, 0).unwrap();
        Candle {
            open_time,
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(10),
            close_time: open_time + Duration::minutes(5) - Duration::milliseconds(1),
        }
    }

    #[tokio::test]
    async fn replay_hides_candles_beyond_cursor() {
        let mut source = ReplaySource::new(DateTime::from_timestamp(0, 0).unwrap());
        source.insert_series(
            "BTCUSDT",
            Timeframe::M5,
            (0..10).map(|i| candle(i * 5)).collect(),
        );

        source.advance_to(DateTime::from_timestamp(20 * 60, 0).unwrap());
        let visible = source
            .get_klines("BTCUSDT", Timeframe::M5, 100)
            .await
            .unwrap();
        // candles opened at 0,5,10,15,20 minutes
        assert_eq!(visible.len(), 5);

        source.advance_to(DateTime::from_timestamp(45 * 60, 0).unwrap());
        let visible = source
            .get_klines("BTCUSDT", Timeframe::M5, 100)
            .await
            .unwrap();
        assert_eq!(visible.len(), 10);
    }

    #[tokio::test]
    async fn stub_sink_is_idempotent_per_client_id() {
        let sink = StubOrderSink::new(dec!(1000));
        let a = sink
            .place_market("BTCUSDT", Side::Buy, dec!(1), "btcusdt-123")
            .await
            .unwrap();
        let b = sink
            .place_market("BTCUSDT", Side::Buy, dec!(1), "btcusdt-123")
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(sink.order_count(), 1);
    }
}
