//! Boundary traits the decision core consumes.
//!
//! The live exchange client and the backtest replay source both implement
//! these, so the exact same pipeline runs against either.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::candle::{Candle, Timeframe};
use crate::domain::order::Side;
use crate::domain::snapshot::OpenInterest;
use crate::error::Result;

/// Abstract market-state fetch: klines plus auxiliary market metrics.
///
/// Candles must come back in strict chronological order. Auxiliary metrics
/// may fail independently; the sync agent treats those as missing inputs.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_klines(&self, symbol: &str, tf: Timeframe, limit: usize) -> Result<Vec<Candle>>;

    async fn get_funding_rate(&self, symbol: &str) -> Result<f64>;

    async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterest>;

    /// Net institutional flow over the trailing window, USD
    async fn get_institutional_netflow(&self, symbol: &str) -> Result<f64>;

    /// The source's notion of "now". Live sources return wall time; the
    /// replay source returns its cursor so backtests stay deterministic.
    fn current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Order dispatch boundary.
///
/// `place_market` must be idempotent on retry for the same
/// `client_order_id` — the orchestrator derives that id from
/// `(snapshot_id, symbol)` so a retried dispatch yields at most one
/// exchange order.
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Returns the exchange order id
    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<String>;

    /// Attach stop-loss / take-profit triggers to an open position
    async fn attach_stops(
        &self,
        symbol: &str,
        order_id: &str,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<()>;

    async fn get_balance(&self) -> Result<Decimal>;

    async fn get_position(&self, symbol: &str) -> Result<Option<PositionInfo>>;
}
