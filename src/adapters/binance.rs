//! Binance USDⓈ-M futures REST adapter.
//!
//! Implements both boundary traits. All signed endpoints use HMAC-SHA256
//! query signatures; every request goes through a shared back-off wrapper
//! that honors HTTP 429/418 with exponential, jittered sleeps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ExchangeConfig;
use crate::domain::candle::{Candle, Timeframe};
use crate::domain::order::Side;
use crate::domain::snapshot::OpenInterest;
use crate::error::{HelixError, Result};

use super::source::{MarketDataSource, OrderSink, PositionInfo};

type HmacSha256 = Hmac<Sha256>;

const MAX_BACKOFF_ATTEMPTS: u32 = 4;
const BACKOFF_BASE_MS: u64 = 500;

/// Binance futures REST client
pub struct BinanceFuturesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    netflow_url: Option<String>,
    dry_run: bool,
}

impl BinanceFuturesClient {
    pub fn new(config: &ExchangeConfig, dry_run: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(HelixError::Http)?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            netflow_url: config.netflow_url.clone(),
            dry_run,
        })
    }

    /// Execute a public (unsigned) GET with 429 back-off.
    async fn get_public(&self, path: &str, query: &str) -> Result<serde_json::Value> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        self.send_with_backoff(Method::GET, &url, None).await
    }

    /// Execute a signed request with 429 back-off.
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        query: &str,
    ) -> Result<serde_json::Value> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            HelixError::ConfigInvalid("signed endpoint requires exchange.api_key".to_string())
        })?;
        let secret = self.api_secret.as_deref().ok_or_else(|| {
            HelixError::ConfigInvalid("signed endpoint requires exchange.api_secret".to_string())
        })?;

        let timestamp = Utc::now().timestamp_millis();
        let payload = if query.is_empty() {
            format!("timestamp={timestamp}")
        } else {
            format!("{query}&timestamp={timestamp}")
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| HelixError::Internal(format!("HMAC init failed: {e}")))?;
        mac.update(payload.as_bytes());
        let signature = mac
            .finalize()
            .into_bytes()
            .iter()
            .fold(String::with_capacity(64), |mut acc, b| {
                use std::fmt::Write;
                let _ = write!(acc, "{b:02x}");
                acc
            });

        let url = format!("{}{}?{}&signature={}", self.base_url, path, payload, signature);
        self.send_with_backoff(method, &url, Some(api_key)).await
    }

    async fn send_with_backoff(
        &self,
        method: Method,
        url: &str,
        api_key: Option<&str>,
    ) -> Result<serde_json::Value> {
        for attempt in 0..MAX_BACKOFF_ATTEMPTS {
            let mut request = self.http.request(method.clone(), url);
            if let Some(key) = api_key {
                request = request.header("X-MBX-APIKEY", key);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                let sleep_ms = BACKOFF_BASE_MS * 2u64.pow(attempt)
                    + rand::thread_rng().gen_range(0..250);
                warn!(url, attempt, sleep_ms, "rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(HelixError::Fetch(format!("{url} -> {status}: {body}")));
            }

            return Ok(response.json::<serde_json::Value>().await?);
        }

        Err(HelixError::RateLimited(format!(
            "{url}: still throttled after {MAX_BACKOFF_ATTEMPTS} attempts"
        )))
    }

    /// Parse one kline row from the exchange's array-of-arrays response
    fn parse_kline_row(row: &[serde_json::Value]) -> Option<Candle> {
        if row.len() < 7 {
            return None;
        }
        let open_time = DateTime::from_timestamp_millis(row[0].as_i64()?)?;
        let close_time = DateTime::from_timestamp_millis(row[6].as_i64()?)?;
        Some(Candle {
            open_time,
            open: row[1].as_str()?.parse().ok()?,
            high: row[2].as_str()?.parse().ok()?,
            low: row[3].as_str()?.parse().ok()?,
            close: row[4].as_str()?.parse().ok()?,
            volume: row[5].as_str()?.parse().ok()?,
            close_time,
        })
    }

    fn decimal_field(value: &serde_json::Value, field: &str) -> Option<f64> {
        value.get(field)?.as_str()?.parse::<f64>().ok()
    }
}

#[async_trait]
impl MarketDataSource for BinanceFuturesClient {
    async fn get_klines(&self, symbol: &str, tf: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let query = format!(
            "symbol={}&interval={}&limit={}",
            symbol,
            tf.as_str(),
            limit.min(1000)
        );
        let data = self.get_public("/fapi/v1/klines", &query).await?;
        let rows = data
            .as_array()
            .ok_or_else(|| HelixError::Fetch(format!("{symbol} {tf}: klines not an array")))?;

        let candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| row.as_array().and_then(|r| Self::parse_kline_row(r)))
            .collect();

        debug!(symbol, tf = %tf, count = candles.len(), "fetched klines");
        Ok(candles)
    }

    async fn get_funding_rate(&self, symbol: &str) -> Result<f64> {
        let data = self
            .get_public("/fapi/v1/premiumIndex", &format!("symbol={symbol}"))
            .await?;
        Self::decimal_field(&data, "lastFundingRate")
            .ok_or_else(|| HelixError::Fetch(format!("{symbol}: missing lastFundingRate")))
    }

    async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterest> {
        // 25 hourly points span the 24h comparison window
        let query = format!("symbol={symbol}&period=1h&limit=25");
        let data = self
            .get_public("/futures/data/openInterestHist", &query)
            .await?;
        let rows = data
            .as_array()
            .filter(|rows| rows.len() >= 2)
            .ok_or_else(|| HelixError::Fetch(format!("{symbol}: open interest history empty")))?;

        let first = Self::decimal_field(&rows[0], "sumOpenInterest");
        let last = Self::decimal_field(&rows[rows.len() - 1], "sumOpenInterest");
        match (first, last) {
            (Some(value_24h_ago), Some(current)) => Ok(OpenInterest {
                current,
                value_24h_ago,
            }),
            _ => Err(HelixError::Fetch(format!(
                "{symbol}: unparsable open interest rows"
            ))),
        }
    }

    async fn get_institutional_netflow(&self, symbol: &str) -> Result<f64> {
        let base = self.netflow_url.as_deref().ok_or_else(|| {
            HelixError::Fetch("no netflow provider configured".to_string())
        })?;
        let url = format!("{}?symbol={}&window=1h", base.trim_end_matches('/'), symbol);
        let data = self.send_with_backoff(Method::GET, &url, None).await?;
        data.get("netflow_usd")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HelixError::Fetch(format!("{symbol}: netflow payload missing field")))
    }
}

#[async_trait]
impl OrderSink for BinanceFuturesClient {
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if self.dry_run {
            debug!(symbol, leverage, "dry-run: set_leverage skipped");
            return Ok(());
        }
        let query = format!("symbol={symbol}&leverage={leverage}");
        self.send_signed(Method::POST, "/fapi/v1/leverage", &query)
            .await?;
        Ok(())
    }

    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        client_order_id: &str,
    ) -> Result<String> {
        if self.dry_run {
            let order_id = format!("dry-{}", Uuid::new_v4());
            debug!(symbol, %side, %quantity, client_order_id, order_id, "dry-run: market order");
            return Ok(order_id);
        }
        let query = format!(
            "symbol={symbol}&side={side}&type=MARKET&quantity={quantity}&newClientOrderId={client_order_id}"
        );
        let data = self.send_signed(Method::POST, "/fapi/v1/order", &query).await?;
        data.get("orderId")
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string())
            .ok_or_else(|| HelixError::Exec(format!("{symbol}: order response missing orderId")))
    }

    async fn attach_stops(
        &self,
        symbol: &str,
        order_id: &str,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<()> {
        if self.dry_run {
            debug!(symbol, order_id, %stop_loss, ?take_profit, "dry-run: attach_stops skipped");
            return Ok(());
        }

        // Stop orders close the position, so their side opposes the entry.
        let position = self.get_position(symbol).await?.ok_or_else(|| {
            HelixError::Exec(format!("{symbol}: no position found to attach stops"))
        })?;
        let close_side = match position.side {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        };

        let query = format!(
            "symbol={symbol}&side={close_side}&type=STOP_MARKET&stopPrice={stop_loss}&closePosition=true"
        );
        self.send_signed(Method::POST, "/fapi/v1/order", &query).await?;

        if let Some(tp) = take_profit {
            let query = format!(
                "symbol={symbol}&side={close_side}&type=TAKE_PROFIT_MARKET&stopPrice={tp}&closePosition=true"
            );
            self.send_signed(Method::POST, "/fapi/v1/order", &query).await?;
        }
        Ok(())
    }

    async fn get_balance(&self) -> Result<Decimal> {
        let data = self.send_signed(Method::GET, "/fapi/v2/balance", "").await?;
        let rows = data
            .as_array()
            .ok_or_else(|| HelixError::Fetch("balance response not an array".to_string()))?;
        for row in rows {
            if row.get("asset").and_then(|v| v.as_str()) == Some("USDT") {
                let balance = row
                    .get("availableBalance")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Decimal::from_str(s).ok());
                if let Some(balance) = balance {
                    return Ok(balance);
                }
            }
        }
        Err(HelixError::Fetch("USDT balance not found".to_string()))
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<PositionInfo>> {
        let data = self
            .send_signed(Method::GET, "/fapi/v2/positionRisk", &format!("symbol={symbol}"))
            .await?;
        let rows = data
            .as_array()
            .ok_or_else(|| HelixError::Fetch("positionRisk response not an array".to_string()))?;

        for row in rows {
            let qty = row
                .get("positionAmt")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            if qty.is_zero() {
                continue;
            }
            let entry_price = row
                .get("entryPrice")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            let unrealized_pnl = row
                .get("unRealizedProfit")
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            return Ok(Some(PositionInfo {
                symbol: symbol.to_string(),
                side: if qty > Decimal::ZERO { Side::Buy } else { Side::Sell },
                quantity: qty.abs(),
                entry_price,
                unrealized_pnl,
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_kline_row() {
        let row = vec![
            json!(1700000000000_i64),
            json!("100.5"),
            json!("101.0"),
            json!("99.5"),
            json!("100.8"),
            json!("1234.5"),
            json!(1700000299999_i64),
        ];
        let candle = BinanceFuturesClient::parse_kline_row(&row).unwrap();
        assert_eq!(candle.close, Decimal::from_str("100.8").unwrap());
        assert!(candle.close_time > candle.open_time);
    }

    #[test]
    fn rejects_short_kline_row() {
        let row = vec![json!(1700000000000_i64), json!("100.5")];
        assert!(BinanceFuturesClient::parse_kline_row(&row).is_none());
    }

    #[test]
    fn decimal_field_reads_string_numbers() {
        let value = json!({"lastFundingRate": "0.000125"});
        let parsed = BinanceFuturesClient::decimal_field(&value, "lastFundingRate").unwrap();
        assert!((parsed - 0.000125).abs() < 1e-12);
        assert!(BinanceFuturesClient::decimal_field(&value, "missing").is_none());
    }
}
