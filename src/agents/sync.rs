//! Synchronized multi-timeframe snapshot assembly.
//!
//! All three kline fetches and the auxiliary metrics go out concurrently.
//! Kline failures abort the cycle; auxiliary failures degrade to missing
//! inputs. The resulting snapshot is immutable and replay-safe.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::source::MarketDataSource;
use crate::config::TimeoutConfig;
use crate::domain::candle::{Candle, KlineValidator, Timeframe, MIN_SERIES_LEN};
use crate::domain::snapshot::{MarketSnapshot, OpenInterest, TimeframeView};
use crate::error::{HelixError, Result};
use crate::indicators::IndicatorProcessor;

pub struct DataSyncAgent<S: MarketDataSource> {
    source: Arc<S>,
    processor: IndicatorProcessor,
    timeouts: TimeoutConfig,
    kline_limit: usize,
}

impl<S: MarketDataSource> DataSyncAgent<S> {
    pub fn new(source: Arc<S>, timeouts: TimeoutConfig, kline_limit: usize) -> Self {
        Self {
            source,
            processor: IndicatorProcessor::new(),
            timeouts,
            kline_limit,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Assemble one snapshot for a symbol at the source's current time.
    pub async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot> {
        let now = self.source.current_time();

        let (m5_raw, m15_raw, h1_raw, funding, open_interest, netflow) = tokio::join!(
            self.fetch_klines(symbol, Timeframe::M5),
            self.fetch_klines(symbol, Timeframe::M15),
            self.fetch_klines(symbol, Timeframe::H1),
            self.fetch_funding(symbol),
            self.fetch_open_interest(symbol),
            self.fetch_netflow(symbol),
        );

        let mut warnings = Vec::new();
        let m5 = self.build_view(symbol, Timeframe::M5, m5_raw?, now, &mut warnings)?;
        let m15 = self.build_view(symbol, Timeframe::M15, m15_raw?, now, &mut warnings)?;
        let h1 = self.build_view(symbol, Timeframe::H1, h1_raw?, now, &mut warnings)?;

        let alignment_ok = MarketSnapshot::check_alignment(
            m5.stable.last_close_time(),
            m15.stable.last_close_time(),
            h1.stable.last_close_time(),
            now,
        );
        if !alignment_ok {
            warn!(
                symbol,
                stable_5m = %m5.stable.last_close_time(),
                stable_15m = %m15.stable.last_close_time(),
                stable_1h = %h1.stable.last_close_time(),
                %now,
                "snapshot misaligned; consumers must treat it as non-decisive"
            );
        }

        let snapshot_id = MarketSnapshot::make_id(symbol, m5.stable.last_close_time());
        debug!(symbol, snapshot_id, alignment_ok, "snapshot assembled");

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            m5,
            m15,
            h1,
            funding_rate: funding,
            open_interest,
            netflow_1h: netflow,
            timestamp: now,
            alignment_ok,
            warnings,
            snapshot_id,
        })
    }

    /// Split the validated series into stable + live and compute the frame.
    fn build_view(
        &self,
        symbol: &str,
        tf: Timeframe,
        raw: Vec<Candle>,
        now: DateTime<Utc>,
        warnings: &mut Vec<String>,
    ) -> Result<TimeframeView> {
        let validated = KlineValidator::validate(symbol, tf, raw)?;
        let (live, stable) = validated
            .split_last()
            .expect("validator guarantees a non-empty series");

        if stable.len() < MIN_SERIES_LEN {
            return Err(HelixError::InsufficientData(format!(
                "{symbol} {tf}: {} stable candles after live split, need {MIN_SERIES_LEN}",
                stable.len()
            )));
        }

        // A live candle older than one period means the exchange has not
        // yet emitted a fresh one.
        let stale_live = now - live.open_time > tf.duration();
        if stale_live {
            warnings.push(format!(
                "{tf}: live candle opened {} is stale at {now}",
                live.open_time
            ));
        }

        // The live candle must be the immediate successor of the stable
        // series; a hole between them means dropped data upstream.
        if let Some(last_stable) = stable.last() {
            if live.open_time - last_stable.close_time > chrono::Duration::seconds(1) {
                warnings.push(format!(
                    "{tf}: gap between stable close {} and live open {}",
                    last_stable.close_time, live.open_time
                ));
            }
        }

        Ok(TimeframeView {
            stable: self.processor.process(stable)?,
            live: live.clone(),
            stale_live,
        })
    }

    async fn fetch_klines(&self, symbol: &str, tf: Timeframe) -> Result<Vec<Candle>> {
        let budget = Duration::from_millis(self.timeouts.klines_ms);
        match tokio::time::timeout(budget, self.source.get_klines(symbol, tf, self.kline_limit))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HelixError::Timeout(format!(
                "{symbol} {tf} klines after {}ms",
                self.timeouts.klines_ms
            ))),
        }
    }

    async fn fetch_funding(&self, symbol: &str) -> Option<f64> {
        self.fetch_aux(symbol, "funding rate", self.source.get_funding_rate(symbol))
            .await
    }

    async fn fetch_open_interest(&self, symbol: &str) -> Option<OpenInterest> {
        self.fetch_aux(symbol, "open interest", self.source.get_open_interest(symbol))
            .await
    }

    async fn fetch_netflow(&self, symbol: &str) -> Option<f64> {
        self.fetch_aux(
            symbol,
            "institutional netflow",
            self.source.get_institutional_netflow(symbol),
        )
        .await
    }

    /// Auxiliary metrics are best-effort: timeouts and errors become None.
    async fn fetch_aux<T>(
        &self,
        symbol: &str,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Option<T> {
        let budget = Duration::from_millis(self.timeouts.aux_ms);
        match tokio::time::timeout(budget, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(symbol, what, error = %e, "auxiliary metric unavailable");
                None
            }
            Err(_) => {
                warn!(symbol, what, timeout_ms = self.timeouts.aux_ms, "auxiliary metric timed out");
                None
            }
        }
    }
}
