//! Cycle driver.
//!
//! Per cycle per symbol: snapshot → quant ∥ predict ∥ regime ∥ position →
//! decision → risk audit → dispatch. Symbols run in parallel inside a
//! cycle; cycles for one symbol are strictly serial, and the next cycle
//! only starts after every dispatch of the previous one was acknowledged.
//! A failure in one symbol never aborts the others.

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::adapters::source::{MarketDataSource, OrderSink, PositionInfo};
use crate::agents::advisor::{modulate, ConfidenceAdvisor};
use crate::agents::decision::{DecisionCoreAgent, VoteInput};
use crate::agents::position::PositionAnalyzer;
use crate::agents::predict::PredictAgent;
use crate::agents::quant::QuantAnalystAgent;
use crate::agents::regime::RegimeDetector;
use crate::agents::risk::{RiskAuditAgent, RiskLedgerSnapshot};
use crate::agents::sync::DataSyncAgent;
use crate::config::AppConfig;
use crate::domain::analysis::{TradeAction, VoteResult};
use crate::domain::candle::Timeframe;
use crate::domain::order::{ExecutionRecord, OrderProposal, Side};
use crate::domain::snapshot::{MarketSnapshot, SnapshotSummary};
use crate::error::{HelixError, Result};
use crate::indicators::FeatureSnapshot;
use crate::persistence::{ArtifactKind, ArtifactStore};

use super::idempotency::{DispatchDecision, DispatchGuard};
use super::reconciler::TradeOutcome;

pub struct Orchestrator<S: MarketDataSource + 'static, K: OrderSink + 'static> {
    config: Arc<AppConfig>,
    sync: DataSyncAgent<S>,
    quant: QuantAnalystAgent,
    predict: PredictAgent,
    regime: RegimeDetector,
    position: PositionAnalyzer,
    decision: DecisionCoreAgent,
    risk: RiskAuditAgent,
    sink: Arc<K>,
    advisor: Option<Arc<dyn ConfidenceAdvisor>>,
    artifacts: ArtifactStore,
    dispatch: DispatchGuard,
    ledger_rx: watch::Receiver<RiskLedgerSnapshot>,
    outcome_tx: mpsc::Sender<TradeOutcome>,
    /// Last observed open position per symbol, for close detection
    open_positions: Mutex<HashMap<String, PositionInfo>>,
    /// Symbols whose position state is unknown after exhausted retries;
    /// blocked until reconciliation succeeds
    quarantined: Mutex<HashSet<String>>,
}

impl<S: MarketDataSource, K: OrderSink> Orchestrator<S, K> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        source: Arc<S>,
        sink: Arc<K>,
        predict: PredictAgent,
        advisor: Option<Arc<dyn ConfidenceAdvisor>>,
        ledger_rx: watch::Receiver<RiskLedgerSnapshot>,
        outcome_tx: mpsc::Sender<TradeOutcome>,
    ) -> Self {
        let sync = DataSyncAgent::new(
            source,
            config.timeouts.clone(),
            config.engine.kline_limit,
        );
        Self {
            sync,
            quant: QuantAnalystAgent::new(),
            predict,
            regime: RegimeDetector::new(),
            position: PositionAnalyzer::new(),
            decision: DecisionCoreAgent::default(),
            risk: RiskAuditAgent::new(config.risk.clone()),
            sink,
            advisor,
            artifacts: ArtifactStore::new(config.persistence.artifact_dir.clone()),
            dispatch: DispatchGuard::new(),
            ledger_rx,
            outcome_tx,
            open_positions: Mutex::new(HashMap::new()),
            quarantined: Mutex::new(HashSet::new()),
            config,
        }
    }

    /// Live loop: one cycle per interval until shutdown flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.engine.cycle_interval_secs,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            symbols = ?self.config.engine.symbols,
            interval_secs = self.config.engine.cycle_interval_secs,
            dry_run = self.config.dry_run.enabled,
            "orchestrator starting"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.clone().run_cycle().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("orchestrator stopped");
        Ok(())
    }

    /// One decision cycle over every configured symbol.
    pub async fn run_cycle(self: Arc<Self>) {
        let mut tasks = JoinSet::new();
        for symbol in self.config.engine.symbols.clone() {
            let this = self.clone();
            tasks.spawn(async move {
                let outcome = this.run_symbol(&symbol).await;
                (symbol, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((symbol, Err(e))) => {
                    error!(symbol, error = %e, "symbol cycle failed");
                }
                Err(e) => {
                    error!(error = %e, "symbol task panicked");
                }
            }
        }
    }

    async fn run_symbol(&self, symbol: &str) -> Result<()> {
        self.reconcile_position(symbol).await;

        if self.quarantined.lock().expect("quarantine lock").contains(symbol) {
            warn!(symbol, "position state unknown, skipping until reconciled");
            return Ok(());
        }

        let snapshot = match self.sync.fetch(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_cycle_scoped() => {
                warn!(symbol, component = "data_sync", error = %e, "cycle degraded to hold");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let snapshot_id = snapshot.snapshot_id.clone();

        self.persist(
            ArtifactKind::Snapshot,
            &snapshot_id,
            &SnapshotSummary::from(&snapshot),
        );
        for tf in Timeframe::ALL {
            let view = snapshot.view(tf);
            self.persist(
                ArtifactKind::Frame,
                &snapshot_id,
                &json!({
                    "tf": tf.as_str(),
                    "live": view.live,
                    "stale_live": view.stale_live,
                    "frame": view.stable,
                }),
            );
        }

        if !snapshot.alignment_ok {
            warn!(symbol, snapshot_id, "snapshot misaligned, forcing hold");
            self.persist(
                ArtifactKind::Decision,
                &snapshot_id,
                &json!({ "action": "hold", "reason": "snapshot misaligned" }),
            );
            return Ok(());
        }

        let vote = self.decide(&snapshot).await;
        self.persist(ArtifactKind::Decision, &snapshot_id, &vote);

        if vote.action == TradeAction::Hold {
            debug!(symbol, snapshot_id, reason = %vote.reason, "holding");
            return Ok(());
        }

        let balance = match self.fetch_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(symbol, component = "order_sink", error = %e, "no balance, holding");
                return Ok(());
            }
        };

        let Some(proposal) = self.build_proposal(&snapshot, &vote, balance) else {
            warn!(symbol, snapshot_id, "could not size a proposal, holding");
            return Ok(());
        };

        // The risk audit is deterministic and never retried; a failed audit
        // means no sink call at all.
        let audit = self
            .risk
            .audit(&proposal, balance, &self.ledger_rx.borrow().clone());
        self.persist(ArtifactKind::RiskAudit, &snapshot_id, &audit);

        if !audit.passed {
            let reason = audit
                .blocked_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unspecified".to_string());
            info!(symbol, snapshot_id, %reason, "risk audit blocked order");
            return Ok(());
        }

        let stop_loss = audit
            .effective_stop(&proposal)
            .expect("passed audits always carry a stop");
        self.dispatch_order(&proposal, stop_loss).await
    }

    /// Detect externally closed positions and publish their outcomes; a
    /// successful position read also clears any quarantine.
    async fn reconcile_position(&self, symbol: &str) {
        let current = match self.sink.get_position(symbol).await {
            Ok(position) => position,
            Err(e) => {
                debug!(symbol, error = %e, "position probe failed");
                return;
            }
        };

        self.quarantined.lock().expect("quarantine lock").remove(symbol);

        let previous = {
            let mut open = self.open_positions.lock().expect("positions lock");
            match &current {
                Some(position) => {
                    open.insert(symbol.to_string(), position.clone());
                    return;
                }
                None => open.remove(symbol),
            }
        };

        if let Some(closed) = previous {
            info!(symbol, pnl = %closed.unrealized_pnl, "position closed, reporting outcome");
            let outcome = TradeOutcome {
                symbol: symbol.to_string(),
                pnl: closed.unrealized_pnl,
                closed_at: Utc::now(),
            };
            if self.outcome_tx.send(outcome).await.is_err() {
                warn!(symbol, "reconciler gone, outcome dropped");
            }
        }
    }

    /// Quant, predictor, regime and position join at the decision core.
    async fn decide(&self, snapshot: &MarketSnapshot) -> VoteResult {
        let quant = self.quant.analyze(snapshot);
        self.persist(ArtifactKind::Quant, &snapshot.snapshot_id, &quant);

        let features = match FeatureSnapshot::extract(&snapshot.m5.stable) {
            Ok(features) => {
                self.persist(ArtifactKind::Features, &snapshot.snapshot_id, &features);
                Some(features)
            }
            Err(e) => {
                warn!(
                    symbol = %snapshot.symbol,
                    snapshot_id = %snapshot.snapshot_id,
                    component = "features",
                    error = %e,
                    "feature extraction failed, predictor falls back"
                );
                None
            }
        };
        let prediction = self.predict.predict(features.as_ref(), quant.composite).await;
        self.persist(ArtifactKind::Prediction, &snapshot.snapshot_id, &prediction);

        let regime = self.regime.detect(&snapshot.h1.stable);
        let position = self.position.analyze(&snapshot.h1.stable);

        let vote = self.decision.decide(&VoteInput {
            quant: &quant,
            prediction: Some(&prediction),
            regime: &regime,
            position: &position,
            netflow_1h: snapshot.netflow_1h,
        });

        match &self.advisor {
            Some(advisor) if self.config.advisor.enabled => {
                modulate(
                    advisor.as_ref(),
                    vote,
                    Duration::from_millis(self.timeouts().advisor_ms),
                )
                .await
            }
            _ => vote,
        }
    }

    /// Size the order and derive ATR-based stop / take-profit levels.
    fn build_proposal(
        &self,
        snapshot: &MarketSnapshot,
        vote: &VoteResult,
        balance: Decimal,
    ) -> Option<OrderProposal> {
        let trading = &self.config.trading;
        let frame = &snapshot.m5.stable;
        let entry = snapshot.m5.live.close;
        if entry <= Decimal::ZERO || balance <= Decimal::ZERO {
            return None;
        }

        let close = frame.last_close();
        let atr = frame.atr_14[frame.last_index()];
        if !(atr.is_finite() && close > 0.0) {
            return None;
        }

        // Stop distance: ATR multiple, clamped into the auditable band
        let min_frac = decimal_to_f64(self.config.risk.min_stop_distance_pct);
        let max_frac = decimal_to_f64(self.config.risk.max_stop_distance_pct);
        let stop_frac = (atr / close * trading.atr_stop_mult).clamp(min_frac, max_frac);
        let stop_offset = entry * Decimal::from_f64(stop_frac)?;
        let profit_offset = entry * Decimal::from_f64(stop_frac * trading.take_profit_rr)?;

        let (stop_loss, take_profit) = match vote.action {
            TradeAction::Long => (entry - stop_offset, entry + profit_offset),
            TradeAction::Short => (entry + stop_offset, entry - profit_offset),
            TradeAction::Hold => return None,
        };

        let notional = balance * trading.position_size_pct;
        let quantity = (notional / entry).round_dp(6);
        if quantity <= Decimal::ZERO {
            return None;
        }

        Some(OrderProposal {
            snapshot_id: snapshot.snapshot_id.clone(),
            symbol: snapshot.symbol.clone(),
            action: vote.action,
            entry_price: entry,
            quantity,
            leverage: trading.leverage,
            stop_loss: Some(stop_loss.round_dp(8)),
            take_profit: Some(take_profit.round_dp(8)),
        })
    }

    /// Idempotent dispatch with bounded retries; exhausted retries
    /// quarantine the symbol until the next successful position probe.
    async fn dispatch_order(&self, proposal: &OrderProposal, stop_loss: Decimal) -> Result<()> {
        let key = DispatchGuard::key(&proposal.snapshot_id, &proposal.symbol);
        match self.dispatch.begin(&key) {
            DispatchDecision::Duplicate { order_id } => {
                warn!(
                    symbol = %proposal.symbol,
                    snapshot_id = %proposal.snapshot_id,
                    ?order_id,
                    "order already dispatched for this snapshot"
                );
                return Ok(());
            }
            DispatchDecision::New => {}
        }

        let side = Side::from_action(proposal.action).expect("audited proposals are directional");
        let client_order_id = DispatchGuard::client_order_id(&key);
        let budget = Duration::from_millis(self.timeouts().order_ms);

        if let Err(e) = self
            .sink
            .set_leverage(&proposal.symbol, proposal.leverage)
            .await
        {
            // Leverage may already be set from a previous session
            warn!(symbol = %proposal.symbol, error = %e, "set_leverage failed, continuing");
        }

        let mut order_id: Option<String> = None;
        for attempt in 0..self.config.trading.max_order_retries {
            let placed = tokio::time::timeout(
                budget,
                self.sink.place_market(
                    &proposal.symbol,
                    side,
                    proposal.quantity,
                    &client_order_id,
                ),
            )
            .await;

            match placed {
                Ok(Ok(id)) => {
                    order_id = Some(id);
                    break;
                }
                Ok(Err(e)) => warn!(
                    symbol = %proposal.symbol,
                    attempt,
                    error = %e,
                    "order submission failed"
                ),
                Err(_) => warn!(
                    symbol = %proposal.symbol,
                    attempt,
                    timeout_ms = self.timeouts().order_ms,
                    "order submission timed out"
                ),
            }
            tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt))).await;
        }

        let Some(order_id) = order_id else {
            self.dispatch.fail(&key);
            self.quarantined
                .lock()
                .expect("quarantine lock")
                .insert(proposal.symbol.clone());
            return Err(HelixError::Exec(format!(
                "{}: retries exhausted, position state unknown",
                proposal.symbol
            )));
        };

        if let Err(e) = self
            .sink
            .attach_stops(&proposal.symbol, &order_id, stop_loss, proposal.take_profit)
            .await
        {
            // Order is live without protection; surface loudly but keep the
            // dispatch recorded.
            error!(symbol = %proposal.symbol, order_id, error = %e, "attaching stops failed");
        }

        self.dispatch.complete(&key, &order_id);

        let record = ExecutionRecord {
            snapshot_id: proposal.snapshot_id.clone(),
            symbol: proposal.symbol.clone(),
            side,
            quantity: proposal.quantity,
            entry_price: proposal.entry_price,
            stop_loss,
            take_profit: proposal.take_profit,
            leverage: proposal.leverage,
            order_id: order_id.clone(),
            dispatched_at: Utc::now(),
            dry_run: self.config.dry_run.enabled,
        };
        self.persist(ArtifactKind::Execution, &proposal.snapshot_id, &record);

        // Remember the opened position so a later disappearance becomes a
        // trade outcome even if the exchange probe lags.
        self.open_positions
            .lock()
            .expect("positions lock")
            .insert(
                proposal.symbol.clone(),
                PositionInfo {
                    symbol: proposal.symbol.clone(),
                    side,
                    quantity: proposal.quantity,
                    entry_price: proposal.entry_price,
                    unrealized_pnl: Decimal::ZERO,
                },
            );

        info!(
            symbol = %proposal.symbol,
            snapshot_id = %proposal.snapshot_id,
            %side,
            quantity = %proposal.quantity,
            %stop_loss,
            order_id,
            "order dispatched"
        );
        Ok(())
    }

    async fn fetch_balance(&self) -> Result<Decimal> {
        let budget = Duration::from_millis(self.timeouts().order_ms);
        match tokio::time::timeout(budget, self.sink.get_balance()).await {
            Ok(result) => result,
            Err(_) => Err(HelixError::Timeout("balance fetch".to_string())),
        }
    }

    fn timeouts(&self) -> &crate::config::TimeoutConfig {
        &self.config.timeouts
    }

    fn persist<T: serde::Serialize>(&self, kind: ArtifactKind, snapshot_id: &str, data: &T) {
        if let Err(e) = self.artifacts.append(kind, snapshot_id, data) {
            warn!(snapshot_id, kind = kind.file_stem(), error = %e, "artifact write failed");
        }
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
