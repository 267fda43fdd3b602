//! End-to-end pipeline scenarios over the replay source and stub sink.
//!
//! The exact same orchestrator that runs live is driven here against
//! scripted market data, which is what keeps backtests honest: no
//! lookahead, no live-only code paths.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use helix::adapters::replay::{ReplaySource, SinkCall, StubOrderSink};
use helix::adapters::OrderSink;
use helix::agents::risk::RiskLedgerSnapshot;
use helix::agents::PredictAgent;
use helix::config::AppConfig;
use helix::domain::candle::{Candle, Timeframe};
use helix::domain::order::Side;
use helix::engine::reconciler::TradeOutcome;
use helix::engine::Orchestrator;

const SYMBOL: &str = "BTCUSDT";

fn anchor() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Candle series ending with a live candle half a period old at `now`.
fn series(
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
            let high = close.max(open) * 1.001;
            let low = close.min(open) * 0.999;
            Candle {
                open_time,
                open: dec(open),
                high: dec(high),
                low: dec(low),
                close: dec(close),
                volume: dec!(30),
                close_time: open_time + period - ChronoDuration::milliseconds(1),
            }
        })
        .collect()
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap()
}

/// Flat base, an old hump peaking well above the finish, then a sharp rise
/// over the final bars: a fresh breakout of the recent 20-bar high with
/// expanding MACD histogram and a live candle above the last close, while
/// the old hump keeps the finish inside the middle of the 96-bar range so
/// the position gate stays open.
fn bullish_breakout(len: usize) -> impl Fn(usize) -> f64 + Copy {
    move |k| {
        let rise_start = len - 9;
        if k >= rise_start {
            100.0 + (k - rise_start + 1) as f64 * 0.8
        } else if (150..170).contains(&k) {
            let t = (if k < 160 { k - 150 } else { 170 - k }) as f64;
            100.0 + t * 1.5
        } else {
            100.0
        }
    }
}

/// Replay source scripted for a strong long: breakout candles on every
/// timeframe, institutional inflow, shorts paying funding.
fn bullish_source(now: DateTime<Utc>) -> ReplaySource {
    let mut source = ReplaySource::new(now);
    for tf in Timeframe::ALL {
        source.insert_series(SYMBOL, tf, series(tf, 240, now, bullish_breakout(240)));
    }
    source.set_netflow(SYMBOL, 5_000_000.0);
    source.set_funding_rate(SYMBOL, -0.0005);
    source
}

struct Stack {
    orchestrator: Arc<Orchestrator<ReplaySource, StubOrderSink>>,
    sink: Arc<StubOrderSink>,
    #[allow(dead_code)]
    outcome_rx: mpsc::Receiver<TradeOutcome>,
    artifact_dir: tempfile::TempDir,
}

fn stack(source: ReplaySource, balance: Decimal, ledger: RiskLedgerSnapshot) -> Stack {
    let artifact_dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default_config(true, vec![SYMBOL.to_string()]);
    config.persistence.artifact_dir = artifact_dir.path().to_string_lossy().to_string();

    let sink = Arc::new(StubOrderSink::new(balance));
    let (_ledger_tx, ledger_rx) = watch::channel(ledger);
    let (outcome_tx, outcome_rx) = mpsc::channel(64);

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(config),
        Arc::new(source),
        sink.clone(),
        PredictAgent::new(None, Duration::from_millis(2000)),
        None,
        ledger_rx,
        outcome_tx,
    ));

    Stack {
        orchestrator,
        sink,
        outcome_rx,
        artifact_dir,
    }
}

/// Read the `data` payloads of one artifact kind, in append order.
fn artifact_data(root: &Path, stem: &str) -> Vec<Value> {
    let mut lines = Vec::new();
    if let Ok(dates) = std::fs::read_dir(root) {
        for date in dates.flatten() {
            let path = date.path().join(format!("{stem}.jsonl"));
            if let Ok(content) = std::fs::read_to_string(path) {
                for line in content.lines() {
                    let value: Value = serde_json::from_str(line).unwrap();
                    lines.push(value["data"].clone());
                }
            }
        }
    }
    lines
}

#[tokio::test]
async fn breakout_dispatches_protected_long() {
    let stack = stack(
        bullish_source(anchor()),
        dec!(10_000),
        RiskLedgerSnapshot::default(),
    );
    stack.orchestrator.clone().run_cycle().await;

    let calls = stack.sink.calls();
    assert_eq!(stack.sink.order_count(), 1, "exactly one order: {calls:?}");

    let mut entry_side = None;
    let mut stop_price = None;
    for call in &calls {
        match call {
            SinkCall::PlaceMarket { side, symbol, .. } => {
                assert_eq!(symbol, SYMBOL);
                entry_side = Some(*side);
            }
            SinkCall::AttachStops { stop_loss, take_profit, .. } => {
                stop_price = Some(*stop_loss);
                assert!(take_profit.is_some());
            }
            SinkCall::SetLeverage { leverage, .. } => assert_eq!(*leverage, 3),
        }
    }
    assert_eq!(entry_side, Some(Side::Buy));

    // Long stops sit below entry
    let decisions = artifact_data(stack.artifact_dir.path(), "decisions");
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["action"], "long");

    let executions = artifact_data(stack.artifact_dir.path(), "executions");
    assert_eq!(executions.len(), 1);
    let entry: f64 = executions[0]["entry_price"].as_str().unwrap().parse().unwrap();
    let stop: f64 = executions[0]["stop_loss"].as_str().unwrap().parse().unwrap();
    assert!(stop < entry, "long stop {stop} must sit below entry {entry}");
    assert_eq!(
        stop,
        stop_price.unwrap().to_string().parse::<f64>().unwrap()
    );
}

#[tokio::test]
async fn same_snapshot_never_dispatches_twice() {
    let stack = stack(
        bullish_source(anchor()),
        dec!(10_000),
        RiskLedgerSnapshot::default(),
    );

    // Two cycles without advancing the replay cursor: identical snapshot_id
    stack.orchestrator.clone().run_cycle().await;
    stack.orchestrator.clone().run_cycle().await;

    assert_eq!(stack.sink.order_count(), 1);
}

#[tokio::test]
async fn risk_veto_blocks_the_sink_entirely() {
    // Drawdown past the stop-trading gate: decision still computes, the
    // audit fails, and not a single sink call goes out.
    let stack = stack(
        bullish_source(anchor()),
        dec!(10_000),
        RiskLedgerSnapshot {
            drawdown_pct: dec!(0.15),
            consecutive_losses: 0,
        },
    );
    stack.orchestrator.clone().run_cycle().await;

    assert!(stack.sink.calls().is_empty(), "no sink calls after a veto");

    let decisions = artifact_data(stack.artifact_dir.path(), "decisions");
    assert_eq!(decisions[0]["action"], "long");

    let audits = artifact_data(stack.artifact_dir.path(), "risk_audits");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0]["passed"], false);
    assert!(audits[0]["blocked_reason"]["Drawdown"].is_object());
}

#[tokio::test]
async fn cooldown_gate_blocks_after_loss_streak() {
    let stack = stack(
        bullish_source(anchor()),
        dec!(10_000),
        RiskLedgerSnapshot {
            drawdown_pct: Decimal::ZERO,
            consecutive_losses: 5,
        },
    );
    stack.orchestrator.clone().run_cycle().await;

    assert!(stack.sink.calls().is_empty());
    let audits = artifact_data(stack.artifact_dir.path(), "risk_audits");
    assert!(audits[0]["blocked_reason"]["Cooldown"].is_object());
}

#[tokio::test]
async fn misaligned_snapshot_degrades_to_hold() {
    // All series end hours before the cursor
    let now = anchor();
    let stale = now - ChronoDuration::hours(8);
    let mut source = ReplaySource::new(now);
    for tf in Timeframe::ALL {
        source.insert_series(SYMBOL, tf, series(tf, 240, stale, bullish_breakout(240)));
    }
    source.set_netflow(SYMBOL, 5_000_000.0);

    let stack = stack(source, dec!(10_000), RiskLedgerSnapshot::default());
    stack.orchestrator.clone().run_cycle().await;

    assert!(stack.sink.calls().is_empty());
    let decisions = artifact_data(stack.artifact_dir.path(), "decisions");
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["action"], "hold");
    assert_eq!(decisions[0]["reason"], "snapshot misaligned");

    let snapshots = artifact_data(stack.artifact_dir.path(), "snapshots");
    assert_eq!(snapshots[0]["alignment_ok"], false);
}

#[tokio::test]
async fn missing_aux_metrics_still_produce_a_decision() {
    // No funding, no netflow, no open interest scripted: sentiment drops
    // out and the remaining weights renormalize.
    let now = anchor();
    let mut source = ReplaySource::new(now);
    for tf in Timeframe::ALL {
        source.insert_series(SYMBOL, tf, series(tf, 240, now, bullish_breakout(240)));
    }

    let stack = stack(source, dec!(10_000), RiskLedgerSnapshot::default());
    stack.orchestrator.clone().run_cycle().await;

    let decisions = artifact_data(stack.artifact_dir.path(), "decisions");
    assert_eq!(decisions.len(), 1);

    let details = decisions[0]["vote_details"].as_object().unwrap();
    assert!(!details.contains_key("sentiment"));
    let weight_sum: f64 = details
        .values()
        .map(|v| v["effective_weight"].as_f64().unwrap())
        .sum();
    assert!((weight_sum - 1.0).abs() < 1e-9, "weights renormalize to 1");
}

#[tokio::test]
async fn replay_is_deterministic() {
    // Identical snapshots and a deterministic (fallback) predictor must
    // produce byte-identical decision and audit artifacts.
    let run = |ledger: RiskLedgerSnapshot| async move {
        let stack = stack(bullish_source(anchor()), dec!(10_000), ledger);
        stack.orchestrator.clone().run_cycle().await;
        (
            artifact_data(stack.artifact_dir.path(), "decisions"),
            artifact_data(stack.artifact_dir.path(), "risk_audits"),
            artifact_data(stack.artifact_dir.path(), "quant"),
        )
    };

    let (decisions_a, audits_a, quant_a) = run(RiskLedgerSnapshot::default()).await;
    let (decisions_b, audits_b, quant_b) = run(RiskLedgerSnapshot::default()).await;

    assert_eq!(decisions_a, decisions_b);
    assert_eq!(audits_a, audits_b);
    assert_eq!(quant_a, quant_b);
    assert!(!decisions_a.is_empty());
}

#[tokio::test]
async fn backtest_cursor_controls_visibility() {
    // Advancing the cursor changes the snapshot id: a new decision cycle
    // becomes possible, proving cycles key off replay time, not wall time.
    // The recorded data extends past the starting cursor so fresh candles
    // appear as the cursor moves.
    let now = anchor();
    let mut recorded = ReplaySource::new(now);
    let data_end = now + ChronoDuration::minutes(30);
    for tf in Timeframe::ALL {
        recorded.insert_series(SYMBOL, tf, series(tf, 246, data_end, bullish_breakout(246)));
    }
    recorded.set_netflow(SYMBOL, 5_000_000.0);
    let source = Arc::new(recorded);
    let artifact_dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default_config(true, vec![SYMBOL.to_string()]);
    config.persistence.artifact_dir = artifact_dir.path().to_string_lossy().to_string();

    let sink = Arc::new(StubOrderSink::new(dec!(10_000)));
    let (_ledger_tx, ledger_rx) = watch::channel(RiskLedgerSnapshot::default());
    let (outcome_tx, _outcome_rx) = mpsc::channel(64);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(config),
        source.clone(),
        sink.clone(),
        PredictAgent::new(None, Duration::from_millis(2000)),
        None,
        ledger_rx,
        outcome_tx,
    ));

    orchestrator.clone().run_cycle().await;
    source.advance_to(source.cursor() + ChronoDuration::minutes(5));
    orchestrator.clone().run_cycle().await;

    let snapshots = artifact_data(artifact_dir.path(), "snapshots");
    assert_eq!(snapshots.len(), 2);
    assert_ne!(
        snapshots[0]["snapshot_id"], snapshots[1]["snapshot_id"],
        "a fresh 5m close produces a fresh snapshot id"
    );
}

#[tokio::test]
async fn stub_sink_get_balance_matches_seed() {
    let sink = StubOrderSink::new(dec!(4_321));
    assert_eq!(sink.get_balance().await.unwrap(), dec!(4_321));
}
