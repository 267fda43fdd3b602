//! Trade-outcome reconciler.
//!
//! The only writer of the global risk gates. Consumes a stream of closed
//! trade outcomes and publishes immutable ledger snapshots; the risk
//! auditor reads one snapshot per cycle and never mutates it. This keeps
//! the component graph acyclic: decision/risk never write what they read.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::agents::risk::RiskLedgerSnapshot;

/// A closed trade, reported once
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub symbol: String,
    pub pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

pub struct Reconciler {
    outcomes_rx: mpsc::Receiver<TradeOutcome>,
    ledger_tx: watch::Sender<RiskLedgerSnapshot>,
    equity: Decimal,
    peak_equity: Decimal,
    consecutive_losses: u32,
}

impl Reconciler {
    /// Returns the reconciler plus the outcome sender and the ledger
    /// receiver handed to the orchestrator and risk auditor.
    pub fn new(
        initial_equity: Decimal,
    ) -> (
        Self,
        mpsc::Sender<TradeOutcome>,
        watch::Receiver<RiskLedgerSnapshot>,
    ) {
        let (outcomes_tx, outcomes_rx) = mpsc::channel(256);
        let (ledger_tx, ledger_rx) = watch::channel(RiskLedgerSnapshot::default());
        (
            Self {
                outcomes_rx,
                ledger_tx,
                equity: initial_equity,
                peak_equity: initial_equity,
                consecutive_losses: 0,
            },
            outcomes_tx,
            ledger_rx,
        )
    }

    /// Drain outcomes until every sender is dropped.
    pub async fn run(mut self) {
        info!(equity = %self.equity, "reconciler started");
        while let Some(outcome) = self.outcomes_rx.recv().await {
            self.apply(&outcome);
        }
        info!("reconciler stopped");
    }

    fn apply(&mut self, outcome: &TradeOutcome) {
        self.equity += outcome.pnl;
        if self.equity > self.peak_equity {
            self.peak_equity = self.equity;
        }
        if outcome.pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }

        let snapshot = self.snapshot();
        debug!(
            symbol = %outcome.symbol,
            pnl = %outcome.pnl,
            equity = %self.equity,
            drawdown = %snapshot.drawdown_pct,
            losses = snapshot.consecutive_losses,
            "trade outcome reconciled"
        );
        // Receivers may all be gone during shutdown; nothing to do then
        let _ = self.ledger_tx.send(snapshot);
    }

    fn snapshot(&self) -> RiskLedgerSnapshot {
        let drawdown_pct = if self.peak_equity > Decimal::ZERO {
            ((self.peak_equity - self.equity) / self.peak_equity).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        RiskLedgerSnapshot {
            drawdown_pct,
            consecutive_losses: self.consecutive_losses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn outcome(pnl: Decimal) -> TradeOutcome {
        TradeOutcome {
            symbol: "BTCUSDT".to_string(),
            pnl,
            closed_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn tracks_drawdown_and_loss_streak() {
        let (reconciler, tx, ledger) = Reconciler::new(dec!(1000));
        let handle = tokio::spawn(reconciler.run());

        tx.send(outcome(dec!(100))).await.unwrap(); // equity 1100, peak 1100
        tx.send(outcome(dec!(-55))).await.unwrap(); // equity 1045
        tx.send(outcome(dec!(-55))).await.unwrap(); // equity 990
        drop(tx);
        handle.await.unwrap();

        let snapshot = *ledger.borrow();
        assert_eq!(snapshot.consecutive_losses, 2);
        // (1100 − 990) / 1100 = 0.1
        assert_eq!(snapshot.drawdown_pct, dec!(0.1));
    }

    #[tokio::test]
    async fn win_resets_the_streak() {
        let (reconciler, tx, ledger) = Reconciler::new(dec!(1000));
        let handle = tokio::spawn(reconciler.run());

        tx.send(outcome(dec!(-10))).await.unwrap();
        tx.send(outcome(dec!(-10))).await.unwrap();
        tx.send(outcome(dec!(30))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(ledger.borrow().consecutive_losses, 0);
    }
}
