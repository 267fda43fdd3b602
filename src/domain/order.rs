//! Order proposals and execution records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::analysis::TradeAction;

/// Order side on the futures exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Entry side for a directional action; `Hold` has no side
    pub fn from_action(action: TradeAction) -> Option<Side> {
        match action {
            TradeAction::Long => Some(Side::Buy),
            TradeAction::Short => Some(Side::Sell),
            TradeAction::Hold => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Proposed order, built by the orchestrator from a non-hold vote and
/// submitted to the risk auditor before any exchange call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProposal {
    pub snapshot_id: String,
    pub symbol: String,
    pub action: TradeAction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u32,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl OrderProposal {
    /// Notional value at the proposed entry
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }

    /// Margin the position would consume at the proposed leverage
    pub fn required_margin(&self) -> Decimal {
        if self.leverage == 0 {
            return self.notional();
        }
        self.notional() / Decimal::from(self.leverage)
    }
}

/// Record of a dispatched order, persisted per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub snapshot_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub leverage: u32,
    pub order_id: String,
    pub dispatched_at: DateTime<Utc>,
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn proposal() -> OrderProposal {
        OrderProposal {
            snapshot_id: "btcusdt-1000".to_string(),
            symbol: "BTCUSDT".to_string(),
            action: TradeAction::Long,
            entry_price: dec!(100),
            quantity: dec!(20),
            leverage: 2,
            stop_loss: Some(dec!(98)),
            take_profit: Some(dec!(104)),
        }
    }

    #[test]
    fn notional_and_margin() {
        let p = proposal();
        assert_eq!(p.notional(), dec!(2000));
        assert_eq!(p.required_margin(), dec!(1000));
    }

    #[test]
    fn side_from_action() {
        assert_eq!(Side::from_action(TradeAction::Long), Some(Side::Buy));
        assert_eq!(Side::from_action(TradeAction::Short), Some(Side::Sell));
        assert_eq!(Side::from_action(TradeAction::Hold), None);
    }
}
