//! Hard risk audit with final veto.
//!
//! Checks run in a fixed order; the first failure blocks the proposal.
//! The one correctable failure is a wrong-sided stop within plausible
//! distance, which is flipped symmetrically around entry before the later
//! checks re-evaluate. The orchestrator must honor `passed == false` —
//! nothing downstream may override it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RiskConfig;
use crate::domain::analysis::TradeAction;
use crate::domain::order::OrderProposal;

/// Severity ladder; `max` of everything encountered becomes the result level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Warning,
    Danger,
    Fatal,
}

/// Why a proposal was blocked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockReason {
    /// Stop missing, on the wrong side and uncorrectable, or absurd
    FatalStopLoss { detail: String },
    /// Stop distance outside the allowed band
    StopLossRange { distance_pct: Decimal },
    Leverage { requested: u32, max: u32 },
    Margin { required: Decimal, available: Decimal },
    PositionPct { notional: Decimal, limit: Decimal },
    RiskExposure { at_risk: Decimal, limit: Decimal },
    Drawdown { drawdown_pct: Decimal, limit: Decimal },
    Cooldown { consecutive_losses: u32, max: u32 },
}

impl BlockReason {
    /// Stable machine-readable code used in logs and persisted artifacts
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::FatalStopLoss { .. } => "FATAL_SL",
            BlockReason::StopLossRange { .. } => "SL_RANGE",
            BlockReason::Leverage { .. } => "LEVERAGE",
            BlockReason::Margin { .. } => "MARGIN",
            BlockReason::PositionPct { .. } => "POSITION_PCT",
            BlockReason::RiskExposure { .. } => "RISK_EXPOSURE",
            BlockReason::Drawdown { .. } => "DRAWDOWN",
            BlockReason::Cooldown { .. } => "COOLDOWN",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::FatalStopLoss { detail } => write!(f, "FATAL_SL: {detail}"),
            BlockReason::StopLossRange { distance_pct } => {
                write!(f, "SL_RANGE: stop distance {distance_pct}% outside bounds")
            }
            BlockReason::Leverage { requested, max } => {
                write!(f, "LEVERAGE: {requested}x exceeds cap {max}x")
            }
            BlockReason::Margin { required, available } => {
                write!(f, "MARGIN: required {required} exceeds usable {available}")
            }
            BlockReason::PositionPct { notional, limit } => {
                write!(f, "POSITION_PCT: notional {notional} exceeds {limit}")
            }
            BlockReason::RiskExposure { at_risk, limit } => {
                write!(f, "RISK_EXPOSURE: {at_risk} at risk exceeds {limit}")
            }
            BlockReason::Drawdown { drawdown_pct, limit } => {
                write!(f, "DRAWDOWN: {drawdown_pct} >= {limit}")
            }
            BlockReason::Cooldown {
                consecutive_losses,
                max,
            } => write!(f, "COOLDOWN: {consecutive_losses} consecutive losses >= {max}"),
        }
    }
}

/// Corrections applied to a proposal before it passed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corrections {
    pub stop_loss: Decimal,
}

/// Outcome of the audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub passed: bool,
    pub risk_level: RiskLevel,
    pub blocked_reason: Option<BlockReason>,
    pub corrections: Option<Corrections>,
    pub warnings: Vec<String>,
}

impl RiskCheckResult {
    /// The stop price the orchestrator must use: corrected if rewritten
    pub fn effective_stop(&self, proposal: &OrderProposal) -> Option<Decimal> {
        self.corrections
            .as_ref()
            .map(|c| c.stop_loss)
            .or(proposal.stop_loss)
    }
}

/// Immutable per-cycle view of the account risk ledger, produced by the
/// trade-outcome reconciler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskLedgerSnapshot {
    /// Drawdown from peak equity as a fraction (0.10 = 10%)
    pub drawdown_pct: Decimal,
    pub consecutive_losses: u32,
}

/// The guardian: deterministic, never retried, final say on every order.
#[derive(Debug, Clone)]
pub struct RiskAuditAgent {
    config: RiskConfig,
}

impl RiskAuditAgent {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn audit(
        &self,
        proposal: &OrderProposal,
        balance: Decimal,
        ledger: &RiskLedgerSnapshot,
    ) -> RiskCheckResult {
        let mut warnings: Vec<String> = Vec::new();
        let mut corrections: Option<Corrections> = None;
        let mut level = RiskLevel::Safe;

        let entry = proposal.entry_price;
        if entry <= Decimal::ZERO || proposal.quantity <= Decimal::ZERO {
            return Self::blocked(
                BlockReason::FatalStopLoss {
                    detail: format!(
                        "invalid proposal: entry {entry}, qty {}",
                        proposal.quantity
                    ),
                },
                RiskLevel::Fatal,
                warnings,
            );
        }
        if proposal.action == TradeAction::Hold {
            return Self::blocked(
                BlockReason::FatalStopLoss {
                    detail: "hold proposals are never dispatched".to_string(),
                },
                RiskLevel::Fatal,
                warnings,
            );
        }

        // 1. Stop direction (fatal, but correctable by a symmetric flip)
        let Some(mut stop) = proposal.stop_loss else {
            return Self::blocked(
                BlockReason::FatalStopLoss {
                    detail: "no stop loss provided".to_string(),
                },
                RiskLevel::Fatal,
                warnings,
            );
        };
        let wrong_side = match proposal.action {
            TradeAction::Long => stop >= entry,
            TradeAction::Short => stop <= entry,
            TradeAction::Hold => unreachable!("hold rejected above"),
        };
        if wrong_side {
            let distance_pct = ((stop - entry) / entry).abs();
            if distance_pct >= self.config.min_stop_distance_pct
                && distance_pct <= self.config.max_stop_distance_pct
            {
                let flipped = entry + entry - stop;
                debug!(
                    symbol = %proposal.symbol,
                    original = %stop,
                    corrected = %flipped,
                    "flipping wrong-sided stop symmetrically around entry"
                );
                warnings.push(format!("stop loss {stop} was wrong-sided, rewritten to {flipped}"));
                level = level.max(RiskLevel::Warning);
                corrections = Some(Corrections { stop_loss: flipped });
                stop = flipped;
            } else {
                return Self::blocked(
                    BlockReason::FatalStopLoss {
                        detail: format!(
                            "stop {stop} on wrong side of entry {entry} and not plausibly flippable"
                        ),
                    },
                    RiskLevel::Fatal,
                    warnings,
                );
            }
        }

        // 2. Stop magnitude
        let distance_pct = ((entry - stop) / entry).abs();
        if distance_pct < self.config.min_stop_distance_pct
            || distance_pct > self.config.max_stop_distance_pct
        {
            return Self::blocked(
                BlockReason::StopLossRange {
                    distance_pct: distance_pct * Decimal::ONE_HUNDRED,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }
        // Outer third of the allowed band is legal but worth flagging
        let wide_stop = self.config.min_stop_distance_pct
            + (self.config.max_stop_distance_pct - self.config.min_stop_distance_pct)
                * Decimal::new(2, 0)
                / Decimal::new(3, 0);
        if distance_pct > wide_stop {
            warnings.push(format!("stop distance {distance_pct} in the outer band"));
            level = level.max(RiskLevel::Warning);
        }

        // 3. Leverage cap
        if proposal.leverage > self.config.max_leverage {
            return Self::blocked(
                BlockReason::Leverage {
                    requested: proposal.leverage,
                    max: self.config.max_leverage,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }
        if proposal.leverage > self.config.warn_leverage {
            warnings.push(format!(
                "leverage {}x above advisory level {}x",
                proposal.leverage, self.config.warn_leverage
            ));
            level = level.max(RiskLevel::Warning);
        }

        // 4. Margin feasibility
        let required_margin = proposal.required_margin();
        let usable = balance * self.config.margin_buffer;
        if required_margin > usable {
            return Self::blocked(
                BlockReason::Margin {
                    required: required_margin,
                    available: usable,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }

        // 5. Position concentration
        let notional = proposal.notional();
        let position_limit = balance * self.config.max_position_pct;
        if notional > position_limit {
            return Self::blocked(
                BlockReason::PositionPct {
                    notional,
                    limit: position_limit,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }

        // 6. Worst-case risk exposure
        let at_risk = (entry - stop).abs() * proposal.quantity;
        let risk_limit = balance * self.config.max_total_risk_pct;
        if at_risk > risk_limit {
            return Self::blocked(
                BlockReason::RiskExposure {
                    at_risk,
                    limit: risk_limit,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }

        // 7. Drawdown gate
        if ledger.drawdown_pct >= self.config.stop_trading_drawdown_pct {
            return Self::blocked(
                BlockReason::Drawdown {
                    drawdown_pct: ledger.drawdown_pct,
                    limit: self.config.stop_trading_drawdown_pct,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }

        // 8. Consecutive-loss cooldown
        if ledger.consecutive_losses >= self.config.max_consecutive_losses {
            return Self::blocked(
                BlockReason::Cooldown {
                    consecutive_losses: ledger.consecutive_losses,
                    max: self.config.max_consecutive_losses,
                },
                level.max(RiskLevel::Danger),
                warnings,
            );
        }

        RiskCheckResult {
            passed: true,
            risk_level: level,
            blocked_reason: None,
            corrections,
            warnings,
        }
    }

    fn blocked(
        reason: BlockReason,
        level: RiskLevel,
        warnings: Vec<String>,
    ) -> RiskCheckResult {
        RiskCheckResult {
            passed: false,
            risk_level: level,
            blocked_reason: Some(reason),
            corrections: None,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn agent() -> RiskAuditAgent {
        RiskAuditAgent::new(RiskConfig::default())
    }

    fn ledger() -> RiskLedgerSnapshot {
        RiskLedgerSnapshot::default()
    }

    fn proposal(action: TradeAction, entry: Decimal, qty: Decimal, stop: Option<Decimal>) -> OrderProposal {
        OrderProposal {
            snapshot_id: "btcusdt-1000".to_string(),
            symbol: "BTCUSDT".to_string(),
            action,
            entry_price: entry,
            quantity: qty,
            leverage: 2,
            stop_loss: stop,
            take_profit: None,
        }
    }

    #[test]
    fn clean_long_passes() {
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(98)));
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert!(result.passed);
        assert_eq!(result.risk_level, RiskLevel::Safe);
        assert!(result.corrections.is_none());
    }

    #[test]
    fn wrong_sided_stop_is_flipped_symmetrically() {
        // Long at 100 with stop 103: rewritten to 97
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(103)));
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert!(result.passed);
        let corrections = result.corrections.as_ref().expect("stop rewritten");
        assert_eq!(corrections.stop_loss, dec!(97));
        assert_eq!(result.effective_stop(&p), Some(dec!(97)));
        assert_eq!(result.risk_level, RiskLevel::Warning);
    }

    #[test]
    fn wrong_sided_stop_too_far_is_fatal() {
        // 20% away: not plausibly a flipped stop
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(120)));
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert!(!result.passed);
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "FATAL_SL");
        assert_eq!(result.risk_level, RiskLevel::Fatal);
    }

    #[test]
    fn missing_stop_is_fatal() {
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), None);
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert!(!result.passed);
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "FATAL_SL");
    }

    #[test]
    fn stop_distance_bounds() {
        // 0.2%: tighter than the 0.5% minimum
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(99.8)));
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "SL_RANGE");

        // 8%: wider than the 5% maximum
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(92)));
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "SL_RANGE");
    }

    #[test]
    fn leverage_cap_blocks_and_advisory_warns() {
        let mut p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(98)));
        p.leverage = 12;
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "LEVERAGE");

        p.leverage = 7;
        let result = agent().audit(&p, dec!(10_000), &ledger());
        assert!(result.passed);
        assert_eq!(result.risk_level, RiskLevel::Warning);
        assert!(result.warnings.iter().any(|w| w.contains("leverage")));
    }

    #[test]
    fn margin_block_matches_worked_example() {
        // balance 1000, entry 100, qty 20, leverage 2:
        // required margin 1000 > 0.95 * 1000
        let p = proposal(TradeAction::Long, dec!(100), dec!(20), Some(dec!(98)));
        let result = agent().audit(&p, dec!(1000), &ledger());
        assert!(!result.passed);
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "MARGIN");
    }

    #[test]
    fn concentration_block() {
        // notional 4000 > 30% of 10_000
        let p = proposal(TradeAction::Long, dec!(100), dec!(40), Some(dec!(99.5)));
        let mut config = RiskConfig::default();
        config.margin_buffer = dec!(1.0);
        let agent = RiskAuditAgent::new(config);
        let result = agent.audit(&p, dec!(10_000), &ledger());
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "POSITION_PCT");
    }

    #[test]
    fn risk_exposure_block() {
        // With concentration relaxed, 5 units risking 4.9 each = 24.5
        // exceeds 2% of a 1000 balance
        let p = proposal(TradeAction::Long, dec!(100), dec!(5), Some(dec!(95.1)));
        let mut config = RiskConfig::default();
        config.max_position_pct = dec!(1.0);
        let agent = RiskAuditAgent::new(config);
        let result = agent.audit(&p, dec!(1000), &ledger());
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "RISK_EXPOSURE");
    }

    #[test]
    fn drawdown_gate() {
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(98)));
        let ledger = RiskLedgerSnapshot {
            drawdown_pct: dec!(0.12),
            consecutive_losses: 0,
        };
        let result = agent().audit(&p, dec!(10_000), &ledger);
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "DRAWDOWN");
    }

    #[test]
    fn consecutive_loss_cooldown() {
        let p = proposal(TradeAction::Long, dec!(100), dec!(1), Some(dec!(98)));
        let ledger = RiskLedgerSnapshot {
            drawdown_pct: Decimal::ZERO,
            consecutive_losses: 3,
        };
        let result = agent().audit(&p, dec!(10_000), &ledger);
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "COOLDOWN");
    }

    #[test]
    fn short_stop_must_sit_above_entry() {
        let good = proposal(TradeAction::Short, dec!(100), dec!(1), Some(dec!(102)));
        assert!(agent().audit(&good, dec!(10_000), &ledger()).passed);

        // Wrong side, plausible distance: flipped to 102
        let wrong = proposal(TradeAction::Short, dec!(100), dec!(1), Some(dec!(98)));
        let result = agent().audit(&wrong, dec!(10_000), &ledger());
        assert!(result.passed);
        assert_eq!(result.corrections.unwrap().stop_loss, dec!(102));
    }

    #[test]
    fn checks_run_in_order_first_failure_wins() {
        // Both margin (1000 > 950) and risk exposure (40 > 20) violated;
        // margin is checked first
        let p = proposal(TradeAction::Long, dec!(100), dec!(20), Some(dec!(98)));
        let result = agent().audit(&p, dec!(1000), &ledger());
        assert_eq!(result.blocked_reason.as_ref().unwrap().code(), "MARGIN");
    }
}
