pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod logging;
pub mod ml;
pub mod persistence;

#[cfg(test)]
pub(crate) mod testutil;

pub use adapters::{BinanceFuturesClient, MarketDataSource, OrderSink, ReplaySource, StubOrderSink};
pub use agents::{
    DataSyncAgent, DecisionCoreAgent, PredictAgent, QuantAnalystAgent, RiskAuditAgent,
};
pub use config::AppConfig;
pub use domain::{MarketSnapshot, TradeAction, VoteResult};
pub use engine::{Orchestrator, Reconciler};
pub use error::{HelixError, Result};
