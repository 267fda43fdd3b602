//! Decision-pipeline agents.
//!
//! Every agent is a plain component with an explicit `input -> output`
//! surface; the orchestrator composes them, there is no agent base type.
//! Compute-only agents (trend, oscillator, sentiment, regime, position,
//! decision, risk) never suspend; only the sync, predict and advisor agents
//! touch I/O.

pub mod advisor;
pub mod decision;
pub mod oscillator;
pub mod position;
pub mod predict;
pub mod quant;
pub mod regime;
pub mod risk;
pub mod sentiment;
pub mod sync;
pub mod trend;

pub use advisor::ConfidenceAdvisor;
pub use decision::{DecisionCoreAgent, DecisionWeights, VoteInput};
pub use oscillator::OscillatorSubAgent;
pub use position::{PositionAnalysis, PositionAnalyzer};
pub use predict::{DensePredictor, PredictAgent, Predictor};
pub use quant::QuantAnalystAgent;
pub use regime::{RegimeDetector, RegimeReading};
pub use risk::{BlockReason, Corrections, RiskAuditAgent, RiskCheckResult, RiskLedgerSnapshot, RiskLevel};
pub use sentiment::SentimentSubAgent;
pub use sync::DataSyncAgent;
pub use trend::TrendSubAgent;
