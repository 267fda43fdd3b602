pub mod idempotency;
pub mod orchestrator;
pub mod reconciler;

pub use idempotency::{DispatchDecision, DispatchGuard};
pub use orchestrator::Orchestrator;
pub use reconciler::{Reconciler, TradeOutcome};
