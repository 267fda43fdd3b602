pub mod analysis;
pub mod candle;
pub mod order;
pub mod snapshot;

pub use analysis::{
    AlignmentTier, PredictLabel, PredictResult, PredictorSource, PriceLocation, QuantAnalysis,
    QuantLabel, Regime, SignalVote, TimeframeScores, TradeAction, VoteResult,
};
pub use candle::{Candle, KlineValidator, Timeframe, MIN_SERIES_LEN};
pub use order::{ExecutionRecord, OrderProposal, Side};
pub use snapshot::{MarketSnapshot, OpenInterest, TimeframeView};
