//! Streaming technical indicators and the per-series indicator frame.
//!
//! Indicator cores are incremental: one `update` per candle, no lookahead.
//! The processor runs them over the closed candles of a series and publishes
//! column vectors with the warmup prefix blanked to NaN so downstream code
//! cannot silently consume unstable values.

pub mod core;
pub mod features;
pub mod frame;

pub use self::core::{Adx, Atr, Ema, Macd, RollingWindow, Rsi};
pub use features::{FeatureSnapshot, FEATURE_DIM, FEATURE_SET_VERSION};
pub use frame::{IndicatorFrame, IndicatorProcessor, PROCESSOR_VERSION, WARMUP_ROWS};
