pub mod binance;
pub mod replay;
pub mod source;

pub use binance::BinanceFuturesClient;
pub use replay::{ReplaySource, StubOrderSink};
pub use source::{MarketDataSource, OrderSink, PositionInfo};
