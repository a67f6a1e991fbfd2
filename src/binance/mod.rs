//! Binance exchange boundary: typed wire messages and the REST client

pub mod rest;
pub mod types;

pub use rest::{BinanceRestClient, KLINE_LIMIT};
pub use types::{ParsedTick, RestApiError, TickerEvent, TickerStats, WebSocketError};
