//! Market data processing and shared engine types

pub mod history;
pub mod ticker_subscription;
pub mod timeframe;

pub use history::{MAX_HISTORY_LEN, PriceHistoryStore};
pub use ticker_subscription::TickerSubscription;
pub use timeframe::Timeframe;

use crate::binance::types::WebSocketError;

/// Latest computed indicator state for one instrument, for the currently
/// selected timeframe. Consumers receive these inside an immutable shared
/// map and never mutate them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub change_24h: f64,
    pub ema50: f64,
    pub ema_percent_diff: f64,
}

/// Events flowing from subscriptions and backfill tasks into the coordinator
#[derive(Debug)]
pub enum MarketEvent {
    /// Live price update from a ticker stream
    Tick {
        symbol: String,
        price: f64,
        change_24h: f64,
    },
    /// Completed historical backfill for one (symbol, timeframe) key
    HistoryLoaded {
        symbol: String,
        timeframe: Timeframe,
        closes: Vec<f64>,
    },
    /// Backfill fetch failed; existing history stays untouched
    BackfillFailed {
        symbol: String,
        timeframe: Timeframe,
        error: String,
    },
    /// Initial 24hr statistics for a freshly added instrument
    SeedStats {
        symbol: String,
        price: f64,
        change_24h: f64,
    },
    /// Transport dropped; the subscription will reconnect on its own
    Disconnected {
        symbol: String,
        error: WebSocketError,
    },
}

/// Control messages sent from the coordinator to a subscription task
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    Shutdown,
}
