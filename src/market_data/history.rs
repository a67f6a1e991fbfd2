//! Bounded per-symbol, per-timeframe close price histories

use std::collections::{HashMap, VecDeque};

use super::Timeframe;

/// Maximum number of closing prices retained per (symbol, timeframe) key
pub const MAX_HISTORY_LEN: usize = 100;

/// Sliding-window store of closing prices, oldest first.
///
/// Writes are serialized by the coordinator event loop that owns this store,
/// which is what keeps appends to a single key in chronological order.
#[derive(Debug, Default)]
pub struct PriceHistoryStore {
    histories: HashMap<(String, Timeframe), VecDeque<f64>>,
}

impl PriceHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a live close to the history for this key, evicting the oldest
    /// entry once the window is full. Returns the new length.
    pub fn append(&mut self, symbol: &str, timeframe: Timeframe, price: f64) -> usize {
        let history = self
            .histories
            .entry((symbol.to_string(), timeframe))
            .or_default();

        history.push_back(price);
        while history.len() > MAX_HISTORY_LEN {
            history.pop_front();
        }
        history.len()
    }

    /// Overwrite the history for this key with backfilled candle closes.
    ///
    /// Backfill is authoritative: existing entries (including live ticks that
    /// raced the fetch) are discarded, not merged. Sequences longer than the
    /// window keep only the most recent entries.
    pub fn replace(&mut self, symbol: &str, timeframe: Timeframe, closes: Vec<f64>) {
        let mut history: VecDeque<f64> = closes.into();
        while history.len() > MAX_HISTORY_LEN {
            history.pop_front();
        }
        self.histories
            .insert((symbol.to_string(), timeframe), history);
    }

    /// Chronological copy of the closes for this key; empty if never seen
    pub fn closes(&self, symbol: &str, timeframe: Timeframe) -> Vec<f64> {
        self.histories
            .get(&(symbol.to_string(), timeframe))
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every timeframe history for a symbol (instrument removal)
    pub fn remove_symbol(&mut self, symbol: &str) {
        self.histories.retain(|(s, _), _| s != symbol);
    }
}
