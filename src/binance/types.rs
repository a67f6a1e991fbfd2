//! Binance API data types and structures

use serde::Deserialize;

/// Live ticker event pushed on a `<symbol>@ticker` stream.
///
/// Only the fields the engine consumes are modeled; a payload missing any of
/// them fails deserialization and is dropped at the ingestion boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerEvent {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "P")]
    pub price_change_percent: String,
}

impl TickerEvent {
    /// Parse the string-typed price fields, rejecting non-numeric payloads
    pub fn to_tick(&self) -> Result<ParsedTick, WebSocketError> {
        let price = self.last_price.parse::<f64>().map_err(|e| {
            WebSocketError::ParseError(format!(
                "invalid last price '{}' for {}: {}",
                self.last_price, self.symbol, e
            ))
        })?;
        let change_24h = self.price_change_percent.parse::<f64>().map_err(|e| {
            WebSocketError::ParseError(format!(
                "invalid change percent '{}' for {}: {}",
                self.price_change_percent, self.symbol, e
            ))
        })?;

        Ok(ParsedTick {
            symbol: self.symbol.clone(),
            price,
            change_24h,
        })
    }
}

/// A ticker event with its numeric fields parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTick {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
}

/// 24hr rolling statistics from the REST ticker endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TickerStats {
    pub symbol: String,
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "priceChangePercent")]
    pub price_change_percent: String,
}

/// Error types for WebSocket operations
#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("WebSocket connection error: {0}")]
    ConnectionError(String),
    #[error("WebSocket message error: {0}")]
    MessageError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Error types for REST API operations
#[derive(Debug, thiserror::Error)]
pub enum RestApiError {
    #[error("HTTP request error: {0}")]
    HttpRequestError(String),
    #[error("HTTP status error: {0} - {1}")]
    HttpStatusError(u16, String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
