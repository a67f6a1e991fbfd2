//! Binance REST API client implementation

use std::time::Duration;

use tracing::debug;

use super::types::{RestApiError, TickerStats};
use crate::market_data::Timeframe;

/// Number of historical candles requested per backfill
pub const KLINE_LIMIT: usize = 100;

/// Binance REST API client
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl BinanceRestClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Fetch the last [`KLINE_LIMIT`] closing prices for a symbol at the
    /// given timeframe, ordered oldest to newest.
    ///
    /// The endpoint returns an array of candle tuples; index 4 is the close,
    /// encoded as a string or a bare number. Any other payload shape is an
    /// [`RestApiError::UnexpectedPayload`].
    pub async fn get_close_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<f64>, RestApiError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            timeframe.interval(),
            KLINE_LIMIT
        );

        debug!("Fetching close history from: {}", url);

        let body = self.get_text(&url).await?;
        let payload: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| RestApiError::ParseError(format!("invalid kline JSON: {}", e)))?;

        let candles = payload.as_array().ok_or_else(|| {
            RestApiError::UnexpectedPayload("kline response is not an array".to_string())
        })?;

        candles
            .iter()
            .map(|candle| Self::candle_close(candle, symbol))
            .collect()
    }

    /// Fetch the 24hr rolling statistics for a symbol (last price and
    /// percent change), used to seed a snapshot before the first live tick.
    pub async fn get_ticker_24hr(&self, symbol: &str) -> Result<TickerStats, RestApiError> {
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, symbol);

        debug!("Fetching 24hr ticker from: {}", url);

        let body = self.get_text(&url).await?;
        serde_json::from_str(&body)
            .map_err(|e| RestApiError::ParseError(format!("invalid ticker JSON: {}", e)))
    }

    async fn get_text(&self, url: &str) -> Result<String, RestApiError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RestApiError::HttpRequestError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RestApiError::HttpStatusError(status, body));
        }

        response
            .text()
            .await
            .map_err(|e| RestApiError::HttpRequestError(e.to_string()))
    }

    /// Extract the close (index 4) from one candle tuple
    fn candle_close(candle: &serde_json::Value, symbol: &str) -> Result<f64, RestApiError> {
        let close = candle.get(4).ok_or_else(|| {
            RestApiError::UnexpectedPayload(format!("candle for {} has no close field", symbol))
        })?;

        match close {
            serde_json::Value::String(s) => s.parse::<f64>().map_err(|e| {
                RestApiError::ParseError(format!("invalid close '{}' for {}: {}", s, symbol, e))
            }),
            serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
                RestApiError::ParseError(format!("non-finite close for {}", symbol))
            }),
            other => Err(RestApiError::UnexpectedPayload(format!(
                "close for {} is neither string nor number: {}",
                symbol, other
            ))),
        }
    }
}
