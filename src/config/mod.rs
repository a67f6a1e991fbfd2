//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::market_data::Timeframe;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Instruments tracked at startup
    pub symbols: Vec<String>,

    /// Initially selected candle timeframe
    pub timeframe: Timeframe,

    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Binance-specific configuration
    pub binance: BinanceConfig,

    /// CLI output configuration
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BinanceConfig {
    /// WebSocket base URL
    pub ws_url: String,

    /// REST API base URL
    pub rest_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Fixed delay between reconnection attempts in milliseconds
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UiConfig {
    /// Interval between snapshot table redraws in milliseconds
    pub refresh_rate_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Absolute or relative path to the rolling log file
    pub file_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
                "INJUSDT".to_string(),
                "HYPEUSDT".to_string(),
            ],
            timeframe: Timeframe::H1,
            log_level: "info".to_string(),
            log: LogConfig::default(),
            binance: BinanceConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.binance.com:9443".to_string(),
            rest_url: "https://api.binance.com".to_string(),
            timeout_seconds: 10,
            reconnect_delay_ms: 3000,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: 1000,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/emawatch.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // EMAWATCH_SYMBOLS - comma-separated list of symbols
        if let Ok(symbols) = env::var("EMAWATCH_SYMBOLS") {
            self.symbols = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // EMAWATCH_TIMEFRAME - initial candle timeframe
        if let Ok(timeframe) = env::var("EMAWATCH_TIMEFRAME") {
            if let Ok(value) = timeframe.parse::<Timeframe>() {
                self.timeframe = value;
            }
        }

        // EMAWATCH_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("EMAWATCH_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // EMAWATCH_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("EMAWATCH_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // EMAWATCH_BINANCE_WS_URL - WebSocket URL
        if let Ok(ws_url) = env::var("EMAWATCH_BINANCE_WS_URL") {
            self.binance.ws_url = ws_url;
        }

        // EMAWATCH_BINANCE_REST_URL - REST API URL
        if let Ok(rest_url) = env::var("EMAWATCH_BINANCE_REST_URL") {
            self.binance.rest_url = rest_url;
        }

        // EMAWATCH_BINANCE_TIMEOUT_SECONDS - request timeout
        if let Ok(timeout) = env::var("EMAWATCH_BINANCE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.binance.timeout_seconds = value;
            }
        }

        // EMAWATCH_BINANCE_RECONNECT_DELAY_MS - reconnect delay
        if let Ok(delay) = env::var("EMAWATCH_BINANCE_RECONNECT_DELAY_MS") {
            if let Ok(value) = delay.parse::<u64>() {
                self.binance.reconnect_delay_ms = value;
            }
        }

        // EMAWATCH_UI_REFRESH_RATE_MS - snapshot table redraw interval
        if let Ok(refresh) = env::var("EMAWATCH_UI_REFRESH_RATE_MS") {
            if let Ok(value) = refresh.parse::<u64>() {
                self.ui.refresh_rate_ms = value.max(1);
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load_from_file(path).unwrap_or_else(|err| {
            tracing::warn!("Failed to load config: {}, using defaults", err);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.binance.timeout_seconds == 0 {
            anyhow::bail!("Timeout must be greater than 0");
        }

        if self.binance.reconnect_delay_ms == 0 {
            anyhow::bail!("Reconnect delay must be greater than 0");
        }

        if self.ui.refresh_rate_ms == 0 {
            anyhow::bail!("Refresh rate must be greater than 0");
        }

        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        // An empty symbol list is fine (instruments can be added at runtime),
        // but any configured symbol must look like a ticker.
        for symbol in &self.symbols {
            if symbol.is_empty() || symbol.len() < 3 {
                anyhow::bail!("Invalid symbol format: {}", symbol);
            }
        }

        Ok(())
    }
}
