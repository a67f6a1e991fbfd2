//! Command Line Interface module
//!
//! Implements argument parsing for the emawatch monitor.

use clap::Parser;

use crate::market_data::Timeframe;

#[derive(Parser, Debug, Clone)]
#[command(name = "emawatch")]
#[command(about = "EmaWatch Market Monitor")]
#[command(long_about = "Real-time cryptocurrency prices with EMA 50 deviation tracking")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error); defaults to the
    /// configured level when omitted
    #[arg(long)]
    pub log_level: Option<String>,

    /// Symbols to monitor, overriding the configuration file
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Initial candle timeframe (1h, 2h, 4h, 1d)
    #[arg(long)]
    pub timeframe: Option<Timeframe>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Effective log level: verbose flag, then the explicit flag, then the
    /// configured fallback
    pub fn effective_log_level(&self, config_level: &str) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config_level.to_string())
        }
    }
}
