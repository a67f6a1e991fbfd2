//! EmaWatch Market Monitor Library
//!
//! A real-time cryptocurrency monitoring engine that tracks live ticker
//! streams, maintains bounded price histories per timeframe, and recomputes
//! an EMA(50) percentage-deviation indicator on every update.

pub mod binance;
pub mod cli;
pub mod config;
pub mod engine;
pub mod indicators;
pub mod market_data;

use std::path::Path;

use anyhow::Result;

/// Application result type for consistent error handling
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize tracing subscriber for logging.
///
/// Always installs a console fmt layer filtered by `level` (overridable via
/// `RUST_LOG`); when `file_path` is given, a non-blocking daily-rolling file
/// layer is added as well. The returned guard must stay alive for the
/// process lifetime or buffered file logs are lost.
pub fn init_logging(
    level: &str,
    file_path: Option<&str>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("emawatch={}", level).into());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match file_path {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "emawatch.log".to_string());

            let appender = tracing_appender::rolling::daily(
                dir.unwrap_or_else(|| Path::new(".")),
                file,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}
