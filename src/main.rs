use std::time::Duration;

use colored::Colorize;
use emawatch::{
    AppResult, cli::Cli, config::Config, engine::Engine, engine::SnapshotMap, init_logging,
};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    let mut config = Config::load_or_default(&cli.config_file);
    if !cli.symbols.is_empty() {
        config.symbols = cli.symbols.clone();
    }
    if let Some(timeframe) = cli.timeframe {
        config.timeframe = timeframe;
    }
    config.validate()?;

    let _log_guard = init_logging(
        &cli.effective_log_level(&config.log_level),
        Some(&config.log.file_path),
    )?;

    tracing::info!("EmaWatch Market Monitor starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    let refresh = Duration::from_millis(config.ui.refresh_rate_ms);
    let (engine, engine_task) = Engine::spawn(config);

    let mut render_interval = tokio::time::interval(refresh);
    loop {
        tokio::select! {
            _ = render_interval.tick() => render_snapshots(&engine.snapshots()),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                break;
            }
        }
    }

    engine.shutdown()?;
    engine_task.await?;
    Ok(())
}

/// Print the current per-symbol indicator table, the CLI stand-in for the
/// original card grid.
fn render_snapshots(snapshots: &SnapshotMap) {
    if snapshots.is_empty() {
        println!("{}", "waiting for instruments...".dimmed());
        return;
    }

    let mut symbols: Vec<&String> = snapshots.keys().collect();
    symbols.sort();

    println!(
        "{:<12} {:>14} {:>9} {:>14} {:>10}",
        "SYMBOL".bold(),
        "PRICE".bold(),
        "24H%".bold(),
        "EMA50".bold(),
        "EMA%".bold()
    );
    for symbol in symbols {
        let snap = &snapshots[symbol];
        println!(
            "{:<12} {:>14.4} {:>9} {:>14.4} {:>10}",
            symbol,
            snap.price,
            colorize_percent(snap.change_24h),
            snap.ema50,
            colorize_percent(snap.ema_percent_diff),
        );
    }
    println!();
}

fn colorize_percent(value: f64) -> colored::ColoredString {
    let text = format!("{:+.2}%", value);
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.dimmed()
    }
}
