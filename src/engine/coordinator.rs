//! Aggregation coordinator: single-writer event loop over ticks, backfills,
//! and registry commands

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::{EngineCommand, EngineHandle, SnapshotMap};
use crate::binance::BinanceRestClient;
use crate::config::Config;
use crate::indicators::{self, EMA_PERIOD};
use crate::market_data::{
    ControlMessage, IndicatorSnapshot, MarketEvent, PriceHistoryStore, TickerSubscription,
    Timeframe,
};

/// Live subscription bookkeeping for one instrument
struct SubscriptionHandle {
    control_tx: mpsc::UnboundedSender<ControlMessage>,
    task: JoinHandle<()>,
}

/// Owns all mutable engine state. Every mutation of the history store and
/// the snapshot map flows through [`Engine::run`], so per-instrument updates
/// apply strictly in the order their events were received.
pub struct Engine {
    config: Config,
    timeframe: Timeframe,
    store: PriceHistoryStore,
    snapshots: HashMap<String, IndicatorSnapshot>,
    subscriptions: HashMap<String, SubscriptionHandle>,
    rest_client: BinanceRestClient,
    event_tx: mpsc::UnboundedSender<MarketEvent>,
    event_rx: mpsc::UnboundedReceiver<MarketEvent>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    snapshot_tx: watch::Sender<SnapshotMap>,
    backfills: JoinSet<()>,
}

impl Engine {
    /// Spawn an engine for the configured symbol set and timeframe.
    ///
    /// Multiple engines can coexist; no state is ambient or static.
    pub fn spawn(config: Config) -> (EngineHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SnapshotMap::default());

        let rest_client = BinanceRestClient::new(
            config.binance.rest_url.clone(),
            Duration::from_secs(config.binance.timeout_seconds),
        );

        let engine = Self {
            timeframe: config.timeframe,
            store: PriceHistoryStore::new(),
            snapshots: HashMap::new(),
            subscriptions: HashMap::new(),
            rest_client,
            event_tx,
            event_rx,
            command_rx,
            snapshot_tx,
            backfills: JoinSet::new(),
            config,
        };

        let handle = EngineHandle::new(command_tx, snapshot_rx);
        let task = tokio::spawn(engine.run());
        (handle, task)
    }

    /// Main event loop. Exits on [`EngineCommand::Shutdown`] or when every
    /// command sender is gone.
    async fn run(mut self) {
        info!(
            "Engine starting with {} symbols at timeframe {}",
            self.config.symbols.len(),
            self.timeframe
        );

        for symbol in self.config.symbols.clone() {
            if !self.register_instrument(&symbol) {
                warn!("Skipping invalid or duplicate configured symbol '{}'", symbol);
            }
        }

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::AddInstrument { symbol, reply }) => {
                            let added = self.register_instrument(&symbol);
                            let _ = reply.send(added);
                        }
                        Some(EngineCommand::RemoveInstrument { symbol, reply }) => {
                            let removed = self.remove_instrument(&symbol);
                            let _ = reply.send(removed);
                        }
                        Some(EngineCommand::SetTimeframe(tf)) => self.set_timeframe(tf),
                        Some(EngineCommand::Shutdown) | None => break,
                    }
                }
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                Some(_) = self.backfills.join_next(), if !self.backfills.is_empty() => {
                    // Reap completed backfill tasks
                }
            }
        }

        self.shutdown().await;
    }

    /// Registry add: canonicalize, reject empty or duplicate symbols, then
    /// open the live subscription and kick off backfill + stat seeding.
    fn register_instrument(&mut self, raw: &str) -> bool {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            warn!("Rejecting empty instrument symbol");
            return false;
        }
        if self.subscriptions.contains_key(&symbol) {
            debug!("Instrument {} already tracked", symbol);
            return false;
        }

        info!("Adding instrument {}", symbol);

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let subscription = TickerSubscription::new(
            symbol.clone(),
            self.config.binance.ws_url.clone(),
            Duration::from_millis(self.config.binance.reconnect_delay_ms),
            control_rx,
            self.event_tx.clone(),
        );
        let task = tokio::spawn(subscription.run());

        self.subscriptions
            .insert(symbol.clone(), SubscriptionHandle { control_tx, task });
        self.snapshots
            .insert(symbol.clone(), IndicatorSnapshot::default());

        self.spawn_backfill(symbol.clone(), self.timeframe);
        self.spawn_seed_fetch(symbol);
        self.publish();
        true
    }

    /// Registry removal: close the subscription and drop all per-symbol state
    fn remove_instrument(&mut self, raw: &str) -> bool {
        let symbol = raw.trim().to_uppercase();
        let Some(handle) = self.subscriptions.remove(&symbol) else {
            debug!("Instrument {} not tracked, nothing to remove", symbol);
            return false;
        };

        info!("Removing instrument {}", symbol);
        let _ = handle.control_tx.send(ControlMessage::Shutdown);
        self.snapshots.remove(&symbol);
        self.store.remove_symbol(&symbol);
        self.publish();
        true
    }

    /// Switch the globally selected timeframe and re-backfill every tracked
    /// instrument. Live subscriptions stay up; only the recomputation target
    /// changes. Selecting the current timeframe acts as an explicit refresh.
    fn set_timeframe(&mut self, timeframe: Timeframe) {
        info!("Switching timeframe {} -> {}", self.timeframe, timeframe);
        self.timeframe = timeframe;

        let symbols: Vec<String> = self.subscriptions.keys().cloned().collect();
        for symbol in symbols {
            self.spawn_backfill(symbol.clone(), timeframe);
            self.recompute(&symbol);
        }
        self.publish();
    }

    /// Fetch candle closes for one (symbol, timeframe) key as an independent
    /// cancellable task; the result comes back through the event channel.
    fn spawn_backfill(&mut self, symbol: String, timeframe: Timeframe) {
        let rest = self.rest_client.clone();
        let event_tx = self.event_tx.clone();

        self.backfills.spawn(async move {
            let event = match rest.get_close_history(&symbol, timeframe).await {
                Ok(closes) => MarketEvent::HistoryLoaded {
                    symbol,
                    timeframe,
                    closes,
                },
                Err(e) => MarketEvent::BackfillFailed {
                    symbol,
                    timeframe,
                    error: e.to_string(),
                },
            };
            let _ = event_tx.send(event);
        });
    }

    /// Seed price and 24h change for a new instrument ahead of its first
    /// live tick. Failure is non-fatal; the snapshot stays neutral.
    fn spawn_seed_fetch(&mut self, symbol: String) {
        let rest = self.rest_client.clone();
        let event_tx = self.event_tx.clone();

        self.backfills.spawn(async move {
            match rest.get_ticker_24hr(&symbol).await {
                Ok(stats) => {
                    let parsed = stats
                        .last_price
                        .parse::<f64>()
                        .and_then(|price| {
                            stats
                                .price_change_percent
                                .parse::<f64>()
                                .map(|change| (price, change))
                        });
                    match parsed {
                        Ok((price, change_24h)) => {
                            let _ = event_tx.send(MarketEvent::SeedStats {
                                symbol,
                                price,
                                change_24h,
                            });
                        }
                        Err(e) => debug!("Unparseable 24hr stats for {}: {}", symbol, e),
                    }
                }
                Err(e) => debug!("Failed to seed 24hr stats for {}: {}", symbol, e),
            }
        });
    }

    fn handle_event(&mut self, event: MarketEvent) {
        match event {
            MarketEvent::Tick {
                symbol,
                price,
                change_24h,
            } => self.apply_tick(&symbol, price, change_24h),
            MarketEvent::HistoryLoaded {
                symbol,
                timeframe,
                closes,
            } => self.apply_history(&symbol, timeframe, closes),
            MarketEvent::BackfillFailed {
                symbol,
                timeframe,
                error,
            } => {
                // Existing history and snapshot stay untouched; the next
                // timeframe switch retries the fetch.
                warn!("Backfill failed for {} @ {}: {}", symbol, timeframe, error);
            }
            MarketEvent::SeedStats {
                symbol,
                price,
                change_24h,
            } => self.apply_seed(&symbol, price, change_24h),
            MarketEvent::Disconnected { symbol, error } => {
                debug!("Transport dropped for {}: {}", symbol, error);
            }
        }
    }

    /// Live tick: append to the active-timeframe history and republish
    fn apply_tick(&mut self, symbol: &str, price: f64, change_24h: f64) {
        if !self.snapshots.contains_key(symbol) {
            debug!("Dropping tick for untracked symbol {}", symbol);
            return;
        }

        self.store.append(symbol, self.timeframe, price);
        let closes = self.store.closes(symbol, self.timeframe);
        let ema50 = indicators::ema(&closes, EMA_PERIOD);

        self.snapshots.insert(
            symbol.to_string(),
            IndicatorSnapshot {
                price,
                change_24h,
                ema50,
                ema_percent_diff: indicators::ema_percent_diff(price, ema50),
            },
        );
        self.publish();
    }

    /// Backfill completion: the fetched closes replace the stored history
    /// wholesale (last-writer-wins over any ticks that raced the fetch).
    /// `change_24h` is preserved from the last live tick; the backfill
    /// changes the EMA basis, not the 24h statistic.
    fn apply_history(&mut self, symbol: &str, timeframe: Timeframe, closes: Vec<f64>) {
        if !self.snapshots.contains_key(symbol) {
            debug!("Dropping backfill for untracked symbol {}", symbol);
            return;
        }

        debug!(
            "Backfilled {} closes for {} @ {}",
            closes.len(),
            symbol,
            timeframe
        );
        self.store.replace(symbol, timeframe, closes);

        if timeframe == self.timeframe {
            self.recompute(symbol);
            self.publish();
        }
    }

    /// Initial 24h statistics; a snapshot whose price was already set by a
    /// live tick wins. An earlier backfill only fills the EMA basis and must
    /// not block the seed.
    fn apply_seed(&mut self, symbol: &str, price: f64, change_24h: f64) {
        let Some(snapshot) = self.snapshots.get_mut(symbol) else {
            return;
        };
        if snapshot.price != 0.0 {
            return;
        }

        snapshot.price = price;
        snapshot.change_24h = change_24h;
        snapshot.ema_percent_diff = indicators::ema_percent_diff(price, snapshot.ema50);
        self.publish();
    }

    /// Recompute one snapshot's indicator fields against the active
    /// timeframe, keeping the last-known price and 24h change. While no
    /// price is known yet the deviation stays at the neutral 0.0 instead of
    /// reading as -100% against the backfilled EMA.
    fn recompute(&mut self, symbol: &str) {
        let closes = self.store.closes(symbol, self.timeframe);
        if let Some(snapshot) = self.snapshots.get_mut(symbol) {
            snapshot.ema50 = indicators::ema(&closes, EMA_PERIOD);
            snapshot.ema_percent_diff = if snapshot.price == 0.0 {
                0.0
            } else {
                indicators::ema_percent_diff(snapshot.price, snapshot.ema50)
            };
        }
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(Arc::new(self.snapshots.clone()));
    }

    /// Close every subscription, cancel in-flight fetches, and wait briefly
    /// for the tasks to wind down.
    async fn shutdown(mut self) {
        info!("Engine shutting down");
        self.backfills.abort_all();

        let handles: Vec<(String, SubscriptionHandle)> = self.subscriptions.drain().collect();
        for (_, handle) in &handles {
            let _ = handle.control_tx.send(ControlMessage::Shutdown);
        }
        for (symbol, handle) in handles {
            if tokio::time::timeout(Duration::from_secs(5), handle.task)
                .await
                .is_err()
            {
                warn!("Subscription for {} did not stop in time", symbol);
            }
        }

        info!("Engine terminated");
    }
}
