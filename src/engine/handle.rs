//! Cloneable consumer-facing surface of a running engine

use anyhow::{Context, Result, anyhow};
use tokio::sync::{mpsc, oneshot, watch};

use super::{EngineCommand, SnapshotMap};
use crate::market_data::Timeframe;

/// Handle for querying snapshots and steering a running [`Engine`].
///
/// Snapshots are immutable `Arc` maps; readers never contend with the
/// coordinator and cannot mutate engine state through them.
///
/// [`Engine`]: super::Engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    snapshot_rx: watch::Receiver<SnapshotMap>,
}

impl EngineHandle {
    pub(crate) fn new(
        command_tx: mpsc::UnboundedSender<EngineCommand>,
        snapshot_rx: watch::Receiver<SnapshotMap>,
    ) -> Self {
        Self {
            command_tx,
            snapshot_rx,
        }
    }

    /// Track a new instrument. Returns `false` when the symbol is empty or
    /// already tracked (case-insensitive); the second add is a no-op.
    pub async fn add_instrument(&self, symbol: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::AddInstrument {
            symbol: symbol.to_string(),
            reply,
        })?;
        rx.await.context("engine dropped the add reply")
    }

    /// Stop tracking an instrument. Returns whether it was tracked.
    pub async fn remove_instrument(&self, symbol: &str) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RemoveInstrument {
            symbol: symbol.to_string(),
            reply,
        })?;
        rx.await.context("engine dropped the remove reply")
    }

    /// Switch the globally selected timeframe, re-backfilling every
    /// tracked instrument
    pub fn set_timeframe(&self, timeframe: Timeframe) -> Result<()> {
        self.send(EngineCommand::SetTimeframe(timeframe))
    }

    /// Point-in-time view of all current snapshots
    pub fn snapshots(&self) -> SnapshotMap {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every published snapshot update
    pub fn watch_snapshots(&self) -> watch::Receiver<SnapshotMap> {
        self.snapshot_rx.clone()
    }

    /// Ask the engine to close every connection and terminate
    pub fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown)
    }

    fn send(&self, command: EngineCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| anyhow!("engine has terminated"))
    }
}
