//! Aggregation engine: instrument registry, coordinator loop, and the
//! command/snapshot surface exposed to consumers

pub mod coordinator;
pub mod handle;

pub use coordinator::Engine;
pub use handle::EngineHandle;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::market_data::{IndicatorSnapshot, Timeframe};

/// Immutable point-in-time view of every tracked instrument
pub type SnapshotMap = Arc<HashMap<String, IndicatorSnapshot>>;

/// Commands accepted by the coordinator loop
#[derive(Debug)]
pub enum EngineCommand {
    AddInstrument {
        symbol: String,
        reply: oneshot::Sender<bool>,
    },
    RemoveInstrument {
        symbol: String,
        reply: oneshot::Sender<bool>,
    },
    SetTimeframe(Timeframe),
    Shutdown,
}
