//! Per-symbol live ticker subscription task

use std::time::Duration;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, info, warn};

use super::{ControlMessage, MarketEvent};
use crate::binance::types::{TickerEvent, WebSocketError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one connected stream session
#[derive(Debug, PartialEq)]
enum StreamExit {
    Reconnect,
    Shutdown,
}

/// Owns one streaming connection for a single instrument.
///
/// Lifecycle: connect the `<symbol>@ticker` channel, forward every valid
/// tick to the coordinator, and on any transport failure reconnect after a
/// fixed delay, forever. Only a [`ControlMessage::Shutdown`] (or the
/// coordinator dropping the control channel) ends the task.
pub struct TickerSubscription {
    symbol: String,
    ws_url: String,
    reconnect_delay: Duration,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    event_tx: mpsc::UnboundedSender<MarketEvent>,
}

impl TickerSubscription {
    pub fn new(
        symbol: String,
        ws_url: String,
        reconnect_delay: Duration,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
        event_tx: mpsc::UnboundedSender<MarketEvent>,
    ) -> Self {
        Self {
            symbol,
            ws_url,
            reconnect_delay,
            control_rx,
            event_tx,
        }
    }

    /// Stream endpoint for this instrument's ticker channel
    fn stream_url(&self) -> String {
        format!("{}/ws/{}@ticker", self.ws_url, self.symbol.to_lowercase())
    }

    /// Run the subscription until shutdown. Never returns early on transport
    /// failure; the retry schedule is a fixed delay with no attempt cap.
    pub async fn run(mut self) {
        let url = self.stream_url();
        info!("Starting ticker subscription for {}", self.symbol);

        loop {
            match connect_async(&url).await {
                Ok((stream, _)) => {
                    info!("Connected ticker stream for {}", self.symbol);
                    if self.read_stream(stream).await == StreamExit::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to connect ticker stream for {}: {}", self.symbol, e);
                    self.send_event(MarketEvent::Disconnected {
                        symbol: self.symbol.clone(),
                        error: WebSocketError::ConnectionError(e.to_string()),
                    });
                }
            }

            debug!(
                "Reconnecting {} in {}ms",
                self.symbol,
                self.reconnect_delay.as_millis()
            );
            tokio::select! {
                _ = sleep(self.reconnect_delay) => {}
                msg = self.control_rx.recv() => {
                    if matches!(msg, Some(ControlMessage::Shutdown) | None) {
                        break;
                    }
                }
            }
        }

        info!("Ticker subscription terminated for {}", self.symbol);
    }

    /// Pump one connected stream until it drops or shutdown is requested
    async fn read_stream(&mut self, mut stream: WsStream) -> StreamExit {
        loop {
            tokio::select! {
                msg = self.control_rx.recv() => {
                    if matches!(msg, Some(ControlMessage::Shutdown) | None) {
                        if let Err(e) = stream.close(None).await {
                            debug!("Error closing stream for {}: {}", self.symbol, e);
                        }
                        return StreamExit::Shutdown;
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = stream.send(Message::Pong(data)).await {
                                warn!("Failed to answer ping for {}: {}", self.symbol, e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Ticker stream closed by remote for {}: {:?}", self.symbol, frame);
                            self.send_event(MarketEvent::Disconnected {
                                symbol: self.symbol.clone(),
                                error: WebSocketError::ConnectionError("remote close".to_string()),
                            });
                            return StreamExit::Reconnect;
                        }
                        Some(Ok(_)) => {
                            // Binary/pong frames carry nothing for us
                        }
                        Some(Err(e)) => {
                            warn!("Ticker stream error for {}: {}", self.symbol, e);
                            self.send_event(MarketEvent::Disconnected {
                                symbol: self.symbol.clone(),
                                error: WebSocketError::MessageError(e.to_string()),
                            });
                            return StreamExit::Reconnect;
                        }
                        None => {
                            info!("Ticker stream ended for {}", self.symbol);
                            self.send_event(MarketEvent::Disconnected {
                                symbol: self.symbol.clone(),
                                error: WebSocketError::ConnectionError("stream ended".to_string()),
                            });
                            return StreamExit::Reconnect;
                        }
                    }
                }
            }
        }
    }

    /// Validate one inbound text frame and forward it as a tick.
    ///
    /// Malformed frames are dropped and logged; they never terminate the
    /// connection.
    fn handle_text(&self, text: &str) {
        let parsed = serde_json::from_str::<TickerEvent>(text)
            .map_err(WebSocketError::from)
            .and_then(|event| event.to_tick());

        match parsed {
            Ok(tick) => {
                self.send_event(MarketEvent::Tick {
                    symbol: tick.symbol,
                    price: tick.price,
                    change_24h: tick.change_24h,
                });
            }
            Err(e) => {
                debug!("Dropping malformed ticker frame for {}: {}", self.symbol, e);
            }
        }
    }

    fn send_event(&self, event: MarketEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Coordinator gone, dropping event for {}", self.symbol);
        }
    }
}
