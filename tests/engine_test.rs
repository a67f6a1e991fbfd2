//! End-to-end engine tests against local mock upstreams

use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emawatch::config::Config;
use emawatch::engine::{Engine, EngineHandle, SnapshotMap};
use emawatch::market_data::Timeframe;

const TEST_RECONNECT_MS: u64 = 200;

fn test_config(ws_url: String, rest_url: String, symbols: Vec<&str>) -> Config {
    let mut config = Config::default();
    config.symbols = symbols.into_iter().map(String::from).collect();
    config.timeframe = Timeframe::H1;
    config.binance.ws_url = ws_url;
    config.binance.rest_url = rest_url;
    config.binance.timeout_seconds = 2;
    config.binance.reconnect_delay_ms = TEST_RECONNECT_MS;
    config
}

/// Candle tuples in the exchange's kline shape; index 4 is the close
fn kline_body(closes: &[f64]) -> serde_json::Value {
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            serde_json::json!([i as u64, "1.0", "2.0", "0.5", close.to_string(), "100"])
        })
        .collect()
}

/// WebSocket server that completes the handshake and stays silent
async fn spawn_quiet_ws() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(msg) = ws.next().await {
                        if msg.is_err() {
                            break;
                        }
                    }
                }
            });
        }
    });

    url
}

/// WebSocket server that pushes the same ticker frame on an interval
async fn spawn_ticking_ws(frame: String, every: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frame = frame.clone();
            tokio::spawn(async move {
                if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                    loop {
                        if ws.send(Message::Text(frame.clone())).await.is_err() {
                            break;
                        }
                        sleep(every).await;
                    }
                }
            });
        }
    });

    url
}

/// WebSocket server that reports each connection attempt and drops it
async fn spawn_flaky_ws() -> (String, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (attempt_tx, attempt_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = attempt_tx.send(());
            drop(stream);
        }
    });

    (url, attempt_rx)
}

/// Wait until the published snapshot satisfies a predicate
async fn wait_for_snapshot<F>(handle: &EngineHandle, mut predicate: F) -> Result<SnapshotMap>
where
    F: FnMut(&SnapshotMap) -> bool,
{
    let mut rx = handle.watch_snapshots();
    let result = timeout(Duration::from_secs(5), async {
        loop {
            {
                let current = rx.borrow().clone();
                if predicate(&current) {
                    return current;
                }
            }
            if rx.changed().await.is_err() {
                panic!("engine terminated before the expected snapshot");
            }
        }
    })
    .await?;
    Ok(result)
}

#[tokio::test]
async fn test_backfill_replaces_history_and_live_ticks_refine_it() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1h"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_body(&[10.0; 60])))
        .mount(&rest)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "symbol": "BTCUSDT", "lastPrice": "10.0", "priceChangePercent": "0.5"
        })))
        .mount(&rest)
        .await;

    let frame = r#"{"s":"BTCUSDT","c":"11.0","P":"1.50"}"#.to_string();
    let ws_url = spawn_ticking_ws(frame, Duration::from_millis(30)).await;

    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec!["BTCUSDT"]));

    // Snapshot converges once the backfill landed and a live tick followed it
    let snapshots = wait_for_snapshot(&handle, |map| {
        map.get("BTCUSDT")
            .map(|s| s.price == 11.0 && s.ema50 > 0.0)
            .unwrap_or(false)
    })
    .await?;

    let snap = snapshots["BTCUSDT"];
    assert_eq!(snap.change_24h, 1.50);
    // Backfilled constant series pulls the EMA to 10; ticks at 11 nudge it up
    assert!(snap.ema50 >= 10.0 && snap.ema50 < 11.0, "ema50 = {}", snap.ema50);
    assert!(snap.ema_percent_diff > 0.0);

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;
    Ok(())
}

#[tokio::test]
async fn test_slow_stat_seed_still_lands_after_backfill() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_body(&[10.0; 60])))
        .mount(&rest)
        .await;
    // The 24hr stats arrive well after the kline backfill
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(800))
                .set_body_json(serde_json::json!({
                    "symbol": "BTCUSDT", "lastPrice": "10.5", "priceChangePercent": "1.0"
                })),
        )
        .mount(&rest)
        .await;

    let ws_url = spawn_quiet_ws().await;
    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec!["BTCUSDT"]));

    // Backfill lands first: EMA is set but no price is known yet, so the
    // deviation must read neutral rather than -100% against a zero price
    let snapshots = wait_for_snapshot(&handle, |map| {
        map.get("BTCUSDT").map(|s| s.ema50 == 10.0).unwrap_or(false)
    })
    .await?;
    let snap = snapshots["BTCUSDT"];
    if snap.price == 0.0 {
        assert_eq!(snap.ema_percent_diff, 0.0);
    }

    // The late seed still applies and recomputes the deviation
    let snapshots = wait_for_snapshot(&handle, |map| {
        map.get("BTCUSDT").map(|s| s.price == 10.5).unwrap_or(false)
    })
    .await?;
    let snap = snapshots["BTCUSDT"];
    assert_eq!(snap.change_24h, 1.0);
    assert!((snap.ema_percent_diff - 5.0).abs() < 1e-9);

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;
    Ok(())
}

#[tokio::test]
async fn test_timeframe_switch_rebackfills_and_retargets() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("interval", "1h"))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_body(&[10.0; 60])))
        .mount(&rest)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("interval", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_body(&[20.0; 60])))
        .mount(&rest)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&rest)
        .await;

    let ws_url = spawn_quiet_ws().await;
    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec!["ETHUSDT"]));

    wait_for_snapshot(&handle, |map| {
        map.get("ETHUSDT").map(|s| s.ema50 == 10.0).unwrap_or(false)
    })
    .await?;

    handle.set_timeframe(Timeframe::D1)?;

    wait_for_snapshot(&handle, |map| {
        map.get("ETHUSDT").map(|s| s.ema50 == 20.0).unwrap_or(false)
    })
    .await?;

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;
    Ok(())
}

#[tokio::test]
async fn test_failed_backfill_preserves_existing_indicator() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("interval", "1h"))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_body(&[10.0; 60])))
        .mount(&rest)
        .await;
    // The 2h backfill returns a non-array payload and must be treated as failed
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("interval", "2h"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": -1121})),
        )
        .mount(&rest)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&rest)
        .await;

    let ws_url = spawn_quiet_ws().await;
    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec!["BTCUSDT"]));

    wait_for_snapshot(&handle, |map| {
        map.get("BTCUSDT").map(|s| s.ema50 == 10.0).unwrap_or(false)
    })
    .await?;

    handle.set_timeframe(Timeframe::H2)?;
    // Give the failed fetch time to come back and be discarded
    sleep(Duration::from_millis(500)).await;

    // The rejected payload must not corrupt state: the instrument is still
    // tracked, and the preserved 1h history backs the snapshot again as soon
    // as the selection returns to it.
    assert!(handle.snapshots().contains_key("BTCUSDT"));

    handle.set_timeframe(Timeframe::H1)?;
    wait_for_snapshot(&handle, |map| {
        map.get("BTCUSDT").map(|s| s.ema50 == 10.0).unwrap_or(false)
    })
    .await?;

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;
    Ok(())
}

#[tokio::test]
async fn test_add_instrument_is_idempotent_and_case_insensitive() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&rest)
        .await;

    let ws_url = spawn_quiet_ws().await;
    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec![]));

    assert!(handle.add_instrument("adausdt").await?);
    assert!(!handle.add_instrument("ADAUSDT").await?);
    assert!(!handle.add_instrument("AdaUsdt").await?);
    assert!(!handle.add_instrument("").await?);

    let snapshots = handle.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots.contains_key("ADAUSDT"));

    assert!(handle.remove_instrument("ADAUSDT").await?);
    assert!(!handle.remove_instrument("ADAUSDT").await?);
    assert!(handle.snapshots().is_empty());

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;
    Ok(())
}

#[tokio::test]
async fn test_sustained_transport_failure_keeps_reconnecting() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&rest)
        .await;

    let (ws_url, mut attempts) = spawn_flaky_ws().await;
    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec!["BTCUSDT"]));

    // At least two attempts within two reconnect periods plus slack
    let budget = Duration::from_millis(2 * TEST_RECONNECT_MS + 800);
    let observed = timeout(budget, async {
        attempts.recv().await.unwrap();
        attempts.recv().await.unwrap();
    })
    .await;
    assert!(
        observed.is_ok(),
        "expected at least 2 connection attempts within {:?}",
        budget
    );

    // And it keeps going under sustained failure
    let third = timeout(Duration::from_millis(2 * TEST_RECONNECT_MS + 800), attempts.recv()).await;
    assert!(third.is_ok());

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;
    Ok(())
}

#[tokio::test]
async fn test_shutdown_terminates_engine_task() -> Result<()> {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&rest)
        .await;

    let ws_url = spawn_quiet_ws().await;
    let (handle, task) = Engine::spawn(test_config(ws_url, rest.uri(), vec!["BTCUSDT", "ETHUSDT"]));

    // Let the subscriptions establish before tearing down
    sleep(Duration::from_millis(200)).await;

    handle.shutdown()?;
    timeout(Duration::from_secs(10), task).await??;

    // Commands after shutdown fail instead of hanging
    assert!(handle.set_timeframe(Timeframe::D1).is_err());
    Ok(())
}
