// WebSocket handler: live throughput stream

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, timeout};

use super::AppState;
use crate::models::ThroughputEvent;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the throughput connection count on drop (connect = +1, drop = -1).
struct WsThroughputGuard(Arc<AtomicUsize>);

impl Drop for WsThroughputGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(super) async fn ws_throughput(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let rx = state.throughput_tx.subscribe();
    let conn_count = state.ws_throughput_connections.clone();
    let selected = state.selected_tx.borrow().clone();
    let capabilities = state.orchestrator.capabilities();
    ws.on_upgrade(move |socket| async move {
        let welcome = serde_json::json!({
            "type": "info",
            "interface": selected,
            "capabilities": capabilities,
        });
        if let Err(e) = stream_throughput(socket, rx, conn_count, welcome).await {
            tracing::info!("Throughput stream error: {}", e);
        }
    })
}

async fn stream_throughput(
    socket: WebSocket,
    mut rx: broadcast::Receiver<ThroughputEvent>,
    conn_count: Arc<AtomicUsize>,
    welcome: serde_json::Value,
) -> anyhow::Result<()> {
    conn_count.fetch_add(1, Ordering::Relaxed);
    let _guard = WsThroughputGuard(conn_count);
    tracing::info!("Client connected to throughput stream");

    let (mut sender, mut receiver) = socket.split();

    let welcome_json = serde_json::to_string(&welcome)?;
    let r = timeout(WS_SEND_TIMEOUT, sender.send(Message::Text(welcome_json.into()))).await;
    if !matches!(r, Ok(Ok(()))) {
        return Ok(());
    }

    let mut ping_interval =
        tokio::time::interval_at(Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        let json = serde_json::to_string(&event)?;
                        let r = timeout(WS_SEND_TIMEOUT, sender.send(Message::Text(json.into()))).await;
                        if !matches!(r, Ok(Ok(()))) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/throughput client lagged, skipped {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, sender.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }
    tracing::info!("Client disconnected from throughput stream");
    Ok(())
}
