//! HTTP Front End
//!
//! Axum router serving the live-update WebSocket, the paginated key
//! listing, and the plain-text stats endpoints peers poll.
//!
//! The WebSocket command channel is privileged and local-only: its writes
//! go straight to the store and hub, without WAL journaling or slot
//! ownership checks.

use std::io;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use bytes::Bytes;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use super::pagination::paginate_keys;
use super::CommandHandler;
use crate::hub::{CommandMessage, SyncMessage, UpdateMessage};

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    handler: Arc<CommandHandler>,
}

/// Build the router with all HTTP and WebSocket routes
pub fn router(handler: Arc<CommandHandler>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/v1/keys", get(list_keys))
        .route("/keycount", get(key_count))
        .route("/bytesize", get(byte_size))
        .with_state(AppState { handler })
}

/// Serve the HTTP front end until the listener fails fatally
pub async fn serve(addr: String, handler: Arc<CommandHandler>) -> io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("http server listening on {}", addr);
    axum::serve(listener, router(handler)).await
}

#[derive(Debug, Deserialize)]
struct KeysQuery {
    limit: Option<usize>,
    cursor: Option<String>,
}

async fn list_keys(State(state): State<AppState>, Query(query): Query<KeysQuery>) -> Response {
    let limit = match query.limit {
        Some(limit) if (1..=MAX_PAGE_LIMIT).contains(&limit) => limit,
        _ => DEFAULT_PAGE_LIMIT,
    };
    let cursor = query.cursor.unwrap_or_default();

    let page = paginate_keys(state.handler.store(), &cursor, limit);
    Json(page).into_response()
}

async fn key_count(State(state): State<AppState>) -> String {
    state.handler.store().len().to_string()
}

async fn byte_size(State(state): State<AppState>) -> String {
    state.handler.store().total_bytes().to_string()
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Bridge one WebSocket connection to the hub and the command channel
async fn handle_socket(socket: WebSocket, state: AppState) {
    let handler = state.handler;
    let (id, updates) = handler.hub().register();
    let (sink, stream) = socket.split();

    if let Err(err) = serve_socket(&handler, sink, stream, updates).await {
        debug!(%err, "websocket connection closed with error");
    }

    handler.hub().unregister(id);
}

async fn serve_socket(
    handler: &Arc<CommandHandler>,
    mut sink: SplitSink<WebSocket, Message>,
    mut stream: SplitStream<WebSocket>,
    mut updates: UnboundedReceiver<String>,
) -> Result<(), axum::Error> {
    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Some(payload) => sink.send(Message::Text(payload.into())).await?,
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_ws_command(text.as_str(), handler, &mut sink).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err),
                }
            }
        }
    }

    Ok(())
}

async fn handle_ws_command(
    raw: &str,
    handler: &Arc<CommandHandler>,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Result<(), axum::Error> {
    let cmd: CommandMessage = match serde_json::from_str(raw) {
        Ok(cmd) => cmd,
        Err(err) => {
            error!(%err, "failed to parse websocket command");
            return Ok(());
        }
    };

    match cmd.action.to_lowercase().as_str() {
        "set" => {
            let key = Bytes::from(cmd.key);
            let value = Bytes::from(cmd.value);
            handler.store().set(key.clone(), value.clone());
            handler.hub().broadcast_update("set", &key, Some(&value));
        }
        "del" => {
            if handler.store().delete(cmd.key.as_bytes()) {
                handler.hub().broadcast_update("del", cmd.key.as_bytes(), None);
            }
        }
        "get" => {
            let value = handler
                .store()
                .get(cmd.key.as_bytes())
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_else(|| "(nil)".to_string());
            let resp = UpdateMessage {
                action: "get_resp".to_string(),
                key: cmd.key,
                value: Some(value),
            };
            send_json(sink, &resp).await?;
        }
        "get_all" => {
            // JSON sync snapshot renders keys and values as UTF-8 text
            let data = handler
                .store()
                .snapshot()
                .iter()
                .map(|(k, v)| {
                    (
                        String::from_utf8_lossy(k).into_owned(),
                        String::from_utf8_lossy(v).into_owned(),
                    )
                })
                .collect();
            let resp = SyncMessage {
                action: "sync".to_string(),
                data,
            };
            send_json(sink, &resp).await?;
        }
        "cluster_info" => {
            let resp = handler.cluster_info();
            send_json(sink, &resp).await?;
        }
        other => {
            debug!(action = other, "unknown websocket action");
        }
    }

    Ok(())
}

async fn send_json<T: Serialize>(
    sink: &mut SplitSink<WebSocket, Message>,
    message: &T,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(payload) => sink.send(Message::Text(payload.into())).await,
        Err(err) => {
            error!(%err, "failed to serialize websocket response");
            Ok(())
        }
    }
}
