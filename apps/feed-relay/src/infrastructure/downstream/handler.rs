//! Per-connection WebSocket handling.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use super::DownstreamState;
use super::connection::WsConnection;
use crate::application::ports::ClientConnectionPort;
use crate::domain::instrument::InstrumentRequest;
use crate::domain::protocol::InboundMessage;
use crate::domain::subscription::Operation;
use crate::infrastructure::metrics;

pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DownstreamState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<DownstreamState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (connection, mut rx) = WsConnection::channel(state.queue_capacity);
    let connection = Arc::new(connection);
    let connection_id = connection.id();

    tracing::info!(connection_id, "Downstream client connected");

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => dispatch(&state, &connection, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => dispatch(&state, &connection, text),
                    Err(_) => tracing::warn!(connection_id, "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(connection_id, error = %e, "Downstream socket error");
                    break;
                }
            },
        }
    }

    let released = state.registry.unregister_connection(connection_id);
    metrics::set_clients_registered(state.registry.len());
    send_task.abort();

    tracing::info!(
        connection_id,
        released = ?released,
        "Downstream client disconnected"
    );
}

fn dispatch(state: &Arc<DownstreamState>, connection: &Arc<WsConnection>, text: &str) {
    let message = match InboundMessage::decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(connection_id = connection.id(), error = %e, "Ignoring malformed client message");
            return;
        }
    };
    tracing::debug!(connection_id = connection.id(), kind = message.kind(), "Client message");

    match message {
        InboundMessage::ClientId(payload) => {
            let handle: Arc<dyn ClientConnectionPort> = connection.clone();
            state.registry.register(payload.id, handle);
            metrics::set_clients_registered(state.registry.len());
        }
        InboundMessage::Subscribe(payload) => {
            spawn_batch(state, connection, Operation::Subscribe, payload.list);
        }
        InboundMessage::Unsubscribe(payload) => {
            spawn_batch(state, connection, Operation::Unsubscribe, payload.list);
        }
    }
}

// Detached from the read loop; a batch completes even if the client disconnects.
fn spawn_batch(
    state: &Arc<DownstreamState>,
    connection: &Arc<WsConnection>,
    operation: Operation,
    requests: Vec<InstrumentRequest>,
) {
    let state = Arc::clone(state);
    let connection = Arc::clone(connection);

    tokio::spawn(async move {
        let outcomes = match operation {
            Operation::Subscribe => {
                state
                    .subscriptions
                    .subscribe(&requests, connection.as_ref())
                    .await
            }
            Operation::Unsubscribe => {
                state
                    .subscriptions
                    .unsubscribe(&requests, connection.as_ref())
                    .await
            }
        };
        metrics::record_subscription_outcomes(&outcomes);
        metrics::set_directory_entries(state.directory.len());
    });
}
