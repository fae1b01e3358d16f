//! WebSocket endpoint shared by receivers and senders.

use av_controls_types::BrokerMessage;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::select;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::error::BrokerError;
use crate::state::{BrokerState, ConnectionId};

/// Upgrade to a broker connection.
///
/// A connection starts unregistered and becomes a receiver or a sender with
/// its first `register-*` message. Every frame is one JSON `BrokerMessage`.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<BrokerState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BrokerState) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut outbox) = state.connect().await;

    let mut ping_interval = interval(state.ping_interval());
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ping_interval.tick().await;

    info!("Broker client {} connected", id);

    loop {
        select! {
            // Routed to this connection by another one
            routed = outbox.recv() => {
                let Some(message) = routed else {
                    break;
                };
                if let Err(e) = send_message(&mut sender, &message).await {
                    debug!("Failed to send to {}, client likely disconnected: {}", id, e);
                    break;
                }
            }

            _ = ping_interval.tick() => {
                trace!("Sending ping to {}", id);
                if let Err(e) = sender.send(Message::Ping(vec![].into())).await {
                    debug!("Failed to send ping, client likely disconnected: {}", e);
                    break;
                }
            }

            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, &id, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_text(&state, &id, text).await,
                        Err(_) => warn!("Dropping non-UTF-8 binary frame from {}", id),
                    },
                    Some(Ok(Message::Pong(_))) => {
                        trace!("Received pong from {}", id);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("Client {} sent close message", id);
                        break;
                    }
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.disconnect(&id).await;
    info!("Broker client {} disconnected", id);
}

async fn handle_text(state: &BrokerState, id: &ConnectionId, text: &str) {
    let result = match serde_json::from_str::<BrokerMessage>(text) {
        Ok(message) => state.handle(id, message).await,
        Err(e) => Err(BrokerError::from(e)),
    };
    if let Err(e) = result {
        warn!("Ignoring message from {}: {}", id, e);
    }
}

/// Send one message to the client as JSON text.
async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &BrokerMessage,
) -> Result<(), axum::Error> {
    trace!("Sending to client: {}", message.description());

    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            Err(axum::Error::new(e))
        }
    }
}
