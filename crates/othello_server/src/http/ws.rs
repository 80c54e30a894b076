//! Live updates over a WebSocket.
//!
//! The socket first receives the current state, then every committed state
//! of the game. Clients may also submit moves and rematches through it;
//! rejections go back to the sender only.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use othello_rules::ParticipantId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::error::{ApiError, classify};
use super::participant::Participant;
use crate::error::GameError;
use crate::registry::SessionRegistry;
use crate::session::GameId;
use crate::sync::{Subscription, SyncMessage};

/// Messages a client may send over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Place a piece.
    Move {
        /// Row, 0 to 7.
        row: i32,
        /// Column, 0 to 7.
        col: i32,
        /// Version the move was computed against.
        #[serde(default)]
        version: Option<u64>,
    },
    /// Start over with colors swapped.
    Rematch,
}

/// Messages the server pushes.
///
/// State messages keep the plain sync shape; errors carry an `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A committed state.
    State(SyncMessage),
    /// A rejection of this client's request.
    Error {
        /// Machine-readable error kind.
        kind: String,
        /// Human-readable description.
        error: String,
    },
}

impl From<&GameError> for ServerMessage {
    fn from(err: &GameError) -> Self {
        let (_, kind) = classify(err);
        Self::Error {
            kind: kind.to_string(),
            error: err.to_string(),
        }
    }
}

/// `GET /api/games/{id}/ws`
///
/// Authorization and subscription happen before the upgrade, so strangers
/// and unknown games get a plain HTTP error.
#[instrument(skip(registry, upgrade))]
pub async fn game_socket(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<i32>,
    Participant(participant): Participant,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let id = GameId::new(id);
    let (snapshot, subscription) = registry.subscribe(id, participant).await?;
    Ok(upgrade.on_upgrade(move |socket| {
        run_socket(registry, participant, snapshot, subscription, socket)
    }))
}

type Sink = SplitSink<WebSocket, Message>;

async fn send(sink: &mut Sink, message: &ServerMessage) -> bool {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to encode server message");
            return true;
        }
    };
    sink.send(Message::Text(text.into())).await.is_ok()
}

#[instrument(skip_all, fields(game_id = %subscription.session(), participant = %participant))]
async fn run_socket(
    registry: Arc<SessionRegistry>,
    participant: ParticipantId,
    snapshot: SyncMessage,
    mut subscription: Subscription,
    socket: WebSocket,
) {
    info!("Socket connected");
    let id = subscription.session();
    let (mut sink, mut stream) = socket.split();

    if send(&mut sink, &ServerMessage::State(snapshot)).await {
        loop {
            tokio::select! {
                update = subscription.recv() => match update {
                    Some(state) => {
                        if !send(&mut sink, &ServerMessage::State(state)).await {
                            break;
                        }
                    }
                    None => break,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text(&registry, id, participant, text.as_str()).await;
                        if let Some(reply) = reply {
                            if !send(&mut sink, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    registry.unsubscribe(subscription).await;
    info!("Socket closed");
}

/// Runs one client request. Returns a reply for the sender, if any;
/// successes arrive through the subscription like everyone else's.
async fn handle_text(
    registry: &SessionRegistry,
    id: GameId,
    participant: ParticipantId,
    text: &str,
) -> Option<ServerMessage> {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unreadable client message");
            return Some(ServerMessage::Error {
                kind: "bad_request".to_string(),
                error: format!("Bad message: {}", e),
            });
        }
    };
    let result = match request {
        ClientMessage::Move { row, col, version } => {
            registry.submit_move(id, participant, row, col, version).await
        }
        ClientMessage::Rematch => registry.rematch(id, participant).await,
    };
    match result {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::from(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use othello_rules::BoardState;

    #[test]
    fn test_client_message_tags() {
        let request: ClientMessage =
            serde_json::from_str(r#"{"type":"move","row":2,"col":4}"#).expect("Parses");
        assert_eq!(
            request,
            ClientMessage::Move {
                row: 2,
                col: 4,
                version: None
            }
        );
        let rematch: ClientMessage = serde_json::from_str(r#"{"type":"rematch"}"#).expect("Parses");
        assert_eq!(rematch, ClientMessage::Rematch);
    }

    #[test]
    fn test_state_push_keeps_sync_shape() {
        let board = BoardState::initial(ParticipantId::new(1));
        let state = SyncMessage::new(GameId::new(3), &board, 2);
        let json = serde_json::to_value(ServerMessage::State(state.clone())).expect("Serializes");
        assert_eq!(json, serde_json::to_value(&state).expect("Serializes"));
        let back: ServerMessage = serde_json::from_value(json).expect("Parses");
        assert_eq!(back, ServerMessage::State(state));
    }

    #[test]
    fn test_error_push_carries_kind() {
        let err = GameError::GameNotOver;
        let json = serde_json::to_value(ServerMessage::from(&err)).expect("Serializes");
        assert_eq!(json["kind"], "game_not_over");
    }
}
