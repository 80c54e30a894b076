//! REST handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use othello_rules::{Color, Coord, ParticipantId, Winner, legal_moves};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::error::ApiError;
use super::participant::Participant;
use crate::registry::SessionRegistry;
use crate::session::{GameId, GameSession, JoinOutcome};
use crate::sync::SyncMessage;

/// Body of `POST /api/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserRequest {
    /// Display name.
    pub name: String,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    /// User id, used as the participant id.
    pub id: i32,
    /// Display name.
    pub name: String,
}

/// Body of `POST /api/games/{id}/moves`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Row, 0 to 7.
    pub row: i32,
    /// Column, 0 to 7.
    pub col: i32,
    /// Version the move was computed against, if the client tracks it.
    #[serde(default)]
    pub version: Option<u64>,
}

/// Response of `POST /api/games/{id}/join`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// What the join did.
    pub outcome: JoinOutcome,
    /// State after joining.
    pub state: SyncMessage,
}

/// Full view of a game for one of its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    /// Host id.
    pub host_id: ParticipantId,
    /// Guest id, once seated.
    pub guest_id: Option<ParticipantId>,
    /// Current state.
    pub state: SyncMessage,
    /// Black piece count.
    pub black_score: usize,
    /// White piece count.
    pub white_score: usize,
    /// Legal cells for the color to move.
    pub legal_moves: Vec<Coord>,
    /// Result once the board is full.
    pub winner: Option<Winner>,
}

impl From<&GameSession> for GameView {
    fn from(session: &GameSession) -> Self {
        let state = session.state();
        Self {
            host_id: *session.host(),
            guest_id: *session.guest(),
            state: SyncMessage::from_session(session),
            black_score: state.score_of(Color::Black),
            white_score: state.score_of(Color::White),
            legal_moves: legal_moves(state),
            winner: state.is_terminal().then(|| state.winner()),
        }
    }
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /api/users`
#[instrument(skip(registry))]
pub async fn create_user(
    State(registry): State<Arc<SessionRegistry>>,
    Json(request): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let name = request.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name must not be empty"));
    }
    let user = registry.create_user(name).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: *user.id(),
            name: user.name().clone(),
        }),
    ))
}

/// `POST /api/games`
#[instrument(skip(registry))]
pub async fn create_game(
    State(registry): State<Arc<SessionRegistry>>,
    Participant(host): Participant,
) -> Result<(StatusCode, Json<SyncMessage>), ApiError> {
    let id = registry.create_game(host).await?;
    let state = registry.snapshot(id, host).await?;
    info!(game_id = %id, "Game opened over HTTP");
    Ok((StatusCode::CREATED, Json(state)))
}

/// `POST /api/games/{id}/join`
#[instrument(skip(registry))]
pub async fn join_game(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<i32>,
    Participant(participant): Participant,
) -> Result<Json<JoinResponse>, ApiError> {
    let id = GameId::new(id);
    let outcome = registry.join_game(id, participant).await?;
    let state = registry.snapshot(id, participant).await?;
    Ok(Json(JoinResponse { outcome, state }))
}

/// `GET /api/games/{id}`
#[instrument(skip(registry))]
pub async fn get_game(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<i32>,
    Participant(participant): Participant,
) -> Result<Json<GameView>, ApiError> {
    let session = registry.session(GameId::new(id), participant).await?;
    Ok(Json(GameView::from(&session)))
}

/// `POST /api/games/{id}/moves`
#[instrument(skip(registry))]
pub async fn submit_move(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<i32>,
    Participant(participant): Participant,
    Json(request): Json<MoveRequest>,
) -> Result<Json<SyncMessage>, ApiError> {
    let state = registry
        .submit_move(GameId::new(id), participant, request.row, request.col, request.version)
        .await?;
    Ok(Json(state))
}

/// `POST /api/games/{id}/rematch`
#[instrument(skip(registry))]
pub async fn rematch(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<i32>,
    Participant(participant): Participant,
) -> Result<Json<SyncMessage>, ApiError> {
    let state = registry.rematch(GameId::new(id), participant).await?;
    Ok(Json(state))
}
