//! HTTP and WebSocket surface over the session registry.

mod error;
mod handlers;
mod participant;
mod ws;

pub use error::{ApiError, ErrorBody, classify};
pub use handlers::{GameView, JoinResponse, MoveRequest, NewUserRequest, UserResponse};
pub use participant::{Participant, USER_HEADER};
pub use ws::{ClientMessage, ServerMessage};

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::registry::SessionRegistry;

/// Builds the application router.
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    let api = Router::new()
        .route("/users", post(handlers::create_user))
        .route("/games", post(handlers::create_game))
        .route("/games/{id}", get(handlers::get_game))
        .route("/games/{id}/join", post(handlers::join_game))
        .route("/games/{id}/moves", post(handlers::submit_move))
        .route("/games/{id}/rematch", post(handlers::rematch))
        .route("/games/{id}/ws", get(ws::game_socket));

    Router::new()
        .route("/healthz", get(handlers::health))
        .nest("/api", api)
        .with_state(registry)
}

/// Serves the router on `listener` until Ctrl-C.
///
/// # Errors
///
/// Returns an I/O error if the server fails.
#[instrument(skip_all)]
pub async fn serve(listener: TcpListener, registry: Arc<SessionRegistry>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Server ready");
    }
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
}
