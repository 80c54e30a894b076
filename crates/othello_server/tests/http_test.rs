//! Router tests driven with `oneshot`, no socket involved.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use othello_rules::{BoardState, ParticipantId};
use othello_server::http::{USER_HEADER, router};
use othello_server::{MemoryGameStore, RelayChannel, SessionRegistry, SyncMessage};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app() -> Router {
    let registry = SessionRegistry::new(
        Arc::new(MemoryGameStore::new()),
        Arc::new(RelayChannel::default()),
    );
    router(Arc::new(registry))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<i32>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("Serializes")))
            .expect("Valid request"),
        None => builder.body(Body::empty()).expect("Valid request"),
    };
    let response = app.clone().oneshot(request).await.expect("Router answers");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Body reads")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn signup(app: &Router, name: &str) -> i32 {
    let body = Some(json!({ "name": name }));
    let (status, body) = call(app, Method::POST, "/api/users", None, body).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().expect("Numeric id") as i32
}

/// Host and guest signed up, game created and joined. Returns (host, guest, game).
async fn seated(app: &Router) -> (i32, i32, i64) {
    let host = signup(app, "host").await;
    let guest = signup(app, "guest").await;
    let (status, created) = call(app, Method::POST, "/api/games", Some(host), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let game = created["sessionId"].as_i64().expect("Game id");
    let join = format!("/api/games/{game}/join");
    let (status, joined) = call(app, Method::POST, &join, Some(guest), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["outcome"], "seated");
    (host, guest, game)
}

#[tokio::test]
async fn test_health() {
    let (status, _) = call(&app(), Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_game_returns_initial_state() {
    let app = app();
    let host = signup(&app, "host").await;
    let (status, body) = call(&app, Method::POST, "/api/games", Some(host), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let state: SyncMessage = serde_json::from_value(body).expect("Sync shape");
    assert_eq!(state.version, 0);
    assert_eq!(
        state.board_state().expect("Decodes"),
        BoardState::initial(ParticipantId::new(host))
    );
}

#[tokio::test]
async fn test_blank_name_rejected() {
    let body = Some(json!({ "name": "  " }));
    let (status, body) = call(&app(), Method::POST, "/api/users", None, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn test_missing_user_header() {
    let (status, body) = call(&app(), Method::POST, "/api/games", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn test_unknown_user_cannot_create_or_join() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/api/games", Some(999), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unknown_user");

    let host = signup(&app, "host").await;
    let (_, created) = call(&app, Method::POST, "/api/games", Some(host), None).await;
    let game = created["sessionId"].as_i64().expect("Game id");
    let join = format!("/api/games/{game}/join");
    let (status, body) = call(&app, Method::POST, &join, Some(999), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unknown_user");
}

#[tokio::test]
async fn test_unknown_game() {
    let (status, body) = call(&app(), Method::GET, "/api/games/404", Some(1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "game_not_found");
}

#[tokio::test]
async fn test_third_player_and_strangers() {
    let app = app();
    let (_, _, game) = seated(&app).await;
    let stranger = signup(&app, "stranger").await;

    let join = format!("/api/games/{game}/join");
    let (status, body) = call(&app, Method::POST, &join, Some(stranger), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "game_full");

    let view = format!("/api/games/{game}");
    let (status, body) = call(&app, Method::GET, &view, Some(stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "not_authorized");
}

#[tokio::test]
async fn test_game_view() {
    let app = app();
    let (host, guest, game) = seated(&app).await;
    let uri = format!("/api/games/{game}");
    let (status, view) = call(&app, Method::GET, &uri, Some(guest), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["hostId"], host);
    assert_eq!(view["guestId"], guest);
    assert_eq!(view["blackScore"], 2);
    assert_eq!(view["whiteScore"], 2);
    assert_eq!(view["legalMoves"].as_array().expect("List").len(), 4);
    assert_eq!(view["winner"], Value::Null);
}

#[tokio::test]
async fn test_move_flow() {
    let app = app();
    let (host, guest, game) = seated(&app).await;
    let moves = format!("/api/games/{game}/moves");

    let body = Some(json!({ "row": 2, "col": 4 }));
    let (status, body) = call(&app, Method::POST, &moves, Some(guest), body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "not_your_turn");

    let body = Some(json!({ "row": 0, "col": 0 }));
    let (status, body) = call(&app, Method::POST, &moves, Some(host), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "illegal_move");

    let (status, body) = call(
        &app,
        Method::POST,
        &moves,
        Some(host),
        Some(json!({ "row": 2, "col": 4, "version": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 1);
    assert_eq!(body["turn"], "2");

    let (status, body) = call(
        &app,
        Method::POST,
        &moves,
        Some(guest),
        Some(json!({ "row": 2, "col": 3, "version": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "stale_version");
}

#[tokio::test]
async fn test_rematch_mid_game() {
    let app = app();
    let (host, _, game) = seated(&app).await;
    let rematch = format!("/api/games/{game}/rematch");
    let (status, body) = call(&app, Method::POST, &rematch, Some(host), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "game_not_over");
}
