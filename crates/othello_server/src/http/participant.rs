//! Resolves the calling participant from the request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use othello_rules::ParticipantId;
use tracing::debug;

use super::error::ApiError;

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";

/// Query parameter accepted when headers cannot be set (browser sockets).
const USER_QUERY: &str = "user";

/// The participant making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant(pub ParticipantId);

fn parse(raw: &str) -> Result<ParticipantId, ApiError> {
    raw.trim()
        .parse::<i32>()
        .map(ParticipantId::new)
        .map_err(|_| ApiError::bad_request(format!("Invalid user id: {:?}", raw)))
}

impl<S: Send + Sync> FromRequestParts<S> for Participant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(USER_HEADER) {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::bad_request("User id header is not text"))?;
            return parse(raw).map(Participant);
        }
        let from_query = parts.uri.query().and_then(|query| {
            query.split('&').find_map(|pair| {
                pair.split_once('=')
                    .filter(|(key, _)| *key == USER_QUERY)
                    .map(|(_, value)| value)
            })
        });
        match from_query {
            Some(raw) => parse(raw).map(Participant),
            None => {
                debug!(path = %parts.uri.path(), "Request without participant");
                Err(ApiError::bad_request(format!("Missing {} header", USER_HEADER)))
            }
        }
    }
}
