//! HTTP client for a running server, used by the CLI.

use anyhow::{Context, Result, bail};
use othello_rules::ParticipantId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::http::{
    ErrorBody, GameView, JoinResponse, MoveRequest, NewUserRequest, USER_HEADER, UserResponse,
};
use crate::session::GameId;
use crate::sync::SyncMessage;

/// REST client acting for one participant.
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    client: reqwest::Client,
    user: Option<ParticipantId>,
}

impl RestClient {
    /// Creates a client for `base_url` (e.g. `http://127.0.0.1:3000`).
    pub fn new(base_url: impl Into<String>, user: Option<ParticipantId>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            user,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn user(&self) -> Result<ParticipantId> {
        self.user.context("This command needs --user")
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.context("Malformed response body");
        }
        match response.json::<ErrorBody>().await {
            Ok(body) => bail!("{} ({}): {}", status, body.kind, body.error),
            Err(_) => bail!("Server answered {}", status),
        }
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.client.post(self.url(path));
        if let Some(user) = self.user {
            request = request.header(USER_HEADER, user.to_string());
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        debug!(path, "POST");
        Self::decode(request.send().await.context("Request failed")?).await
    }

    /// Registers a user.
    #[instrument(skip(self))]
    pub async fn create_user(&self, name: &str) -> Result<UserResponse> {
        let body = NewUserRequest { name: name.to_string() };
        self.post("/users", Some(&body)).await
    }

    /// Opens a game hosted by this client's user.
    #[instrument(skip(self))]
    pub async fn create_game(&self) -> Result<SyncMessage> {
        self.user()?;
        self.post::<(), _>("/games", None).await
    }

    /// Joins a game as guest.
    #[instrument(skip(self))]
    pub async fn join(&self, game: GameId) -> Result<JoinResponse> {
        self.user()?;
        self.post::<(), _>(&format!("/games/{}/join", game), None).await
    }

    /// Reads a game.
    #[instrument(skip(self))]
    pub async fn game(&self, game: GameId) -> Result<GameView> {
        let user = self.user()?;
        let response = self
            .client
            .get(self.url(&format!("/games/{}", game)))
            .header(USER_HEADER, user.to_string())
            .send()
            .await
            .context("Request failed")?;
        Self::decode(response).await
    }

    /// Plays a move.
    #[instrument(skip(self))]
    pub async fn play(
        &self,
        game: GameId,
        row: i32,
        col: i32,
        version: Option<u64>,
    ) -> Result<SyncMessage> {
        self.user()?;
        let body = MoveRequest { row, col, version };
        self.post(&format!("/games/{}/moves", game), Some(&body)).await
    }

    /// Starts a rematch.
    #[instrument(skip(self))]
    pub async fn rematch(&self, game: GameId) -> Result<SyncMessage> {
        self.user()?;
        self.post::<(), _>(&format!("/games/{}/rematch", game), None).await
    }
}
