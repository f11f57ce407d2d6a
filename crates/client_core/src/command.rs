use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{CoordinateMove, Difficulty, GameMode, SessionId, Side, Square},
    error::ApiErrorBody,
    position::Position,
    protocol::{
        AnalysisReport, AnalyzeRequest, CategoryList, CreateGameRequest, DifficultyLevel,
        DifficultyList, GameEnvelope, GameList, GameSnapshot, MakeMoveRequest, MoveOutcome,
        OpeningCategory, OpeningEnvelope, OpeningList, OpeningSummary, SquareMovesResponse,
    },
};
use tracing::{debug, info, warn};

use crate::{
    dispatch::{self, Disposition},
    error::{CommandError, SessionCreateError},
    store::{SessionState, SessionStore},
};

/// Settings for a new game.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub mode: GameMode,
    /// Engine strength when playing against a human.
    pub difficulty: Difficulty,
    pub human_side: Side,
    pub white_difficulty: Difficulty,
    pub black_difficulty: Difficulty,
    pub opening_eco: Option<String>,
}

impl GameConfig {
    pub fn human_vs_engine(human_side: Side, difficulty: Difficulty) -> Self {
        Self {
            mode: GameMode::HumanVsAi,
            difficulty,
            human_side,
            white_difficulty: Difficulty::Medium,
            black_difficulty: Difficulty::Medium,
            opening_eco: None,
        }
    }

    pub fn engine_vs_engine(white: Difficulty, black: Difficulty) -> Self {
        Self {
            mode: GameMode::AiVsAi,
            difficulty: Difficulty::Medium,
            human_side: Side::White,
            white_difficulty: white,
            black_difficulty: black,
            opening_eco: None,
        }
    }

    pub fn with_opening(mut self, eco: impl Into<String>) -> Self {
        self.opening_eco = Some(eco.into());
        self
    }

    pub fn to_request(&self) -> CreateGameRequest {
        CreateGameRequest {
            mode: self.mode,
            difficulty: self.difficulty,
            player_color: self.human_side,
            white_difficulty: self.white_difficulty,
            black_difficulty: self.black_difficulty,
            opening_eco: self.opening_eco.clone(),
        }
    }
}

#[async_trait]
pub trait GameApi: Send + Sync {
    async fn create_game(&self, request: &CreateGameRequest) -> Result<GameEnvelope, CommandError>;
    async fn fetch_game(&self, id: &SessionId) -> Result<GameEnvelope, CommandError>;
    async fn submit_move(&self, id: &SessionId, notation: &str)
        -> Result<MoveOutcome, CommandError>;
    async fn moves_for_square(
        &self,
        id: &SessionId,
        square: Square,
    ) -> Result<Vec<String>, CommandError>;
    async fn delete_game(&self, id: &SessionId) -> Result<(), CommandError>;
    async fn list_games(&self) -> Result<Vec<GameSnapshot>, CommandError>;
    async fn analyze(&self, fen: &str, depth: u32) -> Result<AnalysisReport, CommandError>;
}

/// Stateless reference data served next to the game routes.
#[async_trait]
pub trait OpeningCatalog: Send + Sync {
    async fn list_openings(&self) -> Result<Vec<OpeningSummary>, CommandError>;
    async fn popular_openings(&self, limit: u32) -> Result<Vec<OpeningSummary>, CommandError>;
    async fn openings_in_category(&self, category: &str)
        -> Result<Vec<OpeningSummary>, CommandError>;
    async fn opening_categories(&self) -> Result<Vec<OpeningCategory>, CommandError>;
    /// `None` when the server has no opening with that code.
    async fn opening_by_eco(&self, eco: &str) -> Result<Option<OpeningSummary>, CommandError>;
    /// `None` when no opening carries that name.
    async fn search_openings(&self, name: &str) -> Result<Option<OpeningSummary>, CommandError>;
    async fn difficulties(&self) -> Result<Vec<DifficultyLevel>, CommandError>;
}

pub struct MissingOpeningCatalog;

#[async_trait]
impl OpeningCatalog for MissingOpeningCatalog {
    async fn list_openings(&self) -> Result<Vec<OpeningSummary>, CommandError> {
        Err(CommandError::Unavailable("opening catalog"))
    }

    async fn popular_openings(&self, _limit: u32) -> Result<Vec<OpeningSummary>, CommandError> {
        Err(CommandError::Unavailable("opening catalog"))
    }

    async fn openings_in_category(
        &self,
        _category: &str,
    ) -> Result<Vec<OpeningSummary>, CommandError> {
        Err(CommandError::Unavailable("opening catalog"))
    }

    async fn opening_categories(&self) -> Result<Vec<OpeningCategory>, CommandError> {
        Err(CommandError::Unavailable("opening catalog"))
    }

    async fn opening_by_eco(&self, _eco: &str) -> Result<Option<OpeningSummary>, CommandError> {
        Err(CommandError::Unavailable("opening catalog"))
    }

    async fn search_openings(&self, _name: &str) -> Result<Option<OpeningSummary>, CommandError> {
        Err(CommandError::Unavailable("opening catalog"))
    }

    async fn difficulties(&self) -> Result<Vec<DifficultyLevel>, CommandError> {
        Err(CommandError::Unavailable("difficulty listing"))
    }
}

pub struct HttpGameApi {
    http: Client,
    server_url: String,
}

impl HttpGameApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[async_trait]
impl OpeningCatalog for HttpGameApi {
    async fn list_openings(&self) -> Result<Vec<OpeningSummary>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/openings", self.server_url))
            .send()
            .await?;
        let list: OpeningList = read_json(response).await?;
        Ok(list.openings)
    }

    async fn popular_openings(&self, limit: u32) -> Result<Vec<OpeningSummary>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/openings/popular", self.server_url))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let list: OpeningList = read_json(response).await?;
        Ok(list.openings)
    }

    async fn openings_in_category(
        &self,
        category: &str,
    ) -> Result<Vec<OpeningSummary>, CommandError> {
        let mut url = url::Url::parse(&format!("{}/api/openings/category/", self.server_url))
            .map_err(|err| CommandError::Transport(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| CommandError::Transport("server url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(category);
        let response = self.http.get(url).send().await?;
        let list: OpeningList = read_json(response).await?;
        Ok(list.openings)
    }

    async fn opening_categories(&self) -> Result<Vec<OpeningCategory>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/openings/categories", self.server_url))
            .send()
            .await?;
        let list: CategoryList = read_json(response).await?;
        Ok(list.categories)
    }

    async fn opening_by_eco(&self, eco: &str) -> Result<Option<OpeningSummary>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/openings/eco/{eco}", self.server_url))
            .send()
            .await?;
        read_optional_opening(response).await
    }

    async fn search_openings(&self, name: &str) -> Result<Option<OpeningSummary>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/openings/search", self.server_url))
            .query(&[("name", name)])
            .send()
            .await?;
        read_optional_opening(response).await
    }

    async fn difficulties(&self) -> Result<Vec<DifficultyLevel>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/difficulties", self.server_url))
            .send()
            .await?;
        let list: DifficultyList = read_json(response).await?;
        Ok(list.difficulties)
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn create_game(&self, request: &CreateGameRequest) -> Result<GameEnvelope, CommandError> {
        let response = self
            .http
            .post(format!("{}/api/games", self.server_url))
            .json(request)
            .send()
            .await?;
        read_json(response).await
    }

    async fn fetch_game(&self, id: &SessionId) -> Result<GameEnvelope, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/games/{id}", self.server_url))
            .send()
            .await?;
        read_json(response).await
    }

    async fn submit_move(
        &self,
        id: &SessionId,
        notation: &str,
    ) -> Result<MoveOutcome, CommandError> {
        let response = self
            .http
            .post(format!("{}/api/games/{id}/move", self.server_url))
            .json(&MakeMoveRequest {
                notation: notation.to_string(),
            })
            .send()
            .await?;
        read_json(response).await
    }

    async fn moves_for_square(
        &self,
        id: &SessionId,
        square: Square,
    ) -> Result<Vec<String>, CommandError> {
        let response = self
            .http
            .get(format!(
                "{}/api/games/{id}/legal-moves/{square}",
                self.server_url
            ))
            .send()
            .await?;
        let body: SquareMovesResponse = read_json(response).await?;
        Ok(body.moves)
    }

    async fn delete_game(&self, id: &SessionId) -> Result<(), CommandError> {
        let response = self
            .http
            .delete(format!("{}/api/games/{id}", self.server_url))
            .send()
            .await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn list_games(&self) -> Result<Vec<GameSnapshot>, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/games", self.server_url))
            .send()
            .await?;
        let list: GameList = read_json(response).await?;
        Ok(list.games)
    }

    async fn analyze(&self, fen: &str, depth: u32) -> Result<AnalysisReport, CommandError> {
        let response = self
            .http
            .post(format!("{}/api/analyze", self.server_url))
            .json(&AnalyzeRequest {
                fen: fen.to_string(),
                depth,
            })
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, CommandError> {
    let status = response.status();
    if !status.is_success() {
        let detail = match response.json::<ApiErrorBody>().await {
            Ok(body) => body.detail,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        return Err(CommandError::Rejected {
            status: status.as_u16(),
            detail,
        });
    }
    Ok(response.json().await?)
}

async fn read_optional_opening(response: Response) -> Result<Option<OpeningSummary>, CommandError> {
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let envelope: OpeningEnvelope = read_json(response).await?;
    Ok(Some(envelope.opening))
}

/// Command-channel operations bound to the session store.
///
/// Failures in the interaction path (move submission, destination lookup)
/// are recorded on the store and never returned to the caller.
pub struct CommandChannel {
    api: Arc<dyn GameApi>,
    store: Arc<SessionStore>,
}

impl CommandChannel {
    pub fn new(api: Arc<dyn GameApi>, store: Arc<SessionStore>) -> Self {
        Self { api, store }
    }

    /// Requests a new session. The returned snapshot carries an id and a
    /// readable position; the store is not touched.
    pub async fn create(&self, config: &GameConfig) -> Result<GameSnapshot, SessionCreateError> {
        let envelope = self
            .api
            .create_game(&config.to_request())
            .await
            .inspect_err(|err| warn!(mode = ?config.mode, "create session failed: {err}"))?;
        let snapshot = envelope
            .game
            .filter(|game| game.id.is_some())
            .ok_or(SessionCreateError::EmptyResult)?;
        if let Some(fen) = snapshot.fen.as_deref() {
            Position::from_fen(fen)
                .map_err(|err| SessionCreateError::MalformedResponse(err.to_string()))?;
        }
        debug!(mode = ?config.mode, "session snapshot received");
        Ok(snapshot)
    }

    /// Submits `mv` for the current session. Returns whether the server
    /// accepted it; a rejection leaves the authoritative state unchanged.
    pub async fn submit_move(&self, mv: CoordinateMove) -> bool {
        let Some(id) = self.store.session_id().await else {
            self.store.record_error("cannot submit a move without a session").await;
            return false;
        };

        let outcome = match self.api.submit_move(&id, &mv.to_string()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(session_id = %id, notation = %mv, "move submission failed: {err}");
                self.record_error_for(&id, err.to_string()).await;
                return false;
            }
        };

        let snapshot = match (outcome.error, outcome.game) {
            (None, Some(snapshot)) => snapshot,
            (error, _) => {
                let message = error.unwrap_or_else(|| format!("move {mv} was not accepted"));
                info!(session_id = %id, notation = %mv, "move rejected: {message}");
                self.record_error_for(&id, message).await;
                return false;
            }
        };

        let disposition = self
            .store
            .update(|state, events| {
                if !holds_session(state, &id) {
                    debug!(
                        session_id = %id,
                        notation = %mv,
                        "discarding move response for replaced session"
                    );
                    return Disposition::Ignored;
                }
                dispatch::apply_move_response(state, mv, &snapshot, events)
            })
            .await;
        matches!(disposition, Disposition::Applied { .. })
    }

    /// Legal moves starting on `square`. Any failure yields an empty list.
    pub async fn legal_destinations(&self, square: Square) -> Vec<CoordinateMove> {
        let Some(id) = self.store.session_id().await else {
            return Vec::new();
        };
        match self.api.moves_for_square(&id, square).await {
            Ok(moves) => moves
                .iter()
                .filter_map(|notation| notation.parse::<CoordinateMove>().ok())
                .filter(|mv| mv.from == square)
                .collect(),
            Err(err) => {
                debug!(session_id = %id, %square, "legal destination lookup failed: {err}");
                Vec::new()
            }
        }
    }

    /// Re-reads the session over the command channel and merges it like a
    /// `state` push frame.
    pub async fn refresh(&self) -> Option<Disposition> {
        let id = self.store.session_id().await?;
        match self.api.fetch_game(&id).await {
            Ok(GameEnvelope {
                game: Some(snapshot),
                ..
            }) => Some(
                self.store
                    .update(|state, events| {
                        if !holds_session(state, &id) {
                            debug!(session_id = %id, "discarding refresh for replaced session");
                            return Disposition::Ignored;
                        }
                        dispatch::merge(state, &snapshot, events)
                    })
                    .await,
            ),
            Ok(_) => {
                self.record_error_for(&id, "session refresh returned no game".into())
                    .await;
                None
            }
            Err(err) => {
                warn!(session_id = %id, "session refresh failed: {err}");
                self.record_error_for(&id, err.to_string()).await;
                None
            }
        }
    }

    /// Errors from a session that has since been replaced are dropped.
    async fn record_error_for(&self, id: &SessionId, message: String) {
        self.store
            .update(|state, events| {
                if holds_session(state, id) {
                    state.record_error(message, events);
                } else {
                    debug!(session_id = %id, "dropping error for replaced session: {message}");
                }
            })
            .await;
    }

    pub async fn delete(&self, id: &SessionId) -> Result<(), CommandError> {
        self.api.delete_game(id).await
    }

    pub async fn analyze(&self, fen: &str, depth: u32) -> Result<AnalysisReport, CommandError> {
        self.api.analyze(fen, depth).await
    }

    pub async fn active_games(&self) -> Result<Vec<GameSnapshot>, CommandError> {
        self.api.list_games().await
    }
}

fn holds_session(state: &SessionState, id: &SessionId) -> bool {
    state.session.id.as_ref() == Some(id)
}
