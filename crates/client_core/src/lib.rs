use std::sync::Arc;

use shared::{
    domain::{CoordinateMove, GameStatus, SessionId, Square},
    error::PositionError,
    position::Position,
    protocol::{AnalysisReport, ControlFrame, GameSnapshot, PrimaryFrame},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod channel;
pub mod command;
mod dispatch;
pub mod error;
pub mod selection;
pub mod store;

pub use channel::{channel_url, ChannelKind};
pub use command::{
    CommandChannel, GameApi, GameConfig, HttpGameApi, MissingOpeningCatalog, OpeningCatalog,
};
pub use dispatch::Disposition;
pub use error::{ChannelError, CommandError, SessionCreateError};
pub use selection::{BoardController, ClickOutcome};
pub use store::{
    ChannelStatus, InteractionOverlay, SelectionPhase, Session, SessionState, SessionStore,
    StoreEvent,
};

use channel::{ChannelSlots, PushChannel};

/// Fastest engine-vs-engine playback the server accepts, in seconds per move.
pub const MIN_SPEED_SECONDS: f64 = 0.3;
/// Slowest engine-vs-engine playback the server accepts, in seconds per move.
pub const MAX_SPEED_SECONDS: f64 = 5.0;

/// Entry point for a front-end: owns the store, the command channel and the
/// push channels of the active session.
pub struct GameClient {
    server_url: String,
    store: Arc<SessionStore>,
    commands: Arc<CommandChannel>,
    board: BoardController,
    catalog: Arc<dyn OpeningCatalog>,
    channels: Mutex<ChannelSlots>,
}

impl GameClient {
    pub fn new(server_url: impl Into<String>) -> Arc<Self> {
        let server_url = server_url.into();
        let http = Arc::new(HttpGameApi::new(server_url.clone()));
        Self::with_dependencies(server_url, http.clone(), http)
    }

    /// Session commands go through `api`; the opening catalog is left
    /// unavailable.
    pub fn with_api(server_url: impl Into<String>, api: Arc<dyn GameApi>) -> Arc<Self> {
        Self::with_dependencies(server_url, api, Arc::new(MissingOpeningCatalog))
    }

    pub fn with_dependencies(
        server_url: impl Into<String>,
        api: Arc<dyn GameApi>,
        catalog: Arc<dyn OpeningCatalog>,
    ) -> Arc<Self> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        let store = SessionStore::new();
        let commands = Arc::new(CommandChannel::new(api, Arc::clone(&store)));
        Arc::new(Self {
            board: BoardController::new(Arc::clone(&store), Arc::clone(&commands)),
            catalog,
            server_url,
            store,
            commands,
            channels: Mutex::new(ChannelSlots::default()),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn store(&self) -> Arc<SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    /// Opening catalog and difficulty listing.
    pub fn catalog(&self) -> &dyn OpeningCatalog {
        self.catalog.as_ref()
    }

    /// Creates a session and attaches the push channel for its mode. On
    /// failure the store and the open channels are left as they were.
    pub async fn create_session(&self, config: GameConfig) -> Result<Session, SessionCreateError> {
        let mut channels = self.channels.lock().await;
        let snapshot = self.commands.create(&config).await?;

        channels.close_all(&self.store).await;
        self.store
            .replace_session(&snapshot)
            .await
            .map_err(|err| SessionCreateError::MalformedResponse(err.to_string()))?;
        let session = self.store.session().await;
        let Some(id) = session.id.clone() else {
            return Err(SessionCreateError::EmptyResult);
        };
        info!(session_id = %id, mode = ?session.mode, "session created");

        let kind = channel_kind_for(&session);
        if let Err(err) = self.open_channel(&mut channels, kind, &id).await {
            warn!(session_id = %id, channel = %kind, "session has no push channel: {err}");
        }
        Ok(session)
    }

    /// Deletes the session on the server and closes its channels. The local
    /// mirror keeps the last known state.
    pub async fn end_session(&self) -> Result<(), CommandError> {
        self.close_channels().await;
        let Some(id) = self.store.session_id().await else {
            return Ok(());
        };
        self.commands
            .delete(&id)
            .await
            .inspect_err(|err| warn!(session_id = %id, "failed to delete session: {err}"))?;
        info!(session_id = %id, "session ended");
        Ok(())
    }

    pub async fn close_channels(&self) {
        self.channels.lock().await.close_all(&self.store).await;
    }

    /// Replaces the session with an offline one at `fen`. An unreadable
    /// position leaves everything as it was.
    pub async fn load_position(&self, fen: &str) -> Result<(), PositionError> {
        let board = Position::from_fen(fen)
            .inspect_err(|err| warn!("refusing to load position: {err}"))?;
        let snapshot = GameSnapshot {
            fen: Some(fen.to_string()),
            status: Some(GameStatus::Waiting),
            turn: Some(board.side_to_move()),
            ..GameSnapshot::default()
        };
        self.close_channels().await;
        self.store.replace_session(&snapshot).await
    }

    pub async fn click(&self, square: Square) -> ClickOutcome {
        self.board.click(square).await
    }

    pub async fn submit_move(&self, mv: CoordinateMove) -> bool {
        self.commands.submit_move(mv).await
    }

    pub async fn legal_destinations(&self, square: Square) -> Vec<CoordinateMove> {
        self.commands.legal_destinations(square).await
    }

    pub async fn refresh(&self) -> Option<Disposition> {
        self.commands.refresh().await
    }

    pub async fn analyze_position(
        &self,
        fen: &str,
        depth: u32,
    ) -> Result<AnalysisReport, CommandError> {
        self.commands.analyze(fen, depth).await
    }

    /// Sessions the server still runs, including ones other clients opened.
    pub async fn active_games(&self) -> Result<Vec<GameSnapshot>, CommandError> {
        self.commands.active_games().await
    }

    pub async fn connect_primary(&self) -> Result<(), ChannelError> {
        self.connect(ChannelKind::Primary).await
    }

    pub async fn connect_control(&self) -> Result<(), ChannelError> {
        self.connect(ChannelKind::Control).await
    }

    /// Reopens the push channel that matches the current session's mode.
    pub async fn reconnect(&self) -> Result<(), ChannelError> {
        let session = self.store.session().await;
        self.connect(channel_kind_for(&session)).await
    }

    /// Asks the primary channel to push a fresh `state` frame.
    pub async fn request_state(&self) {
        let channels = self.channels.lock().await;
        let sent = match channels.primary() {
            Some(channel) => channel.send(PrimaryFrame::GetState),
            None => Err(ChannelError::NotConnected(ChannelKind::Primary)),
        };
        drop(channels);
        self.note_send_failure(ChannelKind::Primary, sent).await;
    }

    pub async fn pause(&self) {
        self.send_control(ControlFrame::Pause).await;
    }

    pub async fn resume(&self) {
        self.send_control(ControlFrame::Resume).await;
    }

    /// Plays exactly one engine move while paused.
    pub async fn step(&self) {
        self.send_control(ControlFrame::Step).await;
    }

    /// Sets the delay between engine moves, clamped to
    /// [`MIN_SPEED_SECONDS`]..=[`MAX_SPEED_SECONDS`].
    pub async fn set_speed(&self, seconds: f64) {
        if !seconds.is_finite() {
            warn!(seconds, "ignoring non-finite playback speed");
            self.store
                .record_error(format!("invalid playback speed: {seconds}"))
                .await;
            return;
        }
        let value = seconds.clamp(MIN_SPEED_SECONDS, MAX_SPEED_SECONDS);
        self.send_control(ControlFrame::Speed { value }).await;
    }

    async fn connect(&self, kind: ChannelKind) -> Result<(), ChannelError> {
        let mut channels = self.channels.lock().await;
        let id = self
            .store
            .session_id()
            .await
            .ok_or(ChannelError::NoSession(kind))?;
        self.open_channel(&mut channels, kind, &id).await
    }

    async fn open_channel(
        &self,
        channels: &mut ChannelSlots,
        kind: ChannelKind,
        id: &SessionId,
    ) -> Result<(), ChannelError> {
        channels.close(kind, &self.store).await;
        let store = Arc::clone(&self.store);
        match kind {
            ChannelKind::Primary => {
                let channel = PushChannel::open(store, kind, &self.server_url, id).await?;
                channels.install_primary(channel);
            }
            ChannelKind::Control => {
                let channel = PushChannel::open(store, kind, &self.server_url, id).await?;
                channels.install_control(channel);
            }
        }
        Ok(())
    }

    async fn send_control(&self, frame: ControlFrame) {
        let channels = self.channels.lock().await;
        let sent = match channels.control() {
            Some(channel) => channel.send(frame),
            None => Err(ChannelError::NotConnected(ChannelKind::Control)),
        };
        drop(channels);
        self.note_send_failure(ChannelKind::Control, sent).await;
    }

    async fn note_send_failure(&self, kind: ChannelKind, sent: Result<(), ChannelError>) {
        if let Err(err) = sent {
            warn!(channel = %kind, "failed to send frame: {err}");
            self.store.record_error(err.to_string()).await;
        }
    }
}

fn channel_kind_for(session: &Session) -> ChannelKind {
    if session.mode.is_automated() {
        ChannelKind::Control
    } else {
        ChannelKind::Primary
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod store_tests;

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod selection_tests;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
