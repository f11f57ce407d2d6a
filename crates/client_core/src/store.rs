use std::{collections::BTreeMap, sync::Arc};

use shared::{
    domain::{
        CoordinateMove, Difficulty, GameMode, GameStatus, PieceKind, SessionId, Side, Square,
    },
    error::PositionError,
    position::{Position, STARTING_FEN},
    protocol::{GameSnapshot, OpeningInfo, ServerFrame},
};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::{channel::ChannelKind, dispatch};

const STORE_EVENT_CAPACITY: usize = 256;

/// Authoritative mirror of the server-side game.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Option<SessionId>,
    pub mode: GameMode,
    pub position: String,
    pub board: Position,
    pub status: GameStatus,
    pub white_difficulty: Difficulty,
    pub black_difficulty: Difficulty,
    pub move_history: Vec<String>,
    pub evaluation: f64,
    pub opening: Option<OpeningInfo>,
    pub side_to_move: Side,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_draw: bool,
    pub legal_moves: Vec<String>,
    pub is_white_human: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: None,
            mode: GameMode::HumanVsAi,
            position: STARTING_FEN.to_string(),
            board: Position::default(),
            status: GameStatus::Waiting,
            white_difficulty: Difficulty::Medium,
            black_difficulty: Difficulty::Medium,
            move_history: Vec::new(),
            evaluation: 0.0,
            opening: None,
            side_to_move: Side::White,
            is_check: false,
            is_checkmate: false,
            is_stalemate: false,
            is_draw: false,
            legal_moves: Vec::new(),
            is_white_human: true,
        }
    }
}

impl Session {
    /// Side controlled by the local player, `None` for engine-vs-engine games.
    pub fn human_side(&self) -> Option<Side> {
        match self.mode {
            GameMode::AiVsAi => None,
            GameMode::HumanVsAi if self.is_white_human => Some(Side::White),
            GameMode::HumanVsAi => Some(Side::Black),
        }
    }

    /// Whether a click on `square` may start a selection.
    pub fn is_selectable(&self, square: Square) -> bool {
        let Some(piece) = self.board.piece_at(square) else {
            return false;
        };
        if self.mode.is_automated() {
            return true;
        }
        self.human_side()
            .is_some_and(|human| piece.side == human && human == self.side_to_move)
    }

    /// Overwrites every field present in `snapshot`. Returns whether the
    /// position string changed. A position that does not parse rejects the
    /// whole snapshot before anything is written.
    fn merge(&mut self, snapshot: &GameSnapshot) -> Result<bool, PositionError> {
        let parsed = snapshot
            .fen
            .as_deref()
            .map(|fen| Position::from_fen(fen).map(|board| (fen, board)))
            .transpose()?;

        let mut position_changed = false;
        if let Some((fen, board)) = parsed {
            position_changed = fen != self.position;
            self.position = fen.to_string();
            self.board = board;
        }
        if let Some(id) = &snapshot.id {
            self.id = Some(id.clone());
        }
        if let Some(mode) = snapshot.mode {
            self.mode = mode;
        }
        if let Some(status) = snapshot.status {
            self.status = status;
        }
        if let Some(difficulty) = snapshot.white_difficulty {
            self.white_difficulty = difficulty;
        }
        if let Some(difficulty) = snapshot.black_difficulty {
            self.black_difficulty = difficulty;
        }
        if let Some(history) = &snapshot.move_history {
            self.move_history = history.clone();
        }
        if let Some(evaluation) = snapshot.evaluation {
            self.evaluation = evaluation;
        }
        if let Some(opening) = &snapshot.opening {
            self.opening = (!opening.is_empty()).then(|| opening.clone());
        }
        if let Some(turn) = snapshot.turn {
            self.side_to_move = turn;
        }
        if let Some(flag) = snapshot.is_check {
            self.is_check = flag;
        }
        if let Some(flag) = snapshot.is_checkmate {
            self.is_checkmate = flag;
        }
        if let Some(flag) = snapshot.is_stalemate {
            self.is_stalemate = flag;
        }
        if let Some(flag) = snapshot.is_draw {
            self.is_draw = flag;
        }
        if let Some(moves) = &snapshot.legal_moves {
            self.legal_moves = moves.clone();
        }
        if let Some(flag) = snapshot.is_white_human {
            self.is_white_human = flag;
        }
        Ok(position_changed)
    }
}

/// Correlates an asynchronous destination lookup with the selection that
/// started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectionToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub square: Square,
    pub token: SelectionToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPhase {
    #[default]
    Idle,
    Selected(Selection),
    Committing(CoordinateMove),
}

/// Local-only interaction state layered over the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionOverlay {
    pub phase: SelectionPhase,
    /// Destination square paired with the move that reaches it.
    pub highlights: BTreeMap<Square, CoordinateMove>,
    pub last_move: Option<(Square, Square)>,
}

impl InteractionOverlay {
    pub fn selected_square(&self) -> Option<Square> {
        match self.phase {
            SelectionPhase::Selected(selection) => Some(selection.square),
            _ => None,
        }
    }

    fn clear_selection(&mut self) {
        self.phase = SelectionPhase::Idle;
        self.highlights.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelLink {
    pub status: ChannelStatus,
    generation: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connectivity {
    pub primary: ChannelLink,
    pub control: ChannelLink,
}

impl Connectivity {
    pub fn status(&self, kind: ChannelKind) -> &ChannelStatus {
        &self.link(kind).status
    }

    fn link(&self, kind: ChannelKind) -> &ChannelLink {
        match kind {
            ChannelKind::Primary => &self.primary,
            ChannelKind::Control => &self.control,
        }
    }

    fn link_mut(&mut self, kind: ChannelKind) -> &mut ChannelLink {
        match kind {
            ChannelKind::Primary => &mut self.primary,
            ChannelKind::Control => &mut self.control,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SessionReplaced,
    SnapshotApplied { position_changed: bool },
    StatusChanged(GameStatus),
    OverlayChanged,
    ChannelStatusChanged(ChannelKind, ChannelStatus),
    SpeedChanged(f64),
    ErrorRecorded(String),
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub session: Session,
    pub overlay: InteractionOverlay,
    pub connectivity: Connectivity,
    pub last_error: Option<String>,
    pub control_speed: Option<f64>,
    next_token: u64,
}

impl SessionState {
    pub(crate) fn merge_snapshot(
        &mut self,
        snapshot: &GameSnapshot,
        events: &mut Vec<StoreEvent>,
    ) -> Result<bool, PositionError> {
        let previous_status = self.session.status;
        let position_changed = self.session.merge(snapshot)?;
        if position_changed {
            self.overlay.clear_selection();
            events.push(StoreEvent::OverlayChanged);
        }
        events.push(StoreEvent::SnapshotApplied { position_changed });
        if self.session.status != previous_status {
            events.push(StoreEvent::StatusChanged(self.session.status));
        }
        Ok(position_changed)
    }

    pub(crate) fn replace_session(
        &mut self,
        snapshot: &GameSnapshot,
        events: &mut Vec<StoreEvent>,
    ) -> Result<(), PositionError> {
        let mut session = Session::default();
        session.merge(snapshot)?;
        self.session = session;
        self.overlay = InteractionOverlay::default();
        self.last_error = None;
        self.control_speed = None;
        events.push(StoreEvent::SessionReplaced);
        Ok(())
    }

    pub(crate) fn set_status(&mut self, status: GameStatus, events: &mut Vec<StoreEvent>) {
        if self.session.status != status {
            self.session.status = status;
            events.push(StoreEvent::StatusChanged(status));
        }
    }

    pub(crate) fn set_last_move(&mut self, from: Square, to: Square, events: &mut Vec<StoreEvent>) {
        if self.overlay.last_move != Some((from, to)) {
            self.overlay.last_move = Some((from, to));
            events.push(StoreEvent::OverlayChanged);
        }
    }

    pub(crate) fn begin_selection(
        &mut self,
        square: Square,
        events: &mut Vec<StoreEvent>,
    ) -> SelectionToken {
        self.next_token += 1;
        let token = SelectionToken(self.next_token);
        self.overlay.highlights.clear();
        self.overlay.phase = SelectionPhase::Selected(Selection { square, token });
        events.push(StoreEvent::OverlayChanged);
        token
    }

    /// Installs destination highlights if `token` still names the live
    /// selection. Returns `false` when the lookup lost the race.
    pub(crate) fn apply_destinations(
        &mut self,
        token: SelectionToken,
        moves: &[CoordinateMove],
        events: &mut Vec<StoreEvent>,
    ) -> bool {
        match self.overlay.phase {
            SelectionPhase::Selected(selection) if selection.token == token => {}
            _ => return false,
        }
        let mut highlights = BTreeMap::new();
        for mv in moves {
            highlights
                .entry(mv.to)
                .and_modify(|existing: &mut CoordinateMove| {
                    if mv.promotion == Some(PieceKind::Queen) {
                        *existing = *mv;
                    }
                })
                .or_insert(*mv);
        }
        self.overlay.highlights = highlights;
        events.push(StoreEvent::OverlayChanged);
        true
    }

    pub(crate) fn clear_selection(&mut self, events: &mut Vec<StoreEvent>) {
        self.overlay.clear_selection();
        events.push(StoreEvent::OverlayChanged);
    }

    pub(crate) fn begin_commit(&mut self, mv: CoordinateMove, events: &mut Vec<StoreEvent>) {
        self.overlay.highlights.clear();
        self.overlay.phase = SelectionPhase::Committing(mv);
        events.push(StoreEvent::OverlayChanged);
    }

    pub(crate) fn finish_commit(&mut self, mv: CoordinateMove, events: &mut Vec<StoreEvent>) {
        if self.overlay.phase == SelectionPhase::Committing(mv) {
            self.overlay.phase = SelectionPhase::Idle;
            events.push(StoreEvent::OverlayChanged);
        }
    }

    pub(crate) fn record_error(&mut self, message: impl Into<String>, events: &mut Vec<StoreEvent>) {
        let message = message.into();
        self.last_error = Some(message.clone());
        events.push(StoreEvent::ErrorRecorded(message));
    }

    pub(crate) fn set_control_speed(&mut self, seconds: f64, events: &mut Vec<StoreEvent>) {
        self.control_speed = Some(seconds);
        events.push(StoreEvent::SpeedChanged(seconds));
    }

    /// Starts a new link generation for `kind` and marks it connecting.
    pub(crate) fn begin_channel(&mut self, kind: ChannelKind, events: &mut Vec<StoreEvent>) -> u64 {
        let link = self.connectivity.link_mut(kind);
        link.generation += 1;
        link.status = ChannelStatus::Connecting;
        events.push(StoreEvent::ChannelStatusChanged(kind, ChannelStatus::Connecting));
        link.generation
    }

    /// Updates the link status only if `generation` is still the newest
    /// link of that kind.
    pub(crate) fn set_channel_status(
        &mut self,
        kind: ChannelKind,
        generation: u64,
        status: ChannelStatus,
        events: &mut Vec<StoreEvent>,
    ) -> bool {
        let link = self.connectivity.link_mut(kind);
        if link.generation != generation {
            return false;
        }
        if link.status != status {
            link.status = status.clone();
            events.push(StoreEvent::ChannelStatusChanged(kind, status));
        }
        true
    }

    /// Marks the current link of `kind` as closed on purpose.
    pub(crate) fn retire_channel(&mut self, kind: ChannelKind, events: &mut Vec<StoreEvent>) {
        let link = self.connectivity.link_mut(kind);
        link.generation += 1;
        if link.status != ChannelStatus::Disconnected {
            link.status = ChannelStatus::Disconnected;
            events.push(StoreEvent::ChannelStatusChanged(
                kind,
                ChannelStatus::Disconnected,
            ));
        }
    }
}

pub struct SessionStore {
    inner: Mutex<SessionState>,
    events: broadcast::Sender<StoreEvent>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        Arc::new(Self {
            inner: Mutex::new(SessionState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.clone()
    }

    pub async fn session(&self) -> Session {
        self.inner.lock().await.session.clone()
    }

    pub async fn overlay(&self) -> InteractionOverlay {
        self.inner.lock().await.overlay.clone()
    }

    pub async fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().await.session.id.clone()
    }

    /// Runs `f` under the store lock and publishes the events it produced
    /// before the lock is released.
    pub(crate) async fn update<R>(
        &self,
        f: impl FnOnce(&mut SessionState, &mut Vec<StoreEvent>) -> R,
    ) -> R {
        let mut guard = self.inner.lock().await;
        let mut events = Vec::new();
        let result = f(&mut guard, &mut events);
        for event in events {
            let _ = self.events.send(event);
        }
        result
    }

    pub(crate) async fn apply_frame(
        &self,
        kind: ChannelKind,
        frame: ServerFrame,
    ) -> dispatch::Disposition {
        self.update(|state, events| dispatch::apply_push_frame(state, kind, frame, events))
            .await
    }

    pub(crate) async fn replace_session(&self, snapshot: &GameSnapshot) -> Result<(), PositionError> {
        self.update(|state, events| state.replace_session(snapshot, events))
            .await
            .inspect_err(|err| warn!("store: rejected replacement session: {err}"))
    }

    pub(crate) async fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|state, events| state.record_error(message, events))
            .await;
    }
}
