use shared::{
    domain::{CoordinateMove, GameStatus},
    protocol::{EngineMove, GameSnapshot, MoveOutcome, ServerFrame},
};
use tracing::{debug, warn};

use crate::{
    channel::ChannelKind,
    store::{SessionState, StoreEvent},
};

/// What a dispatched message did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A snapshot was merged.
    Applied { position_changed: bool },
    /// Only the status field was touched.
    StatusOnly,
    /// Side data only (speed acknowledgement, error flag, annotation).
    Annotated,
    /// The message carried an unparsable position and was dropped whole.
    Rejected,
    /// Not a message this channel acts on, or a reply for a replaced session.
    Ignored,
}

pub(crate) fn apply_push_frame(
    state: &mut SessionState,
    kind: ChannelKind,
    frame: ServerFrame,
    events: &mut Vec<StoreEvent>,
) -> Disposition {
    match (kind, frame) {
        (_, ServerFrame::Connected { game }) => merge(state, &game, events),
        (_, ServerFrame::Move { data }) => apply_move_frame(state, &data, events),
        (ChannelKind::Primary, ServerFrame::State { game }) => merge(state, &game, events),
        (ChannelKind::Control, ServerFrame::GameOver { game }) => merge(state, &game, events),
        (ChannelKind::Control, ServerFrame::Paused) => {
            state.set_status(GameStatus::Paused, events);
            Disposition::StatusOnly
        }
        (ChannelKind::Control, ServerFrame::Resumed) => {
            state.set_status(GameStatus::Active, events);
            Disposition::StatusOnly
        }
        (ChannelKind::Control, ServerFrame::SpeedSet { value }) => {
            state.set_control_speed(value, events);
            Disposition::Annotated
        }
        (_, ServerFrame::Error { message }) => {
            warn!(channel = %kind, "server reported error: {message}");
            state.record_error(message, events);
            Disposition::Annotated
        }
        (kind, frame) => {
            debug!(channel = %kind, frame = frame.kind(), "ignoring frame");
            Disposition::Ignored
        }
    }
}

/// Applies the response to a move submitted over the command channel. The
/// submitted move becomes the last move so the board reflects it before
/// the push channel catches up.
pub(crate) fn apply_move_response(
    state: &mut SessionState,
    submitted: CoordinateMove,
    snapshot: &GameSnapshot,
    events: &mut Vec<StoreEvent>,
) -> Disposition {
    let disposition = merge(state, snapshot, events);
    if disposition != Disposition::Rejected {
        let (from, to) = submitted.squares();
        state.set_last_move(from, to, events);
    }
    disposition
}

// No ordering across channels: the last snapshot processed wins per field.
pub(crate) fn merge(
    state: &mut SessionState,
    snapshot: &GameSnapshot,
    events: &mut Vec<StoreEvent>,
) -> Disposition {
    match state.merge_snapshot(snapshot, events) {
        Ok(position_changed) => Disposition::Applied { position_changed },
        Err(err) => {
            warn!("dropping snapshot with invalid position: {err}");
            Disposition::Rejected
        }
    }
}

fn apply_move_frame(
    state: &mut SessionState,
    data: &MoveOutcome,
    events: &mut Vec<StoreEvent>,
) -> Disposition {
    if let Some(error) = &data.error {
        state.record_error(error.clone(), events);
        return Disposition::Annotated;
    }

    let disposition = match &data.game {
        Some(game) => merge(state, game, events),
        None => Disposition::Annotated,
    };
    if disposition == Disposition::Rejected {
        return disposition;
    }
    if let Some(mv) = data.engine_move().and_then(parse_engine_move) {
        let (from, to) = mv.squares();
        state.set_last_move(from, to, events);
    }
    disposition
}

fn parse_engine_move(mv: &EngineMove) -> Option<CoordinateMove> {
    mv.uci
        .parse()
        .inspect_err(|err| warn!("ignoring unreadable engine move: {err}"))
        .ok()
}
