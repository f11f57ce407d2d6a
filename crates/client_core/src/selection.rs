use std::sync::Arc;

use shared::domain::{CoordinateMove, Square};
use tracing::debug;

use crate::{
    command::CommandChannel,
    store::{SelectionPhase, SelectionToken, SessionState, SessionStore, StoreEvent},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Nothing selectable was clicked, or a move is already in flight.
    Ignored,
    /// `square` is selected and its destinations are highlighted.
    Selected {
        square: Square,
        destinations: Vec<CoordinateMove>,
    },
    /// The lookup for `square` returned after it was no longer selected.
    Stale { square: Square },
    Deselected,
    Committed { mv: CoordinateMove, accepted: bool },
}

enum Step {
    Ignore,
    Deselect,
    Select(SelectionToken),
    Commit(CoordinateMove),
}

pub struct BoardController {
    store: Arc<SessionStore>,
    commands: Arc<CommandChannel>,
}

impl BoardController {
    pub fn new(store: Arc<SessionStore>, commands: Arc<CommandChannel>) -> Self {
        Self { store, commands }
    }

    pub async fn click(&self, square: Square) -> ClickOutcome {
        let step = self
            .store
            .update(|state, events| decide(state, square, events))
            .await;

        match step {
            Step::Ignore => ClickOutcome::Ignored,
            Step::Deselect => ClickOutcome::Deselected,
            Step::Select(token) => {
                let destinations = self.commands.legal_destinations(square).await;
                let applied = self
                    .store
                    .update(|state, events| state.apply_destinations(token, &destinations, events))
                    .await;
                if applied {
                    ClickOutcome::Selected {
                        square,
                        destinations,
                    }
                } else {
                    debug!(%square, ?token, "discarding destinations for superseded selection");
                    ClickOutcome::Stale { square }
                }
            }
            Step::Commit(mv) => {
                let accepted = self.commands.submit_move(mv).await;
                self.store
                    .update(|state, events| state.finish_commit(mv, events))
                    .await;
                ClickOutcome::Committed { mv, accepted }
            }
        }
    }
}

fn decide(state: &mut SessionState, square: Square, events: &mut Vec<StoreEvent>) -> Step {
    match state.overlay.phase {
        SelectionPhase::Committing(_) => Step::Ignore,
        SelectionPhase::Selected(selection) if selection.square == square => {
            state.clear_selection(events);
            Step::Deselect
        }
        SelectionPhase::Selected(_) => {
            if let Some(mv) = state.overlay.highlights.get(&square).copied() {
                state.begin_commit(mv, events);
                Step::Commit(mv)
            } else if state.session.is_selectable(square) {
                Step::Select(state.begin_selection(square, events))
            } else {
                state.clear_selection(events);
                Step::Deselect
            }
        }
        SelectionPhase::Idle => {
            if state.session.is_selectable(square) {
                Step::Select(state.begin_selection(square, events))
            } else {
                Step::Ignore
            }
        }
    }
}
