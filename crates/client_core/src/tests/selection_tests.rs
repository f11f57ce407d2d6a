use std::collections::{HashMap, HashSet};

use super::*;
use async_trait::async_trait;
use serde_json::json;
use shared::{
    domain::Side,
    position::STARTING_FEN,
    protocol::{CreateGameRequest, GameEnvelope, MoveOutcome},
};
use tokio::sync::oneshot;

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
const PAWN_ON_SEVENTH: &str = "8/4P3/8/8/8/8/8/4K2k w - - 0 1";

fn square(name: &str) -> Square {
    name.parse().expect("square")
}

fn snapshot(value: serde_json::Value) -> GameSnapshot {
    serde_json::from_value(value).expect("snapshot")
}

#[derive(Default)]
struct FakeApi {
    moves: HashMap<Square, Vec<String>>,
    failing_squares: HashSet<Square>,
    lookup_gates: Mutex<HashMap<Square, oneshot::Receiver<()>>>,
    submit_gate: Mutex<Option<oneshot::Receiver<()>>>,
    fetch_gate: Mutex<Option<oneshot::Receiver<()>>>,
    reject_moves: bool,
    submitted: Mutex<Vec<String>>,
}

impl FakeApi {
    fn with_moves(moves: &[(&str, &[&str])]) -> Self {
        Self {
            moves: moves
                .iter()
                .map(|(from, list)| {
                    (
                        square(from),
                        list.iter().map(|mv| mv.to_string()).collect(),
                    )
                })
                .collect(),
            ..Self::default()
        }
    }

    fn gate_lookup(&self, square: Square) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.lookup_gates
            .try_lock()
            .expect("gates")
            .insert(square, rx);
        tx
    }

    fn gate_submit(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.submit_gate.try_lock().expect("gate") = Some(rx);
        tx
    }

    fn gate_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.fetch_gate.try_lock().expect("gate") = Some(rx);
        tx
    }
}

#[async_trait]
impl GameApi for FakeApi {
    async fn create_game(&self, _request: &CreateGameRequest) -> Result<GameEnvelope, CommandError> {
        Err(CommandError::Transport("not used".to_string()))
    }

    async fn fetch_game(&self, id: &SessionId) -> Result<GameEnvelope, CommandError> {
        let gate = self.fetch_gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(GameEnvelope {
            game: Some(snapshot(json!({"id": id, "fen": AFTER_E4, "turn": "black"}))),
            ..GameEnvelope::default()
        })
    }

    async fn submit_move(
        &self,
        _id: &SessionId,
        notation: &str,
    ) -> Result<MoveOutcome, CommandError> {
        let gate = self.submit_gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.submitted.lock().await.push(notation.to_string());
        if self.reject_moves {
            return Err(CommandError::Rejected {
                status: 400,
                detail: format!("Illegal move: {notation}"),
            });
        }
        Ok(MoveOutcome {
            success: Some(true),
            game: Some(snapshot(json!({"fen": AFTER_E4, "turn": "black"}))),
            ..MoveOutcome::default()
        })
    }

    async fn moves_for_square(
        &self,
        _id: &SessionId,
        square: Square,
    ) -> Result<Vec<String>, CommandError> {
        let gate = self.lookup_gates.lock().await.remove(&square);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing_squares.contains(&square) {
            return Err(CommandError::Transport("connection reset".to_string()));
        }
        Ok(self.moves.get(&square).cloned().unwrap_or_default())
    }

    async fn delete_game(&self, _id: &SessionId) -> Result<(), CommandError> {
        Ok(())
    }

    async fn list_games(&self) -> Result<Vec<GameSnapshot>, CommandError> {
        Ok(Vec::new())
    }

    async fn analyze(&self, _fen: &str, _depth: u32) -> Result<AnalysisReport, CommandError> {
        Err(CommandError::Transport("not used".to_string()))
    }
}

async fn client_at(api: Arc<FakeApi>, fen: &str) -> Arc<GameClient> {
    let client = GameClient::with_api("http://127.0.0.1:9", api);
    client
        .store
        .replace_session(&snapshot(json!({
            "id": "g-1",
            "mode": "human_vs_ai",
            "fen": fen,
            "status": "active",
            "turn": "white",
            "isWhiteHuman": true
        })))
        .await
        .expect("seed");
    client
}

fn highlighted(overlay: &InteractionOverlay) -> Vec<String> {
    overlay.highlights.keys().map(|sq| sq.to_string()).collect()
}

async fn wait_for_phase(client: &GameClient, check: impl Fn(&SelectionPhase) -> bool) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !check(&client.store.overlay().await.phase) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("phase reached");
}

#[tokio::test]
async fn king_pawn_highlights_single_and_double_push() {
    let api = Arc::new(FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]));
    let client = client_at(api, STARTING_FEN).await;

    let outcome = client.click(square("e2")).await;

    assert!(matches!(outcome, ClickOutcome::Selected { square: sq, .. } if sq == square("e2")));
    let overlay = client.store.overlay().await;
    assert_eq!(highlighted(&overlay), vec!["e3", "e4"]);
    assert_eq!(overlay.selected_square(), Some(square("e2")));
}

#[tokio::test]
async fn clicking_destination_submits_coordinates_and_flips_turn() {
    let api = Arc::new(FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]));
    let client = client_at(Arc::clone(&api), STARTING_FEN).await;

    client.click(square("e2")).await;
    let outcome = client.click(square("e4")).await;

    assert_eq!(
        outcome,
        ClickOutcome::Committed {
            mv: CoordinateMove::new(square("e2"), square("e4")),
            accepted: true
        }
    );
    assert_eq!(*api.submitted.lock().await, vec!["e2e4".to_string()]);
    let state = client.store.state().await;
    assert_eq!(state.session.side_to_move, Side::Black);
    assert_eq!(state.overlay.phase, SelectionPhase::Idle);
    assert_eq!(state.overlay.last_move, Some((square("e2"), square("e4"))));
}

#[tokio::test]
async fn superseded_lookup_does_not_populate_highlights() {
    let api = Arc::new(FakeApi::with_moves(&[
        ("e2", &["e2e3", "e2e4"]),
        ("d2", &["d2d3", "d2d4"]),
    ]));
    let release_e2 = api.gate_lookup(square("e2"));
    let client = client_at(api, STARTING_FEN).await;

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.click(square("e2")).await }
    });
    wait_for_phase(&client, |phase| {
        matches!(phase, SelectionPhase::Selected(sel) if sel.square == square("e2"))
    })
    .await;

    let second = client.click(square("d2")).await;
    assert!(matches!(second, ClickOutcome::Selected { .. }));

    release_e2.send(()).expect("release");
    let first = first.await.expect("join");

    assert_eq!(first, ClickOutcome::Stale { square: square("e2") });
    let overlay = client.store.overlay().await;
    assert_eq!(overlay.selected_square(), Some(square("d2")));
    assert_eq!(highlighted(&overlay), vec!["d3", "d4"]);
}

#[tokio::test]
async fn failed_lookup_only_empties_that_squares_highlights() {
    let mut api = FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]);
    api.failing_squares.insert(square("g1"));
    let api = Arc::new(api);
    let client = client_at(Arc::clone(&api), STARTING_FEN).await;

    let outcome = client.click(square("g1")).await;
    assert_eq!(
        outcome,
        ClickOutcome::Selected {
            square: square("g1"),
            destinations: Vec::new()
        }
    );
    assert!(client.store.overlay().await.highlights.is_empty());

    client.click(square("e2")).await;
    let outcome = client.click(square("e4")).await;
    assert!(matches!(outcome, ClickOutcome::Committed { accepted: true, .. }));
    assert_eq!(*api.submitted.lock().await, vec!["e2e4".to_string()]);
}

#[tokio::test]
async fn clicks_are_ignored_while_a_move_is_in_flight() {
    let api = Arc::new(FakeApi::with_moves(&[
        ("e2", &["e2e3", "e2e4"]),
        ("d2", &["d2d3", "d2d4"]),
    ]));
    let release_submit = api.gate_submit();
    let client = client_at(Arc::clone(&api), STARTING_FEN).await;

    client.click(square("e2")).await;
    let commit = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.click(square("e4")).await }
    });
    wait_for_phase(&client, |phase| matches!(phase, SelectionPhase::Committing(_))).await;
    assert!(client.store.overlay().await.highlights.is_empty());

    assert_eq!(client.click(square("d2")).await, ClickOutcome::Ignored);

    release_submit.send(()).expect("release");
    let outcome = commit.await.expect("join");
    assert!(matches!(outcome, ClickOutcome::Committed { accepted: true, .. }));
    assert_eq!(client.store.overlay().await.phase, SelectionPhase::Idle);
}

#[tokio::test]
async fn clicking_selected_square_again_deselects() {
    let api = Arc::new(FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]));
    let client = client_at(api, STARTING_FEN).await;

    client.click(square("e2")).await;
    assert_eq!(client.click(square("e2")).await, ClickOutcome::Deselected);
    let overlay = client.store.overlay().await;
    assert_eq!(overlay.phase, SelectionPhase::Idle);
    assert!(overlay.highlights.is_empty());
}

#[tokio::test]
async fn non_destination_click_deselects_without_moving() {
    let api = Arc::new(FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]));
    let client = client_at(Arc::clone(&api), STARTING_FEN).await;

    client.click(square("e2")).await;
    assert_eq!(client.click(square("e7")).await, ClickOutcome::Deselected);
    assert!(api.submitted.lock().await.is_empty());
}

#[tokio::test]
async fn opponent_and_empty_squares_are_not_selectable() {
    let api = Arc::new(FakeApi::default());
    let client = client_at(api, STARTING_FEN).await;

    assert_eq!(client.click(square("e7")).await, ClickOutcome::Ignored);
    assert_eq!(client.click(square("e4")).await, ClickOutcome::Ignored);
    assert_eq!(client.store.overlay().await.phase, SelectionPhase::Idle);
}

#[tokio::test]
async fn rejected_move_keeps_position_and_returns_to_idle() {
    let mut api = FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]);
    api.reject_moves = true;
    let client = client_at(Arc::new(api), STARTING_FEN).await;

    client.click(square("e2")).await;
    let outcome = client.click(square("e4")).await;

    assert!(matches!(outcome, ClickOutcome::Committed { accepted: false, .. }));
    let state = client.store.state().await;
    assert_eq!(state.session.position, STARTING_FEN);
    assert_eq!(state.session.side_to_move, Side::White);
    assert_eq!(state.overlay.phase, SelectionPhase::Idle);
    assert_eq!(state.overlay.last_move, None);
    assert!(state
        .last_error
        .as_deref()
        .is_some_and(|err| err.contains("Illegal move")));
}

#[tokio::test]
async fn promotion_destination_resolves_to_queen() {
    let api = Arc::new(FakeApi::with_moves(&[(
        "e7",
        &["e7e8n", "e7e8b", "e7e8q", "e7e8r"],
    )]));
    let client = client_at(Arc::clone(&api), PAWN_ON_SEVENTH).await;

    client.click(square("e7")).await;
    let overlay = client.store.overlay().await;
    assert_eq!(highlighted(&overlay), vec!["e8"]);

    client.click(square("e8")).await;
    assert_eq!(*api.submitted.lock().await, vec!["e7e8q".to_string()]);
}

#[tokio::test]
async fn lookups_without_a_session_are_empty() {
    let api = Arc::new(FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]));
    let client = GameClient::with_api("http://127.0.0.1:9", api);

    assert!(client.legal_destinations(square("e2")).await.is_empty());
    assert!(!client.submit_move(CoordinateMove::new(square("e2"), square("e4"))).await);
    assert!(client.store.state().await.last_error.is_some());
}

async fn replace_with_fresh_game(client: &GameClient) {
    client
        .store
        .replace_session(&snapshot(json!({
            "id": "g-2",
            "mode": "human_vs_ai",
            "fen": STARTING_FEN,
            "status": "active",
            "turn": "white",
            "isWhiteHuman": true
        })))
        .await
        .expect("replace");
}

#[tokio::test]
async fn move_response_for_replaced_session_is_discarded() {
    let api = Arc::new(FakeApi::with_moves(&[("e2", &["e2e3", "e2e4"])]));
    let release_submit = api.gate_submit();
    let client = client_at(Arc::clone(&api), STARTING_FEN).await;

    client.click(square("e2")).await;
    let commit = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.click(square("e4")).await }
    });
    wait_for_phase(&client, |phase| matches!(phase, SelectionPhase::Committing(_))).await;

    replace_with_fresh_game(&client).await;
    release_submit.send(()).expect("release");
    let outcome = commit.await.expect("join");

    assert!(matches!(outcome, ClickOutcome::Committed { accepted: false, .. }));
    let state = client.store.state().await;
    assert_eq!(state.session.id, Some(SessionId("g-2".to_string())));
    assert_eq!(state.session.position, STARTING_FEN);
    assert_eq!(state.session.side_to_move, Side::White);
    assert_eq!(state.overlay.last_move, None);
    assert_eq!(state.overlay.phase, SelectionPhase::Idle);
    assert_eq!(state.last_error, None);
}

#[tokio::test]
async fn refresh_for_replaced_session_is_discarded() {
    let api = Arc::new(FakeApi::default());
    let release_fetch = api.gate_fetch();
    let client = client_at(Arc::clone(&api), STARTING_FEN).await;

    let refresh = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.refresh().await }
    });
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while api.fetch_gate.lock().await.is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("fetch started");
    replace_with_fresh_game(&client).await;
    release_fetch.send(()).expect("release");

    assert_eq!(refresh.await.expect("join"), Some(Disposition::Ignored));
    let session = client.store.session().await;
    assert_eq!(session.id, Some(SessionId("g-2".to_string())));
    assert_eq!(session.position, STARTING_FEN);
}

#[tokio::test]
async fn refresh_merges_snapshot_for_current_session() {
    let api = Arc::new(FakeApi::default());
    let client = client_at(api, STARTING_FEN).await;

    assert_eq!(
        client.refresh().await,
        Some(Disposition::Applied {
            position_changed: true
        })
    );
    let session = client.store.session().await;
    assert_eq!(session.id, Some(SessionId("g-1".to_string())));
    assert_eq!(session.side_to_move, Side::Black);
}
