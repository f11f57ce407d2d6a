use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, GameMode, GameStatus, SessionId, Side};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub eco: Option<String>,
}

impl OpeningInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.eco.is_none()
    }
}

/// A possibly partial copy of the authoritative game state.
///
/// Every field is optional: whatever the server omits keeps its previous
/// value on the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GameMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub white_difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub move_history: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<OpeningInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_checkmate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_stalemate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_draw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_moves: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_white_human: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMove {
    pub uci: String,
    #[serde(default)]
    pub san: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Side>,
}

/// Payload of a `move` push frame and of the submit-move response.
///
/// Human-observed games report the engine reply as `aiMove`; automated games
/// report the move just played as `move`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_move: Option<EngineMove>,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub played: Option<EngineMove>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_evaluated: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MoveOutcome {
    pub fn engine_move(&self) -> Option<&EngineMove> {
        self.played.as_ref().or(self.ai_move.as_ref())
    }
}

/// Frames pushed by the server on either game socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        game: GameSnapshot,
    },
    Move {
        data: MoveOutcome,
    },
    State {
        game: GameSnapshot,
    },
    GameOver {
        game: GameSnapshot,
    },
    Paused,
    Resumed,
    SpeedSet {
        value: f64,
    },
    Deleted,
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::Connected { .. } => "connected",
            ServerFrame::Move { .. } => "move",
            ServerFrame::State { .. } => "state",
            ServerFrame::GameOver { .. } => "game_over",
            ServerFrame::Paused => "paused",
            ServerFrame::Resumed => "resumed",
            ServerFrame::SpeedSet { .. } => "speed_set",
            ServerFrame::Deleted => "deleted",
            ServerFrame::Error { .. } => "error",
            ServerFrame::Unknown => "unknown",
        }
    }
}

/// Outbound frames accepted by the human-observed game socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimaryFrame {
    GetState,
    Move {
        #[serde(rename = "move")]
        notation: String,
    },
}

/// Outbound frames accepted by the automated game socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Pause,
    Resume,
    Step,
    Speed { value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub mode: GameMode,
    pub difficulty: Difficulty,
    pub player_color: Side,
    pub white_difficulty: Difficulty,
    pub black_difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_eco: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game: Option<GameSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeMoveRequest {
    #[serde(rename = "move")]
    pub notation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub color: Side,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquareMovesResponse {
    pub square: String,
    #[serde(default)]
    pub piece: Option<PieceInfo>,
    #[serde(default)]
    pub moves: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub fen: String,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub fen: String,
    pub evaluation: f64,
    #[serde(default)]
    pub best_move: Option<String>,
    pub depth: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningStatistics {
    pub white_wins: f64,
    pub black_wins: f64,
    pub draws: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningSummary {
    pub eco: String,
    pub name: String,
    pub moves: String,
    pub fen: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub statistics: OpeningStatistics,
    #[serde(default)]
    pub popularity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningCategory {
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub avg_popularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyLevel {
    pub name: Difficulty,
    pub depth: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningList {
    pub openings: Vec<OpeningSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningEnvelope {
    pub opening: OpeningSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryList {
    pub categories: Vec<OpeningCategory>,
}

/// `GET /api/games`: sessions the server still considers active or paused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameList {
    #[serde(default)]
    pub games: Vec<GameSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyList {
    pub difficulties: Vec<DifficultyLevel>,
}
