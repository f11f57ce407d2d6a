use shakmaty::{fen::Fen, Board, File, Rank};

use crate::{
    domain::{Piece, Side, Square},
    error::PositionError,
};

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Piece placement and side to move. Castling, en passant and clocks stay
/// in the FEN string the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    board: Board,
    side_to_move: Side,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            board: Board::new(),
            side_to_move: Side::White,
        }
    }
}

impl Position {
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let fen = fen.trim();
        if fen.is_empty() {
            return Err(PositionError::Empty);
        }
        let setup = fen
            .parse::<Fen>()
            .map_err(|err| PositionError::Invalid {
                fen: fen.to_string(),
                reason: err.to_string(),
            })?
            .into_setup();

        Ok(Self {
            board: setup.board,
            side_to_move: setup.turn.into(),
        })
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.board.piece_at(square.into()).map(Piece::from)
    }

    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }

    /// Rows from rank 8 down to rank 1, each from file a to file h.
    pub fn rows(&self) -> impl Iterator<Item = [Option<Piece>; 8]> + '_ {
        Rank::ALL.into_iter().rev().map(move |rank| {
            File::ALL.map(|file| {
                self.board
                    .piece_at(shakmaty::Square::from_coords(file, rank))
                    .map(Piece::from)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PieceKind;

    fn sq(s: &str) -> Square {
        s.parse().expect("square")
    }

    #[test]
    fn reads_starting_position() {
        let position = Position::from_fen(STARTING_FEN).expect("fen");
        assert_eq!(position, Position::default());
        assert_eq!(position.side_to_move(), Side::White);
        assert_eq!(
            position.piece_at(sq("e2")),
            Some(Piece {
                side: Side::White,
                kind: PieceKind::Pawn
            })
        );
        assert_eq!(
            position.piece_at(sq("e8")),
            Some(Piece {
                side: Side::Black,
                kind: PieceKind::King
            })
        );
        assert_eq!(position.piece_at(sq("e4")), None);
    }

    #[test]
    fn reads_side_to_move_after_first_move() {
        let position =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                .expect("fen");
        assert_eq!(position.side_to_move(), Side::Black);
        assert!(position.piece_at(sq("e4")).is_some());
        assert!(position.piece_at(sq("e2")).is_none());
    }

    #[test]
    fn rows_run_from_rank_eight_to_rank_one() {
        let position = Position::default();
        let rows: Vec<_> = position.rows().collect();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0][4].map(Piece::symbol), Some('k'));
        assert_eq!(rows[7][3].map(Piece::symbol), Some('Q'));
        assert!(rows[3].iter().all(Option::is_none));
    }

    #[test]
    fn rejects_malformed_placement() {
        assert_eq!(Position::from_fen("  "), Err(PositionError::Empty));
        for fen in [
            "8/8/8 w - - 0 1",
            "rnbqkbnr/ppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX w KQkq - 0 1",
            "8/8/8/8/8/8/8/8 x - - 0 1",
        ] {
            assert!(
                matches!(Position::from_fen(fen), Err(PositionError::Invalid { .. })),
                "{fen} should be rejected"
            );
        }
    }
}
