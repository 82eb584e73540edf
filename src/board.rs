//! A thin wrapper around the `shakmaty` rules engine: FEN parsing, move application, game-over
//! detection, and PGN movetext rendering.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::str::FromStr;
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, Move, Outcome, Position};

/// A game is adjudicated a draw once each side has gone this many plies without a capture or pawn
/// move (the seventy-five-move rule).
const SEVENTY_FIVE_MOVE_HALFMOVES: u32 = 150;

/// The FEN of the standard chess starting position, used to decide whether a game's `FEN`/`SetUp`
/// PGN tags are needed.
pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Error returned when a FEN or a UCI move string can't be applied to the board.
#[derive(Debug)]
pub struct BoardError(String);

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for BoardError {}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A game-over result, in PGN notation, with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChessRulesResult {
    /// `"1-0"`, `"0-1"`, or `"1/2-1/2"`.
    pub pgn_result: &'static str,
    /// A short, human-readable reason, suitable for a PGN comment.
    pub reason: &'static str,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A chess position plus the move history needed to render PGN movetext.
#[derive(Debug, Clone)]
pub struct Board {
    mode: CastlingMode,
    initial: Chess,
    position: Chess,
    moves: Vec<Move>,
}

impl Board {
    /// Parses `fen` under the given castling mode (standard, or Chess960).
    pub fn from_fen(fen: &str, chess960: bool) -> Result<Self, BoardError> {
        let mode = if chess960 { CastlingMode::Chess960 } else { CastlingMode::Standard };
        let setup: Fen = Fen::from_str(fen).map_err(|err| BoardError(format!("{fen}: {err}")))?;
        let position: Chess =
            setup.into_position(mode).map_err(|err| BoardError(format!("{fen}: {err}")))?;

        Ok(Board { mode, initial: position.clone(), position, moves: Vec::new() })
    }

    /// The side to move in the current position.
    pub fn side_to_move(&self) -> Color {
        self.position.turn()
    }

    /// Plies since the last capture or pawn move.
    pub fn halfmove_clock(&self) -> u32 {
        self.position.halfmoves()
    }

    /// The current fullmove number.
    pub fn fullmove_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    /// The starting FEN this board was built from.
    pub fn initial_fen(&self) -> String {
        Fen::from_position(self.initial.clone(), shakmaty::EnPassantMode::Legal).to_string()
    }

    /// Applies a move given in UCI long-algebraic notation.
    pub fn play_uci(&mut self, uci_move: &str) -> Result<(), BoardError> {
        let uci = Uci::from_str(uci_move).map_err(|err| BoardError(format!("{uci_move}: {err}")))?;
        let mv = uci
            .to_move(&self.position)
            .map_err(|err| BoardError(format!("{uci_move}: illegal move ({err})")))?;
        self.position = self.position.clone().play(&mv).map_err(|_| {
            BoardError(format!("{uci_move}: illegal in the current position"))
        })?;
        self.moves.push(mv);

        Ok(())
    }

    /// Returns the chess-rules result if the game has ended, or `None` if it's still in progress.
    ///
    /// Recognises checkmate, stalemate, insufficient material, and the seventy-five-move rule.
    /// Repetition-based draws are not detected (see module docs).
    pub fn result(&self) -> Option<ChessRulesResult> {
        if let Some(outcome) = self.position.outcome() {
            let reason = if self.position.is_checkmate() {
                "checkmate"
            } else if self.position.is_stalemate() {
                "stalemate"
            } else {
                "insufficient material"
            };

            let pgn_result = match outcome {
                Outcome::Decisive { winner: Color::White } => "1-0",
                Outcome::Decisive { winner: Color::Black } => "0-1",
                Outcome::Draw => "1/2-1/2",
            };

            return Some(ChessRulesResult { pgn_result, reason });
        }

        if self.halfmove_clock() >= SEVENTY_FIVE_MOVE_HALFMOVES {
            return Some(ChessRulesResult { pgn_result: "1/2-1/2", reason: "seventy-five-move rule" });
        }

        None
    }

    /// The underlying rules-engine position, for collaborators (such as a tablebase prober) that
    /// need direct access to it.
    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// Renders the moves played so far as a list of SAN tokens, no move numbers, no NAGs.
    pub fn sans(&self) -> Vec<String> {
        let mut pos = self.initial.clone();
        let mut sans = Vec::with_capacity(self.moves.len());
        for mv in &self.moves {
            sans.push(SanPlus::from_move(pos.clone(), mv).to_string());
            pos = pos.play(mv).expect("previously legal move replays cleanly");
        }

        sans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn plays_moves_and_flips_side_to_move() {
        let mut board = Board::from_fen(START, false).unwrap();
        assert_eq!(board.side_to_move(), Color::White);
        board.play_uci("e2e4").unwrap();
        assert_eq!(board.side_to_move(), Color::Black);
        assert_eq!(board.halfmove_clock(), 0);
    }

    #[test]
    fn detects_checkmate() {
        // Fool's mate.
        let mut board = Board::from_fen(START, false).unwrap();
        for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            board.play_uci(mv).unwrap();
        }
        let result = board.result().unwrap();
        assert_eq!(result.pgn_result, "0-1");
        assert_eq!(result.reason, "checkmate");
    }

    #[test]
    fn renders_sans_in_order() {
        let mut board = Board::from_fen(START, false).unwrap();
        board.play_uci("e2e4").unwrap();
        board.play_uci("e7e5").unwrap();
        assert_eq!(board.sans(), vec!["e4".to_owned(), "e5".to_owned()]);
    }

    #[test]
    fn in_progress_game_has_no_result() {
        let board = Board::from_fen(START, false).unwrap();
        assert!(board.result().is_none());
    }
}
