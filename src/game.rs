//! The per-game play loop: clock accounting, tablebase probing, and score/rule-based
//! adjudication.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::time::Instant;
use shakmaty::Color;
use crate::board::{Board, BoardError};
use crate::clock::Clock;
use crate::config::{Draw, Resign, TimeControl};
use crate::error::SessionError;
use crate::pgn::{self, GameHeaders};
use crate::session::{EngineSession, GoArgs};
use crate::tablebase::TablebaseProber;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A starting position plus which pairing index plays white, as handed out by the job queue.
#[derive(Debug, Clone)]
pub struct GameSetup {
    /// The round this game belongs to within its matchup, for the PGN `Round` tag.
    pub round: u32,
    /// The starting FEN.
    pub fen: String,
    /// Which of the two engines (0 or 1) plays white.
    pub white_idx: usize,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A finished game's outcome.
#[derive(Debug, Clone)]
pub struct GameOutcome {
    /// `1-0`, `0-1`, or `1/2-1/2`.
    pub pgn_result: &'static str,
    /// The rule that ended the game.
    pub reason: &'static str,
    /// The score in {0, 0.5, 1} from engine 0's perspective.
    pub score0: f64,
    /// Rendered PGN text, if requested.
    pub pgn: Option<String>,
}

/// Everything the Game Loop needs beyond the two sessions: time controls, adjudication
/// thresholds, and optional extras.
#[derive(Debug, Clone, Copy)]
pub struct GameOptions {
    /// Per-engine time controls, indexed the same way as the sessions.
    pub time_controls: [TimeControl; 2],
    /// Draw-adjudication thresholds.
    pub draw: Draw,
    /// Resignation-adjudication thresholds.
    pub resign: Resign,
    /// Plays Chess960.
    pub chess960: bool,
    /// Whether to render PGN text for the finished game.
    pub render_pgn: bool,
}

/// PGN headers that don't vary per game within a matchup.
#[derive(Debug, Clone)]
pub struct MatchLabels {
    /// `Event`
    pub event: String,
    /// `Site`
    pub site: String,
    /// Engine names, indexed like the sessions.
    pub names: [String; 2],
}

enum Termination {
    BoardResult { pgn_result: &'static str, reason: &'static str },
    LostOnTime { loser_idx: usize },
    Resigned { score: i32, side_to_move: Color },
    TablebaseWdl { wdl: i8, side_to_move: Color },
    NoProgress,
}

/// Plays one game to completion.
///
/// `sessions[i]` and `options.time_controls[i]` refer to the same engine throughout; `setup`
/// decides which of the two plays white for this particular game.
pub fn play_game(
    sessions: &mut [EngineSession; 2],
    setup: &GameSetup,
    options: &GameOptions,
    tablebase: Option<&dyn TablebaseProber>,
    labels: &MatchLabels,
    date: &str,
) -> Result<GameOutcome, SessionError> {
    let mut board = Board::from_fen(&setup.fen, options.chess960)
        .map_err(|err| SessionError::ProtocolFailure(err.to_string()))?;
    let mut clocks = [
        Clock::new(options.time_controls[0]),
        Clock::new(options.time_controls[1]),
    ];

    for session in sessions.iter_mut() {
        session.new_game()?;
    }

    let mut position_cmd = format!("position fen {}", setup.fen);
    let mut turn_idx = setup.white_idx ^ usize::from(board.side_to_move() == Color::Black);

    let mut resign_count = 0u32;
    let mut draw_count = 0u32;

    let termination = loop {
        if let Some(result) = board.result() {
            break Termination::BoardResult { pgn_result: result.pgn_result, reason: result.reason };
        }

        let white_idx = setup.white_idx;
        let black_idx = 1 - white_idx;

        sessions[turn_idx].position(&position_cmd)?;
        sessions[turn_idx].ready()?;

        let halfmove_clock_reset = board.halfmove_clock() == 0;
        if halfmove_clock_reset {
            if let Some(prober) = tablebase {
                if let Some(wdl) = prober.probe(board.position()) {
                    break Termination::TablebaseWdl { wdl, side_to_move: board.side_to_move() };
                }
            }
        }

        let go_args = GoArgs {
            depth: options.time_controls[turn_idx].depth,
            nodes: options.time_controls[turn_idx].nodes,
            movetime_ms: options.time_controls[turn_idx].movetime.map(to_millis),
            wtime_ms: clocks[white_idx].remaining().map(|d| d.as_millis() as u64),
            btime_ms: clocks[black_idx].remaining().map(|d| d.as_millis() as u64),
            winc_ms: options.time_controls[white_idx].inc.map(to_millis),
            binc_ms: options.time_controls[black_idx].inc.map(to_millis),
            movestogo: clocks[turn_idx].moves_to_go(),
        };

        let started = Instant::now();
        let search_result = sessions[turn_idx].go(&go_args, options.resign.score.abs())?;
        let elapsed = started.elapsed();

        if clocks[turn_idx].consume(elapsed).is_err() {
            break Termination::LostOnTime { loser_idx: turn_idx };
        }

        match search_result.score {
            Some(score) if !search_result.is_mate => {
                if score.abs() >= options.resign.score {
                    resign_count += 1;
                    if resign_count >= 2 * options.resign.movecount {
                        break Termination::Resigned { score, side_to_move: board.side_to_move() };
                    }
                } else {
                    resign_count = 0;
                }

                if score.abs() <= options.draw.score {
                    draw_count += 1;
                    if draw_count >= 2 * options.draw.movecount
                        && board.fullmove_number() >= options.draw.movenumber
                    {
                        break Termination::NoProgress;
                    }
                } else {
                    draw_count = 0;
                }
            }
            _ => {
                resign_count = 0;
                draw_count = 0;
            }
        }

        if position_cmd.ends_with(&setup.fen) {
            position_cmd += " moves ";
        } else {
            position_cmd += " ";
        }
        position_cmd += &search_result.best_move;

        board
            .play_uci(&search_result.best_move)
            .map_err(to_session_error)?;
        turn_idx = 1 - turn_idx;
    };

    let (pgn_result, reason) = resolve(&termination, setup.white_idx);
    let score_white = match pgn_result {
        "1-0" => 1.0,
        "0-1" => 0.0,
        _ => 0.5,
    };
    let score0 = if setup.white_idx == 0 { score_white } else { 1.0 - score_white };

    let pgn = options.render_pgn.then(|| {
        let headers = GameHeaders {
            event: labels.event.clone(),
            site: labels.site.clone(),
            date: date.to_owned(),
            round: setup.round.to_string(),
            white: labels.names[setup.white_idx].clone(),
            black: labels.names[1 - setup.white_idx].clone(),
            result: pgn_result,
            fen: (board.initial_fen() != crate::board::STANDARD_START_FEN)
                .then(|| board.initial_fen()),
        };
        pgn::render(&headers, &board.sans(), reason)
    });

    Ok(GameOutcome { pgn_result, reason, score0, pgn })
}

fn to_millis(seconds: f64) -> u64 {
    (seconds * 1000.0).round() as u64
}

fn to_session_error(err: BoardError) -> SessionError {
    SessionError::ProtocolFailure(err.to_string())
}

fn resolve(termination: &Termination, white_idx: usize) -> (&'static str, &'static str) {
    match termination {
        Termination::BoardResult { pgn_result, reason } => (pgn_result, reason),
        Termination::LostOnTime { loser_idx } => {
            let result = if *loser_idx == white_idx { "0-1" } else { "1-0" };
            (result, "lost-on-time")
        }
        Termination::Resigned { score, side_to_move } => {
            let side_to_move_won = *score > 0;
            let winner_is_white = (*side_to_move == Color::White) == side_to_move_won;
            (if winner_is_white { "1-0" } else { "0-1" }, "resign")
        }
        Termination::TablebaseWdl { wdl, side_to_move } => {
            let result = match wdl {
                -2 => if *side_to_move == Color::White { "0-1" } else { "1-0" },
                2 => if *side_to_move == Color::White { "1-0" } else { "0-1" },
                _ => "1/2-1/2",
            };
            (result, "tb-adjudication")
        }
        Termination::NoProgress => ("1/2-1/2", "draw-adjudication"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use crate::config::{Draw, Resign, TimeControl};
    use crate::session::test_support::stub_engine;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn labels() -> MatchLabels {
        MatchLabels {
            event: "test".to_owned(),
            site: "?".to_owned(),
            names: ["a".to_owned(), "b".to_owned()],
        }
    }

    fn options(resign: Resign, draw: Draw) -> GameOptions {
        GameOptions {
            time_controls: [
                TimeControl { depth: Some(1), nodes: None, movetime: None, time: None, inc: None, movestogo: None },
                TimeControl { depth: Some(1), nodes: None, movetime: None, time: None, inc: None, movestogo: None },
            ],
            draw,
            resign,
            chess960: false,
            render_pgn: false,
        }
    }

    /// Replies `bestmove` for each entry of `moves` in turn (optionally with a `score cp` info
    /// line first), then ignores anything further. `ucinewgame`/`position` are never replied to;
    /// `isready` always gets `readyok`.
    fn scripted_engine(
        moves: Vec<(&'static str, Option<i32>)>,
    ) -> impl FnOnce(Receiver<String>, Sender<String>) + Send + 'static {
        move |cmds, out| {
            let mut moves = moves.into_iter();
            while let Ok(cmd) = cmds.recv() {
                if cmd == "isready" {
                    out.send("readyok".to_owned()).unwrap();
                } else if cmd.starts_with("go") {
                    let Some((mv, score)) = moves.next() else { break };
                    if let Some(score) = score {
                        out.send(format!("info depth 1 score cp {score}")).unwrap();
                    }
                    out.send(format!("bestmove {mv}")).unwrap();
                }
            }
        }
    }

    fn sessions(white_moves: Vec<(&'static str, Option<i32>)>, black_moves: Vec<(&'static str, Option<i32>)>) -> [EngineSession; 2] {
        [
            EngineSession::new(Box::new(stub_engine(scripted_engine(white_moves))), "white", false),
            EngineSession::new(Box::new(stub_engine(scripted_engine(black_moves))), "black", false),
        ]
    }

    /// Replies to the opening move for whichever color it's asked to play, inferred from whether
    /// the `position` command it was last sent carries a `moves` token yet. Used so the same
    /// engine script works unchanged whichever physical session ends up playing which color.
    fn symmetric_opening_engine(score: i32) -> impl FnOnce(Receiver<String>, Sender<String>) + Send + 'static {
        move |cmds: Receiver<String>, out: Sender<String>| {
            let mut last_position = String::new();
            while let Ok(cmd) = cmds.recv() {
                if cmd.starts_with("position") {
                    last_position = cmd;
                } else if cmd == "isready" {
                    out.send("readyok".to_owned()).unwrap();
                } else if cmd.starts_with("go") {
                    let mv = if last_position.contains("moves") { "e7e5" } else { "e2e4" };
                    out.send(format!("info depth 1 score cp {score}")).unwrap();
                    out.send(format!("bestmove {mv}")).unwrap();
                    break;
                }
            }
        }
    }

    #[test]
    fn score_is_symmetric_regardless_of_which_engine_plays_white() {
        let resign = Resign { movecount: 1, score: 700 };
        let draw = Draw { movenumber: 40, movecount: 8, score: 10 };

        // Two identical plies, both reporting a crushing score for the side to move; the second
        // (mover = black) is the one adjudication fires on, so black wins.
        let setup_a = GameSetup { round: 1, fen: START.to_owned(), white_idx: 0 };
        let mut sessions_a = [
            EngineSession::new(Box::new(stub_engine(symmetric_opening_engine(800))), "s0", false),
            EngineSession::new(Box::new(stub_engine(symmetric_opening_engine(800))), "s1", false),
        ];
        let outcome_a =
            play_game(&mut sessions_a, &setup_a, &options(resign, draw), None, &labels(), "2024.01.01").unwrap();
        assert_eq!(outcome_a.pgn_result, "0-1");
        assert_eq!(outcome_a.score0, 0.0);

        // Same script, but engine 0 now plays black instead of white: the winner is still
        // whichever physical session played black, so engine 0's score flips to a win.
        let setup_b = GameSetup { round: 1, fen: START.to_owned(), white_idx: 1 };
        let mut sessions_b = [
            EngineSession::new(Box::new(stub_engine(symmetric_opening_engine(800))), "s0", false),
            EngineSession::new(Box::new(stub_engine(symmetric_opening_engine(800))), "s1", false),
        ];
        let outcome_b =
            play_game(&mut sessions_b, &setup_b, &options(resign, draw), None, &labels(), "2024.01.01").unwrap();
        assert_eq!(outcome_b.pgn_result, "0-1");
        assert_eq!(outcome_b.score0, 1.0);
    }

    #[test]
    fn position_buffer_inserts_moves_token_once_then_appends() {
        let resign = Resign { movecount: 10, score: 100_000 };
        let draw = Draw { movenumber: 40, movecount: 10, score: 0 };

        let (record_tx, record_rx) = channel();
        let white_moves = vec![("f2f3", None), ("g2g4", None)];
        let mut sessions = sessions_recording(record_tx, white_moves, vec![("e7e5", None), ("d8h4", None)]);
        let setup = GameSetup { round: 1, fen: START.to_owned(), white_idx: 0 };
        let outcome =
            play_game(&mut sessions, &setup, &options(resign, draw), None, &labels(), "2024.01.01").unwrap();

        assert_eq!(outcome.reason, "checkmate");

        let positions: Vec<_> = record_rx.try_iter().collect();
        assert_eq!(positions[0], format!("position fen {START}"));
        assert_eq!(positions[1], format!("position fen {START} moves f2f3 e7e5"));
    }

    fn sessions_recording(
        record_tx: std::sync::mpsc::Sender<String>,
        white_moves: Vec<(&'static str, Option<i32>)>,
        black_moves: Vec<(&'static str, Option<i32>)>,
    ) -> [EngineSession; 2] {
        let white = move |cmds: Receiver<String>, out: Sender<String>| {
            let mut moves = white_moves.into_iter();
            while let Ok(cmd) = cmds.recv() {
                if cmd.starts_with("position") {
                    record_tx.send(cmd).unwrap();
                } else if cmd == "isready" {
                    out.send("readyok".to_owned()).unwrap();
                } else if cmd.starts_with("go") {
                    let Some((mv, _)) = moves.next() else { break };
                    out.send(format!("bestmove {mv}")).unwrap();
                }
            }
        };
        let black = move |cmds: Receiver<String>, out: Sender<String>| {
            let mut moves = black_moves.into_iter();
            while let Ok(cmd) = cmds.recv() {
                if cmd == "isready" {
                    out.send("readyok".to_owned()).unwrap();
                } else if cmd.starts_with("go") {
                    let Some((mv, _)) = moves.next() else { break };
                    out.send(format!("bestmove {mv}")).unwrap();
                }
            }
        };
        [
            EngineSession::new(Box::new(stub_engine(white)), "white", false),
            EngineSession::new(Box::new(stub_engine(black)), "black", false),
        ]
    }

    #[test]
    fn resign_and_draw_counters_reset_on_a_non_qualifying_ply() {
        // Resignation needs 2 consecutive qualifying plies (movecount 1); draw needs 2 (movecount
        // 1 as well). Every other ply here breaks the streak, so fool's mate decides the game
        // instead of either adjudication rule.
        let resign = Resign { movecount: 1, score: 700 };
        let draw = Draw { movenumber: 1, movecount: 1, score: 10 };

        let white_moves = vec![("f2f3", Some(800)), ("g2g4", Some(800))];
        let black_moves = vec![("e7e5", Some(0)), ("d8h4", None)];
        let mut sessions = sessions(white_moves, black_moves);
        let setup = GameSetup { round: 1, fen: START.to_owned(), white_idx: 0 };

        let outcome =
            play_game(&mut sessions, &setup, &options(resign, draw), None, &labels(), "2024.01.01").unwrap();

        assert_eq!(outcome.pgn_result, "0-1");
        assert_eq!(outcome.reason, "checkmate");
    }

    struct AlwaysWinningForWhite;

    impl TablebaseProber for AlwaysWinningForWhite {
        fn probe(&self, _position: &shakmaty::Chess) -> Option<i8> {
            Some(2)
        }
    }

    #[test]
    fn tablebase_is_probed_after_position_and_ready_are_sent() {
        let resign = Resign { movecount: 10, score: 100_000 };
        let draw = Draw { movenumber: 40, movecount: 10, score: 0 };

        let (seen_tx, seen_rx) = channel();
        let make_engine = |seen_tx: Sender<&'static str>| {
            move |cmds: Receiver<String>, out: Sender<String>| {
                while let Ok(cmd) = cmds.recv() {
                    if cmd.starts_with("position") {
                        let _ = seen_tx.send("position");
                    } else if cmd == "isready" {
                        let _ = seen_tx.send("isready");
                        out.send("readyok".to_owned()).unwrap();
                    } else if cmd.starts_with("go") {
                        let _ = seen_tx.send("go");
                        out.send("bestmove e2e4".to_owned()).unwrap();
                    }
                }
            }
        };

        let mut sessions = [
            EngineSession::new(Box::new(stub_engine(make_engine(seen_tx.clone()))), "white", false),
            EngineSession::new(Box::new(stub_engine(make_engine(seen_tx))), "black", false),
        ];

        let tablebase = AlwaysWinningForWhite;
        let setup = GameSetup { round: 1, fen: START.to_owned(), white_idx: 0 };
        let outcome = play_game(
            &mut sessions,
            &setup,
            &options(resign, draw),
            Some(&tablebase),
            &labels(),
            "2024.01.01",
        )
        .unwrap();

        assert_eq!(outcome.reason, "tb-adjudication");
        assert_eq!(outcome.pgn_result, "1-0");

        let seen: Vec<_> = seen_rx.try_iter().collect();
        assert_eq!(seen, vec!["position", "isready"]);
    }
}
