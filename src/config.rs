//! The configuration surface: engines, time controls, adjudication thresholds, and match settings.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::collections::HashMap;
use std::fmt;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::error::ConfigError;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A value that can be sent with `setoption`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// A boolean option, sent as `true`/`false`.
    Bool(bool),
    /// An integer option.
    Int(i64),
    /// A string option.
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => b.fmt(f),
            OptionValue::Int(n) => n.fmt(f),
            OptionValue::Str(s) => s.fmt(f),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// One configured engine: how to launch it, and the UCI options to set on it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineSpec {
    /// A short name used in match reports and PGN headers.
    pub name: String,
    /// The engine's executable.
    pub file: PathBuf,
    /// Command line arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// When set, logs both directions of engine protocol traffic.
    #[serde(default)]
    pub debug: bool,
    /// UCI options to set on the engine after the handshake.
    #[serde(default)]
    pub options: HashMap<String, OptionValue>,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Per-move and whole-game time limits for one side of a match.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimeControl {
    /// Per-move search-depth cap.
    #[serde(default)]
    pub depth: Option<u32>,
    /// Per-move node-count cap.
    #[serde(default)]
    pub nodes: Option<u64>,
    /// Per-move wall-time cap, in seconds.
    #[serde(default)]
    pub movetime: Option<f64>,
    /// Total time budget for the game (or for the current `movestogo` period), in seconds.
    #[serde(default)]
    pub time: Option<f64>,
    /// Time added to the budget after each move, in seconds.
    #[serde(default)]
    pub inc: Option<f64>,
    /// Number of moves per time-budget period.
    #[serde(default)]
    pub movestogo: Option<u32>,
}

impl TimeControl {
    /// Returns `true` if at least one field restricts the search.
    pub fn is_valid(&self) -> bool {
        self.depth.is_some()
            || self.nodes.is_some()
            || self.movetime.is_some()
            || self.time.is_some()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Draw-adjudication thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Draw {
    /// Earliest fullmove number at which a draw may be adjudicated.
    pub movenumber: u32,
    /// Number of consecutive plies by each side that must meet the score threshold.
    pub movecount: u32,
    /// Score (centipawns, absolute value) at or below which a ply counts toward adjudication.
    pub score: i32,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Resignation-adjudication thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Resign {
    /// Number of consecutive plies by each side that must meet the score threshold.
    pub movecount: u32,
    /// Score (centipawns, absolute value) at or above which a ply counts toward adjudication.
    pub score: i32,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Which matchups a multi-engine tournament plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tournament {
    /// Engine 0 plays every other configured engine.
    Gauntlet,
    /// Every unordered pair of configured engines plays.
    RoundRobin,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Optional logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Log {
    /// Turns logging on.
    #[serde(default)]
    pub enabled: bool,
    /// The log file to write to.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// The log level, one of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("engineduel.log")
}

fn default_log_level() -> String {
    "info".to_owned()
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The full match configuration, as loaded from a YAML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// The engines to pit against each other, at least two.
    pub engines: Vec<EngineSpec>,
    /// The time control for each side of a game, indexed by engine order within the pairing.
    pub time_controls: [TimeControl; 2],
    /// Draw-adjudication thresholds.
    pub draw: Draw,
    /// Resignation-adjudication thresholds.
    pub resign: Resign,
    /// Path to an EPD file of opening positions.
    #[serde(default)]
    pub openings: Option<PathBuf>,
    /// Fullmove-number cap for the random opening-book sampler, used when `openings` is unset.
    #[serde(default)]
    pub book_depth: Option<u32>,
    /// Path to append played games to, in PGN.
    #[serde(default)]
    pub pgn_out: Option<PathBuf>,
    /// Plays Chess960 (Fischer Random) instead of standard chess.
    #[serde(default)]
    pub chess960: bool,
    /// Total games to play per matchup. Typically even, so each opening is played with both
    /// colors.
    pub games: usize,
    /// Number of games to run concurrently.
    pub concurrency: usize,
    /// How often, in completed games, to print the running score and confidence interval.
    pub rating_interval: usize,
    /// Gauntlet or round-robin, when more than two engines are configured.
    #[serde(default = "default_tournament")]
    pub tournament: Tournament,
    /// Path to Syzygy tablebase files, if adjudication by tablebase is desired.
    #[serde(default)]
    pub tablebase: Option<PathBuf>,
    /// Logging configuration.
    #[serde(default)]
    pub log: Option<Log>,
}

fn default_tournament() -> Tournament {
    Tournament::Gauntlet
}

impl Config {
    /// Reads and parses a YAML configuration file, then validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engines.len() < 2 {
            return Err(ConfigError("at least two engines must be configured".to_owned()));
        }
        for tc in &self.time_controls {
            if !tc.is_valid() {
                return Err(ConfigError(
                    "each time control must restrict depth, nodes, movetime, or time".to_owned(),
                ));
            }
        }
        if self.games == 0 {
            return Err(ConfigError("games must be positive".to_owned()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError("concurrency must be positive".to_owned()));
        }
        if self.rating_interval == 0 {
            return Err(ConfigError("rating_interval must be positive".to_owned()));
        }

        Ok(())
    }
}
