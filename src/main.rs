//! A utility for running automated matches between UCI chess engines.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
#![warn(missing_debug_implementations, unused_extern_crates)]
#![warn(clippy::unimplemented, clippy::todo)]

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use clap::{Parser, Subcommand};
use simplelog::{Config as LogConfig, LevelFilter, WriteLogger};
use engineduel::config::Config;
use engineduel::openings::{BookSampler, EpdFile, OpeningSource};
use engineduel::tablebase::{SyzygyProber, TablebaseProber};
use engineduel::tournament;

#[derive(Debug, Parser)]
#[command(name = "engineduel", version, about = "Runs automated matches between UCI chess engines.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plays the configured tournament.
    Run {
        /// Path to the YAML configuration file.
        #[arg(long, short = 'c')]
        config: PathBuf,
        /// Turns on logging.
        #[arg(long, short = 'l')]
        log: bool,
        /// Sets the log file if logging is turned on.
        #[arg(long, value_name = "LOG_FILE")]
        log_file: Option<PathBuf>,
        /// Sets the log level if logging is turned on.
        #[arg(long, value_name = "LEVEL")]
        log_level: Option<String>,
    },
    /// Validates a configuration file without spawning any engine.
    CheckConfig {
        /// Path to the YAML configuration file.
        #[arg(long, short = 'c')]
        config: PathBuf,
    },
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.command {
        Command::CheckConfig { config } => check_config(&config),
        Command::Run { config, log, log_file, log_level } => run(&config, log, log_file, log_level),
    }
}

fn check_config(path: &PathBuf) -> Result<(), Error> {
    let config = Config::load(path)?;
    println!("{}: ok ({} engines configured)", path.display(), config.engines.len());

    Ok(())
}

fn run(
    path: &PathBuf,
    log_flag: bool,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
) -> Result<(), Error> {
    let config = Config::load(path)?;

    let log_enabled = log_flag || config.log.as_ref().is_some_and(|l| l.enabled);
    let log_file = log_file
        .or_else(|| config.log.as_ref().map(|l| l.file.clone()))
        .unwrap_or_else(|| PathBuf::from("engineduel.log"));
    let log_level = log_level
        .or_else(|| config.log.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_owned());
    let level_filter = parse_level(&log_level)?;

    let _logger = if log_enabled {
        WriteLogger::init(
            level_filter,
            LogConfig::default(),
            File::create(&log_file).map_err(|err| Error(format!("{}: {err}", log_file.display())))?,
        )
    } else {
        WriteLogger::init(LevelFilter::Off, LogConfig::default(), std::io::sink())
    };

    let mut openings = match &config.openings {
        Some(path) => OpeningSource::Epd(EpdFile::open(path)?),
        None => OpeningSource::Book(BookSampler::new(config.book_depth)),
    };

    let tablebase: Option<std::sync::Arc<dyn TablebaseProber>> = config
        .tablebase
        .as_ref()
        .map(|dir| Arc::new(SyzygyProber::open(dir)) as Arc<dyn TablebaseProber>);

    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| Error(format!("failed to install interrupt handler: {err}")))?;

    tournament::run(&config, &mut openings, tablebase, &interrupted)?;

    Ok(())
}

fn parse_level(level: &str) -> Result<LevelFilter, Error> {
    match level {
        "off" => Ok(LevelFilter::Off),
        "error" => Ok(LevelFilter::Error),
        "warn" => Ok(LevelFilter::Warn),
        "info" => Ok(LevelFilter::Info),
        "debug" => Ok(LevelFilter::Debug),
        "trace" => Ok(LevelFilter::Trace),
        other => Err(Error(format!("{other}: invalid log level"))),
    }
}

#[derive(Debug)]
struct Error(String);

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for Error {}

impl From<engineduel::error::ConfigError> for Error {
    fn from(err: engineduel::error::ConfigError) -> Self {
        Error(err.to_string())
    }
}

impl From<engineduel::error::SessionError> for Error {
    fn from(err: engineduel::error::SessionError) -> Self {
        Error(err.to_string())
    }
}
