//! Error types used throughout the match runner.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::sync::mpsc;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Error raised by a [`Clock`](crate::clock::Clock) when its owner has no time left to move.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "out of time".fmt(f)
    }
}

impl std::error::Error for TimedOut {}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Error encountered while speaking the engine protocol to a subprocess.
#[derive(Debug)]
pub enum SessionError {
    /// The engine closed its output (or the pipe broke) before giving an expected reply.
    ProtocolFailure(String),
    /// The underlying process could not be spawned or written to.
    Io(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ProtocolFailure(msg) => write!(f, "protocol failure: {msg}"),
            SessionError::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err)
    }
}

impl From<mpsc::RecvError> for SessionError {
    fn from(_: mpsc::RecvError) -> Self {
        SessionError::ProtocolFailure("engine closed its output".to_owned())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Error raised while loading or validating a [`Config`](crate::config::Config).
#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError(err.to_string())
    }
}
