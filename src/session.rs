//! The engine-session state machine: spawns an engine, speaks UCI to it, and exposes a blocking
//! `go` call.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use log::{debug, warn};
use crate::config::OptionValue;
use crate::error::SessionError;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The line-oriented transport an [`EngineSession`] speaks over.
///
/// Abstracted so the protocol state machine can be exercised against an in-memory stub instead of
/// a real subprocess.
pub trait Transport: Send + std::fmt::Debug {
    /// Writes one line (without a trailing newline) to the engine.
    fn send_line(&mut self, line: &str) -> Result<(), SessionError>;

    /// Blocks until the engine sends a line, or its output is closed.
    fn recv_line(&mut self) -> Result<String, SessionError>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A `Transport` backed by a real child process's standard input and output.
#[derive(Debug)]
pub struct ProcessTransport {
    child: Child,
    stdin: std::process::ChildStdin,
    lines: Receiver<String>,
}

impl ProcessTransport {
    /// Spawns `cmd` with `args` and connects to its standard input/output.
    pub fn spawn<T, U>(cmd: T, args: &[U]) -> Result<Self, SessionError>
    where
        T: AsRef<OsStr>,
        U: AsRef<OsStr>,
    {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if sender.send(line.trim_end().to_owned()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(ProcessTransport { child, stdin, lines: receiver })
    }

    /// The child process's id, for debug logging.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Transport for ProcessTransport {
    fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn recv_line(&mut self) -> Result<String, SessionError> {
        self.lines.recv().map_err(SessionError::from)
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The arguments accepted by a `go` call. Keys whose value is `None` are omitted from the wire
/// command entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoArgs {
    /// `depth`
    pub depth: Option<u32>,
    /// `nodes`
    pub nodes: Option<u64>,
    /// `movetime`, in milliseconds.
    pub movetime_ms: Option<u64>,
    /// `wtime`, in milliseconds.
    pub wtime_ms: Option<u64>,
    /// `btime`, in milliseconds.
    pub btime_ms: Option<u64>,
    /// `winc`, in milliseconds.
    pub winc_ms: Option<u64>,
    /// `binc`, in milliseconds.
    pub binc_ms: Option<u64>,
    /// `movestogo`
    pub movestogo: Option<u32>,
}

impl GoArgs {
    fn command(&self) -> String {
        let mut cmd = String::from("go");
        if let Some(v) = self.depth {
            cmd += &format!(" depth {v}");
        }
        if let Some(v) = self.nodes {
            cmd += &format!(" nodes {v}");
        }
        if let Some(v) = self.movetime_ms {
            cmd += &format!(" movetime {v}");
        }
        if let Some(v) = self.wtime_ms {
            cmd += &format!(" wtime {v}");
        }
        if let Some(v) = self.btime_ms {
            cmd += &format!(" btime {v}");
        }
        if let Some(v) = self.winc_ms {
            cmd += &format!(" winc {v}");
        }
        if let Some(v) = self.binc_ms {
            cmd += &format!(" binc {v}");
        }
        if let Some(v) = self.movestogo {
            cmd += &format!(" movestogo {v}");
        }

        cmd
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The outcome of a `go` call: the chosen move and the last evaluation score seen before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// The move chosen by the engine, in UCI long-algebraic notation.
    pub best_move: String,
    /// The last accepted evaluation, in centipawns from the mover's perspective, if any.
    pub score: Option<i32>,
    /// Whether `score` came from a `mate` line rather than a `cp` line.
    pub is_mate: bool,
}

/// Extracts the score update (if any) implied by one `info` line.
///
/// Returns `None` when the line carries no score update at all, so the caller should keep
/// whatever score it already had (fail-high/fail-low bound scores, and unrecognised score kinds,
/// both leave the running score untouched).
fn extract_score(line: &str, resign_score: i32) -> Option<(i32, bool)> {
    let after = line.split_once("score ")?.1;
    let mut tokens = after.split_whitespace();
    match tokens.next()? {
        "cp" => {
            let value: i32 = tokens.next()?.parse().ok()?;
            match tokens.next() {
                Some(bound) if bound.ends_with("bound") => None,
                _ => Some((value, false)),
            }
        }
        "mate" => {
            let plies: i32 = tokens.next()?.parse().ok()?;
            if plies > 0 {
                Some((resign_score, true))
            } else {
                Some((-resign_score, true))
            }
        }
        _ => None,
    }
}

/// Extracts the option name from an `option name ... type ...` reply. The name is every token
/// between `name` and the first following `type` token.
fn parse_option_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("option name ")?;
    let mut name_tokens = Vec::new();
    for token in rest.split_whitespace() {
        if token == "type" {
            break;
        }
        name_tokens.push(token);
    }

    if name_tokens.is_empty() {
        None
    } else {
        Some(name_tokens.join(" "))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// One engine subprocess, speaking the UCI protocol.
#[derive(Debug)]
pub struct EngineSession {
    transport: Box<dyn Transport>,
    label: String,
    debug: bool,
    pid: Option<u32>,
    advertised_options: HashSet<String>,
}

impl EngineSession {
    /// Wraps an already-connected transport. Does not perform the handshake; call
    /// [`handshake`](Self::handshake) before using the session.
    pub fn new(transport: Box<dyn Transport>, label: impl Into<String>, debug: bool) -> Self {
        EngineSession {
            transport,
            label: label.into(),
            debug,
            pid: None,
            advertised_options: HashSet::new(),
        }
    }

    /// Spawns `cmd` and wraps it in a session.
    pub fn spawn<T, U>(cmd: T, args: &[U], label: impl Into<String>, debug: bool) -> Result<Self, SessionError>
    where
        T: AsRef<OsStr>,
        U: AsRef<OsStr>,
    {
        let transport = ProcessTransport::spawn(cmd, args)?;
        let pid = transport.pid();
        let mut session = Self::new(Box::new(transport), label, debug);
        session.pid = Some(pid);

        Ok(session)
    }

    fn send(&mut self, line: &str) -> Result<(), SessionError> {
        if self.debug {
            debug!("[{} pid={:?}] -> {}", self.label, self.pid, line);
        }
        self.transport.send_line(line)
    }

    fn recv(&mut self) -> Result<String, SessionError> {
        let line = self.transport.recv_line()?;
        if self.debug {
            debug!("[{} pid={:?}] <- {}", self.label, self.pid, line);
        }
        Ok(line)
    }

    /// The options this engine advertised during the handshake.
    pub fn advertised_options(&self) -> &HashSet<String> {
        &self.advertised_options
    }

    /// Sends `uci` and consumes replies until `uciok`, recording every advertised option name.
    pub fn handshake(&mut self) -> Result<(), SessionError> {
        self.send("uci")?;
        loop {
            let line = self.recv()?;
            if let Some(name) = parse_option_name(&line) {
                self.advertised_options.insert(name);
            } else if line.trim() == "uciok" {
                return Ok(());
            }
        }
    }

    /// Sends `setoption` for each entry in `options`, warning about names the engine never
    /// advertised (the line is still sent).
    pub fn set_options(&mut self, options: &std::collections::HashMap<String, OptionValue>) -> Result<(), SessionError> {
        for (name, value) in options {
            if !self.advertised_options.contains(name) {
                warn!("{}: engine did not advertise option \"{}\"", self.label, name);
            }

            let value = match value {
                OptionValue::Bool(b) => b.to_string(),
                other => other.to_string(),
            };
            self.send(&format!("setoption name {name} value {value}"))?;
        }

        Ok(())
    }

    /// Sends `setoption name UCI_Chess960 value true`, for Chess960 matches.
    pub fn set_chess960(&mut self) -> Result<(), SessionError> {
        self.send("setoption name UCI_Chess960 value true")
    }

    /// Sends `isready` and blocks until `readyok`.
    pub fn ready(&mut self) -> Result<(), SessionError> {
        self.send("isready")?;
        loop {
            if self.recv()?.trim() == "readyok" {
                return Ok(());
            }
        }
    }

    /// Sends `ucinewgame`.
    pub fn new_game(&mut self) -> Result<(), SessionError> {
        self.send("ucinewgame")
    }

    /// Sends a pre-built `position fen ...` command line.
    pub fn position(&mut self, position_cmd: &str) -> Result<(), SessionError> {
        self.send(position_cmd)
    }

    /// Sends `go` with the given arguments and blocks until `bestmove`.
    ///
    /// `resign_score` is the magnitude (in centipawns) substituted for a `mate` score; its sign
    /// follows the sign of the mate ply count.
    pub fn go(&mut self, args: &GoArgs, resign_score: i32) -> Result<SearchResult, SessionError> {
        self.send(&args.command())?;

        let mut score = None;
        let mut is_mate = false;
        loop {
            let line = self.recv()?;
            if let Some(rest) = line.strip_prefix("bestmove") {
                let best_move = rest
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| SessionError::ProtocolFailure("bestmove with no move".to_owned()))?
                    .to_owned();

                return Ok(SearchResult { best_move, score, is_mate });
            } else if line.starts_with("info") {
                if let Some((value, mate)) = extract_score(&line, resign_score) {
                    score = Some(value);
                    is_mate = mate;
                }
            }
        }
    }

    /// Sends `quit`. Best-effort: errors are ignored.
    pub fn quit(&mut self) {
        let _ = self.send("quit");
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.quit();
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::mpsc::{channel, Sender};

    /// An in-memory transport pair. `ours` is handed to the `EngineSession`; `theirs` is driven
    /// by a test-written stub-engine closure running on a background thread.
    #[derive(Debug)]
    pub struct StubEngineTransport {
        outgoing: Receiver<String>,
        incoming: Sender<String>,
    }

    impl Transport for StubEngineTransport {
        fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
            self.incoming.send(line.to_owned()).map_err(|_| {
                SessionError::ProtocolFailure("stub engine hung up".to_owned())
            })
        }

        fn recv_line(&mut self) -> Result<String, SessionError> {
            self.outgoing.recv().map_err(SessionError::from)
        }
    }

    /// Spawns a background thread running `engine`, and returns a `Transport` connected to it.
    /// `engine` receives commands sent to the session and a handle to send replies back.
    pub fn stub_engine<F>(engine: F) -> StubEngineTransport
    where
        F: FnOnce(Receiver<String>, Sender<String>) + Send + 'static,
    {
        let (to_engine_tx, to_engine_rx) = channel();
        let (from_engine_tx, from_engine_rx) = channel();

        thread::spawn(move || engine(to_engine_rx, from_engine_tx));

        StubEngineTransport { outgoing: from_engine_rx, incoming: to_engine_tx }
    }
}
