//! A single worker: owns one pair of engine sessions for its whole lifetime and plays games
//! pulled from a job queue.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvError, Sender};
use std::sync::Arc;
use log::{error, info};
use crate::config::EngineSpec;
use crate::game::{self, GameOptions, GameSetup, MatchLabels};
use crate::session::EngineSession;
use crate::tablebase::TablebaseProber;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// One game to play, or the sentinel telling a worker to shut down.
#[derive(Debug)]
pub enum Job {
    /// Play the given game.
    Play(GameSetup),
    /// Drain no further jobs; exit the worker loop.
    Stop,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A source of jobs a worker can pull from, shared across worker threads.
///
/// The pool wraps an `mpsc::Receiver` behind a mutex so several worker threads can pull from the
/// same queue (`Receiver` alone isn't `Sync`).
pub trait JobQueue: Send + Sync {
    /// Blocks until a job is available, or returns an error once the channel is closed.
    fn recv(&self) -> Result<Job, RecvError>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A finished game as reported back to the pool.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// The round this result belongs to, for ordering in logs.
    pub round: u32,
    /// The score in {0, 0.5, 1} from engine 0's perspective.
    pub score0: f64,
    /// A human-readable summary line.
    pub display: String,
    /// Rendered PGN text, if requested.
    pub pgn: Option<String>,
}

/// Spawns and configures the two engines for this worker, then plays jobs from `jobs` until the
/// `Stop` sentinel, pushing a [`JobResult`] for each game onto `results`.
///
/// Returns an error only if an engine session could not be brought up at startup; failures during
/// a game are logged and the worker moves on to its next job, reporting no result for the failed
/// game (matching the "never retry" failure model).
///
/// Checks `interrupted` before pulling each job from `jobs`, so a host interrupt stops the worker
/// between games rather than mid-game; a game already underway always runs to completion.
pub fn run(
    worker_id: usize,
    specs: &[EngineSpec; 2],
    options: &GameOptions,
    tablebase: Option<&dyn TablebaseProber>,
    jobs: &dyn JobQueue,
    results: &Sender<JobResult>,
    interrupted: &Arc<AtomicBool>,
) -> Result<(), crate::error::SessionError> {
    let mut sessions = [
        start_session(&specs[0], options.chess960)?,
        start_session(&specs[1], options.chess960)?,
    ];

    let labels = MatchLabels {
        event: "Automated match".to_owned(),
        site: hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "?".to_owned()),
        names: [specs[0].name.clone(), specs[1].name.clone()],
    };

    info!("worker {worker_id}: ready ({} vs {})", specs[0].name, specs[1].name);

    drive(worker_id, &mut sessions, &labels, options, tablebase, jobs, results, interrupted);

    info!("worker {worker_id}: shutting down");

    Ok(())
}

/// The job loop proper, factored out of [`run`] so it can be driven against stub sessions in
/// tests without spawning a real engine subprocess.
#[allow(clippy::too_many_arguments)]
fn drive(
    worker_id: usize,
    sessions: &mut [EngineSession; 2],
    labels: &MatchLabels,
    options: &GameOptions,
    tablebase: Option<&dyn TablebaseProber>,
    jobs: &dyn JobQueue,
    results: &Sender<JobResult>,
    interrupted: &Arc<AtomicBool>,
) {
    while !interrupted.load(Ordering::SeqCst) {
        let Ok(job) = jobs.recv() else { break };
        let setup = match job {
            Job::Play(setup) => setup,
            Job::Stop => break,
        };

        let round = setup.round;
        let date = chrono::Local::now().format("%Y.%m.%d").to_string();
        match game::play_game(sessions, &setup, options, tablebase, labels, &date) {
            Ok(outcome) => {
                let display = format!(
                    "round {round}: {} vs {} = {} ({})",
                    labels.names[setup.white_idx],
                    labels.names[1 - setup.white_idx],
                    outcome.pgn_result,
                    outcome.reason
                );
                let _ = results.send(JobResult {
                    round,
                    score0: outcome.score0,
                    display,
                    pgn: outcome.pgn,
                });
            }
            Err(err) => {
                error!("worker {worker_id}: round {round} abandoned: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, RecvError};
    use std::sync::Mutex;
    use std::thread;
    use crate::config::{Draw, Resign, TimeControl};
    use crate::session::test_support::stub_engine;

    const FOOLS_MATE: &str = "rnbqkbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";

    fn options() -> GameOptions {
        GameOptions {
            time_controls: [
                TimeControl { depth: None, nodes: None, movetime: Some(1.0), time: None, inc: None, movestogo: None },
                TimeControl { depth: None, nodes: None, movetime: Some(1.0), time: None, inc: None, movestogo: None },
            ],
            draw: Draw { movenumber: 40, movecount: 8, score: 10 },
            resign: Resign { movecount: 3, score: 700 },
            chess960: false,
            render_pgn: false,
        }
    }

    /// Drains every command sent to it without replying; used where the game under test ends
    /// before any reply is ever awaited (see `FOOLS_MATE`).
    fn idle_engine(cmds: Receiver<String>, _replies: Sender<String>) {
        while cmds.recv().is_ok() {}
    }

    fn idle_sessions() -> [EngineSession; 2] {
        [
            EngineSession::new(Box::new(stub_engine(idle_engine)), "white", false),
            EngineSession::new(Box::new(stub_engine(idle_engine)), "black", false),
        ]
    }

    fn labels() -> MatchLabels {
        MatchLabels {
            event: "test".to_owned(),
            site: "?".to_owned(),
            names: ["white".to_owned(), "black".to_owned()],
        }
    }

    /// A `JobQueue` over a shared, mutex-guarded receiver, mirroring `pool::SharedJobs`.
    struct SharedJobs(Mutex<Receiver<Job>>);

    impl JobQueue for SharedJobs {
        fn recv(&self) -> Result<Job, RecvError> {
            self.0.lock().expect("job queue mutex poisoned").recv()
        }
    }

    /// A `JobQueue` that panics if polled, to prove a caller never reached `recv`.
    struct PanicsIfPolled;

    impl JobQueue for PanicsIfPolled {
        fn recv(&self) -> Result<Job, RecvError> {
            panic!("interrupted worker should not poll the job queue");
        }
    }

    #[test]
    fn already_interrupted_worker_never_polls_the_queue() {
        let mut sessions = idle_sessions();
        let labels = labels();
        let options = options();
        let (results_tx, _results_rx) = channel();
        let interrupted = Arc::new(AtomicBool::new(true));

        drive(0, &mut sessions, &labels, &options, None, &PanicsIfPolled, &results_tx, &interrupted);
    }

    #[test]
    fn sentinel_per_worker_drains_every_job_across_several_workers() {
        const WORKERS: usize = 4;
        const JOBS: usize = 23;

        let (job_tx, job_rx) = channel::<Job>();
        let job_rx = Arc::new(SharedJobs(Mutex::new(job_rx)));

        for round in 0..JOBS as u32 {
            job_tx
                .send(Job::Play(GameSetup { round, fen: FOOLS_MATE.to_owned(), white_idx: 0 }))
                .unwrap();
        }
        for _ in 0..WORKERS {
            job_tx.send(Job::Stop).unwrap();
        }
        drop(job_tx);

        let (results_tx, results_rx) = channel();
        let interrupted = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(WORKERS);
        for worker_id in 0..WORKERS {
            let job_rx = Arc::clone(&job_rx);
            let results_tx = results_tx.clone();
            let interrupted = Arc::clone(&interrupted);
            handles.push(thread::spawn(move || {
                let mut sessions = idle_sessions();
                let labels = labels();
                let options = options();
                drive(worker_id, &mut sessions, &labels, &options, None, job_rx.as_ref(), &results_tx, &interrupted);
            }));
        }
        drop(results_tx);

        for handle in handles {
            handle.join().expect("worker thread should not panic");
        }

        let received: Vec<_> = results_rx.iter().collect();
        assert_eq!(received.len(), JOBS);
    }

    #[test]
    fn chess960_option_is_sent_even_when_unadvertised() {
        let engine = move |cmds: Receiver<String>, replies: Sender<String>| {
            assert_eq!(cmds.recv().unwrap(), "uci");
            replies.send("uciok".to_owned()).unwrap();
            assert_eq!(cmds.recv().unwrap(), "setoption name UCI_Chess960 value true");
            replies.send("readyok for isready".to_owned()).unwrap();
            loop {
                match cmds.recv() {
                    Ok(cmd) if cmd == "isready" => {
                        replies.send("readyok".to_owned()).unwrap();
                    }
                    _ => break,
                }
            }
        };

        let mut session = EngineSession::new(Box::new(stub_engine(engine)), "stub", false);
        session.handshake().unwrap();
        assert!(!session.advertised_options().contains("UCI_Chess960"));
        session.set_options(&std::collections::HashMap::new()).unwrap();
        session.set_chess960().unwrap();
    }
}

fn start_session(spec: &EngineSpec, chess960: bool) -> Result<EngineSession, crate::error::SessionError> {
    let mut session = EngineSession::spawn(&spec.file, &spec.args, spec.name.clone(), spec.debug)?;
    session.handshake()?;
    session.set_options(&spec.options)?;
    if chess960 {
        if !session.advertised_options().contains("UCI_Chess960") {
            log::warn!("{}: engine did not advertise UCI_Chess960", spec.name);
        }
        session.set_chess960()?;
    }
    session.ready()?;

    Ok(session)
}
