//! The worker pool: dispatches a matchup's games across N worker threads and aggregates their
//! results.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use log::{info, warn};
use crate::config::EngineSpec;
use crate::error::SessionError;
use crate::game::{GameOptions, GameSetup};
use crate::tablebase::TablebaseProber;
use crate::worker::{self, Job, JobQueue, JobResult};

/// How often the result-channel receive times out to poll the interrupt flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The outcome of playing one matchup's full set of games.
#[derive(Debug, Clone, Default)]
pub struct MatchupOutcome {
    /// Engine-0-perspective scores, one per game actually completed.
    pub scores: Vec<f64>,
}

/// Runs one matchup: `specs[0]` vs. `specs[1]` over `jobs`, across `concurrency` workers.
///
/// Prints each game's display line as it completes, and a running score/confidence-interval
/// summary every `rating_interval` results. Appends PGN text to `pgn_out`, if configured, in
/// completion order. Returns early (with whatever games had already completed) if `interrupted`
/// is set, either before this call or while it runs.
///
/// Returns `Err` if `interrupted` was observed, or if any worker failed to bring up its engine
/// sessions at startup, so the caller can surface a non-zero exit status.
#[allow(clippy::too_many_arguments)]
pub fn run_matchup(
    specs: &[EngineSpec; 2],
    jobs: Vec<GameSetup>,
    options: &GameOptions,
    tablebase: Option<Arc<dyn TablebaseProber>>,
    concurrency: usize,
    rating_interval: usize,
    pgn_out: Option<&Path>,
    interrupted: &Arc<AtomicBool>,
) -> Result<MatchupOutcome, SessionError> {
    let (job_tx, job_rx) = mpsc::channel::<Job>();
    let (result_tx, result_rx) = mpsc::channel::<JobResult>();
    let job_rx = Arc::new(std::sync::Mutex::new(job_rx));

    let total_jobs = jobs.len();
    for setup in jobs {
        if job_tx.send(Job::Play(setup)).is_err() {
            break;
        }
    }
    for _ in 0..concurrency {
        let _ = job_tx.send(Job::Stop);
    }
    drop(job_tx);

    let worker_failed = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::with_capacity(concurrency);
    for worker_id in 0..concurrency {
        let specs = specs.clone();
        let options = *options;
        let tablebase = tablebase.clone();
        let job_rx = Arc::clone(&job_rx);
        let result_tx = result_tx.clone();
        let worker_interrupted = Arc::clone(interrupted);
        let worker_failed = Arc::clone(&worker_failed);

        handles.push(thread::spawn(move || {
            let jobs = SharedJobs { inner: job_rx };
            let prober = tablebase.as_deref();
            if let Err(err) =
                worker::run(worker_id, &specs, &options, prober, &jobs, &result_tx, &worker_interrupted)
            {
                log::error!("worker {worker_id}: failed to start: {err}");
                worker_failed.store(true, Ordering::SeqCst);
            }
        }));
    }
    drop(result_tx);

    let mut outcome = MatchupOutcome::default();
    let mut pgn_file = pgn_out
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose()
        .map_err(|err| SessionError::ProtocolFailure(err.to_string()))?;

    let mut received = 0usize;
    while received < total_jobs {
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted: stopping after {received}/{total_jobs} games");
            break;
        }

        match result_rx.recv_timeout(POLL_INTERVAL) {
            Ok(result) => {
                received += 1;
                println!("{}", result.display);
                outcome.scores.push(result.score0);

                if let (Some(file), Some(pgn)) = (pgn_file.as_mut(), &result.pgn) {
                    if let Err(err) = writeln!(file, "{pgn}") {
                        warn!("failed to append PGN for round {}: {err}", result.round);
                    }
                }

                if received % rating_interval == 0 {
                    print_summary(&specs[0].name, &specs[1].name, &outcome.scores);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    print_summary(&specs[0].name, &specs[1].name, &outcome.scores);

    let was_interrupted = interrupted.load(Ordering::SeqCst);
    for handle in handles {
        let _ = handle.join();
    }

    if worker_failed.load(Ordering::SeqCst) {
        return Err(SessionError::ProtocolFailure(
            "one or more workers failed to start an engine session".to_owned(),
        ));
    }
    if was_interrupted {
        return Err(SessionError::ProtocolFailure("interrupted by host".to_owned()));
    }

    Ok(outcome)
}

/// A job receiver shared between worker threads behind a mutex, since `mpsc::Receiver` isn't
/// `Sync` but many workers must pull from the same queue.
struct SharedJobs {
    inner: Arc<std::sync::Mutex<mpsc::Receiver<Job>>>,
}

impl JobQueue for SharedJobs {
    fn recv(&self) -> Result<Job, mpsc::RecvError> {
        self.inner.lock().expect("job queue mutex poisoned").recv()
    }
}

/// Prints `score of A vs. B = M% +/- H%` for the 95% confidence interval over `scores`.
fn print_summary(name_a: &str, name_b: &str, scores: &[f64]) {
    let n = scores.len();
    if n < 2 {
        return;
    }

    let mean: f64 = scores.iter().sum::<f64>() / n as f64;
    let variance: f64 = scores.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let margin = 1.96 * (variance / n as f64).sqrt();

    println!(
        "score of {name_a} vs. {name_b} = {:.2}% +/- {:.2}%",
        100.0 * mean,
        100.0 * margin
    );
}
