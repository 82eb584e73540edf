//! Enumerates the matchups of a multi-engine tournament and runs the pool over each.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::config::{Config, Tournament};
use crate::error::SessionError;
use crate::game::{GameOptions, GameSetup};
use crate::openings::OpeningSource;
use crate::pool;
use crate::tablebase::TablebaseProber;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Lists the `(engine index, engine index)` pairs a tournament mode plays, engine 0 of each pair
/// listed first.
pub fn matchups(engine_count: usize, mode: Tournament) -> Vec<(usize, usize)> {
    match mode {
        Tournament::Gauntlet => (1..engine_count).map(|i| (0, i)).collect(),
        Tournament::RoundRobin => {
            let mut pairs = Vec::new();
            for i in 0..engine_count {
                for j in (i + 1)..engine_count {
                    pairs.push((i, j));
                }
            }
            pairs
        }
    }
}

/// Builds the list of jobs for one matchup: `games` total, alternating which configured engine
/// plays white so every opening is played with both colors, drawn from `openings`.
fn build_jobs(games: usize, openings: &mut OpeningSource) -> Vec<GameSetup> {
    let mut jobs = Vec::with_capacity(games);
    let mut round = 1;
    while jobs.len() < games {
        let fen = openings.next_fen();
        jobs.push(GameSetup { round, fen: fen.clone(), white_idx: 0 });
        round += 1;
        if jobs.len() < games {
            jobs.push(GameSetup { round, fen, white_idx: 1 });
            round += 1;
        }
    }

    jobs
}

/// Runs every matchup implied by `config.tournament` (or the single pairing, if only two engines
/// are configured), printing each matchup's summary as it completes.
pub fn run(
    config: &Config,
    openings: &mut OpeningSource,
    tablebase: Option<Arc<dyn TablebaseProber>>,
    interrupted: &Arc<AtomicBool>,
) -> Result<(), SessionError> {
    let pairs = matchups(config.engines.len(), config.tournament);

    for (i, j) in pairs {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }

        let specs = [config.engines[i].clone(), config.engines[j].clone()];
        println!("{} vs {}", specs[0].name, specs[1].name);

        let jobs = build_jobs(config.games, openings);
        let options = GameOptions {
            time_controls: config.time_controls,
            draw: config.draw,
            resign: config.resign,
            chess960: config.chess960,
            render_pgn: config.pgn_out.is_some(),
        };

        pool::run_matchup(
            &specs,
            jobs,
            &options,
            tablebase.clone(),
            config.concurrency,
            config.rating_interval,
            config.pgn_out.as_deref(),
            interrupted,
        )?;
    }

    if interrupted.load(Ordering::SeqCst) {
        return Err(SessionError::ProtocolFailure("interrupted by host".to_owned()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauntlet_pairs_engine_zero_with_every_other() {
        assert_eq!(matchups(4, Tournament::Gauntlet), vec![(0, 1), (0, 2), (0, 3)]);
    }

    #[test]
    fn round_robin_pairs_every_unordered_combination() {
        assert_eq!(
            matchups(3, Tournament::RoundRobin),
            vec![(0, 1), (0, 2), (1, 2)]
        );
    }

    #[test]
    fn build_jobs_alternates_colors_for_the_same_opening() {
        let mut openings = OpeningSource::Book(crate::openings::BookSampler::new(Some(1)));
        let jobs = build_jobs(4, &mut openings);
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].white_idx, 0);
        assert_eq!(jobs[1].white_idx, 1);
        assert_eq!(jobs[0].fen, jobs[1].fen);
    }
}
