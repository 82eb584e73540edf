//! Per-engine time accounting for a single game.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::time::Duration;
use crate::config::TimeControl;
use crate::error::TimedOut;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A chess clock for one engine across one game.
///
/// Holds the remaining time budget and moves-to-go counter implied by a [`TimeControl`], both of
/// which may be unset if the time control doesn't use them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    remaining: Option<Duration>,
    moves_to_go: Option<u32>,
    tc: TimeControl,
}

impl Clock {
    /// Creates a new clock for the given time control.
    pub fn new(tc: TimeControl) -> Self {
        Clock {
            remaining: tc.time.map(Duration::from_secs_f64),
            moves_to_go: tc.movestogo,
            tc,
        }
    }

    /// Returns the time control this clock was built from.
    pub fn time_control(&self) -> TimeControl {
        self.tc
    }

    /// Returns the current remaining time, if the time control tracks one.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }

    /// Returns the current moves-to-go counter, if the time control tracks one.
    pub fn moves_to_go(&self) -> Option<u32> {
        self.moves_to_go
    }

    /// Accounts for `elapsed` wall-clock time spent on the move that just completed.
    ///
    /// The timeout check always happens before the increment (if any) is credited, and before the
    /// moves-to-go period is reloaded.
    pub fn consume(&mut self, elapsed: Duration) -> Result<(), TimedOut> {
        if let Some(remaining) = self.remaining {
            match remaining.checked_sub(elapsed) {
                Some(mut left) => {
                    if let Some(inc) = self.tc.inc {
                        left += Duration::from_secs_f64(inc);
                    }
                    self.remaining = Some(left);
                }
                None => {
                    self.remaining = Some(Duration::ZERO);
                    return Err(TimedOut);
                }
            }
        }

        if let Some(moves_to_go) = self.moves_to_go {
            if moves_to_go <= 1 {
                self.moves_to_go = self.tc.movestogo;
                if let (Some(base), Some(remaining)) = (self.tc.time, &mut self.remaining) {
                    *remaining += Duration::from_secs_f64(base);
                }
            } else {
                self.moves_to_go = Some(moves_to_go - 1);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc(time: Option<f64>, inc: Option<f64>, movestogo: Option<u32>) -> TimeControl {
        TimeControl { depth: None, nodes: None, movetime: None, time, inc, movestogo }
    }

    #[test]
    fn consume_subtracts_and_credits_increment() {
        let mut clock = Clock::new(tc(Some(60.0), Some(1.0), None));
        clock.consume(Duration::from_secs(10)).unwrap();
        assert_eq!(clock.remaining(), Some(Duration::from_secs(51)));
    }

    #[test]
    fn consume_times_out_before_crediting_increment() {
        let mut clock = Clock::new(tc(Some(5.0), Some(10.0), None));
        let err = clock.consume(Duration::from_secs(6));
        assert!(err.is_err());
        assert_eq!(clock.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn moves_to_go_reloads_and_adds_base() {
        let mut clock = Clock::new(tc(Some(60.0), None, Some(1)));
        clock.consume(Duration::from_secs(5)).unwrap();
        assert_eq!(clock.moves_to_go(), Some(1));
        assert_eq!(clock.remaining(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn unset_fields_are_left_unset() {
        let mut clock = Clock::new(tc(None, None, None));
        clock.consume(Duration::from_secs(1000)).unwrap();
        assert_eq!(clock.remaining(), None);
        assert_eq!(clock.moves_to_go(), None);
    }
}
