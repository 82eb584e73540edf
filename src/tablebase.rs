//! Optional Syzygy tablebase adjudication.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fmt;
use std::path::Path;
use log::warn;
use shakmaty::Chess;
use shakmaty_syzygy::{Tablebase, Wdl};

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Anything that can answer "is this position won, lost, or drawn" from tablebase knowledge.
///
/// `None` means "no answer available", whether because the position has too many pieces, the
/// files aren't present, or probing failed; the Game Loop treats that identically to "not
/// configured".
pub trait TablebaseProber: Send + Sync {
    /// Probes `position`, returning a WDL value in `{-2, -1, 0, 1, 2}` from the perspective of
    /// the side to move, or `None` if no result is available.
    fn probe(&self, position: &Chess) -> Option<i8>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A [`TablebaseProber`] backed by a directory of Syzygy `.rtbw`/`.rtbz` files.
pub struct SyzygyProber {
    tables: Tablebase<Chess>,
}

impl fmt::Debug for SyzygyProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyzygyProber").finish_non_exhaustive()
    }
}

impl SyzygyProber {
    /// Loads every tablebase file found in `dir`.
    pub fn open(dir: &Path) -> Self {
        let mut tables = Tablebase::new();
        if let Err(err) = tables.add_directory(dir) {
            warn!("{}: failed to load Syzygy tablebases: {}", dir.display(), err);
        }

        SyzygyProber { tables }
    }
}

impl TablebaseProber for SyzygyProber {
    fn probe(&self, position: &Chess) -> Option<i8> {
        match self.tables.probe_wdl_after_zeroing(position) {
            Ok(wdl) => Some(match wdl {
                Wdl::Loss => -2,
                Wdl::BlessedLoss => -1,
                Wdl::Draw => 0,
                Wdl::CursedWin => 1,
                Wdl::Win => 2,
            }),
            Err(err) => {
                warn!("tablebase probe failed: {err}");
                None
            }
        }
    }
}
