//! A utility for running automated matches between UCI chess engines.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
#![warn(missing_docs, missing_debug_implementations, unused_extern_crates)]
#![warn(clippy::unimplemented, clippy::todo)]

pub mod board;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod openings;
pub mod pgn;
pub mod pool;
pub mod session;
pub mod tablebase;
pub mod tournament;
pub mod worker;
