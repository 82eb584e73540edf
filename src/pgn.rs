//! Renders a finished game as PGN text.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Lines are wrapped so that no movetext line exceeds this many bytes, matching common PGN
/// viewer expectations.
const MAX_LINE_WIDTH: usize = 80;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// The seven-tag roster plus the optional `SetUp`/`FEN` pair for a non-default starting position.
#[derive(Debug, Clone)]
pub struct GameHeaders {
    /// `Event`
    pub event: String,
    /// `Site`
    pub site: String,
    /// `Date`, in `YYYY.MM.DD` form.
    pub date: String,
    /// `Round`
    pub round: String,
    /// `White`
    pub white: String,
    /// `Black`
    pub black: String,
    /// `Result`, one of `1-0`, `0-1`, `1/2-1/2`.
    pub result: &'static str,
    /// The starting FEN, when it isn't the standard starting position.
    pub fen: Option<String>,
}

/// Renders a complete PGN game: the seven-tag roster (plus `SetUp`/`FEN` when given), SAN
/// movetext with move numbers, the result, and a trailing `{reason}` comment.
pub fn render(headers: &GameHeaders, sans: &[String], reason: &str) -> String {
    let mut tags = String::new();
    tags += &format!("[Event \"{}\"]\n", headers.event);
    tags += &format!("[Site \"{}\"]\n", headers.site);
    tags += &format!("[Date \"{}\"]\n", headers.date);
    tags += &format!("[Round \"{}\"]\n", headers.round);
    tags += &format!("[White \"{}\"]\n", headers.white);
    tags += &format!("[Black \"{}\"]\n", headers.black);
    tags += &format!("[Result \"{}\"]\n", headers.result);
    if let Some(fen) = &headers.fen {
        tags += "[SetUp \"1\"]\n";
        tags += &format!("[FEN \"{fen}\"]\n");
    }

    let mut words = Vec::with_capacity(sans.len() + 1);
    for (ply, san) in sans.iter().enumerate() {
        if ply % 2 == 0 {
            words.push(format!("{}.", ply / 2 + 1));
        }
        words.push(san.clone());
    }
    words.push(format!("{{{reason}}}"));
    words.push(headers.result.to_owned());

    let mut movetext = String::new();
    let mut width = 0;
    for word in &words {
        if width > 0 && width + 1 + word.len() <= MAX_LINE_WIDTH {
            movetext += " ";
            width += 1;
        } else if width > 0 {
            movetext += "\n";
            width = 0;
        }
        movetext += word;
        width += word.len();
    }

    format!("{tags}\n{movetext}\n")
}
