//! Starting-position sources: an EPD file reader, and a random opening-book sampler.
//
//  Copyright 2020 Michael Leany
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::fs::read_to_string;
use std::path::Path;
use rand::seq::IteratorRandom;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use shakmaty::fen::Fen;
use crate::error::ConfigError;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// An EPD file, read into memory, with a cursor that wraps around once exhausted.
///
/// Each non-empty line holds one position; fields are delimited by `;` and only the first
/// (piece placement, side to move, castling, en passant) is used, with halfmove clock and
/// fullmove number defaulting to `0 1`.
#[derive(Debug, Clone)]
pub struct EpdFile {
    fens: Vec<String>,
    next: usize,
}

impl EpdFile {
    /// Reads `path` into memory.
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let text = read_to_string(path)?;
        let fens: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let epd_fields = line.split(';').next().unwrap_or(line);
                format!("{} 0 1", epd_fields.trim())
            })
            .collect();

        if fens.is_empty() {
            return Err(ConfigError(format!("{}: no positions found", path.display())));
        }

        Ok(EpdFile { fens, next: 0 })
    }

    /// Resets the cursor to the first position.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Returns the next FEN, wrapping around to the start after the last one.
    pub fn next_fen(&mut self) -> String {
        if self.next >= self.fens.len() {
            self.reset();
        }
        let fen = self.fens[self.next].clone();
        self.next += 1;

        fen
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// Samples a random opening by playing uniformly-random legal moves from the standard starting
/// position up to a fullmove-number cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookSampler {
    depth: Option<u32>,
}

impl BookSampler {
    /// Creates a sampler that stops after reaching fullmove number `depth`, or never stops
    /// (beyond running out of legal moves) if `depth` is `None`.
    pub fn new(depth: Option<u32>) -> Self {
        BookSampler { depth }
    }

    /// Plays a random line and returns the resulting position's FEN.
    pub fn sample_fen(&self) -> String {
        let mut position = Chess::default();
        let mut rng = rand::thread_rng();

        loop {
            if let Some(depth) = self.depth {
                if position.fullmoves().get() >= depth {
                    break;
                }
            }

            let legals = position.legal_moves();
            let Some(mv) = legals.iter().choose(&mut rng) else { break };
            position = position.play(mv).expect("move drawn from legal_moves is legal");
        }

        Fen::from_position(position, EnPassantMode::Legal).to_string()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A finite, repeatable source of starting-position FENs.
#[derive(Debug, Clone)]
pub enum OpeningSource {
    /// Positions read from an EPD file, cycling once exhausted.
    Epd(EpdFile),
    /// Positions sampled fresh from a random opening book.
    Book(BookSampler),
}

impl OpeningSource {
    /// Returns the next starting FEN. For [`Epd`](Self::Epd) this advances the file cursor; for
    /// [`Book`](Self::Book) this samples a brand new random line.
    pub fn next_fen(&mut self) -> String {
        match self {
            OpeningSource::Epd(epd) => epd.next_fen(),
            OpeningSource::Book(sampler) => sampler.sample_fen(),
        }
    }

    /// Validates a FEN is well-formed under the given castling mode. Used by `check-config`.
    pub fn validate_fen(fen: &str, chess960: bool) -> Result<(), ConfigError> {
        use std::str::FromStr;
        let mode = if chess960 { CastlingMode::Chess960 } else { CastlingMode::Standard };
        let setup = Fen::from_str(fen).map_err(|err| ConfigError(format!("{fen}: {err}")))?;
        let _: Chess = setup
            .into_position(mode)
            .map_err(|err| ConfigError(format!("{fen}: {err}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn epd_file_cycles_after_exhaustion() {
        let mut file = tempfile_with(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -;\n\
             rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3;\n",
        );
        let mut epd = EpdFile::open(file.path()).unwrap();
        let first = epd.next_fen();
        let second = epd.next_fen();
        let wrapped = epd.next_fen();
        assert_eq!(first, wrapped);
        assert_ne!(first, second);
        file.close();
    }

    #[test]
    fn book_sampler_respects_depth_cap() {
        let sampler = BookSampler::new(Some(1));
        let fen = sampler.sample_fen();
        OpeningSource::validate_fen(&fen, false).unwrap();
    }

    struct TempFile {
        path: std::path::PathBuf,
    }
    impl TempFile {
        fn path(&self) -> &Path {
            &self.path
        }
        fn close(self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(contents: &str) -> TempFile {
        let path = std::env::temp_dir().join(format!("engineduel-test-{}.epd", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        TempFile { path }
    }
}
