/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use super::{CastlingRights, File, Piece, Square, XoShiRo};

const ZOBRIST_TABLE: ZobristTable = ZobristTable::new();

/// An incrementally-updated hash of a position.
///
/// Every feature of a position (a piece on a square, the en passant file, the castling rights, and
/// Black being on move) has a random key, and the position's hash is the XOR of the keys of all of its
/// features. Toggling a feature is therefore a single XOR.
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct ZobristKey(u64);

impl ZobristKey {
    #[inline(always)]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub fn hash_piece(&mut self, square: Square, piece: Piece) {
        self.0 ^= ZOBRIST_TABLE.pieces[square][piece.index()];
    }

    /// Toggles the en passant key for the file of `ep_square`, if there is one.
    #[inline(always)]
    pub fn hash_ep_square(&mut self, ep_square: Option<Square>) {
        if let Some(square) = ep_square {
            self.0 ^= ZOBRIST_TABLE.ep_files[square.file().index()];
        }
    }

    #[inline(always)]
    pub fn hash_castling_rights(&mut self, rights: CastlingRights) {
        self.0 ^= ZOBRIST_TABLE.castling[rights.index()];
    }

    #[inline(always)]
    pub fn hash_side_to_move(&mut self) {
        self.0 ^= ZOBRIST_TABLE.black_to_move;
    }
}

impl From<u64> for ZobristKey {
    #[inline(always)]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ZobristKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ZobristKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZobristKey({self})")
    }
}

struct ZobristTable {
    pieces: [[u64; Piece::COUNT]; Square::COUNT],
    ep_files: [u64; File::COUNT],
    castling: [u64; CastlingRights::COUNT],
    black_to_move: u64,
}

impl ZobristTable {
    const fn new() -> Self {
        let mut pieces = [[0; Piece::COUNT]; Square::COUNT];
        let mut ep_files = [0; File::COUNT];
        let mut castling = [0; CastlingRights::COUNT];

        let mut prng = XoShiRo::new();
        let mut key;

        let mut i = 0;
        while i < Square::COUNT {
            let mut j = 0;
            while j < Piece::COUNT {
                (key, prng) = prng.next_const();
                pieces[i][j] = key;
                j += 1;
            }
            i += 1;
        }

        i = 0;
        while i < File::COUNT {
            (key, prng) = prng.next_const();
            ep_files[i] = key;
            i += 1;
        }

        // No rights at all hashes to zero, so a fresh key matches a position without castling
        i = 1;
        while i < CastlingRights::COUNT {
            (key, prng) = prng.next_const();
            castling[i] = key;
            i += 1;
        }

        (key, _) = prng.next_const();

        Self {
            pieces,
            ep_files,
            castling,
            black_to_move: key,
        }
    }
}
