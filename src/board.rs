/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Precomputed attack tables for every piece, including magic bitboards for sliders.
mod attacks;

/// Bitboards: 64-bit sets of squares.
mod bitboard;

/// Legal move generation.
mod movegen;

/// Compact move encoding and coordinate notation.
mod moves;

/// Move-path enumeration, for validating move generation.
mod perft;

/// Colors, piece kinds, and pieces.
mod piece;

/// The board itself, along with its make/unmake state stack.
mod position;

/// Deterministic pseudo-random numbers, for hash keys and magic numbers.
mod prng;

/// Squares, files, and ranks.
mod square;

/// Zobrist hashing of positions.
mod zobrist;

pub use attacks::*;
pub use bitboard::*;
pub use movegen::*;
pub use moves::*;
pub use perft::*;
pub use piece::*;
pub use position::*;
pub use prng::*;
pub use square::*;
pub use zobrist::*;
