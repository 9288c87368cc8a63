/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Board representation, move generation, and perft.
mod board;

/// Command-line interface.
mod cli;

/// The threaded search driver and benchmarking.
mod engine;

/// Evaluation of chess positions.
mod eval;

/// Ordering of moves within a node, including static exchange evaluation.
mod movepicker;

/// Piece-square tables.
mod psqt;

/// Centipawn and mate scores.
mod score;

/// Main engine logic; all search related code.
mod search;

/// Transposition table.
mod ttable;

pub use board::*;
pub use cli::*;
pub use engine::*;
pub use eval::*;
pub use movepicker::*;
pub use psqt::*;
pub use score::*;
pub use search::*;
pub use ttable::*;

/// Build every lookup table the engine relies on.
///
/// Tables are built lazily on first use regardless, so calling this is optional.
/// It is mostly useful to keep that one-time cost out of timed code.
pub fn init() {
    init_attacks();
}
