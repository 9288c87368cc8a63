/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::Position;

/// Perform a perft at the specified depth, collecting only data about the number of possible positions (nodes).
///
/// This performs bulk counting, meaning that, at depth 1, it returns the number of available moves,
/// rather than making them, recursing again, and returning 1 for each terminal case.
/// If you do *not* want to use bulk counting, use [`perft_generic`].
///
/// # Example
/// ```
/// # use gambit::{perft, Position};
/// let mut pos = Position::default();
/// assert_eq!(perft(&mut pos, 3), 8_902);
/// ```
#[inline(always)]
pub fn perft(position: &mut Position, depth: usize) -> u64 {
    perft_generic::<true, false>(position, depth)
}

/// Like [`perft`], but also prints the number of nodes reachable after each move available at the root node.
#[inline(always)]
pub fn splitperft(position: &mut Position, depth: usize) -> u64 {
    perft_generic::<true, true>(position, depth)
}

/// Generic version of `perft` that allows you to specify whether to perform bulk counting and splitperft.
///
/// If `BULK` is set to `true`, this will perform bulk counting.
/// If `SPLIT` is set to `true`, this will perform a splitperft.
///
/// The position is walked with [`Position::do_move`] and [`Position::undo_move`], and is left as it was found.
pub fn perft_generic<const BULK: bool, const SPLIT: bool>(
    position: &mut Position,
    depth: usize,
) -> u64 {
    // Bulk counting; no need to recurse again just to apply a singular move and return 1.
    if BULK && !SPLIT && depth == 1 {
        return position.legal_moves().len() as u64;
    }
    // Recursion limit; return 1, since we're fathoming this node.
    else if depth == 0 {
        return 1;
    }

    position.legal_moves().into_iter().fold(0, |nodes, mv| {
        position.do_move(mv);
        debug_assert!(position.is_consistent(), "board corrupted after {mv}");
        let new_nodes = perft_generic::<BULK, false>(position, depth - 1);
        position.undo_move();

        if SPLIT {
            println!("{mv}\t{new_nodes}");
        }

        nodes + new_nodes
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FEN_KIWIPETE;

    #[test]
    fn test_bulk_and_full_counts_agree() {
        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        assert_eq!(perft_generic::<true, false>(&mut pos, 2), 2_039);
        assert_eq!(perft_generic::<false, false>(&mut pos, 2), 2_039);
        assert_eq!(pos.to_fen(), FEN_KIWIPETE);
    }

    #[test]
    fn test_depth_zero_is_one_node() {
        let mut pos = Position::default();
        assert_eq!(perft(&mut pos, 0), 1);
        assert_eq!(splitperft(&mut pos, 1), 20);
    }
}
