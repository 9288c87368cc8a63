/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{fmt, ops::Neg};

use crate::MAX_PLY;

/// Evaluation of a position in [centipawns](https://www.chessprogramming.org/Score), from the
/// point of view of the side to move.
///
/// Mate scores sit just below [`Score::INF`] and encode their distance from the root, so that a
/// shorter mate always compares better. Every score fits in the `i16` kept by the transposition table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Score(pub i32);

impl Score {
    /// Bound that no real score reaches. Used for open search windows.
    pub const INF: Self = Self(i16::MAX as i32);

    /// Being able to mate right now. A mate `n` plies away is worth `MATE - n`.
    pub const MATE: Self = Self(Self::INF.0 - 1);

    pub const DRAW: Self = Self(0);

    /// Anything at least this far from zero is a mate score.
    pub const LOWEST_MATE: Self = Self(Self::MATE.0 - MAX_PLY as i32);

    #[inline(always)]
    pub const fn new(centipawns: i32) -> Self {
        Self(centipawns)
    }

    /// Score of the side to move being checkmated `ply` plies from the root.
    #[inline(always)]
    pub const fn mated_in(ply: usize) -> Self {
        Self(ply as i32 - Self::MATE.0)
    }

    #[inline(always)]
    pub const fn is_mate(&self) -> bool {
        self.0.abs() >= Self::LOWEST_MATE.0
    }

    /// Plies between the root and the mate. Meaningless unless [`Score::is_mate`].
    #[inline(always)]
    pub const fn plies_to_mate(&self) -> i32 {
        Self::MATE.0 - self.0.abs()
    }

    /// Full moves until mate: positive if the side to move mates, negative if it is mated.
    #[inline(always)]
    pub const fn moves_to_mate(&self) -> i32 {
        let plies = self.plies_to_mate();
        if self.0 > 0 {
            (plies + 1) / 2
        } else {
            -plies / 2
        }
    }

    /// Measure a mate from the node `ply` plies below the root instead of from the root itself.
    ///
    /// Mates seen from a node are closer than the same mates seen from the root. Storing scores this
    /// way lets the transposition table hand them out at any ply; [`Score::relative`] undoes it.
    #[inline(always)]
    pub const fn absolute(self, ply: usize) -> Self {
        self.shift_mate(ply as i32)
    }

    /// Inverse of [`Score::absolute`].
    #[inline(always)]
    pub const fn relative(self, ply: usize) -> Self {
        self.shift_mate(-(ply as i32))
    }

    /// Moves a mate score away from zero by `plies`, or towards it if `plies` is negative.
    #[inline(always)]
    const fn shift_mate(self, plies: i32) -> Self {
        match self.0.signum() {
            _ if !self.is_mate() => self,
            1 => Self(self.0 + plies),
            _ => Self(self.0 - plies),
        }
    }

    #[inline(always)]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl Neg for Score {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Score {
    /// `cp <n>`, or `mate <n>` in full moves.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_mate() {
            true => write!(f, "mate {}", self.moves_to_mate()),
            false => write!(f, "cp {}", self.0),
        }
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        if self.is_mate() {
            write!(f, " ({self}, {} plies)", self.plies_to_mate())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mate_distances() {
        // We deliver mate with our next move.
        let mate_in_one = -Score::mated_in(1);
        assert!(mate_in_one.is_mate());
        assert_eq!(mate_in_one.plies_to_mate(), 1);
        assert_eq!(mate_in_one.moves_to_mate(), 1);

        // We are mated after our move and theirs.
        let mated_in_one = Score::mated_in(2);
        assert_eq!(mated_in_one.moves_to_mate(), -1);

        assert!(!Score::new(900).is_mate());
        assert!(!Score::DRAW.is_mate());
        assert!(Score::mated_in(MAX_PLY).is_mate());
    }

    #[test]
    fn test_absolute_relative_round_trip() {
        let mated = Score::mated_in(7);
        let stored = mated.absolute(5);
        assert_eq!(stored, Score::mated_in(2));
        assert_eq!(stored.relative(5), mated);

        let winning = -Score::mated_in(9);
        assert_eq!(winning.absolute(4).relative(4), winning);

        let cp = Score::new(-35);
        assert_eq!(cp.absolute(12), cp);
    }

    #[test]
    fn test_display() {
        assert_eq!(Score::new(42).to_string(), "cp 42");
        assert_eq!((-Score::mated_in(3)).to_string(), "mate 2");
        assert_eq!(Score::mated_in(4).to_string(), "mate -2");
        assert_eq!(format!("{:?}", Score::new(-7)), "-7");
    }
}
