/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{fmt, ops::Not};

use super::{Color, File, Rank, Square};

/// A set of squares, one bit per square.
///
/// Bit `i` corresponds to [`Square`] index `i` (Little-Endian Rank-File mapping), so `a1` is the
/// least-significant bit and `h8` the most-significant. The first rank is therefore `0xFF`:
/// ```text
/// 8| . . . . . . . .
/// 7| . . . . . . . .
/// 6| . . . . . . . .
/// 5| . . . . . . . .
/// 4| . . . . . . . .
/// 3| . . . . . . . .
/// 2| . . . . . . . .
/// 1| X X X X X X X X
///  +----------------
///    a b c d e f g h
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Bitboard(pub(crate) u64);

impl Bitboard {
    pub const FILE_A: Self = Self(0x0101010101010101);
    pub const FILE_H: Self = Self(0x8080808080808080);
    pub const NOT_FILE_A: Self = Self(!Self::FILE_A.0);
    pub const NOT_FILE_H: Self = Self(!Self::FILE_H.0);
    pub const RANK_1: Self = Self(0x00000000000000FF);
    pub const RANK_8: Self = Self(0xFF00000000000000);
    pub const EDGE_FILES: Self = Self(Self::FILE_A.0 | Self::FILE_H.0);
    pub const EDGE_RANKS: Self = Self(Self::RANK_1.0 | Self::RANK_8.0);
    pub const LIGHT_SQUARES: Self = Self(0x55AA55AA55AA55AA);
    pub const EMPTY: Self = Self(0);
    pub const FULL: Self = Self(u64::MAX);

    #[inline(always)]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// A set containing only `square`.
    ///
    /// # Example
    /// ```
    /// # use gambit::{Bitboard, Square};
    /// assert_eq!(Bitboard::from_square(Square::H8).inner(), 1 << 63);
    /// ```
    #[inline(always)]
    pub const fn from_square(square: Square) -> Self {
        Self(1 << square.0)
    }

    #[inline(always)]
    pub const fn from_file(file: File) -> Self {
        Self(Self::FILE_A.0 << file.0)
    }

    #[inline(always)]
    pub const fn from_rank(rank: Rank) -> Self {
        Self(Self::RANK_1.0 << (rank.0 * 8))
    }

    #[inline(always)]
    pub const fn inner(&self) -> u64 {
        self.0
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline(always)]
    pub const fn is_nonempty(&self) -> bool {
        self.0 != 0
    }

    /// Whether more than one square is set.
    #[inline(always)]
    pub const fn has_many(&self) -> bool {
        self.0 & self.0.wrapping_sub(1) != 0
    }

    #[inline(always)]
    pub const fn contains(&self, square: Square) -> bool {
        self.0 & (1 << square.0) != 0
    }

    #[inline(always)]
    pub fn intersects(&self, other: impl Into<Self>) -> bool {
        (*self & other.into()).is_nonempty()
    }

    #[inline(always)]
    pub fn set(&mut self, other: impl Into<Self>) {
        *self |= other.into()
    }

    #[inline(always)]
    pub fn clear(&mut self, other: impl Into<Self>) {
        *self &= !other.into()
    }

    /// The lowest set square, if any.
    #[inline(always)]
    pub const fn lsb(&self) -> Option<Square> {
        if self.is_empty() {
            None
        } else {
            Some(Square(self.0.trailing_zeros() as u8))
        }
    }

    /// The lowest set square. Only meaningful on a non-empty set.
    #[inline(always)]
    pub const fn to_square_unchecked(&self) -> Square {
        debug_assert!(self.0 != 0, "no square in an empty bitboard");
        Square(self.0.trailing_zeros() as u8)
    }

    /// Removes and returns the lowest set square.
    ///
    /// # Example
    /// ```
    /// # use gambit::{Bitboard, Square};
    /// let mut bb = Square::C3.bitboard() | Square::A1.bitboard();
    /// assert_eq!(bb.pop_lsb(), Some(Square::A1));
    /// assert_eq!(bb.pop_lsb(), Some(Square::C3));
    /// assert_eq!(bb.pop_lsb(), None);
    /// ```
    #[inline(always)]
    pub fn pop_lsb(&mut self) -> Option<Square> {
        let lsb = self.lsb();
        self.0 &= self.0.wrapping_sub(1);
        lsb
    }

    #[inline(always)]
    pub const fn population(&self) -> u8 {
        self.0.count_ones() as u8
    }

    #[inline(always)]
    pub const fn iter(&self) -> BitboardIter {
        BitboardIter(*self)
    }

    /// Iterates every subset of this set, starting with the empty set and ending with the set itself.
    ///
    /// # Example
    /// ```
    /// # use gambit::{Bitboard, Square};
    /// let bb = Square::A1.bitboard() | Square::B2.bitboard() | Square::C3.bitboard();
    /// assert_eq!(bb.subsets().count(), 8);
    /// assert_eq!(bb.subsets().last(), Some(bb));
    /// ```
    #[inline(always)]
    pub const fn subsets(&self) -> BitboardSubsetIter {
        BitboardSubsetIter {
            set: *self,
            subset: Self::EMPTY,
            remaining: 1 << self.population(),
        }
    }

    /// Shifts every square one rank towards `color`'s opponent.
    #[inline(always)]
    pub const fn forward(self, color: Color) -> Self {
        match color {
            Color::White => self.north(),
            Color::Black => self.south(),
        }
    }

    #[inline(always)]
    pub const fn backward(self, color: Color) -> Self {
        match color {
            Color::White => self.south(),
            Color::Black => self.north(),
        }
    }

    #[inline(always)]
    pub const fn north(self) -> Self {
        Self(self.0 << 8)
    }

    #[inline(always)]
    pub const fn south(self) -> Self {
        Self(self.0 >> 8)
    }

    // Shifts towards a side file must mask off whatever wrapped around to the other side.

    #[inline(always)]
    pub const fn east(self) -> Self {
        Self((self.0 << 1) & Self::NOT_FILE_A.0)
    }

    #[inline(always)]
    pub const fn west(self) -> Self {
        Self((self.0 >> 1) & Self::NOT_FILE_H.0)
    }

    #[inline(always)]
    pub const fn northeast(self) -> Self {
        Self((self.0 << 9) & Self::NOT_FILE_A.0)
    }

    #[inline(always)]
    pub const fn northwest(self) -> Self {
        Self((self.0 << 7) & Self::NOT_FILE_H.0)
    }

    #[inline(always)]
    pub const fn southeast(self) -> Self {
        Self((self.0 >> 7) & Self::NOT_FILE_A.0)
    }

    #[inline(always)]
    pub const fn southwest(self) -> Self {
        Self((self.0 >> 9) & Self::NOT_FILE_H.0)
    }

    // `const` union, for use in table construction.

    #[inline(always)]
    pub const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

macro_rules! impl_bitwise_op {
    ($op:ident, $op_assign:ident, $func:ident, $func_assign:ident) => {
        impl<T> std::ops::$op<T> for Bitboard
        where
            Self: From<T>,
        {
            type Output = Self;
            #[inline(always)]
            fn $func(self, rhs: T) -> Self::Output {
                Self(self.0.$func(Self::from(rhs).0))
            }
        }

        impl<T> std::ops::$op_assign<T> for Bitboard
        where
            Self: From<T>,
        {
            #[inline(always)]
            fn $func_assign(&mut self, rhs: T) {
                self.0.$func_assign(Self::from(rhs).0);
            }
        }
    };
}

impl_bitwise_op!(BitAnd, BitAndAssign, bitand, bitand_assign);
impl_bitwise_op!(BitOr, BitOrAssign, bitor, bitor_assign);
impl_bitwise_op!(BitXor, BitXorAssign, bitxor, bitxor_assign);

impl Not for Bitboard {
    type Output = Self;
    #[inline(always)]
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl From<Square> for Bitboard {
    #[inline(always)]
    fn from(value: Square) -> Self {
        Self::from_square(value)
    }
}

impl From<Option<Square>> for Bitboard {
    #[inline(always)]
    fn from(value: Option<Square>) -> Self {
        value.map(Self::from_square).unwrap_or_default()
    }
}

impl From<u64> for Bitboard {
    #[inline(always)]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromIterator<Square> for Bitboard {
    fn from_iter<T: IntoIterator<Item = Square>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, |bb, sq| bb | sq)
    }
}

impl fmt::Display for Bitboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            for file in File::iter() {
                let c = if self.contains(Square::new(file, rank)) {
                    'X'
                } else {
                    '.'
                };
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Bitboard(0x{:016X})", self.0)?;
        for rank in Rank::iter().rev() {
            write!(f, "{rank}| ")?;
            for file in File::iter() {
                let c = if self.contains(Square::new(file, rank)) {
                    'X'
                } else {
                    '.'
                };
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        write!(f, " +----------------\n   a b c d e f g h")
    }
}

/// Yields the squares of a [`Bitboard`] from lowest to highest.
pub struct BitboardIter(Bitboard);

impl Iterator for BitboardIter {
    type Item = Square;
    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.pop_lsb()
    }

    #[inline(always)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.population() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for BitboardIter {}

impl IntoIterator for Bitboard {
    type Item = Square;
    type IntoIter = BitboardIter;
    #[inline(always)]
    fn into_iter(self) -> Self::IntoIter {
        BitboardIter(self)
    }
}

/// Yields every subset of a [`Bitboard`] with the Carry-Rippler trick.
///
/// See <https://www.chessprogramming.org/Traversing_Subsets_of_a_Set#All_Subsets_of_any_Set>
pub struct BitboardSubsetIter {
    set: Bitboard,
    subset: Bitboard,
    remaining: usize,
}

impl Iterator for BitboardSubsetIter {
    type Item = Bitboard;
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let current = self.subset;
        self.subset.0 = self.subset.0.wrapping_sub(self.set.0) & self.set.0;
        self.remaining -= 1;
        Some(current)
    }

    #[inline(always)]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for BitboardSubsetIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitboard_display() {
        let board = Bitboard::from_rank(Rank::TWO) | Bitboard::from_file(File::C);
        let expected = ". . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        . . X . . . . . \n\
                        X X X X X X X X \n\
                        . . X . . . . . \n";
        assert_eq!(board.to_string(), expected);
    }

    #[test]
    fn test_shifts_do_not_wrap() {
        assert_eq!(Bitboard::FILE_H.east(), Bitboard::EMPTY);
        assert_eq!(Bitboard::FILE_A.west(), Bitboard::EMPTY);
        assert_eq!(Bitboard::FILE_H.northeast(), Bitboard::EMPTY);
        assert_eq!(Bitboard::FILE_A.southwest(), Bitboard::EMPTY);
        assert_eq!(Bitboard::RANK_8.north(), Bitboard::EMPTY);
        assert_eq!(Bitboard::RANK_1.south(), Bitboard::EMPTY);

        assert_eq!(Square::E4.bitboard().northwest(), Square::D5.bitboard());
        assert_eq!(Square::E4.bitboard().southeast(), Square::F3.bitboard());
        assert_eq!(
            Square::E2.bitboard().forward(Color::Black),
            Square::E1.bitboard()
        );
    }

    #[test]
    fn test_population_and_iter() {
        let bb = Bitboard::RANK_1 | Square::H8;
        assert_eq!(bb.population(), 9);
        assert!(bb.has_many());
        assert!(!Square::A1.bitboard().has_many());

        let squares: Vec<Square> = bb.iter().collect();
        assert_eq!(squares.first(), Some(&Square::A1));
        assert_eq!(squares.last(), Some(&Square::H8));
        assert_eq!(squares.iter().copied().collect::<Bitboard>(), bb);
    }

    #[test]
    fn test_subsets_are_distinct() {
        let set = Bitboard::new(0b1011_0000_0001);
        let subsets: Vec<Bitboard> = set.subsets().collect();
        assert_eq!(subsets.len(), 16);
        for (i, a) in subsets.iter().enumerate() {
            assert_eq!(*a & !set, Bitboard::EMPTY);
            for b in &subsets[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
