/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use thiserror::Error;

use super::{PieceKind, Square};

/// Maximum number of legal moves in any reachable chess position.
///
/// See <https://www.chessprogramming.org/Chess_Position#cite_note-4>
pub const MAX_NUM_MOVES: usize = 218;

/// A fixed-capacity, stack-allocated buffer of moves.
pub type MoveList = arrayvec::ArrayVec<Move, MAX_NUM_MOVES>;

/// Reasons a move string could not be understood.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveParseError {
    #[error("move strings must be 4 or 5 characters long, got {0:?}")]
    InvalidLength(String),

    #[error("invalid square {0:?} in move string")]
    InvalidSquare(String),

    #[error("invalid promotion {0:?} in move string")]
    InvalidPromotion(char),
}

/// What a [`Move`] does besides moving a piece from one square to another.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(u8)]
pub enum MoveKind {
    Quiet = 0,
    PawnDoublePush = 1,
    ShortCastle = 2,
    LongCastle = 3,
    Capture = 4,
    EnPassantCapture = 5,
    PromoteKnight = 8,
    PromoteBishop = 9,
    PromoteRook = 10,
    PromoteQueen = 11,
    CaptureAndPromoteKnight = 12,
    CaptureAndPromoteBishop = 13,
    CaptureAndPromoteRook = 14,
    CaptureAndPromoteQueen = 15,
}

impl MoveKind {
    const CAPTURE_BIT: u8 = 0b0100;
    const PROMOTION_BIT: u8 = 0b1000;

    /// The promotion flag for `promotion`, with or without a capture.
    ///
    /// `promotion` must be a knight, bishop, rook, or queen.
    #[inline(always)]
    pub const fn promotion(promotion: PieceKind, capture: bool) -> Self {
        match (promotion, capture) {
            (PieceKind::Knight, false) => Self::PromoteKnight,
            (PieceKind::Bishop, false) => Self::PromoteBishop,
            (PieceKind::Rook, false) => Self::PromoteRook,
            (PieceKind::Knight, true) => Self::CaptureAndPromoteKnight,
            (PieceKind::Bishop, true) => Self::CaptureAndPromoteBishop,
            (PieceKind::Rook, true) => Self::CaptureAndPromoteRook,
            (_, false) => Self::PromoteQueen,
            (_, true) => Self::CaptureAndPromoteQueen,
        }
    }

    #[inline(always)]
    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::PawnDoublePush,
            2 => Self::ShortCastle,
            3 => Self::LongCastle,
            4 => Self::Capture,
            5 => Self::EnPassantCapture,
            8 => Self::PromoteKnight,
            9 => Self::PromoteBishop,
            10 => Self::PromoteRook,
            11 => Self::PromoteQueen,
            12 => Self::CaptureAndPromoteKnight,
            13 => Self::CaptureAndPromoteBishop,
            14 => Self::CaptureAndPromoteRook,
            15 => Self::CaptureAndPromoteQueen,
            _ => Self::Quiet,
        }
    }
}

/// A move, packed into 16 bits.
///
/// ```text
///     0000 000000 000000
///      |     |      |
///      |     |      +- Source square
///      |     +- Destination square
///      +- MoveKind flag
/// ```
///
/// Castling is encoded as the king's own two-square move, such as `e1g1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    const SRC_MASK: u16 = 0b0000_0000_0011_1111;
    const DST_MASK: u16 = 0b0000_1111_1100_0000;
    const DST_BITS: u16 = 6;
    const FLG_BITS: u16 = 12;

    /// # Example
    /// ```
    /// # use gambit::{Move, MoveKind, Square};
    /// let mv = Move::new(Square::E2, Square::E4, MoveKind::PawnDoublePush);
    /// assert_eq!(mv.from(), Square::E2);
    /// assert_eq!(mv.to(), Square::E4);
    /// assert_eq!(mv.to_string(), "e2e4");
    /// ```
    #[inline(always)]
    pub const fn new(from: Square, to: Square, kind: MoveKind) -> Self {
        Self((kind as u16) << Self::FLG_BITS | (to.0 as u16) << Self::DST_BITS | from.0 as u16)
    }

    /// The raw 16 bits of this move.
    #[inline(always)]
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Rebuilds a move from [`Move::bits`]. Zero bits (`a1a1`) means "no move".
    #[inline(always)]
    pub const fn from_bits(bits: u16) -> Option<Self> {
        if bits == 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    #[inline(always)]
    pub const fn from(&self) -> Square {
        Square((self.0 & Self::SRC_MASK) as u8)
    }

    #[inline(always)]
    pub const fn to(&self) -> Square {
        Square(((self.0 & Self::DST_MASK) >> Self::DST_BITS) as u8)
    }

    #[inline(always)]
    const fn flag(&self) -> u8 {
        (self.0 >> Self::FLG_BITS) as u8
    }

    #[inline(always)]
    pub const fn kind(&self) -> MoveKind {
        MoveKind::from_bits(self.flag())
    }

    #[inline(always)]
    pub const fn is_capture(&self) -> bool {
        self.flag() & MoveKind::CAPTURE_BIT != 0
    }

    #[inline(always)]
    pub const fn is_en_passant(&self) -> bool {
        self.flag() == MoveKind::EnPassantCapture as u8
    }

    #[inline(always)]
    pub const fn is_castle(&self) -> bool {
        matches!(self.kind(), MoveKind::ShortCastle | MoveKind::LongCastle)
    }

    #[inline(always)]
    pub const fn is_pawn_double_push(&self) -> bool {
        self.flag() == MoveKind::PawnDoublePush as u8
    }

    #[inline(always)]
    pub const fn is_promotion(&self) -> bool {
        self.flag() & MoveKind::PROMOTION_BIT != 0
    }

    /// Captures and promotions: the moves a quiescence search looks at.
    #[inline(always)]
    pub const fn is_forcing(&self) -> bool {
        self.flag() & (MoveKind::CAPTURE_BIT | MoveKind::PROMOTION_BIT) != 0
    }

    #[inline(always)]
    pub const fn promotion(&self) -> Option<PieceKind> {
        if !self.is_promotion() {
            return None;
        }

        Some(match self.flag() & 0b11 {
            0 => PieceKind::Knight,
            1 => PieceKind::Bishop,
            2 => PieceKind::Rook,
            _ => PieceKind::Queen,
        })
    }

    /// Splits a coordinate move string such as `e2e4` or `e7e8q` into its parts.
    ///
    /// `k` is accepted as an alias for a knight promotion.
    ///
    /// # Example
    /// ```
    /// # use gambit::{Move, PieceKind, Square};
    /// let (from, to, promo) = Move::parse_uci("b7b8k").unwrap();
    /// assert_eq!((from, to, promo), (Square::B7, Square::B8, Some(PieceKind::Knight)));
    /// assert!(Move::parse_uci("e2").is_err());
    /// ```
    pub fn parse_uci(
        uci: &str,
    ) -> Result<(Square, Square, Option<PieceKind>), MoveParseError> {
        if !uci.is_ascii() || !(4..=5).contains(&uci.len()) {
            return Err(MoveParseError::InvalidLength(uci.to_string()));
        }

        let square = |s: &str| {
            Square::from_uci(s).map_err(|_| MoveParseError::InvalidSquare(s.to_string()))
        };
        let from = square(&uci[0..2])?;
        let to = square(&uci[2..4])?;

        let promotion = match uci[4..].chars().next() {
            None => None,
            Some(c) => Some(match c.to_ascii_lowercase() {
                'q' => PieceKind::Queen,
                'r' => PieceKind::Rook,
                'b' => PieceKind::Bishop,
                'n' | 'k' => PieceKind::Knight,
                _ => return Err(MoveParseError::InvalidPromotion(c)),
            }),
        };

        Ok((from, to, promotion))
    }

    /// Formats this move in coordinate notation, e.g. `e7e8q`.
    pub fn to_uci(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from(), self.to())?;
        if let Some(promotion) = self.promotion() {
            write!(f, "{promotion}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} ({:?})", self.kind())
    }
}
