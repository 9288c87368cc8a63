/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, queen_attacks, ray_containing,
    rook_attacks, Bitboard, CastleSide, Move, MoveKind, MoveList, MoveParseError, PieceKind,
    Position, Rank, Square,
};

/// Which subset of the legal moves to generate.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub enum GenType {
    /// Every legal move.
    #[default]
    All,
    /// Captures (en passant included) and promotions only.
    Forced,
}

impl Position {
    /// Generate all legal moves from the current position.
    ///
    /// # Example
    /// ```
    /// # use gambit::Position;
    /// let pos = Position::default();
    /// assert_eq!(pos.legal_moves().len(), 20);
    /// ```
    #[inline(always)]
    pub fn legal_moves(&self) -> MoveList {
        self.generate(GenType::All)
    }

    /// Generate the legal captures and promotions from the current position.
    #[inline(always)]
    pub fn forced_moves(&self) -> MoveList {
        self.generate(GenType::Forced)
    }

    /// Generate the legal moves of kind `gen` from the current position.
    ///
    /// The order of the moves is fixed for a given position and [`GenType`].
    pub fn generate(&self, gen: GenType) -> MoveList {
        let mut moves = MoveList::default();
        match self.checkers().population() {
            0 => self.generate_all_moves::<false>(gen, &mut moves),
            1 => self.generate_all_moves::<true>(gen, &mut moves),
            // If we're in double check, we can only move the King
            _ => self.generate_king_moves::<true>(gen, &mut moves),
        }
        moves
    }

    /// Looks up the legal move described by a coordinate string such as `e2e4` or `e7e8q`.
    ///
    /// Returns `Ok(None)` if the string is well-formed but no legal move matches it.
    ///
    /// # Example
    /// ```
    /// # use gambit::Position;
    /// let pos = Position::default();
    /// assert!(pos.find_move("e2e4").unwrap().is_some());
    /// assert!(pos.find_move("e2e5").unwrap().is_none());
    /// assert!(pos.find_move("e2").is_err());
    /// ```
    pub fn find_move(&self, uci: &str) -> Result<Option<Move>, MoveParseError> {
        let (from, to, promotion) = Move::parse_uci(uci)?;
        Ok(self
            .legal_moves()
            .into_iter()
            .find(|mv| mv.from() == from && mv.to() == to && mv.promotion() == promotion))
    }

    fn generate_all_moves<const IN_CHECK: bool>(&self, gen: GenType, moves: &mut MoveList) {
        self.generate_pawn_moves::<IN_CHECK>(gen, moves);
        self.generate_piece_moves(gen, moves);
        self.generate_king_moves::<IN_CHECK>(gen, moves);
    }

    /// The squares a piece on `square` may move to without exposing its king.
    #[inline(always)]
    fn pin_ray(&self, square: Square) -> Bitboard {
        if self.pinned().contains(square) {
            ray_containing(square, self.king_square())
        } else {
            Bitboard::FULL
        }
    }

    /// Squares that non-King pieces may land on for this kind of generation.
    #[inline(always)]
    fn target_squares(&self, gen: GenType) -> Bitboard {
        let us = self.side_to_move();
        let targets = match gen {
            GenType::All => !self.color(us),
            GenType::Forced => self.color(us.opponent()),
        };
        targets & self.check_evasion_mask()
    }

    /// Creates and appends a [`Move`] that is either a quiet or capture.
    #[inline(always)]
    fn serialize_normal_move(&self, from: Square, to: Square, moves: &mut MoveList) {
        let kind = if self.piece_at(to).is_some() {
            MoveKind::Capture
        } else {
            MoveKind::Quiet
        };
        moves.push(Move::new(from, to, kind));
    }

    #[inline(always)]
    fn serialize_promotions(from: Square, to: Square, capture: bool, moves: &mut MoveList) {
        for promotion in PieceKind::promotions() {
            moves.push(Move::new(from, to, MoveKind::promotion(promotion, capture)));
        }
    }

    /// Generates and serializes all legal Pawn moves.
    fn generate_pawn_moves<const IN_CHECK: bool>(&self, gen: GenType, moves: &mut MoveList) {
        let us = self.side_to_move();
        let enemies = self.color(us.opponent());
        let empty = !self.occupied();
        let last_rank = Bitboard::from_rank(Rank::eighth(us));

        for from in self.pieces(us, PieceKind::Pawn) {
            let legal = self.check_evasion_mask() & self.pin_ray(from);

            let single = from.bitboard().forward(us) & empty;
            let double = if from.rank() == Rank::second(us) {
                single.forward(us) & empty
            } else {
                Bitboard::EMPTY
            };

            let mut pushes = (single | double) & legal;
            // Quiet pushes are only forcing when they promote
            if gen == GenType::Forced {
                pushes &= last_rank;
            }

            for to in pushes {
                if last_rank.contains(to) {
                    Self::serialize_promotions(from, to, false, moves);
                } else if double.contains(to) {
                    moves.push(Move::new(from, to, MoveKind::PawnDoublePush));
                } else {
                    moves.push(Move::new(from, to, MoveKind::Quiet));
                }
            }

            for to in pawn_attacks(from, us) & enemies & legal {
                if last_rank.contains(to) {
                    Self::serialize_promotions(from, to, true, moves);
                } else {
                    moves.push(Move::new(from, to, MoveKind::Capture));
                }
            }

            if let Some(ep_square) = self.ep_square() {
                if self.is_legal_en_passant::<IN_CHECK>(from, ep_square) {
                    moves.push(Move::new(from, ep_square, MoveKind::EnPassantCapture));
                }
            }
        }
    }

    /// Whether the Pawn on `from` may capture en passant onto `ep_square`.
    #[inline(always)]
    fn is_legal_en_passant<const IN_CHECK: bool>(&self, from: Square, ep_square: Square) -> bool {
        let us = self.side_to_move();
        let them = us.opponent();

        if !pawn_attacks(from, us).contains(ep_square) {
            return false;
        }

        let Some(victim) = ep_square.backward_by(us, 1) else {
            return false;
        };

        // When in check, EP must capture the checker or block the check
        if IN_CHECK
            && !self.check_evasion_mask().contains(victim)
            && !self.check_evasion_mask().contains(ep_square)
        {
            return false;
        }

        // Two pawns leave the board at once, so recompute slider attacks on the king as if EP was performed.
        // This covers both pinned pawns and pawns that shield the king along a rank.
        let blockers_after_ep = (self.occupied() ^ from ^ victim) | ep_square;
        let king = self.king_square();

        !rook_attacks(king, blockers_after_ep).intersects(self.orthogonal_sliders(them))
            && !bishop_attacks(king, blockers_after_ep).intersects(self.diagonal_sliders(them))
    }

    /// Generates and serializes all legal Knight, Bishop, Rook, and Queen moves.
    fn generate_piece_moves(&self, gen: GenType, moves: &mut MoveList) {
        let us = self.side_to_move();
        let blockers = self.occupied();
        let targets = self.target_squares(gen);

        for kind in [
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Rook,
            PieceKind::Queen,
        ] {
            for from in self.pieces(us, kind) {
                let attacks = match kind {
                    PieceKind::Knight => knight_attacks(from),
                    PieceKind::Bishop => bishop_attacks(from, blockers),
                    PieceKind::Rook => rook_attacks(from, blockers),
                    _ => queen_attacks(from, blockers),
                };

                for to in attacks & targets & self.pin_ray(from) {
                    self.serialize_normal_move(from, to, moves);
                }
            }
        }
    }

    /// Generates and serializes all legal King moves, followed by castling.
    fn generate_king_moves<const IN_CHECK: bool>(&self, gen: GenType, moves: &mut MoveList) {
        let us = self.side_to_move();
        let from = self.king_square();

        // Enemy attacks were computed without our King on the board, so retreating along a checking ray is excluded
        let safe = !self.attacked_by_opponent();
        let targets = match gen {
            GenType::All => !self.color(us),
            GenType::Forced => self.color(us.opponent()),
        };

        for to in king_attacks(from) & targets & safe {
            self.serialize_normal_move(from, to, moves);
        }

        if IN_CHECK || gen == GenType::Forced {
            return;
        }

        for (side, kind, destination) in [
            (CastleSide::Short, MoveKind::ShortCastle, Square::G1),
            (CastleSide::Long, MoveKind::LongCastle, Square::C1),
        ] {
            if self.can_castle(side) {
                moves.push(Move::new(from, destination.rank_relative_to(us), kind));
            }
        }
    }
}
