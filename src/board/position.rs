/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, Result};

use super::{
    bishop_attacks, bishop_rays, king_attacks, knight_attacks, pawn_attacks, ray_between,
    rook_attacks, rook_rays, Bitboard, Color, File, Move, MoveKind, Piece, PieceKind, Rank,
    Square, ZobristKey,
};

/// FEN string for the standard starting position.
pub const FEN_STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// FEN string for the "Kiwipete" perft position.
///
/// <https://www.chessprogramming.org/Perft_Results#Position_2>
pub const FEN_KIWIPETE: &str =
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

/// Number of reversible half-moves after which the game is drawn.
pub const FIFTY_MOVE_LIMIT: u16 = 100;

/// Castling rights removed when a move starts or ends on each square.
const CASTLING_SPOILERS: [CastlingRights; Square::COUNT] = {
    let mut spoilers = [CastlingRights::NONE; Square::COUNT];
    spoilers[Square::A1.index()] = CastlingRights::WHITE_LONG;
    spoilers[Square::H1.index()] = CastlingRights::WHITE_SHORT;
    spoilers[Square::E1.index()] =
        CastlingRights(CastlingRights::WHITE_SHORT.0 | CastlingRights::WHITE_LONG.0);
    spoilers[Square::A8.index()] = CastlingRights::BLACK_LONG;
    spoilers[Square::H8.index()] = CastlingRights::BLACK_SHORT;
    spoilers[Square::E8.index()] =
        CastlingRights(CastlingRights::BLACK_SHORT.0 | CastlingRights::BLACK_LONG.0);
    spoilers
};

/// Which side of the board a castling move goes to.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum CastleSide {
    /// Towards the h-file ("kingside").
    Short,
    /// Towards the a-file ("queenside").
    Long,
}

impl CastleSide {
    /// Squares the king starts on, passes over, and lands on, and the rook's start and end squares.
    #[inline(always)]
    const fn squares(&self, color: Color) -> CastleSquares {
        let (king_to, rook_from, rook_to) = match self {
            Self::Short => (Square::G1, Square::H1, Square::F1),
            Self::Long => (Square::C1, Square::A1, Square::D1),
        };

        CastleSquares {
            king_from: Square::E1.rank_relative_to(color),
            king_to: king_to.rank_relative_to(color),
            rook_from: rook_from.rank_relative_to(color),
            rook_to: rook_to.rank_relative_to(color),
        }
    }

    /// Where `color`'s rook starts and lands when castling to this side.
    #[inline(always)]
    pub const fn rook_squares(&self, color: Color) -> (Square, Square) {
        let squares = self.squares(color);
        (squares.rook_from, squares.rook_to)
    }

    /// The castling side a move encodes, if it is a castling move.
    #[inline(always)]
    pub const fn of(mv: Move) -> Option<Self> {
        match mv.kind() {
            MoveKind::ShortCastle => Some(Self::Short),
            MoveKind::LongCastle => Some(Self::Long),
            _ => None,
        }
    }
}

struct CastleSquares {
    king_from: Square,
    king_to: Square,
    rook_from: Square,
    rook_to: Square,
}

/// Castling availability for both sides, as a 4-bit mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const COUNT: usize = 16;

    pub const NONE: Self = Self(0);
    pub const WHITE_SHORT: Self = Self(0b0001);
    pub const WHITE_LONG: Self = Self(0b0010);
    pub const BLACK_SHORT: Self = Self(0b0100);
    pub const BLACK_LONG: Self = Self(0b1000);
    pub const ALL: Self = Self(0b1111);

    #[inline(always)]
    pub const fn bit(color: Color, side: CastleSide) -> Self {
        match (color, side) {
            (Color::White, CastleSide::Short) => Self::WHITE_SHORT,
            (Color::White, CastleSide::Long) => Self::WHITE_LONG,
            (Color::Black, CastleSide::Short) => Self::BLACK_SHORT,
            (Color::Black, CastleSide::Long) => Self::BLACK_LONG,
        }
    }

    #[inline(always)]
    pub const fn has(&self, color: Color, side: CastleSide) -> bool {
        self.0 & Self::bit(color, side).0 != 0
    }

    #[inline(always)]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Parses the castling field of a FEN string (`KQkq`, any subset, or `-`).
    pub fn from_fen(castling: &str) -> Result<Self> {
        let mut rights = Self::NONE;
        for c in castling.chars() {
            rights.0 |= match c {
                'K' => Self::WHITE_SHORT.0,
                'Q' => Self::WHITE_LONG.0,
                'k' => Self::BLACK_SHORT.0,
                'q' => Self::BLACK_LONG.0,
                '-' => 0,
                _ => bail!("Castling rights must be some of \"KQkq\" or \"-\". Got {c:?}"),
            };
        }
        Ok(rights)
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "-");
        }
        for (bit, c) in [
            (Self::WHITE_SHORT, 'K'),
            (Self::WHITE_LONG, 'Q'),
            (Self::BLACK_SHORT, 'k'),
            (Self::BLACK_LONG, 'q'),
        ] {
            if self.0 & bit.0 != 0 {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CastlingRights({self})")
    }
}

/// Everything about a position that cannot be recovered by reversing a move.
///
/// One record is pushed per ply played; the last record on the stack describes the current position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StateRecord {
    /// The move that led to this state. `None` for the root.
    pub mv: Option<Move>,
    /// The piece captured by `mv`, if any.
    pub captured: Option<Piece>,
    pub castling: CastlingRights,
    pub ep_square: Option<Square>,
    /// Half-moves since the last capture or pawn move.
    pub halfmove: u16,
    /// Starts at 1 and increments after each move by Black.
    pub fullmove: u16,
    pub key: ZobristKey,
}

/// A chess position, mutated in place through [`Position::do_move`] and [`Position::undo_move`].
///
/// Alongside the board, a [`Position`] caches which pieces give check, which are pinned, and which
/// squares the opponent attacks. These are recomputed after every change and drive legal move
/// generation.
#[derive(Clone)]
pub struct Position {
    pieces: [[Bitboard; PieceKind::COUNT]; Color::COUNT],
    occupied: [Bitboard; Color::COUNT],
    mailbox: [Option<Piece>; Square::COUNT],
    side_to_move: Color,
    states: Vec<StateRecord>,

    king_square: Square,
    checkers: Bitboard,
    pinned: Bitboard,
    attacked_by_opponent: Bitboard,
    check_evasion_mask: Bitboard,
}

impl Position {
    /// Builds a position from a list of placed pieces and the remaining position state.
    ///
    /// Each side must have exactly one king.
    pub fn from_parts(
        placements: impl IntoIterator<Item = (Piece, Square)>,
        side_to_move: Color,
        castling: CastlingRights,
        ep_square: Option<Square>,
        halfmove: u16,
        fullmove: u16,
    ) -> Result<Self> {
        let mut pos = Self {
            pieces: [[Bitboard::EMPTY; PieceKind::COUNT]; Color::COUNT],
            occupied: [Bitboard::EMPTY; Color::COUNT],
            mailbox: [None; Square::COUNT],
            side_to_move,
            states: Vec::with_capacity(256),
            king_square: Square::default(),
            checkers: Bitboard::EMPTY,
            pinned: Bitboard::EMPTY,
            attacked_by_opponent: Bitboard::EMPTY,
            check_evasion_mask: Bitboard::FULL,
        };

        for (piece, square) in placements {
            if pos.mailbox[square].is_some() {
                bail!("Two pieces placed on {square}");
            }
            pos.put_piece(piece, square);
        }

        for color in Color::all() {
            let kings = pos.pieces[color][PieceKind::King].population();
            if kings != 1 {
                bail!("{} must have exactly one king. Found {kings}", color.name());
            }
        }

        if (pos.pieces[Color::White][PieceKind::Pawn] | pos.pieces[Color::Black][PieceKind::Pawn])
            .intersects(Bitboard::EDGE_RANKS)
        {
            bail!("Pawns cannot stand on the first or last rank");
        }

        if let Some(ep) = ep_square {
            // The pawn that just moved two squares, and the two squares it crossed
            let victim = ep.backward_by(side_to_move, 1);
            let start = ep.forward_by(side_to_move, 1);
            let pawn = Piece::new(side_to_move.opponent(), PieceKind::Pawn);
            if victim.and_then(|sq| pos.mailbox[sq]) != Some(pawn)
                || pos.mailbox[ep].is_some()
                || start.and_then(|sq| pos.mailbox[sq]).is_some()
            {
                bail!("En passant square {ep} does not follow a double pawn push");
            }
        }

        let opponent_king = pos.pieces[side_to_move.opponent()][PieceKind::King].to_square_unchecked();
        if pos.attackers_to(opponent_king, pos.occupied()).intersects(pos.occupied[side_to_move]) {
            bail!("The side not to move is in check");
        }

        let mut state = StateRecord {
            mv: None,
            captured: None,
            castling,
            ep_square,
            halfmove,
            fullmove: fullmove.max(1),
            key: ZobristKey::default(),
        };
        state.key = pos.compute_key(&state);
        pos.states.push(state);
        pos.refresh();

        Ok(pos)
    }

    /// Parses a position from a FEN string.
    ///
    /// The castling, en passant, and clock fields may be omitted; they default to `-`, `-`, `0` and `1`.
    ///
    /// # Example
    /// ```
    /// # use gambit::{Position, FEN_STARTPOS};
    /// let pos = Position::from_fen(FEN_STARTPOS).unwrap();
    /// assert_eq!(pos.to_fen(), FEN_STARTPOS);
    /// ```
    pub fn from_fen(fen: &str) -> Result<Self> {
        let mut fields = fen.split_whitespace();

        let placements = fields
            .next()
            .ok_or(anyhow!("FEN string must contain piece placements"))?;

        let ranks = placements.split('/').collect::<Vec<_>>();
        if ranks.len() != Rank::COUNT {
            bail!("FEN must describe all 8 ranks. Got {}", ranks.len());
        }

        let mut pieces = Vec::with_capacity(32);
        for (rank, row) in Rank::iter().rev().zip(ranks) {
            let mut file = 0u8;
            for c in row.chars() {
                if let Some(skip) = c.to_digit(10) {
                    // At most 8 + 9, so this never wraps
                    file += skip as u8;
                    if file as usize > File::COUNT {
                        bail!("Too many squares on rank {rank} of FEN {fen:?}");
                    }
                } else {
                    let piece = Piece::from_uci(c)?;
                    if file as usize >= File::COUNT {
                        bail!("Too many squares on rank {rank} of FEN {fen:?}");
                    }
                    pieces.push((piece, Square::new(File(file), rank)));
                    file += 1;
                }
            }
            if file as usize != File::COUNT {
                bail!("Rank {rank} of FEN {fen:?} does not describe 8 squares");
            }
        }

        let side_to_move = match fields.next() {
            Some(color) if color.len() == 1 => Color::from_uci(color.chars().next().unwrap_or('w'))?,
            Some(color) => bail!("Invalid side to move {color:?}"),
            None => Color::White,
        };

        let castling = CastlingRights::from_fen(fields.next().unwrap_or("-"))?;

        let ep_square = match fields.next().unwrap_or("-") {
            "-" => None,
            square => {
                let square = Square::from_uci(square)?;
                let expected = Rank::first(side_to_move.opponent()).offset(2 * side_to_move.opponent().direction());
                if Some(square.rank()) != expected {
                    bail!("En passant square {square} is impossible with {} to move", side_to_move.name());
                }
                Some(square)
            }
        };

        let halfmove = match fields.next() {
            Some(n) => n
                .parse()
                .map_err(|_| anyhow!("Invalid halfmove clock {n:?}"))?,
            None => 0,
        };
        let fullmove = match fields.next() {
            Some(n) => n
                .parse()
                .map_err(|_| anyhow!("Invalid fullmove number {n:?}"))?,
            None => 1,
        };

        Self::from_parts(pieces, side_to_move, castling, ep_square, halfmove, fullmove)
    }

    /// Serializes this position to a FEN string.
    pub fn to_fen(&self) -> String {
        let mut placements = String::with_capacity(64);
        for rank in Rank::iter().rev() {
            let mut empty = 0;
            for file in File::iter() {
                match self.piece_at(Square::new(file, rank)) {
                    Some(piece) => {
                        if empty > 0 {
                            placements.push(char::from(b'0' + empty));
                            empty = 0;
                        }
                        placements.push(piece.to_uci());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                placements.push(char::from(b'0' + empty));
            }
            if rank != Rank::ONE {
                placements.push('/');
            }
        }

        let state = self.state();
        let ep = state
            .ep_square
            .map(|sq| sq.to_string())
            .unwrap_or_else(|| String::from("-"));

        format!(
            "{placements} {} {} {ep} {} {}",
            self.side_to_move, state.castling, state.halfmove, state.fullmove
        )
    }

    #[inline(always)]
    pub fn state(&self) -> &StateRecord {
        // The root record is pushed on construction and never popped
        &self.states[self.states.len() - 1]
    }

    /// Number of plies played since this position was created.
    #[inline(always)]
    pub fn ply(&self) -> usize {
        self.states.len() - 1
    }

    #[inline(always)]
    pub const fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline(always)]
    pub fn key(&self) -> ZobristKey {
        self.state().key
    }

    #[inline(always)]
    pub fn castling_rights(&self) -> CastlingRights {
        self.state().castling
    }

    #[inline(always)]
    pub fn ep_square(&self) -> Option<Square> {
        self.state().ep_square
    }

    #[inline(always)]
    pub fn halfmove(&self) -> u16 {
        self.state().halfmove
    }

    #[inline(always)]
    pub fn fullmove(&self) -> u16 {
        self.state().fullmove
    }

    /// The move that led to this position, if it was reached with [`Position::do_move`].
    #[inline(always)]
    pub fn last_move(&self) -> Option<Move> {
        self.state().mv
    }

    #[inline(always)]
    pub const fn piece_at(&self, square: Square) -> Option<Piece> {
        self.mailbox[square.index()]
    }

    #[inline(always)]
    pub const fn pieces(&self, color: Color, kind: PieceKind) -> Bitboard {
        self.pieces[color.index()][kind.index()]
    }

    #[inline(always)]
    pub fn kind(&self, kind: PieceKind) -> Bitboard {
        self.pieces[Color::White][kind] | self.pieces[Color::Black][kind]
    }

    #[inline(always)]
    pub const fn color(&self, color: Color) -> Bitboard {
        self.occupied[color.index()]
    }

    #[inline(always)]
    pub const fn occupied(&self) -> Bitboard {
        self.occupied[0].or(self.occupied[1])
    }

    #[inline(always)]
    pub fn king(&self, color: Color) -> Square {
        self.pieces[color][PieceKind::King].to_square_unchecked()
    }

    #[inline(always)]
    pub fn orthogonal_sliders(&self, color: Color) -> Bitboard {
        self.pieces[color][PieceKind::Rook] | self.pieces[color][PieceKind::Queen]
    }

    #[inline(always)]
    pub fn diagonal_sliders(&self, color: Color) -> Bitboard {
        self.pieces[color][PieceKind::Bishop] | self.pieces[color][PieceKind::Queen]
    }

    /// King square of the side to move.
    #[inline(always)]
    pub const fn king_square(&self) -> Square {
        self.king_square
    }

    /// Opponent pieces giving check to the side to move.
    #[inline(always)]
    pub const fn checkers(&self) -> Bitboard {
        self.checkers
    }

    /// Pieces of the side to move that are pinned to their king.
    #[inline(always)]
    pub const fn pinned(&self) -> Bitboard {
        self.pinned
    }

    /// Every square the opponent attacks, computed as if the side to move's king were not on the board.
    #[inline(always)]
    pub const fn attacked_by_opponent(&self) -> Bitboard {
        self.attacked_by_opponent
    }

    /// Squares a non-king piece may move to: the checker and the squares between it and the king when in
    /// single check, every square otherwise.
    #[inline(always)]
    pub const fn check_evasion_mask(&self) -> Bitboard {
        self.check_evasion_mask
    }

    #[inline(always)]
    pub const fn is_in_check(&self) -> bool {
        self.checkers.is_nonempty()
    }

    #[inline(always)]
    pub const fn is_in_double_check(&self) -> bool {
        self.checkers.has_many()
    }

    /// All pieces of either color attacking `square`, given `occupied` as blockers.
    pub fn attackers_to(&self, square: Square, occupied: Bitboard) -> Bitboard {
        let [white, black] = self.pieces;
        (pawn_attacks(square, Color::Black) & white[PieceKind::Pawn])
            | (pawn_attacks(square, Color::White) & black[PieceKind::Pawn])
            | (knight_attacks(square) & self.kind(PieceKind::Knight))
            | (king_attacks(square) & self.kind(PieceKind::King))
            | (rook_attacks(square, occupied)
                & (self.orthogonal_sliders(Color::White) | self.orthogonal_sliders(Color::Black)))
            | (bishop_attacks(square, occupied)
                & (self.diagonal_sliders(Color::White) | self.diagonal_sliders(Color::Black)))
    }

    /// Every square attacked by `color`'s pieces, given `occupied` as blockers.
    pub fn attacks_by(&self, color: Color, occupied: Bitboard) -> Bitboard {
        let pawns = self.pieces[color][PieceKind::Pawn].forward(color);
        let mut attacks = pawns.east() | pawns.west();

        for square in self.pieces[color][PieceKind::Knight] {
            attacks |= knight_attacks(square);
        }
        for square in self.diagonal_sliders(color) {
            attacks |= bishop_attacks(square, occupied);
        }
        for square in self.orthogonal_sliders(color) {
            attacks |= rook_attacks(square, occupied);
        }
        attacks | king_attacks(self.king(color))
    }

    /// Whether the side to move may castle to `side` right now.
    ///
    /// Requires the castling right, empty squares between king and rook, and no attacked square on the
    /// king's path (including its start and destination).
    pub fn can_castle(&self, side: CastleSide) -> bool {
        let color = self.side_to_move;
        if !self.castling_rights().has(color, side) {
            return false;
        }

        let squares = side.squares(color);
        if self.king_square != squares.king_from
            || !self.pieces[color][PieceKind::Rook].contains(squares.rook_from)
        {
            return false;
        }

        let must_be_empty = ray_between(squares.king_from, squares.rook_from);
        let must_be_safe = ray_between(squares.king_from, squares.king_to)
            | squares.king_from
            | squares.king_to;

        !self.occupied().intersects(must_be_empty)
            && !self.attacked_by_opponent.intersects(must_be_safe)
    }

    /// Whether the position is drawn by the fifty-move rule, insufficient material, or repetition.
    ///
    /// `history` holds the keys of the positions played before this [`Position`] was created, oldest
    /// first. Repetitions are looked for both in that history and in the moves played since.
    pub fn is_draw(&self, history: &[ZobristKey]) -> bool {
        self.halfmove() >= FIFTY_MOVE_LIMIT
            || self.is_insufficient_material()
            || self.is_repetition(history)
    }

    /// Bare kings, or a king and a single minor piece against a bare king.
    pub fn is_insufficient_material(&self) -> bool {
        let heavy_or_pawns = self.kind(PieceKind::Pawn)
            | self.kind(PieceKind::Rook)
            | self.kind(PieceKind::Queen);
        let minors = self.kind(PieceKind::Knight) | self.kind(PieceKind::Bishop);

        heavy_or_pawns.is_empty() && minors.population() <= 1
    }

    /// Whether the current position occurred before, within the current run of reversible moves.
    pub fn is_repetition(&self, history: &[ZobristKey]) -> bool {
        let key = self.key();
        let window = self.halfmove() as usize;

        history
            .iter()
            .copied()
            .chain(self.states.iter().map(|state| state.key))
            .rev()
            .take(window + 1)
            .skip(2)
            .step_by(2)
            .any(|prev| prev == key)
    }

    /// Applies `mv`, which must be legal in this position.
    ///
    /// Pushes a new [`StateRecord`] so that [`Position::undo_move`] can restore the current state exactly.
    pub fn do_move(&mut self, mv: Move) {
        let us = self.side_to_move;
        let them = us.opponent();
        let (from, to) = (mv.from(), mv.to());

        let prev = *self.state();
        let mut next = StateRecord {
            mv: Some(mv),
            captured: None,
            castling: prev.castling,
            ep_square: None,
            halfmove: prev.halfmove.saturating_add(1),
            fullmove: prev.fullmove,
            key: prev.key,
        };

        let Some(piece) = self.piece_at(from) else {
            debug_assert!(false, "do_move({mv}) with no piece on {from} in {}", self.to_fen());
            return;
        };
        debug_assert_eq!(piece.color(), us, "do_move({mv}) moves an opponent piece");

        let key = &mut next.key;
        key.hash_side_to_move();
        key.hash_ep_square(prev.ep_square);
        key.hash_castling_rights(prev.castling);

        // Captures
        let victim_square = if mv.is_en_passant() {
            to.backward_by(us, 1)
        } else if mv.is_capture() {
            Some(to)
        } else {
            None
        };
        if let Some(square) = victim_square {
            if let Some(victim) = self.remove_piece(square) {
                debug_assert_ne!(victim.kind(), PieceKind::King, "do_move({mv}) captures a king");
                key.hash_piece(square, victim);
                next.captured = Some(victim);
                next.halfmove = 0;
            }
        }

        // Move (and possibly promote) the piece
        self.remove_piece(from);
        key.hash_piece(from, piece);
        let placed = match mv.promotion() {
            Some(promotion) => Piece::new(us, promotion),
            None => piece,
        };
        self.put_piece(placed, to);
        key.hash_piece(to, placed);

        if piece.kind() == PieceKind::Pawn {
            next.halfmove = 0;

            if mv.is_pawn_double_push() {
                let ep = from.forward_by(us, 1);
                // Only record en passant when it could actually be played
                let enemy_pawns = self.pieces[them][PieceKind::Pawn];
                if let Some(ep) = ep.filter(|&ep| pawn_attacks(ep, us).intersects(enemy_pawns)) {
                    next.ep_square = Some(ep);
                    key.hash_ep_square(Some(ep));
                }
            }
        }

        if let Some(side) = CastleSide::of(mv) {
            let squares = side.squares(us);
            let rook = Piece::new(us, PieceKind::Rook);
            self.remove_piece(squares.rook_from);
            self.put_piece(rook, squares.rook_to);
            key.hash_piece(squares.rook_from, rook);
            key.hash_piece(squares.rook_to, rook);
        }

        next.castling = next
            .castling
            .without(CASTLING_SPOILERS[from])
            .without(CASTLING_SPOILERS[to]);
        key.hash_castling_rights(next.castling);

        if us == Color::Black {
            next.fullmove = next.fullmove.saturating_add(1);
        }
        self.side_to_move = them;
        self.states.push(next);
        self.refresh();

        debug_assert_eq!(
            self.key(),
            self.compute_key(self.state()),
            "incremental hash diverged after {mv}"
        );
    }

    /// Reverts the most recent [`Position::do_move`].
    pub fn undo_move(&mut self) {
        debug_assert!(self.states.len() > 1, "undo_move called without a matching do_move");
        if self.states.len() <= 1 {
            return;
        }
        let Some(state) = self.states.pop() else {
            return;
        };
        let Some(mv) = state.mv else {
            return;
        };

        let us = self.side_to_move.opponent();
        self.side_to_move = us;

        let (from, to) = (mv.from(), mv.to());
        if let Some(moved) = self.remove_piece(to) {
            let original = if mv.is_promotion() {
                Piece::new(us, PieceKind::Pawn)
            } else {
                moved
            };
            self.put_piece(original, from);
        }

        if let Some(captured) = state.captured {
            let square = if mv.is_en_passant() {
                to.backward_by(us, 1).unwrap_or(to)
            } else {
                to
            };
            self.put_piece(captured, square);
        }

        if let Some(side) = CastleSide::of(mv) {
            let (rook_from, rook_to) = side.rook_squares(us);
            if let Some(rook) = self.remove_piece(rook_to) {
                self.put_piece(rook, rook_from);
            }
        }

        self.refresh();
    }

    /// Recomputes the hash of this position from scratch.
    pub fn compute_key(&self, state: &StateRecord) -> ZobristKey {
        let mut key = ZobristKey::default();
        for square in self.occupied() {
            if let Some(piece) = self.piece_at(square) {
                key.hash_piece(square, piece);
            }
        }
        key.hash_ep_square(state.ep_square);
        key.hash_castling_rights(state.castling);
        if self.side_to_move == Color::Black {
            key.hash_side_to_move();
        }
        key
    }

    /// Checks that the piece bitboards, color bitboards, and mailbox all agree.
    pub fn is_consistent(&self) -> bool {
        if self.occupied[0].intersects(self.occupied[1]) {
            return false;
        }

        for color in Color::all() {
            let mut union = Bitboard::EMPTY;
            for kind in PieceKind::all() {
                let bb = self.pieces[color][kind];
                if union.intersects(bb) {
                    return false;
                }
                union |= bb;
            }
            if union != self.occupied[color] {
                return false;
            }
        }

        Square::iter().all(|square| match self.mailbox[square] {
            Some(piece) => self.pieces[piece.color()][piece.kind()].contains(square),
            None => !self.occupied().contains(square),
        })
    }

    #[inline(always)]
    fn put_piece(&mut self, piece: Piece, square: Square) {
        debug_assert!(self.mailbox[square].is_none(), "{square} is already occupied");
        self.pieces[piece.color()][piece.kind()].set(square);
        self.occupied[piece.color()].set(square);
        self.mailbox[square] = Some(piece);
    }

    #[inline(always)]
    fn remove_piece(&mut self, square: Square) -> Option<Piece> {
        let piece = self.mailbox[square].take()?;
        self.pieces[piece.color()][piece.kind()].clear(square);
        self.occupied[piece.color()].clear(square);
        Some(piece)
    }

    /// Recomputes checkers, pins, and attacked squares for the side to move.
    fn refresh(&mut self) {
        self.king_square = self.king(self.side_to_move);
        self.compute_attacks();
        self.compute_pins();
    }

    fn compute_attacks(&mut self) {
        let us = self.side_to_move;
        let them = us.opponent();
        let king = self.king_square;
        let occupied = self.occupied();

        // Our king must not block the rays that would hit it after stepping away
        self.attacked_by_opponent = self.attacks_by(them, occupied ^ king);

        self.checkers = (knight_attacks(king) & self.pieces[them][PieceKind::Knight])
            | (pawn_attacks(king, us) & self.pieces[them][PieceKind::Pawn])
            | (rook_attacks(king, occupied) & self.orthogonal_sliders(them))
            | (bishop_attacks(king, occupied) & self.diagonal_sliders(them));

        self.check_evasion_mask = if self.checkers.is_empty() {
            Bitboard::FULL
        } else {
            let mut mask = Bitboard::FULL;
            for checker in self.checkers {
                mask &= ray_between(king, checker) | checker;
            }
            mask
        };
    }

    fn compute_pins(&mut self) {
        let us = self.side_to_move;
        let them = us.opponent();
        let king = self.king_square;
        let occupied = self.occupied();

        // Sliders that would see the king on an empty board
        let snipers = (rook_rays(king) & self.orthogonal_sliders(them))
            | (bishop_rays(king) & self.diagonal_sliders(them));

        self.pinned = Bitboard::EMPTY;
        for sniper in snipers {
            let between = ray_between(king, sniper) & occupied;
            if between.population() == 1 {
                self.pinned |= between & self.occupied[us];
            }
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        let placements = [
            "RNBQKBNR".chars().zip(Square::iter()).collect::<Vec<_>>(),
            "PPPPPPPP".chars().zip(Square::iter().skip(8)).collect(),
            "pppppppp".chars().zip(Square::iter().skip(48)).collect(),
            "rnbqkbnr".chars().zip(Square::iter().skip(56)).collect(),
        ];

        let pieces = placements.into_iter().flatten().filter_map(|(c, square)| {
            Piece::from_uci(c).ok().map(|piece| (piece, square))
        });

        // The standard layout always satisfies the checks in `from_parts`
        match Self::from_parts(pieces, Color::White, CastlingRights::ALL, None, 0, 1) {
            Ok(pos) => pos,
            Err(e) => unreachable!("standard start position rejected: {e}"),
        }
    }
}

impl FromStr for Position {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_fen(s)
    }
}

impl PartialEq for Position {
    /// Two positions are equal if their boards and current states match, regardless of how they were reached.
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.state(), other.state());
        self.pieces == other.pieces
            && self.mailbox == other.mailbox
            && self.side_to_move == other.side_to_move
            && a.castling == b.castling
            && a.ep_square == b.ep_square
            && a.halfmove == b.halfmove
            && a.key == b.key
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            write!(f, "{rank}| ")?;
            for file in File::iter() {
                let c = self
                    .piece_at(Square::new(file, rank))
                    .map(|piece| piece.to_uci())
                    .unwrap_or('.');
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        writeln!(f, " +----------------")?;
        writeln!(f, "   a b c d e f g h")?;
        writeln!(f)?;
        writeln!(f, "FEN: {}", self.to_fen())?;
        write!(f, "Key: {}", self.key())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.to_fen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MoveKind;

    #[test]
    fn test_fen_round_trip() {
        for fen in [
            FEN_STARTPOS,
            FEN_KIWIPETE,
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbqkb1r/pp1p1pPp/8/2p1pP2/1P1P4/3P3P/P1P1P3/RNBQKBNR w KQkq e6 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "4k3/8/8/8/8/8/8/4K3 b - - 37 80",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert_eq!(pos.to_fen(), fen);
            assert!(pos.is_consistent());
        }
    }

    #[test]
    fn test_fen_defaults_and_errors() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w").unwrap();
        assert_eq!(pos.to_fen(), "4k3/8/8/8/8/8/8/4K3 w - - 0 1");

        let pos = Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 3").unwrap();
        assert_eq!(pos.halfmove(), 3);
        assert_eq!(pos.fullmove(), 1);

        assert!(Position::from_fen("").is_err());
        assert!(Position::from_fen("8/8/8/8/8/8/8/8 w - - 0 1").is_err(), "no kings");
        assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K3 x - - 0 1").is_err());
        assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K2 w - - 0 1").is_err());
        assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K3 w X - 0 1").is_err());
        assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - e4 0 1").is_err());
        assert!(Position::from_fen("P3k3/8/8/8/8/8/8/4K3 w - - 0 1").is_err());
        assert!(
            Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").is_ok(),
            "white gives no check"
        );
        assert!(
            Position::from_fen("R3k3/8/8/8/8/8/8/4K3 w - - 0 1").is_err(),
            "black is in check but white is to move"
        );
    }

    #[test]
    fn test_fen_rejects_overlong_ranks() {
        let nines = "9".repeat(30);
        assert!(Position::from_fen(&format!("{nines}/8/8/8/8/8/8/4K2k w - - 0 1")).is_err());
        assert!(Position::from_fen("4k4/8/8/8/8/8/8/4K3 w - - 0 1").is_err());
        assert!(Position::from_fen("44k3/8/8/8/8/8/8/4K3 w - - 0 1").is_err());
    }

    #[test]
    fn test_move_counters_saturate() {
        let fen = "4k3/8/8/8/8/8/8/R3K3 w - - 65535 65535";
        let mut pos = Position::from_fen(fen).unwrap();

        pos.do_move(pos.find_move("a1a2").unwrap().unwrap());
        assert_eq!(pos.halfmove(), u16::MAX);
        assert!(pos.is_draw(&[]));

        pos.do_move(pos.find_move("e8d8").unwrap().unwrap());
        assert_eq!(pos.fullmove(), u16::MAX);

        pos.undo_move();
        pos.undo_move();
        assert_eq!(pos.to_fen(), fen);
    }

    #[test]
    fn test_fen_en_passant_needs_a_pushed_pawn() {
        // No Black pawn on d5 to capture
        assert!(Position::from_fen("4k3/8/8/4P3/8/8/8/4K3 w - d6 0 1").is_err());
        // d7 is still occupied, so the pawn cannot have come from there
        assert!(Position::from_fen("4k3/3p4/8/3pP3/8/8/8/4K3 w - d6 0 1").is_err());
        // Something stands on the en passant square itself
        assert!(Position::from_fen("4k3/8/3n4/3pP3/8/8/8/4K3 w - d6 0 1").is_err());
        // A White pawn on e4 is not Black's to capture en passant
        assert!(Position::from_fen("4k3/8/8/8/4P3/8/8/4K3 w - e3 0 1").is_err());

        let pos = Position::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        assert_eq!(pos.ep_square(), Some(Square::D6));
        let ep = pos.legal_moves().into_iter().filter(|mv| mv.is_en_passant()).count();
        assert_eq!(ep, 1);

        let pos = Position::from_fen("4k3/8/8/8/3pP3/8/8/4K3 b - e3 0 1").unwrap();
        assert_eq!(pos.find_move("d4e3").unwrap().map(|mv| mv.is_en_passant()), Some(true));
    }

    #[test]
    fn test_default_is_startpos() {
        let pos = Position::default();
        assert_eq!(pos.to_fen(), FEN_STARTPOS);
        assert_eq!(pos, Position::from_fen(FEN_STARTPOS).unwrap());
    }

    #[test]
    fn test_do_undo_restores_everything() {
        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        let original = pos.clone();

        let moves = [
            Move::new(Square::E1, Square::G1, MoveKind::ShortCastle),
            Move::new(Square::E1, Square::C1, MoveKind::LongCastle),
            Move::new(Square::E5, Square::F7, MoveKind::Capture),
            Move::new(Square::D5, Square::E6, MoveKind::Capture),
            Move::new(Square::A2, Square::A4, MoveKind::PawnDoublePush),
            Move::new(Square::F3, Square::H3, MoveKind::Capture),
        ];

        for mv in moves {
            pos.do_move(mv);
            assert!(pos.is_consistent(), "inconsistent after {mv}");
            assert_eq!(pos.key(), pos.compute_key(pos.state()));
            pos.undo_move();
            assert_eq!(pos, original, "undo of {mv} did not restore the position");
            assert_eq!(pos.to_fen(), FEN_KIWIPETE);
        }
    }

    #[test]
    fn test_castling_moves_rook_and_clears_rights() {
        let mut pos = Position::from_fen(FEN_KIWIPETE).unwrap();
        pos.do_move(Move::new(Square::E1, Square::G1, MoveKind::ShortCastle));
        assert_eq!(
            pos.to_fen(),
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R4RK1 b kq - 1 1"
        );

        pos.do_move(Move::new(Square::E8, Square::C8, MoveKind::LongCastle));
        assert_eq!(
            pos.to_fen(),
            "2kr3r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R4RK1 w - - 2 2"
        );
    }

    #[test]
    fn test_capturing_rook_clears_rights() {
        let mut pos = Position::from_fen("r3k2r/8/8/8/8/6n1/8/R3K2R b KQkq - 0 1").unwrap();
        let before = pos.castling_rights();
        pos.do_move(Move::new(Square::G3, Square::H5, MoveKind::Quiet));
        assert_eq!(pos.castling_rights(), before);
        pos.undo_move();

        let mut pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        pos.do_move(Move::new(Square::A1, Square::A8, MoveKind::Capture));
        assert_eq!(pos.castling_rights().to_string(), "Kk");
        assert_eq!(pos.state().captured, Some(Piece::new(Color::Black, PieceKind::Rook)));
        assert_eq!(pos.halfmove(), 0);
    }

    #[test]
    fn test_en_passant_and_promotion() {
        let mut pos =
            Position::from_fen("4k3/1P6/8/3pP3/8/8/8/4K3 w - d6 0 1").unwrap();
        let original = pos.clone();

        pos.do_move(Move::new(Square::E5, Square::D6, MoveKind::EnPassantCapture));
        assert_eq!(pos.to_fen(), "4k3/1P6/3P4/8/8/8/8/4K3 b - - 0 1");
        pos.undo_move();
        assert_eq!(pos, original);

        pos.do_move(Move::new(Square::B7, Square::B8, MoveKind::PromoteQueen));
        assert_eq!(pos.to_fen(), "1Q2k3/8/8/3pP3/8/8/8/4K3 b - - 0 1");
        assert!(pos.is_in_check());
        pos.undo_move();
        assert_eq!(pos, original);
    }

    #[test]
    fn test_double_push_sets_ep_only_when_capturable() {
        let mut pos = Position::default();
        pos.do_move(Move::new(Square::E2, Square::E4, MoveKind::PawnDoublePush));
        assert_eq!(pos.ep_square(), None);

        let mut pos = Position::from_fen("4k3/8/8/8/3p4/8/4P3/4K3 w - - 0 1").unwrap();
        pos.do_move(Move::new(Square::E2, Square::E4, MoveKind::PawnDoublePush));
        assert_eq!(pos.ep_square(), Some(Square::E3));
    }

    #[test]
    fn test_checks_and_pins() {
        // Rook on e8 checks the king through an empty file; bishop on b4 pins the d2 knight
        let pos = Position::from_fen("4r1k1/8/8/8/1b6/8/3N4/4K3 w - - 0 1").unwrap();
        assert_eq!(pos.checkers(), Square::E8.bitboard());
        assert_eq!(pos.pinned(), Square::D2.bitboard());
        assert!(pos.check_evasion_mask().contains(Square::E4));
        assert!(pos.check_evasion_mask().contains(Square::E8));
        assert!(!pos.check_evasion_mask().contains(Square::D4));
        assert!(pos.attacked_by_opponent().contains(Square::E1));

        // Knight and rook both give check, so nothing but the king may move
        let pos = Position::from_fen("4k3/8/8/8/8/5n2/8/r3K3 w - - 0 1").unwrap();
        assert!(pos.is_in_double_check());
        assert_eq!(pos.checkers(), Square::F3.bitboard() | Square::A1.bitboard());
        assert_eq!(pos.check_evasion_mask(), Bitboard::EMPTY);
    }

    #[test]
    fn test_can_castle() {
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert!(pos.can_castle(CastleSide::Short));
        assert!(pos.can_castle(CastleSide::Long));

        // f1 attacked
        let pos = Position::from_fen("r3kr2/8/8/8/8/8/8/R3K2R w KQq - 0 1").unwrap();
        assert!(!pos.can_castle(CastleSide::Short));
        assert!(pos.can_castle(CastleSide::Long));

        // b1 attacked does not prevent long castling, but b1 occupied does
        let pos = Position::from_fen("1r2k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        assert!(pos.can_castle(CastleSide::Long));
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/RN2K2R w KQ - 0 1").unwrap();
        assert!(!pos.can_castle(CastleSide::Long));

        // No rights
        let pos = Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w kq - 0 1").unwrap();
        assert!(!pos.can_castle(CastleSide::Short));
    }

    #[test]
    fn test_insufficient_material_draws() {
        for fen in [
            "4k3/8/8/8/8/8/8/4K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/4K3 b - - 0 1",
            "4k3/8/8/8/8/8/8/2B1K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/2B1K3 b - - 0 1",
            "4k3/8/8/3n4/8/8/8/4K3 w - - 0 1",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert!(pos.is_draw(&[]), "{fen} should be a draw");
        }

        for fen in [
            "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1",
            "4k3/8/8/3n4/8/8/8/2B1K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/R3K3 w - - 0 1",
        ] {
            let pos = Position::from_fen(fen).unwrap();
            assert!(!pos.is_draw(&[]), "{fen} should not be a draw");
        }
    }

    #[test]
    fn test_fifty_move_rule() {
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 99 80").unwrap();
        assert!(!pos.is_draw(&[]));
        let pos = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 100 80").unwrap();
        assert!(pos.is_draw(&[]));
    }

    #[test]
    fn test_repetition() {
        let mut pos = Position::default();
        let shuffle = [
            Move::new(Square::G1, Square::F3, MoveKind::Quiet),
            Move::new(Square::G8, Square::F6, MoveKind::Quiet),
            Move::new(Square::F3, Square::G1, MoveKind::Quiet),
            Move::new(Square::F6, Square::G8, MoveKind::Quiet),
        ];
        for mv in shuffle {
            assert!(!pos.is_repetition(&[]));
            pos.do_move(mv);
        }
        assert!(pos.is_repetition(&[]));

        // The same repetition, split between game history and the search stack
        let mut game = Position::default();
        let mut history = vec![game.key()];
        game.do_move(shuffle[0]);
        history.push(game.key());
        game.do_move(shuffle[1]);

        let mut root = Position::from_fen(&game.to_fen()).unwrap();
        root.do_move(shuffle[2]);
        assert!(!root.is_repetition(&history));
        root.do_move(shuffle[3]);
        assert!(root.is_repetition(&history));
    }
}
