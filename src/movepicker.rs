/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use arrayvec::ArrayVec;

use crate::{
    bishop_attacks, rook_attacks, value_of, Color, Move, MoveList, PieceKind, Position,
    MAX_NUM_MOVES,
};

/// Ordering score of the hash move (or the previous iteration's best move).
const HASH_MOVE_SCORE: i32 = i32::MAX;

/// Offset that places every capture and promotion above every quiet move.
const FORCING_MOVE_SCORE: i32 = 1 << 20;

/// Value of a king when exchanging on a square: it may capture, but nothing outweighs it.
const KING_EXCHANGE_VALUE: i32 = 1500;

/// Longest exchange sequence considered on a single square.
const MAX_EXCHANGES: usize = 32;

/// Yields moves best-first: the hash move, then captures by [`see`], then quiet moves.
///
/// Scores are computed up front, and the best remaining move is selected lazily on each call to
/// [`Iterator::next`]. Searches that cut off early never pay to sort the tail of the list.
pub struct MovePicker {
    moves: MoveList,
    scores: ArrayVec<i32, MAX_NUM_MOVES>,
    current: usize,
}

impl MovePicker {
    pub fn new(position: &Position, moves: MoveList, hash_move: Option<Move>) -> Self {
        let mut picker = Self {
            moves,
            scores: ArrayVec::new(),
            current: 0,
        };
        picker.rescore(position, hash_move);
        picker
    }

    /// Recompute all scores with `hash_move` first, and start yielding from the top again.
    ///
    /// Used at the root between iterations, where the list of moves stays the same.
    pub fn rescore(&mut self, position: &Position, hash_move: Option<Move>) {
        self.scores.clear();
        for &mv in self.moves.iter() {
            self.scores.push(score_move(position, mv, hash_move));
        }
        self.current = 0;
    }

    /// Number of moves this picker holds.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

impl Iterator for MovePicker {
    type Item = Move;

    fn next(&mut self) -> Option<Self::Item> {
        // No more moves left
        if self.current >= self.moves.len() {
            return None;
        }

        // Find the index of the next highest score
        let mut best_index = self.current;
        for i in (self.current + 1)..self.moves.len() {
            if self.scores[i] > self.scores[best_index] {
                best_index = i;
            }
        }

        if best_index != self.current {
            self.moves.swap(self.current, best_index);
            self.scores.swap(self.current, best_index);
        }

        let mv = self.moves[self.current];
        self.current += 1;

        Some(mv)
    }
}

#[inline(always)]
fn score_move(position: &Position, mv: Move, hash_move: Option<Move>) -> i32 {
    if Some(mv) == hash_move {
        return HASH_MOVE_SCORE;
    }

    let mut score = 0;
    if mv.is_capture() {
        score += FORCING_MOVE_SCORE + see(position, mv);
    }
    if let Some(promotion) = mv.promotion() {
        score += value_of(promotion) - value_of(PieceKind::Pawn);
        if !mv.is_capture() {
            score += FORCING_MOVE_SCORE;
        }
    }
    score
}

#[inline(always)]
const fn exchange_value(kind: PieceKind) -> i32 {
    match kind {
        PieceKind::King => KING_EXCHANGE_VALUE,
        _ => value_of(kind),
    }
}

/// [Static Exchange Evaluation](https://www.chessprogramming.org/Static_Exchange_Evaluation) of a capture.
///
/// Plays out every capture on the destination square, least valuable attacker first, and returns the
/// material the side to move can expect to win (or lose, if negative). Either side may stop capturing
/// whenever continuing would be worse. Sliders hidden behind a capturing piece join in as it moves away.
///
/// Pins and checks are ignored. Non-captures have a value of 0.
pub fn see(position: &Position, mv: Move) -> i32 {
    let (from, to) = (mv.from(), mv.to());
    let Some(mut attacker) = position.piece_at(from).map(|piece| piece.kind()) else {
        return 0;
    };

    let mut occupied = position.occupied() ^ from;
    let victim = if mv.is_en_passant() {
        occupied ^= to.backward_by(position.side_to_move(), 1);
        Some(PieceKind::Pawn)
    } else {
        position.piece_at(to).map(|piece| piece.kind())
    };
    let Some(victim) = victim else {
        return 0;
    };

    let diagonal =
        position.diagonal_sliders(Color::White) | position.diagonal_sliders(Color::Black);
    let orthogonal =
        position.orthogonal_sliders(Color::White) | position.orthogonal_sliders(Color::Black);

    let mut gains = [0; MAX_EXCHANGES];
    gains[0] = exchange_value(victim);

    let mut attackers = position.attackers_to(to, occupied);
    let mut side = position.side_to_move();
    let mut depth = 0;

    loop {
        depth += 1;
        side = side.opponent();
        attackers &= occupied;

        let ours = attackers & position.color(side);
        if ours.is_empty() || depth >= MAX_EXCHANGES {
            break;
        }

        // Least valuable attacker goes next
        let Some((kind, square)) = PieceKind::all().into_iter().find_map(|kind| {
            (ours & position.pieces(side, kind))
                .lsb()
                .map(|square| (kind, square))
        }) else {
            break;
        };

        occupied ^= square;
        gains[depth] = exchange_value(attacker) - gains[depth - 1];

        match kind {
            PieceKind::Pawn | PieceKind::Bishop => {
                attackers |= bishop_attacks(to, occupied) & diagonal
            }
            PieceKind::Rook => attackers |= rook_attacks(to, occupied) & orthogonal,
            PieceKind::Queen => {
                attackers |= bishop_attacks(to, occupied) & diagonal;
                attackers |= rook_attacks(to, occupied) & orthogonal;
            }
            PieceKind::Knight | PieceKind::King => {}
        }

        attacker = kind;
    }

    // Each side picks the better of standing pat and continuing the exchange
    while depth > 1 {
        depth -= 1;
        gains[depth - 1] = -(-gains[depth - 1]).max(gains[depth]);
    }

    gains[0]
}
