/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use crate::{CastleSide, Color, Move, Piece, PieceKind, Position, Psqt, Score, Square};
use crate::{MATERIAL, MAX_PHASE, PHASE_INCREMENT};

/// Encapsulates the logic of scoring a chess position.
///
/// An evaluator follows the search up and down the tree: [`Evaluator::update`] is called right after
/// a move is made on the [`Position`], and [`Evaluator::rollback`] right after it is unmade.
///
/// Scores are from the side-to-move's perspective. That is, if it is Black's turn, a "good" evaluation
/// for Black will be a positive number.
pub trait Evaluator {
    /// Evaluate `position` from scratch, discarding any previous state.
    fn init(&mut self, position: &Position);

    /// Account for `mv`, which has just been made on `position`.
    fn update(&mut self, position: &Position, mv: Move);

    /// Forget the most recent [`Evaluator::update`].
    fn rollback(&mut self);

    /// Evaluation of the current position.
    fn score(&self) -> Score;
}

/// Returns the middle-game value of the provided `PieceKind`.
///
/// Kings are given 0, since they are never traded.
#[inline(always)]
pub const fn value_of(kind: PieceKind) -> i32 {
    MATERIAL[kind.index()].0
}

/// Running totals of a [`Pesto`] evaluation, per color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PestoState {
    mg: [i32; Color::COUNT],
    eg: [i32; Color::COUNT],
    phase: i32,
    side_to_move: Color,
}

impl PestoState {
    #[inline(always)]
    fn add(&mut self, piece: Piece, square: Square) {
        let (mg, eg) = Psqt::evals(piece, square);
        self.mg[piece.color()] += mg;
        self.eg[piece.color()] += eg;
    }

    #[inline(always)]
    fn remove(&mut self, piece: Piece, square: Square) {
        let (mg, eg) = Psqt::evals(piece, square);
        self.mg[piece.color()] -= mg;
        self.eg[piece.color()] -= eg;
    }
}

impl Default for PestoState {
    fn default() -> Self {
        Self {
            mg: [0; Color::COUNT],
            eg: [0; Color::COUNT],
            phase: 0,
            side_to_move: Color::White,
        }
    }
}

/// A tapered material and piece-square evaluation, using the tables of
/// [PeSTO](https://www.chessprogramming.org/PeSTO%27s_Evaluation_Function).
///
/// Middle-game and end-game scores are blended by how much material is left on the board.
/// Updates are incremental; a stack of states makes [`Evaluator::rollback`] free.
#[derive(Clone, Debug)]
pub struct Pesto {
    states: Vec<PestoState>,
}

impl Pesto {
    pub fn new(position: &Position) -> Self {
        let mut pesto = Self::default();
        pesto.init(position);
        pesto
    }

    /// One-off evaluation of `position`.
    pub fn evaluate(position: &Position) -> Score {
        Self::new(position).score()
    }

    /// Game phase, from [`MAX_PHASE`] (all pieces on the board) down to 0 (pawns and kings only).
    pub fn phase(&self) -> i32 {
        self.state().phase.min(MAX_PHASE)
    }

    #[inline(always)]
    fn state(&self) -> &PestoState {
        // `init` always leaves one state behind
        &self.states[self.states.len() - 1]
    }
}

impl Default for Pesto {
    fn default() -> Self {
        Self {
            states: vec![PestoState::default()],
        }
    }
}

impl Evaluator for Pesto {
    fn init(&mut self, position: &Position) {
        let mut state = PestoState {
            side_to_move: position.side_to_move(),
            ..Default::default()
        };

        for square in position.occupied() {
            if let Some(piece) = position.piece_at(square) {
                state.add(piece, square);
                state.phase += PHASE_INCREMENT[piece.kind()];
            }
        }

        self.states.clear();
        self.states.push(state);
    }

    fn update(&mut self, position: &Position, mv: Move) {
        let mut state = *self.state();
        let us = state.side_to_move;
        let (from, to) = (mv.from(), mv.to());

        let Some(placed) = position.piece_at(to) else {
            debug_assert!(false, "update({mv}) with an empty destination");
            return;
        };
        let moved = if mv.is_promotion() {
            Piece::new(us, PieceKind::Pawn)
        } else {
            placed
        };

        if let Some(captured) = position.state().captured {
            let square = if mv.is_en_passant() {
                to.backward_by(us, 1).unwrap_or(to)
            } else {
                to
            };
            state.remove(captured, square);
            state.phase -= PHASE_INCREMENT[captured.kind()];
        }

        state.remove(moved, from);
        state.add(placed, to);
        state.phase += PHASE_INCREMENT[placed.kind()] - PHASE_INCREMENT[moved.kind()];

        if let Some(side) = CastleSide::of(mv) {
            let (rook_from, rook_to) = side.rook_squares(us);
            let rook = Piece::new(us, PieceKind::Rook);
            state.remove(rook, rook_from);
            state.add(rook, rook_to);
        }

        state.side_to_move = us.opponent();
        self.states.push(state);
    }

    fn rollback(&mut self) {
        debug_assert!(self.states.len() > 1, "rollback without a matching update");
        if self.states.len() > 1 {
            self.states.pop();
        }
    }

    fn score(&self) -> Score {
        let state = self.state();
        let us = state.side_to_move;
        let them = us.opponent();

        let mg = state.mg[us] - state.mg[them];
        let eg = state.eg[us] - state.eg[them];
        let phase = self.phase();

        Score::new((mg * phase + eg * (MAX_PHASE - phase)) / MAX_PHASE)
    }
}

impl fmt::Display for Pesto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        writeln!(
            f,
            "Middle game: {} (white) {} (black)",
            state.mg[Color::White],
            state.mg[Color::Black]
        )?;
        writeln!(
            f,
            "End game:    {} (white) {} (black)",
            state.eg[Color::White],
            state.eg[Color::Black]
        )?;
        writeln!(f, "Phase:       {}/{MAX_PHASE}", self.phase())?;
        write!(f, "Score:       {} ({} to move)", self.score(), state.side_to_move.name())
    }
}
