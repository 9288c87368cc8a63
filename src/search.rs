/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use crate::{Bound, Evaluator, Move, MovePicker, Pesto, Position, Score, TTable, ZobristKey};

/// Deepest iteration a search may be configured to run.
pub const MAX_DEPTH: u8 = 64;

/// Hard limit on the distance from the root, quiescence included.
///
/// Nodes this deep return their static evaluation.
pub const MAX_PLY: usize = 128;

/// Configuration variables for executing a [`Search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// How long the search may run before it must stop.
    ///
    /// The search stops as soon as this is exceeded, keeping the result of the last finished iteration.
    pub time_budget: Duration,

    /// Size of the transposition table, in megabytes.
    pub hash_mb: usize,

    /// Maximum depth to execute the search.
    pub max_depth: u8,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(5),
            hash_mb: TTable::DEFAULT_SIZE,
            max_depth: MAX_DEPTH,
        }
    }
}

/// The outcome of a [`Search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchReport {
    /// Best move found by the deepest finished iteration, if any iteration finished.
    pub best_move: Option<Move>,

    /// Evaluation of the position after `best_move` is made, for the side to move.
    pub score: Score,

    /// The depth of the iteration that produced `best_move`.
    pub depth: u8,

    /// Number of nodes visited, quiescence included.
    pub nodes: u64,

    /// Number of nodes answered by the transposition table.
    pub tt_hits: u64,

    pub elapsed: Duration,
}

impl Default for SearchReport {
    /// A default report should initialize to a *very bad* value, since there isn't a move to play.
    fn default() -> Self {
        Self {
            best_move: None,
            score: -Score::INF,
            depth: 0,
            nodes: 0,
            tt_hits: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Executes a search on a position.
///
/// The search walks its own copy of the position with [`Position::do_move`] and [`Position::undo_move`],
/// keeping an [`Evaluator`] in step with it.
pub struct Search<'a, E = Pesto> {
    position: Position,

    /// Keys of positions played before the root, oldest first. Used to detect repetitions.
    history: &'a [ZobristKey],

    /// Transposition table used to cache information during search.
    ttable: &'a mut TTable,

    evaluator: E,

    config: SearchConfig,

    /// Set from outside to cancel the search as soon as possible.
    abort: &'a AtomicBool,

    starttime: Instant,

    /// `None` if the time budget is too large to represent.
    deadline: Option<Instant>,

    nodes: u64,

    /// Latched once the deadline passes or `abort` is raised; every node returns immediately afterwards.
    stopped: bool,
}

impl<'a, E: Evaluator + Default> Search<'a, E> {
    /// Construct a new [`Search`] instance to execute. The clock starts now.
    pub fn new(
        position: Position,
        history: &'a [ZobristKey],
        ttable: &'a mut TTable,
        config: SearchConfig,
        abort: &'a AtomicBool,
    ) -> Self {
        let starttime = Instant::now();
        Self {
            position,
            history,
            ttable,
            evaluator: E::default(),
            config,
            abort,
            starttime,
            deadline: starttime.checked_add(config.time_budget),
            nodes: 0,
            stopped: false,
        }
    }
}

impl<E: Evaluator> Search<'_, E> {
    /// Performs [iterative deepening](https://www.chessprogramming.org/Iterative_Deepening) (ID) on the Search's position.
    ///
    /// Searches at depth 1, then 2, and so on until the configured maximum depth or until time runs out.
    /// The result of the last iteration to finish is returned; an interrupted iteration is thrown away.
    pub fn start(mut self) -> SearchReport {
        let hits_before = self.ttable.hits();
        let mut report = SearchReport::default();

        tracing::debug!(
            fen = %self.position.to_fen(),
            budget = ?self.config.time_budget,
            max_depth = self.config.max_depth,
            "starting search"
        );

        let moves = self.position.legal_moves();
        if moves.is_empty() {
            report.score = if self.position.is_in_check() {
                Score::mated_in(0)
            } else {
                Score::DRAW
            };
            return self.finish(report, hits_before);
        }

        self.evaluator.init(&self.position);
        let hash_move = self.ttable.best_move(self.position.key());
        let mut picker = MovePicker::new(&self.position, moves, hash_move);

        'iterative_deepening: for depth in 1..=self.config.max_depth.min(MAX_DEPTH) {
            let mut alpha = -Score::INF;
            let mut bestmove = None;

            // Every root move gets a full upper bound; alpha rises as better moves are found
            for mv in picker.by_ref() {
                let score = self.search_child(mv, depth - 1, alpha, Score::INF, 0);

                if self.stopped {
                    tracing::debug!("search cancelled during depth {depth}");
                    break 'iterative_deepening;
                }

                if score > alpha {
                    alpha = score;
                    bestmove = Some(mv);
                }
            }

            report.best_move = bestmove;
            report.score = alpha;
            report.depth = depth;

            self.ttable
                .store(self.position.key(), alpha, bestmove, depth, Bound::Exact, 0);

            tracing::debug!(
                depth,
                score = %alpha,
                nodes = self.nodes,
                bestmove = ?bestmove.map(|mv| mv.to_string()),
                "finished iteration"
            );

            // Try the best move first in the next iteration
            picker.rescore(&self.position, bestmove);
        }

        self.finish(report, hits_before)
    }

    fn finish(&self, mut report: SearchReport, hits_before: u64) -> SearchReport {
        report.nodes = self.nodes;
        report.tt_hits = self.ttable.hits().saturating_sub(hits_before);
        report.elapsed = self.starttime.elapsed();
        report
    }

    /// Checks if we've exceeded any conditions that would warrant the search to end.
    #[inline(always)]
    fn search_cancelled(&mut self) -> bool {
        if !self.stopped {
            self.stopped = self.abort.load(Ordering::Relaxed)
                || self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        }
        self.stopped
    }

    /// Makes `mv`, scores the resulting position from our perspective, and unmakes it.
    ///
    /// `ply` is the distance of the current node from the root.
    fn search_child(&mut self, mv: Move, depth: u8, alpha: Score, beta: Score, ply: usize) -> Score {
        self.position.do_move(mv);

        let score = if self.position.is_draw(self.history) {
            Score::DRAW
        } else {
            self.evaluator.update(&self.position, mv);
            let score = -self.negamax(depth, -beta, -alpha, ply + 1);
            self.evaluator.rollback();
            score
        };

        self.position.undo_move();
        score
    }

    /// Primary location of search logic.
    ///
    /// Uses the [negamax](https://www.chessprogramming.org/Negamax) algorithm in a
    /// [fail soft](https://www.chessprogramming.org/Alpha-Beta#Negamax_Framework) framework.
    fn negamax(&mut self, depth: u8, mut alpha: Score, beta: Score, ply: usize) -> Score {
        if self.search_cancelled() {
            return Score::DRAW;
        }

        /****************************************************************************************************
         * TT Cutoffs: https://www.chessprogramming.org/Transposition_Table#Transposition_Table_Cutoffs
         ****************************************************************************************************/
        let key = self.position.key();
        let probe = self.ttable.probe(key, depth, alpha, beta, ply);
        if let Some(score) = probe.score {
            return score;
        }

        if depth == 0 {
            return self.quiescence(alpha, beta, ply);
        }

        self.nodes += 1;

        // If there are no legal moves, it's either mate or a draw.
        let moves = self.position.legal_moves();
        if moves.is_empty() {
            return if self.position.is_in_check() {
                Score::mated_in(ply)
            } else {
                Score::DRAW
            };
        }

        let original_alpha = alpha;
        let mut best = -Score::INF;
        let mut bestmove = None;

        for mv in MovePicker::new(&self.position, moves, probe.mv) {
            let score = self.search_child(mv, depth - 1, alpha, beta, ply);

            // Whatever was found is incomplete; don't let it into the table
            if self.stopped {
                return Score::DRAW;
            }

            if score > best {
                best = score;
                bestmove = Some(mv);

                if score > alpha {
                    alpha = score;

                    // Fail high
                    if score >= beta {
                        self.ttable
                            .store(key, best, bestmove, depth, Bound::Lower, ply);
                        return best;
                    }
                }
            }
        }

        let bound = if best <= original_alpha {
            Bound::Upper
        } else {
            Bound::Exact
        };
        self.ttable.store(key, best, bestmove, depth, bound, ply);

        best
    }

    /// [Quiescence Search](https://www.chessprogramming.org/Quiescence_Search)
    ///
    /// Resolves captures and promotions before trusting the static evaluation, so that the search
    /// does not stop in the middle of an exchange. When in check, every evasion is searched instead.
    fn quiescence(&mut self, mut alpha: Score, beta: Score, ply: usize) -> Score {
        if self.search_cancelled() {
            return Score::DRAW;
        }

        if self.position.is_draw(self.history) {
            return Score::DRAW;
        }

        self.nodes += 1;

        let stand_pat = self.evaluator.score();
        if ply >= MAX_PLY {
            return stand_pat;
        }

        let in_check = self.position.is_in_check();
        let mut best = if in_check {
            -Score::INF
        } else {
            // Beta cutoff; this position is "too good" and our opponent would never let us get here
            if stand_pat >= beta {
                return stand_pat;
            }
            alpha = alpha.max(stand_pat);
            stand_pat
        };

        let moves = if in_check {
            self.position.legal_moves()
        } else {
            self.position.forced_moves()
        };
        if moves.is_empty() {
            return if in_check {
                Score::mated_in(ply)
            } else {
                stand_pat
            };
        }

        for mv in MovePicker::new(&self.position, moves, None) {
            self.position.do_move(mv);
            self.evaluator.update(&self.position, mv);
            let score = -self.quiescence(-beta, -alpha, ply + 1);
            self.position.undo_move();
            self.evaluator.rollback();

            if self.stopped {
                return Score::DRAW;
            }

            if score > best {
                best = score;
                if score > alpha {
                    alpha = score;
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        best // fail-soft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FEN_KIWIPETE, FEN_STARTPOS};

    fn run_search(fen: &str, config: SearchConfig) -> SearchReport {
        let abort = AtomicBool::new(false);
        let mut ttable = TTable::new(1);
        let position = Position::from_fen(fen).unwrap();
        Search::<Pesto>::new(position, &[], &mut ttable, config, &abort).start()
    }

    fn depth(max_depth: u8) -> SearchConfig {
        SearchConfig {
            max_depth,
            time_budget: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn ensure_is_mate_in(fen: &str, config: SearchConfig, moves: i32) -> SearchReport {
        let res = run_search(fen, config);
        assert!(
            res.score.is_mate(),
            "Search on {fen:?} with config {config:#?} produced result that is not mate.\nResult: {res:#?}"
        );
        assert_eq!(
            res.score.moves_to_mate(),
            moves,
            "Search on {fen:?} with config {config:#?} produced result not mate in {moves}.\nResult: {res:#?}"
        );
        res
    }

    /// Plain minimax over the same tree the search explores, without pruning or caching.
    fn brute_force(pos: &mut Position, depth: u8, ply: usize) -> Score {
        if depth == 0 {
            return brute_force_quiescence(pos, ply);
        }

        let moves = pos.legal_moves();
        if moves.is_empty() {
            return if pos.is_in_check() {
                Score::mated_in(ply)
            } else {
                Score::DRAW
            };
        }

        let mut best = -Score::INF;
        for mv in moves {
            pos.do_move(mv);
            let score = if pos.is_draw(&[]) {
                Score::DRAW
            } else {
                -brute_force(pos, depth - 1, ply + 1)
            };
            pos.undo_move();
            best = best.max(score);
        }
        best
    }

    fn brute_force_quiescence(pos: &mut Position, ply: usize) -> Score {
        if pos.is_draw(&[]) {
            return Score::DRAW;
        }

        let stand_pat = Pesto::evaluate(pos);
        let in_check = pos.is_in_check();
        let (moves, mut best) = if in_check {
            (pos.legal_moves(), Score::mated_in(ply))
        } else {
            (pos.forced_moves(), stand_pat)
        };

        for mv in moves {
            pos.do_move(mv);
            best = best.max(-brute_force_quiescence(pos, ply + 1));
            pos.undo_move();
        }
        best
    }

    #[test]
    fn test_white_mate_in_1() {
        let fen = "k7/8/KQ6/8/8/8/8/8 w - - 0 1";
        let res = ensure_is_mate_in(fen, depth(2), 1);

        let mut pos = Position::from_fen(fen).unwrap();
        pos.do_move(res.best_move.unwrap());
        assert!(pos.is_in_check() && pos.legal_moves().is_empty());
    }

    #[test]
    fn test_black_mated_in_1() {
        let fen = "1k6/8/KQ6/2Q5/8/8/8/8 b - - 0 1";
        let res = ensure_is_mate_in(fen, depth(3), -1);
        assert_eq!(res.best_move.unwrap().to_string(), "b8a8");
    }

    #[test]
    fn test_mate_in_2() {
        // Two rooks roll the king up the board
        let fen = "6k1/8/8/8/8/8/R7/1R4K1 w - - 0 1";
        ensure_is_mate_in(fen, depth(4), 2);
    }

    #[test]
    fn test_stalemate() {
        let fen = "k7/8/KQ6/8/8/8/8/8 b - - 0 1";
        let res = run_search(fen, SearchConfig::default());
        assert!(res.best_move.is_none());
        assert_eq!(res.score, Score::DRAW);
    }

    #[test]
    fn test_checkmated_root() {
        let fen = "k7/1Q6/K7/8/8/8/8/8 b - - 0 1";
        let res = run_search(fen, SearchConfig::default());
        assert!(res.best_move.is_none());
        assert_eq!(res.score, Score::mated_in(0));
    }

    #[test]
    fn test_obvious_capture_promote() {
        // Pawn should take queen and also promote to queen
        let fen = "3q1n2/4P3/8/8/8/8/k7/7K w - - 0 1";
        let res = run_search(fen, depth(1));
        assert_eq!(res.best_move.unwrap().to_string(), "e7d8q");
    }

    #[test]
    fn test_insufficient_material_is_drawn() {
        for fen in [
            "8/8/4k3/8/8/3K4/8/8 w - - 0 1",
            "8/8/4k3/8/8/3KB3/8/8 w - - 0 1",
            "8/8/4kb2/8/8/3K4/8/8 b - - 0 1",
        ] {
            let res = run_search(fen, depth(4));
            assert_eq!(res.score, Score::DRAW, "{fen}");
            assert!(res.best_move.is_some());
        }
    }

    #[test]
    fn test_matches_brute_force() {
        for fen in [
            "8/8/4k3/8/2p5/3P4/4K3/8 w - - 0 1",
            "4k3/8/8/3q4/8/2N5/8/4K2R w K - 0 1",
            "8/5k2/8/3r4/8/8/2R1K3/8 b - - 0 1",
            "6k1/8/6K1/8/8/8/8/R7 w - - 0 1",
        ] {
            for max_depth in 1..=3 {
                let res = run_search(fen, depth(max_depth));
                let mut pos = Position::from_fen(fen).unwrap();
                let expected = brute_force(&mut pos, max_depth, 0);

                assert_eq!(res.score, expected, "{fen} at depth {max_depth}");
                assert!(res.score.abs() <= Score::MATE);
                assert_eq!(res.depth, max_depth);
            }
        }
    }

    #[test]
    fn test_zero_time_finds_nothing() {
        let config = SearchConfig {
            time_budget: Duration::ZERO,
            ..Default::default()
        };
        let res = run_search(FEN_STARTPOS, config);
        assert!(res.best_move.is_none());
        assert_eq!(res.depth, 0);
    }

    #[test]
    fn test_abort_flag_stops_search() {
        let abort = AtomicBool::new(true);
        let mut ttable = TTable::new(1);
        let position = Position::from_fen(FEN_KIWIPETE).unwrap();
        let res =
            Search::<Pesto>::new(position, &[], &mut ttable, SearchConfig::default(), &abort)
                .start();
        assert!(res.best_move.is_none());
    }

    #[test]
    fn test_repetition_in_history_is_a_draw() {
        // White is a rook down, but can repeat the position
        let start = Position::from_fen("r5k1/8/8/8/8/8/8/6KN w - - 0 1").unwrap();
        let mut pos = start.clone();
        let mut history = Vec::new();
        for mv in ["h1g3", "g8h8", "g3h1", "h8g8"] {
            history.push(pos.key());
            let mv = pos.find_move(mv).unwrap().unwrap();
            pos.do_move(mv);
        }
        let pos = Position::from_fen(&pos.to_fen()).unwrap();

        let abort = AtomicBool::new(false);
        let mut ttable = TTable::new(1);
        let res = Search::<Pesto>::new(pos, &history, &mut ttable, depth(2), &abort).start();
        assert!(res.score >= Score::DRAW, "got {:?}", res.score);
    }

    #[test]
    fn test_report_counts() {
        let res = run_search(FEN_KIWIPETE, depth(3));
        assert_eq!(res.depth, 3);
        assert!(res.nodes > 0);
        assert!(res.best_move.is_some());
        assert!(!res.score.is_mate());
    }

    #[test]
    fn test_cancelled_nodes_leave_table_untouched() {
        let abort = AtomicBool::new(true);
        let mut ttable = TTable::new(1);
        let position = Position::from_fen(FEN_KIWIPETE).unwrap();

        let mut search = Search::<Pesto>::new(position, &[], &mut ttable, depth(4), &abort);
        search.evaluator.init(&search.position);
        assert_eq!(search.negamax(4, -Score::INF, Score::INF, 0), Score::DRAW);
        assert!(search.stopped);
        assert_eq!(search.ttable.num_entries(), 0);
    }

    #[test]
    fn test_node_interrupted_midway_is_not_stored() {
        let abort = AtomicBool::new(false);
        let mut ttable = TTable::new(1);
        let position = Position::from_fen(FEN_KIWIPETE).unwrap();
        let key = position.key();

        // Far too deep to finish before the deadline
        let mut search = Search::<Pesto>::new(position, &[], &mut ttable, depth(8), &abort);
        search.evaluator.init(&search.position);
        search.deadline = Some(Instant::now() + Duration::from_millis(5));

        let score = search.negamax(8, -Score::INF, Score::INF, 0);
        assert!(search.stopped);
        assert!(search.nodes > 0);
        assert_eq!(score, Score::DRAW);

        // Completed subtrees may be cached, the interrupted root may not
        assert_eq!(ttable.best_move(key), None);
        assert_eq!(ttable.probe(key, 0, -Score::INF, Score::INF, 0).score, None);
    }
}
