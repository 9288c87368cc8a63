/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    sync::{atomic::AtomicBool, mpsc},
    time::Duration,
};

use gambit::{
    bench, Engine, Pesto, Position, Score, Search, SearchConfig, SearchReport, TTable,
    BENCHMARK_FENS, FEN_KIWIPETE,
};

fn config(max_depth: u8) -> SearchConfig {
    SearchConfig {
        max_depth,
        hash_mb: 1,
        time_budget: Duration::from_secs(60),
    }
}

/// Run one search on a fresh engine and block until it reports.
fn think(fen: &str, config: SearchConfig) -> SearchReport {
    let position = Position::from_fen(fen).unwrap();
    let engine = Engine::new();
    let (sender, receiver) = mpsc::channel();

    engine
        .think(&position, &[], config, move |report| {
            sender.send(report).unwrap();
        })
        .unwrap();

    receiver.recv().unwrap()
}

fn best(report: &SearchReport) -> Option<String> {
    report.best_move.map(|mv| mv.to_string())
}

#[test]
fn test_engine_finds_back_rank_mate() {
    let report = think("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", config(4));

    assert_eq!(best(&report), Some("a1a8".into()));
    assert!(report.score.is_mate());
    assert_eq!(report.score.moves_to_mate(), 1);
    assert_eq!(report.depth, 4);
}

#[test]
fn test_engine_wins_hanging_queen() {
    // Black's queen is undefended and attacked by a knight
    let report = think("4k3/7p/8/3q4/8/4N3/4P3/4K3 w - - 0 1", config(3));

    assert_eq!(best(&report), Some("e3d5".into()));
    assert!(report.score > Score::new(0));
}

#[test]
fn test_engine_reports_on_terminal_positions() {
    // Checkmated: nothing to play
    let report = think("R5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 0 1", config(3));
    assert_eq!(report.best_move, None);
    assert_eq!(report.score, Score::mated_in(0));

    // Stalemated
    let report = think("k7/2Q5/1K6/8/8/8/8/8 b - - 0 1", config(3));
    assert_eq!(report.best_move, None);
    assert_eq!(report.score, Score::DRAW);
}

#[test]
fn test_best_move_is_legal_after_played_moves() {
    let mut position = Position::default();
    for uci in ["e2e4", "c7c5", "g1f3", "d7d6"] {
        let mv = position.find_move(uci).unwrap().unwrap();
        position.do_move(mv);
    }

    let engine = Engine::new();
    let (sender, receiver) = mpsc::channel();
    engine
        .think(&position, &[], config(3), move |report| {
            sender.send(report).unwrap();
        })
        .unwrap();

    let report = receiver.recv().unwrap();
    let mv = report.best_move.unwrap();
    assert!(position.legal_moves().contains(&mv));
}

#[test]
fn test_engine_stop_still_reports() {
    let position = Position::from_fen(FEN_KIWIPETE).unwrap();
    let mut engine = Engine::new();
    let (sender, receiver) = mpsc::channel();

    let config = SearchConfig {
        max_depth: 64,
        hash_mb: 1,
        time_budget: Duration::from_secs(600),
    };
    engine
        .think(&position, &[], config, move |report| {
            sender.send(report).unwrap();
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(100));
    engine.stop();

    let report = receiver.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(report.depth < 64);
    assert!(!engine.is_searching());
}

#[test]
fn test_search_without_transposition_table() {
    let position = Position::from_fen(FEN_KIWIPETE).unwrap();
    let mut ttable = TTable::new(0);
    assert_eq!(ttable.capacity(), 0);

    let abort = AtomicBool::new(false);
    let report = Search::<Pesto>::new(position.clone(), &[], &mut ttable, config(3), &abort).start();

    assert_eq!(report.depth, 3);
    assert_eq!(report.tt_hits, 0);
    assert!(position.legal_moves().contains(&report.best_move.unwrap()));
}

#[test]
fn test_bench_is_deterministic() {
    let first = bench(2, 1).unwrap();
    let second = bench(2, 1).unwrap();

    assert_eq!(first.reports.len(), BENCHMARK_FENS.len());
    assert_eq!(first.nodes(), second.nodes());
    assert!(first.nodes() > 0);

    for (a, b) in first.reports.iter().zip(&second.reports) {
        assert_eq!(a.best_move, b.best_move);
        assert_eq!(a.score, b.score);
    }
}
