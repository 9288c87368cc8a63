/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{sync::atomic::AtomicBool, time::Duration};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gambit::{perft, Pesto, Position, Search, SearchConfig, TTable, FEN_KIWIPETE, FEN_STARTPOS};

const PERFT_CASES: &[(&str, &str, usize, u64)] = &[
    ("startpos", FEN_STARTPOS, 4, 197_281),
    ("kiwipete", FEN_KIWIPETE, 3, 97_862),
    ("endgame", "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", 4, 43_238),
];

fn bench_perft(c: &mut Criterion) {
    gambit::init();

    let mut group = c.benchmark_group("perft");
    for &(name, fen, depth, nodes) in PERFT_CASES {
        let mut position = Position::from_fen(fen).unwrap();
        assert_eq!(perft(&mut position, depth), nodes, "{name} miscounted");

        group.throughput(Throughput::Elements(nodes));
        group.bench_with_input(BenchmarkId::new(name, depth), &depth, |b, &depth| {
            b.iter(|| perft(black_box(&mut position), depth))
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    gambit::init();

    let config = SearchConfig {
        time_budget: Duration::MAX,
        hash_mb: 16,
        max_depth: 4,
    };
    let abort = AtomicBool::new(false);
    let position = Position::from_fen(FEN_KIWIPETE).unwrap();
    let mut ttable = TTable::new(config.hash_mb);

    c.bench_function("search kiwipete depth 4", |b| {
        b.iter(|| {
            ttable.clear();
            Search::<Pesto>::new(position.clone(), &[], &mut ttable, config, &abort).start()
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_perft, bench_search
}
criterion_main!(benches);
