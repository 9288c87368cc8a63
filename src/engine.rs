/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    Pesto, Position, Search, SearchConfig, SearchReport, TTable, ZobristKey, BYTES_IN_MB,
    FEN_KIWIPETE, FEN_STARTPOS,
};

/// Default depth at which to run the benchmark searches.
pub const BENCH_DEPTH: u8 = 5;

/// Positions searched by [`bench`]: openings, middlegames, and endgames with castling, en passant,
/// and promotions available.
pub const BENCHMARK_FENS: [&str; 10] = [
    FEN_STARTPOS,
    FEN_KIWIPETE,
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3",
    "r2q1rk1/ppp2ppp/2n1bn2/2bpp3/4P3/2PP1NN1/PP1BBPPP/R2QK2R w KQ - 0 8",
    "6k1/5ppp/8/8/8/8/5PPP/3R2K1 w - - 0 1",
    "8/8/1p6/3k4/8/2K5/1P6/8 w - - 0 1",
];

/// Misuse of an [`Engine`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("a search is already in progress")]
    AlreadySearching,

    #[error("the engine has been stopped")]
    Stopped,
}

/// Called with the outcome of each search, on the engine's worker thread.
pub type SearchCallback = Box<dyn FnOnce(SearchReport) + Send + 'static>;

/// A search waiting to be picked up by the worker.
struct SearchRequest {
    position: Position,
    history: Vec<ZobristKey>,
    config: SearchConfig,
    callback: SearchCallback,
}

#[derive(Default)]
struct EngineState {
    request: Option<SearchRequest>,

    /// Set from the moment a search is requested until its callback has returned.
    searching: bool,

    /// Set once by [`Engine::stop`]; the worker exits and no further searches are accepted.
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<EngineState>,

    /// Wakes the worker when a request arrives or the engine stops.
    wakeup: Condvar,

    /// Wakes callers of [`Engine::wait`] when a search finishes.
    idle: Condvar,

    /// Cancels the running search.
    abort: AtomicBool,
}

impl Shared {
    /// A panicking callback must not take the engine down with it, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A chess engine that searches on a dedicated, long-lived worker thread.
///
/// The worker sleeps until [`Engine::think`] hands it a position, searches it, reports back through
/// the provided callback, and goes back to sleep. Only one search runs at a time. The worker owns the
/// transposition table, which persists between searches.
pub struct Engine {
    shared: Arc<Shared>,

    /// Handle to the worker thread, until it is joined by [`Engine::stop`].
    worker: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new() -> Self {
        let shared = Arc::new(Shared::default());
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || worker_loop(&shared))
        };

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Start searching `position` in the background, handing the result to `callback` when done.
    ///
    /// `history` holds the keys of the positions played before `position`, oldest first, so that the
    /// search can recognize repetitions. If the hash size in `config` differs from the current one, the
    /// transposition table is reallocated first.
    pub fn think(
        &self,
        position: &Position,
        history: &[ZobristKey],
        config: SearchConfig,
        callback: impl FnOnce(SearchReport) + Send + 'static,
    ) -> Result<(), EngineError> {
        {
            let mut state = self.shared.lock();

            if state.stopped {
                return Err(EngineError::Stopped);
            }
            if state.searching {
                return Err(EngineError::AlreadySearching);
            }

            state.searching = true;
            state.request = Some(SearchRequest {
                position: position.clone(),
                history: history.to_vec(),
                config,
                callback: Box::new(callback),
            });
            self.shared.abort.store(false, Ordering::Relaxed);
        }

        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Returns `true` if a search has been requested and its callback has not yet returned.
    pub fn is_searching(&self) -> bool {
        self.shared.lock().searching
    }

    /// Block until the current search (if any) has finished and reported.
    pub fn wait(&self) {
        let mut state = self.shared.lock();
        while state.searching && !state.stopped {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Cancel any running search and shut the worker down.
    ///
    /// A search that was interrupted still reports the last depth it finished. Afterwards,
    /// [`Engine::think`] fails with [`EngineError::Stopped`].
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.stopped = true;
            self.shared.abort.store(true, Ordering::Relaxed);
        }
        self.shared.wakeup.notify_one();
        self.shared.idle.notify_all();

        if let Some(worker) = self.worker.take() {
            let id = worker.thread().id();
            if worker.join().is_err() {
                tracing::warn!("search worker {id:?} panicked");
            }
            tracing::debug!("search worker {id:?} joined");
        }

        let mut state = self.shared.lock();
        state.request = None;
        state.searching = false;
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the worker thread: wait for a request, search it, report, repeat.
fn worker_loop(shared: &Shared) {
    let mut ttable = TTable::default();
    let mut hash_mb = None;

    loop {
        let request = {
            let mut state = shared.lock();
            loop {
                // A request accepted before `stop` still reports back, after an immediate abort
                if let Some(request) = state.request.take() {
                    break request;
                }
                if state.stopped {
                    return;
                }
                state = shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if hash_mb != Some(request.config.hash_mb) {
            hash_mb = Some(request.config.hash_mb);
            if let Err(err) = ttable.resize(request.config.hash_mb * BYTES_IN_MB) {
                tracing::warn!("{err}; searching without a transposition table");
            }
        }

        tracing::info!(fen = %request.position.to_fen(), "search started");
        let report = Search::<Pesto>::new(
            request.position,
            &request.history,
            &mut ttable,
            request.config,
            &shared.abort,
        )
        .start();
        tracing::info!(
            bestmove = ?report.best_move.map(|mv| mv.to_string()),
            score = %report.score,
            depth = report.depth,
            nodes = report.nodes,
            tt_hits = report.tt_hits,
            elapsed = ?report.elapsed,
            "search finished"
        );

        let callback = request.callback;
        if panic::catch_unwind(AssertUnwindSafe(move || callback(report))).is_err() {
            tracing::warn!("search callback panicked");
        }

        shared.lock().searching = false;
        shared.idle.notify_all();
    }
}

/// Totals from running [`bench`].
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// One report per entry of [`BENCHMARK_FENS`], in order.
    pub reports: Vec<SearchReport>,
    pub elapsed: Duration,
}

impl BenchResult {
    pub fn nodes(&self) -> u64 {
        self.reports.iter().map(|report| report.nodes).sum()
    }

    /// Nodes searched per second.
    pub fn nps(&self) -> u64 {
        (self.nodes() as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)) as u64
    }
}

/// Run a fixed-depth search on each of [`BENCHMARK_FENS`], with a fresh transposition table each time.
///
/// Useful as a deterministic node count ("signature") and for measuring speed.
pub fn bench(depth: u8, hash_mb: usize) -> anyhow::Result<BenchResult> {
    let config = SearchConfig {
        max_depth: depth,
        hash_mb,
        time_budget: Duration::MAX,
    };
    let abort = AtomicBool::new(false);
    let starttime = Instant::now();

    let mut reports = Vec::with_capacity(BENCHMARK_FENS.len());
    for fen in BENCHMARK_FENS {
        let position = Position::from_fen(fen)?;
        let mut ttable = TTable::default();
        ttable.resize(hash_mb * BYTES_IN_MB)?;

        let report = Search::<Pesto>::new(position, &[], &mut ttable, config, &abort).start();
        tracing::debug!(fen, nodes = report.nodes, "bench position done");
        reports.push(report);
    }

    Ok(BenchResult {
        reports,
        elapsed: starttime.elapsed(),
    })
}
