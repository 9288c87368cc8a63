/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{sync::mpsc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    bench, perft, splitperft, Engine, Pesto, Position, SearchConfig, SearchReport, TTable,
    BENCH_DEPTH, FEN_STARTPOS, MAX_DEPTH,
};

/// A bitboard chess engine.
#[derive(Debug, Clone, Parser)]
#[command(version, about, rename_all = "lower")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// A command to be executed by the engine.
#[derive(Debug, Clone, Subcommand)]
#[command(rename_all = "lower")]
pub enum Command {
    /// Search a position and print the best move found.
    #[command(alias = "go")]
    Search {
        /// Position to search, as a FEN string.
        #[arg(short, long, default_value = FEN_STARTPOS)]
        fen: String,

        /// Moves to play from `fen` before searching, in coordinate notation.
        #[arg(short, long, num_args = 0..)]
        moves: Vec<String>,

        /// Maximum depth to search.
        #[arg(short, long, default_value_t = MAX_DEPTH)]
        depth: u8,

        /// Time budget, in seconds.
        #[arg(short, long, default_value_t = 5.0)]
        time: f64,

        /// Transposition table size, in megabytes.
        #[arg(long, default_value_t = TTable::DEFAULT_SIZE)]
        hash: usize,
    },

    /// Count the leaf nodes reachable from a position at the supplied depth.
    Perft {
        depth: usize,

        #[arg(short, long, default_value = FEN_STARTPOS)]
        fen: String,
    },

    /// Like `perft`, but also prints the node count below each root move.
    #[command(alias = "sperft")]
    Splitperft {
        depth: usize,

        #[arg(short, long, default_value = FEN_STARTPOS)]
        fen: String,
    },

    /// Run a fixed-depth search over a set of positions, printing total nodes and speed.
    Bench {
        /// Override the default benchmark depth.
        #[arg(short, long, default_value_t = BENCH_DEPTH)]
        depth: u8,

        #[arg(long, default_value_t = TTable::DEFAULT_SIZE)]
        hash: usize,
    },

    /// Print a position, its FEN, and its static evaluation.
    #[command(aliases = ["d", "display", "eval"])]
    Fen {
        #[arg(default_value = FEN_STARTPOS)]
        fen: String,

        /// Moves to play from `fen` first, in coordinate notation.
        #[arg(short, long, num_args = 0..)]
        moves: Vec<String>,
    },
}

impl Command {
    /// Execute this command, printing its results to stdout.
    pub fn execute(self) -> Result<()> {
        match self {
            Self::Search {
                fen,
                moves,
                depth,
                time,
                hash,
            } => {
                let position = play(&fen, &moves)?;
                let time_budget = Duration::try_from_secs_f64(time)
                    .with_context(|| format!("invalid time budget {time}"))?;
                let config = SearchConfig {
                    time_budget,
                    hash_mb: hash,
                    max_depth: depth,
                };

                let report = search(&position, config)?;
                print_report(&report);
            }

            Self::Perft { depth, fen } => {
                let mut position = Position::from_fen(&fen)?;
                println!("{}", perft(&mut position, depth));
            }

            Self::Splitperft { depth, fen } => {
                let mut position = Position::from_fen(&fen)?;
                let nodes = splitperft(&mut position, depth);
                println!("\n{nodes}");
            }

            Self::Bench { depth, hash } => {
                let result = bench(depth, hash)?;
                println!("{} nodes {} nps", result.nodes(), result.nps());
            }

            Self::Fen { fen, moves } => {
                let position = play(&fen, &moves)?;
                println!("{position}");
                println!("Fen: {}", position.to_fen());
                println!("Key: {}", position.key());
                if let Some(mv) = position.last_move() {
                    println!("Last move: {mv}");
                }
                println!("{}", Pesto::new(&position));
            }
        }

        Ok(())
    }
}

/// Parse `fen` and play each of `moves` on it.
fn play(fen: &str, moves: &[String]) -> Result<Position> {
    let mut position = Position::from_fen(fen)?;

    for uci in moves {
        let Some(mv) = position.find_move(uci)? else {
            bail!("{uci} is not a legal move in {}", position.to_fen());
        };
        position.do_move(mv);
    }

    Ok(position)
}

/// Run a single search on a fresh [`Engine`] and wait for its report.
fn search(position: &Position, config: SearchConfig) -> Result<SearchReport> {
    let mut engine = Engine::new();
    let (sender, receiver) = mpsc::channel();

    engine.think(position, &[], config, move |report| {
        // The receiver outlives the search
        let _ = sender.send(report);
    })?;

    let report = receiver.recv().context("search ended without a report")?;
    engine.stop();

    Ok(report)
}

fn print_report(report: &SearchReport) {
    println!(
        "depth {} score {} nodes {} hits {} time {}",
        report.depth,
        report.score,
        report.nodes,
        report.tt_hits,
        report.elapsed.as_millis()
    );

    match report.best_move {
        Some(mv) => println!("bestmove {mv}"),
        None => println!("bestmove (none)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["gambit", "perft", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Perft { depth: 3, .. }));

        let cli = Cli::try_parse_from(["gambit", "go", "--depth", "4", "--time", "0.5"]).unwrap();
        let Command::Search {
            depth, time, fen, ..
        } = cli.command
        else {
            panic!("expected a search");
        };
        assert_eq!(depth, 4);
        assert_eq!(time, 0.5);
        assert_eq!(fen, FEN_STARTPOS);

        let cli = Cli::try_parse_from(["gambit", "bench"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Bench {
                depth: BENCH_DEPTH,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["gambit", "perft"]).is_err());
    }

    #[test]
    fn test_play_moves() {
        let moves = ["e2e4", "e7e5", "g1f3"].map(String::from);
        let position = play(FEN_STARTPOS, &moves).unwrap();
        assert_eq!(
            position.to_fen(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
        assert_eq!(position.last_move().map(|mv| mv.to_string()), Some("g1f3".into()));
        assert_eq!(play(FEN_STARTPOS, &[]).unwrap().last_move(), None);

        assert!(play(FEN_STARTPOS, &["e2e5".to_string()]).is_err());
        assert!(play(FEN_STARTPOS, &["nonsense".to_string()]).is_err());
    }

    #[test]
    fn test_search_command() {
        let position = Position::from_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1").unwrap();
        let config = SearchConfig {
            time_budget: Duration::from_secs(30),
            hash_mb: 1,
            max_depth: 3,
        };

        let report = search(&position, config).unwrap();
        assert_eq!(report.best_move.map(|mv| mv.to_string()), Some("a1a8".into()));
        assert!(report.score.is_mate());
    }
}
