/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::OnceLock;

use super::{Bitboard, Color, Square, XoShiRo};

const ROOK_DELTAS: [(i8, i8); 4] = [(1, 0), (0, -1), (-1, 0), (0, 1)];
const BISHOP_DELTAS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];
const LINE_DELTAS: [(i8, i8); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];
const KING_DELTAS: [(i8, i8); 8] = [
    (1, 0),
    (0, -1),
    (-1, 0),
    (0, 1),
    (1, 1),
    (1, -1),
    (-1, -1),
    (-1, 1),
];
const KNIGHT_DELTAS: [(i8, i8); 8] = [
    (1, 2),
    (1, -2),
    (2, 1),
    (2, -1),
    (-1, 2),
    (-1, -2),
    (-2, 1),
    (-2, -1),
];

const KING_ATTACKS: [Bitboard; Square::COUNT] = leaper_table(&KING_DELTAS);
const KNIGHT_ATTACKS: [Bitboard; Square::COUNT] = leaper_table(&KNIGHT_DELTAS);
const PAWN_ATTACKS: [[Bitboard; Square::COUNT]; Color::COUNT] = [
    leaper_table(&[(-1, 1), (1, 1)]),
    leaper_table(&[(-1, -1), (1, -1)]),
];

/// Squares strictly between two squares that share a line, or empty if they don't.
const RAY_BETWEEN: [[Bitboard; Square::COUNT]; Square::COUNT] = {
    let mut rays = [[Bitboard::EMPTY; Square::COUNT]; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let from = Square::from_index_unchecked(i);
        let mut d = 0;
        while d < KING_DELTAS.len() {
            let (df, dr) = KING_DELTAS[d];
            let mut between = Bitboard::EMPTY;
            let mut to = from;
            while let Some(next) = to.offset(df, dr) {
                rays[i][next.index()] = between;
                between = between.or(next.bitboard());
                to = next;
            }
            d += 1;
        }
        i += 1;
    }

    rays
};

/// The whole line (edge to edge) through two squares that share a rank, file, or diagonal.
const RAY_CONTAINING: [[Bitboard; Square::COUNT]; Square::COUNT] = {
    let mut lines = [[Bitboard::EMPTY; Square::COUNT]; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let from = Square::from_index_unchecked(i);

        // A direction and its opposite make one line
        let mut d = 0;
        while d < LINE_DELTAS.len() {
            let (df, dr) = LINE_DELTAS[d];
            let forward = slow_ray(from, df, dr, Bitboard::EMPTY);
            let backward = slow_ray(from, -df, -dr, Bitboard::EMPTY);
            let line = forward.or(backward).or(from.bitboard());

            let mut targets = forward.or(backward).inner();
            while targets != 0 {
                let j = targets.trailing_zeros() as usize;
                lines[i][j] = line;
                targets &= targets - 1;
            }
            d += 1;
        }
        i += 1;
    }

    lines
};

const fn leaper_table(deltas: &[(i8, i8)]) -> [Bitboard; Square::COUNT] {
    let mut table = [Bitboard::EMPTY; Square::COUNT];

    let mut i = 0;
    while i < Square::COUNT {
        let square = Square::from_index_unchecked(i);
        let mut j = 0;
        while j < deltas.len() {
            let (df, dr) = deltas[j];
            if let Some(to) = square.offset(df, dr) {
                table[i] = table[i].or(to.bitboard());
            }
            j += 1;
        }
        i += 1;
    }

    table
}

/// Casts a ray from `square` in one direction, stopping at (and including) the first blocker.
const fn slow_ray(square: Square, df: i8, dr: i8, blockers: Bitboard) -> Bitboard {
    let mut ray = Bitboard::EMPTY;
    let mut current = square;
    while let Some(next) = current.offset(df, dr) {
        ray = ray.or(next.bitboard());
        if blockers.contains(next) {
            break;
        }
        current = next;
    }
    ray
}

/// Slow, loop-based slider attacks.
///
/// Only used to build the lookup tables and to check them in tests.
pub fn ray_attacks(square: Square, deltas: &[(i8, i8)], blockers: Bitboard) -> Bitboard {
    deltas
        .iter()
        .fold(Bitboard::EMPTY, |acc, &(df, dr)| {
            acc | slow_ray(square, df, dr, blockers)
        })
}

/// The squares a slider could be blocked on: its empty-board rays, minus the final square of each ray.
fn relevant_blockers(square: Square, deltas: &[(i8, i8)]) -> Bitboard {
    let mut mask = Bitboard::EMPTY;
    for &(df, dr) in deltas {
        let mut current = square;
        while let Some(next) = current.offset(df, dr) {
            if next.offset(df, dr).is_none() {
                break;
            }
            mask |= next;
            current = next;
        }
    }
    mask
}

#[derive(Clone, Copy, Debug, Default)]
struct MagicEntry {
    mask: u64,
    magic: u64,
    shift: u8,
    offset: u32,
}

impl MagicEntry {
    #[inline(always)]
    fn index(&self, blockers: Bitboard) -> usize {
        let relevant = blockers.inner() & self.mask;
        let hash = relevant.wrapping_mul(self.magic);
        self.offset as usize + (hash >> self.shift) as usize
    }
}

/// Perfect-hash lookup tables for rooks and bishops.
struct SliderTables {
    rook: [MagicEntry; Square::COUNT],
    bishop: [MagicEntry; Square::COUNT],
    attacks: Vec<Bitboard>,
}

static SLIDERS: OnceLock<SliderTables> = OnceLock::new();

impl SliderTables {
    fn build() -> Self {
        let mut attacks = Vec::with_capacity(102_400 + 5_248);
        let mut prng = XoShiRo::with_salt(0x5EED);

        let mut rook = [MagicEntry::default(); Square::COUNT];
        let mut bishop = [MagicEntry::default(); Square::COUNT];

        for square in Square::iter() {
            rook[square] = find_magic(square, &ROOK_DELTAS, &mut prng, &mut attacks);
        }
        for square in Square::iter() {
            bishop[square] = find_magic(square, &BISHOP_DELTAS, &mut prng, &mut attacks);
        }

        tracing::debug!("built slider tables with {} entries", attacks.len());

        Self {
            rook,
            bishop,
            attacks,
        }
    }
}

/// Searches for a multiplier that maps every blocker subset of `square` to a collision-free slot,
/// then appends that square's attack sets to `table`.
fn find_magic(
    square: Square,
    deltas: &[(i8, i8)],
    prng: &mut XoShiRo,
    table: &mut Vec<Bitboard>,
) -> MagicEntry {
    let mask = relevant_blockers(square, deltas);
    let bits = mask.population();
    let size = 1usize << bits;

    let (subsets, targets): (Vec<Bitboard>, Vec<Bitboard>) = mask
        .subsets()
        .map(|blockers| (blockers, ray_attacks(square, deltas, blockers)))
        .unzip();

    let mut slots = vec![Bitboard::EMPTY; size];
    let mut epoch = vec![0u32; size];
    let mut attempt = 0u32;

    loop {
        let magic = prng.next_sparse_u64();

        // Reject multipliers that do not spread the mask's bits into the top byte
        if (mask.inner().wrapping_mul(magic) >> 56).count_ones() < 6 {
            continue;
        }

        attempt += 1;
        let entry = MagicEntry {
            mask: mask.inner(),
            magic,
            shift: 64 - bits,
            offset: 0,
        };

        let fits = subsets.iter().zip(&targets).all(|(&blockers, &attacks)| {
            let idx = entry.index(blockers);
            if epoch[idx] != attempt {
                epoch[idx] = attempt;
                slots[idx] = attacks;
                true
            } else {
                // Constructive collisions (same attack set) are fine
                slots[idx] == attacks
            }
        });

        if fits {
            let offset = table.len() as u32;
            table.extend_from_slice(&slots);
            return MagicEntry { offset, ..entry };
        }
    }
}

#[inline(always)]
fn sliders() -> &'static SliderTables {
    SLIDERS.get_or_init(SliderTables::build)
}

/// Builds the slider lookup tables. Idempotent and safe to call from any thread.
///
/// Lookups build the tables on first use anyway. Calling this up front moves that cost to startup.
pub fn init_attacks() {
    sliders();
}

/// Squares strictly between `from` and `to`, if they share a line.
///
/// # Example
/// ```
/// # use gambit::{ray_between, Bitboard, Square};
/// let between = ray_between(Square::A1, Square::D4);
/// assert_eq!(between, Square::B2.bitboard() | Square::C3.bitboard());
/// assert_eq!(ray_between(Square::A1, Square::B3), Bitboard::EMPTY);
/// ```
#[inline(always)]
pub const fn ray_between(from: Square, to: Square) -> Bitboard {
    RAY_BETWEEN[from.index()][to.index()]
}

/// The full line through `from` and `to`, or empty if they are not aligned.
#[inline(always)]
pub const fn ray_containing(from: Square, to: Square) -> Bitboard {
    RAY_CONTAINING[from.index()][to.index()]
}

#[inline(always)]
pub const fn king_attacks(square: Square) -> Bitboard {
    KING_ATTACKS[square.index()]
}

#[inline(always)]
pub const fn knight_attacks(square: Square) -> Bitboard {
    KNIGHT_ATTACKS[square.index()]
}

/// Squares a pawn of `color` on `square` attacks.
#[inline(always)]
pub const fn pawn_attacks(square: Square, color: Color) -> Bitboard {
    PAWN_ATTACKS[color.index()][square.index()]
}

#[inline(always)]
pub fn rook_attacks(square: Square, blockers: Bitboard) -> Bitboard {
    let tables = sliders();
    tables.attacks[tables.rook[square].index(blockers)]
}

#[inline(always)]
pub fn bishop_attacks(square: Square, blockers: Bitboard) -> Bitboard {
    let tables = sliders();
    tables.attacks[tables.bishop[square].index(blockers)]
}

#[inline(always)]
pub fn queen_attacks(square: Square, blockers: Bitboard) -> Bitboard {
    rook_attacks(square, blockers) | bishop_attacks(square, blockers)
}

/// Attacks of a rook on an empty board.
#[inline(always)]
pub fn rook_rays(square: Square) -> Bitboard {
    rook_attacks(square, Bitboard::EMPTY)
}

/// Attacks of a bishop on an empty board.
#[inline(always)]
pub fn bishop_rays(square: Square) -> Bitboard {
    bishop_attacks(square, Bitboard::EMPTY)
}
