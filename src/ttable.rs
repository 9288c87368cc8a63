/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use thiserror::Error;

use crate::{Move, Score, ZobristKey};

/// Number of bytes in a megabyte
pub const BYTES_IN_MB: usize = 1024 * 1024;

/// Number of entries sharing one bucket of the table.
const CLUSTER_SIZE: usize = 4;

/// How a stored score relates to the true value of its position.
///
/// See [CPW](https://www.chessprogramming.org/Node_Types) for more.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Default)]
#[repr(u8)]
pub enum Bound {
    /// The score is exact.
    #[default]
    Exact,

    /// The score failed high; the true value is at least this (cut node).
    Lower,

    /// The score failed low; the true value is at most this (all node).
    Upper,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TTableError {
    #[error("failed to allocate {bytes} bytes for the transposition table")]
    Allocation { bytes: usize },
}

/// A single slot of the table, packed into 8 bytes.
///
/// A `key` of zero with a `depth` of zero is treated as empty.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
struct TTableEntry {
    /// Low 16 bits of the position's hash; the high bits pick the cluster.
    key: u16,
    score: i16,
    mv: u16,
    depth: u8,
    bound: Bound,
}

impl TTableEntry {
    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.key == 0 && self.depth == 0 && self.mv == 0
    }

    /// Determine whether the score in this entry can be used and, if so, return it.
    ///
    /// An entry's score can be used if and only if:
    ///     1. The entry is [`Bound::Exact`].
    ///     2. The entry is a [`Bound::Upper`] and its score is `<= alpha`.
    ///     3. The entry is a [`Bound::Lower`] and its score is `>= beta`.
    #[inline(always)]
    fn try_score(&self, alpha: Score, beta: Score, ply: usize) -> Option<Score> {
        let score = Score::new(self.score as i32).relative(ply);

        match self.bound {
            Bound::Exact => Some(score),
            Bound::Lower => (score >= beta).then_some(score),
            Bound::Upper => (score <= alpha).then_some(score),
        }
    }
}

#[derive(Clone, Copy, Default, Debug)]
#[repr(align(32))]
struct Cluster([TTableEntry; CLUSTER_SIZE]);

/// What a [`TTable::probe`] found about a position.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ProbeResult {
    /// Best move previously found here, whenever the key matched.
    pub mv: Option<Move>,

    /// A score that may be returned without searching, if the stored depth and bound allow it.
    pub score: Option<Score>,
}

/// Transposition Table.
///
/// Used during a search to keep track of previous search results on positions,
/// avoiding unnecessary re-computations.
///
/// Entries live in clusters of four. A truncated key means two positions may share an entry;
/// such collisions are accepted.
#[derive(Debug, Default)]
pub struct TTable {
    clusters: Vec<Cluster>,

    /// Number of probes that produced a usable score since the last clear.
    pub(crate) hits: u64,
}

impl TTable {
    /// Default size of the Transposition Table, in megabytes.
    pub const DEFAULT_SIZE: usize = 16;

    /// Create a new [`TTable`] that is `mb` megabytes, or empty if that cannot be allocated.
    pub fn new(mb: usize) -> Self {
        let mut tt = Self::default();
        if let Err(err) = tt.resize(mb * BYTES_IN_MB) {
            tracing::warn!("{err}; continuing without a transposition table");
        }
        tt
    }

    /// Reallocate the table to the largest power-of-two number of clusters that fits in `bytes`.
    ///
    /// All entries are lost. If `bytes` cannot hold a single cluster, the table has no capacity:
    /// nothing is stored and every probe misses. On failure the table is left empty.
    pub fn resize(&mut self, bytes: usize) -> Result<(), TTableError> {
        let fits = bytes / size_of::<Cluster>();
        let count = if fits == 0 {
            0
        } else {
            1 << fits.ilog2()
        };

        self.clusters = Vec::new();
        self.hits = 0;

        self.clusters
            .try_reserve_exact(count)
            .map_err(|_| TTableError::Allocation {
                bytes: count * size_of::<Cluster>(),
            })?;
        self.clusters.resize(count, Cluster::default());

        tracing::debug!(
            "resized transposition table to {count} clusters ({} bytes)",
            count * size_of::<Cluster>()
        );
        Ok(())
    }

    /// Clears the entries of this [`TTable`], keeping its capacity.
    pub fn clear(&mut self) {
        self.clusters.fill(Cluster::default());
        self.hits = 0;
    }

    /// Returns the number of entries that can fit within this [`TTable`]
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.clusters.len() * CLUSTER_SIZE
    }

    /// Returns the size of this [`TTable`], in bytes.
    #[inline(always)]
    pub fn size_in_bytes(&self) -> usize {
        self.clusters.len() * size_of::<Cluster>()
    }

    /// Returns the number of occupied entries in this [`TTable`].
    pub fn num_entries(&self) -> usize {
        self.clusters
            .iter()
            .flat_map(|cluster| cluster.0.iter())
            .filter(|entry| !entry.is_empty())
            .count()
    }

    /// Number of probes that returned a usable score since the last clear.
    #[inline(always)]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Map `key` to a cluster, using its high bits.
    #[inline(always)]
    fn index(&self, key: ZobristKey) -> usize {
        ((key.inner() as u128 * self.clusters.len() as u128) >> 64) as usize
    }

    #[inline(always)]
    fn truncate(key: ZobristKey) -> u16 {
        key.inner() as u16
    }

    /// Record the result of searching the position with `key`.
    ///
    /// `score` is relative to a node `ply` plies from the root; mate scores are made ply-independent.
    pub fn store(
        &mut self,
        key: ZobristKey,
        score: Score,
        mv: Option<Move>,
        depth: u8,
        bound: Bound,
        ply: usize,
    ) {
        if self.clusters.is_empty() {
            return;
        }

        let index = self.index(key);
        let key16 = Self::truncate(key);
        let entry = TTableEntry {
            key: key16,
            score: score.absolute(ply).0 as i16,
            mv: mv.map_or(0, |mv| mv.bits()),
            depth,
            bound,
        };
        let cluster = &mut self.clusters[index].0;

        // Same position: only replace with something at least as informative.
        if let Some(existing) = cluster
            .iter_mut()
            .find(|e| e.key == key16 && !e.is_empty())
        {
            if bound == Bound::Exact || depth >= existing.depth {
                *existing = entry;
            }
            return;
        }

        // Otherwise evict an empty slot, or else the shallowest one.
        if let Some(victim) = cluster
            .iter_mut()
            .min_by_key(|e| (!e.is_empty(), e.depth))
        {
            *victim = entry;
        }
    }

    fn entry(&self, key: ZobristKey) -> Option<TTableEntry> {
        if self.clusters.is_empty() {
            return None;
        }

        let key16 = Self::truncate(key);
        self.clusters[self.index(key)]
            .0
            .iter()
            .find(|e| e.key == key16 && !e.is_empty())
            .copied()
    }

    /// The move stored for `key`, if any. Does not count as a hit.
    #[inline(always)]
    pub fn best_move(&self, key: ZobristKey) -> Option<Move> {
        self.entry(key).and_then(|entry| Move::from_bits(entry.mv))
    }

    /// Look up the position with `key`, searched to `depth` with the window `[alpha, beta]`.
    pub fn probe(
        &mut self,
        key: ZobristKey,
        depth: u8,
        alpha: Score,
        beta: Score,
        ply: usize,
    ) -> ProbeResult {
        let Some(entry) = self.entry(key) else {
            return ProbeResult::default();
        };

        let score = if entry.depth >= depth {
            entry.try_score(alpha, beta, ply)
        } else {
            None
        };

        if score.is_some() {
            self.hits += 1;
        }

        ProbeResult {
            mv: Move::from_bits(entry.mv),
            score,
        }
    }
}
