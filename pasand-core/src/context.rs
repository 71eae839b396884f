// SPDX-License-Identifier: AGPL-3.0-or-later
// PasandDB - In-Memory Personalized Ranking Engine
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Context Position Encoding
//!
//! Context-aware scorers bucket their counters by small integer "context
//! positions" instead of raw attribute values or situational signals. The
//! encoder is a concurrent dictionary from raw 64-bit keys (packed attribute
//! keys, discretized signal buckets) to dense positions.
//!
//! Position [`NO_CONTEXT`] (0) always denotes "no context" and is what an
//! empty source encodes to, so every scorer table has a well-defined bucket
//! even for context-free requests.
//!
//! ## Soft capacity
//!
//! Distinct raw keys are assumed bounded by `max_positions`. The bound is
//! soft: the first overflow logs a warning and later keys fold into the
//! existing position range by modulus, which can collide. Encoding never
//! fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::warn;

/// The reserved "no context" position
pub const NO_CONTEXT: u32 = 0;

/// A supplier of raw context keys for one (product, situation) pair.
pub trait ContextSource {
    /// Raw 64-bit keys, e.g. [`crate::attribute::PackedAttrKey`] values or
    /// discretized signal buckets
    fn raw_keys(&self) -> SmallVec<[u64; 8]>;
}

/// A plain key-set context source.
#[derive(Debug, Default, Clone)]
pub struct KeySetContext(pub SmallVec<[u64; 8]>);

impl ContextSource for KeySetContext {
    fn raw_keys(&self) -> SmallVec<[u64; 8]> {
        self.0.clone()
    }
}

/// Concurrent raw-key → position dictionary.
///
/// Positions are assigned in first-encounter order starting at 1, which
/// makes the encoding deterministic for identical input sequences.
#[derive(Debug)]
pub struct ContextEncoder {
    positions: RwLock<HashMap<u64, u32>>,
    max_positions: u32,
    overflow_warned: AtomicBool,
}

impl ContextEncoder {
    /// Create an encoder with the given soft position cap (excluding
    /// position 0)
    pub fn new(max_positions: u32) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            max_positions: max_positions.max(1),
            overflow_warned: AtomicBool::new(false),
        }
    }

    /// Encode a source into its set of context positions.
    ///
    /// An empty source yields exactly `[NO_CONTEXT]`. Duplicate keys
    /// contribute one position.
    pub fn encode(&self, source: &dyn ContextSource) -> SmallVec<[u32; 4]> {
        let keys = source.raw_keys();
        if keys.is_empty() {
            return SmallVec::from_slice(&[NO_CONTEXT]);
        }
        let mut out: SmallVec<[u32; 4]> = SmallVec::new();
        for &key in &keys {
            let pos = self.position_of(key);
            if !out.contains(&pos) {
                out.push(pos);
            }
        }
        out
    }

    /// Position for one raw key, assigning on first encounter
    pub fn position_of(&self, key: u64) -> u32 {
        if let Some(&pos) = self.positions.read().get(&key) {
            return pos;
        }
        let mut table = self.positions.write();
        // Re-check under the write lock; another thread may have assigned.
        if let Some(&pos) = table.get(&key) {
            return pos;
        }
        let assigned = table.len() as u32 + 1;
        let pos = if assigned > self.max_positions {
            if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    max_positions = self.max_positions,
                    "context position table full, folding new keys into existing range"
                );
            }
            (key % self.max_positions as u64) as u32 + 1
        } else {
            assigned
        };
        table.insert(key, pos);
        pos
    }

    /// Number of distinct keys seen so far
    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.read().is_empty()
    }
}
