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

//! Entity Records and Dense Index Maps
//!
//! Products and consumers are addressed two ways: by their durable external
//! id (an i64 from the upstream system) and by a dense index used for array
//! offsets everywhere inside a generation. [`IdMap`] is the bidirectional
//! bridge between the two.
//!
//! Lookups by external id sit on the scoring hot path and referential gaps
//! are routine during live ingestion, so a miss returns the sentinel index
//! rather than an error; callers short-circuit on it.

use pasand_core::AttributeValue;

use crate::event_log::EventLog;

/// Raw sentinel index shared by both index newtypes
pub const SENTINEL_INDEX: u32 = u32::MAX;

/// Dense index of a product within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductIdx(pub u32);

impl ProductIdx {
    pub const SENTINEL: Self = Self(SENTINEL_INDEX);

    #[inline]
    pub fn is_sentinel(self) -> bool {
        self.0 == SENTINEL_INDEX
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Dense index of a consumer within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerIdx(pub u32);

impl ConsumerIdx {
    pub const SENTINEL: Self = Self(SENTINEL_INDEX);

    #[inline]
    pub fn is_sentinel(self) -> bool {
        self.0 == SENTINEL_INDEX
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Bidirectional external-id ↔ dense-index map.
///
/// Forward lookups go through a hash map; the reverse direction is a plain
/// vector in index order, which is also the snapshot layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdMap {
    forward: std::collections::HashMap<i64, u32>,
    reverse: Vec<i64>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            forward: std::collections::HashMap::with_capacity(capacity),
            reverse: Vec::with_capacity(capacity),
        }
    }

    /// Insert an external id, returning its dense index (existing or new)
    pub fn insert(&mut self, external: i64) -> u32 {
        if let Some(&idx) = self.forward.get(&external) {
            return idx;
        }
        let idx = self.reverse.len() as u32;
        self.reverse.push(external);
        self.forward.insert(external, idx);
        idx
    }

    /// Dense index of an external id; [`SENTINEL_INDEX`] on miss
    #[inline]
    pub fn index_of(&self, external: i64) -> u32 {
        self.forward.get(&external).copied().unwrap_or(SENTINEL_INDEX)
    }

    /// External id at a dense index
    #[inline]
    pub fn external_of(&self, idx: u32) -> Option<i64> {
        self.reverse.get(idx as usize).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// External ids in dense-index order (snapshot layout)
    pub fn externals(&self) -> &[i64] {
        &self.reverse
    }

    /// Rebuild from externals in index order (snapshot restore)
    pub fn from_externals(externals: Vec<i64>) -> Self {
        let mut forward = std::collections::HashMap::with_capacity(externals.len());
        for (idx, &external) in externals.iter().enumerate() {
            forward.insert(external, idx as u32);
        }
        Self { forward, reverse: externals }
    }
}

/// A catalog product record.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// Durable external id
    pub external_id: i64,
    /// Public-facing id string
    pub public_id: String,
    /// Product type tag
    pub kind: u8,
    /// Attribute values in domain schema order; `None` = value absent
    pub attributes: Vec<Option<AttributeValue>>,
    /// Running occurrence count across ingested events
    pub frequency: u64,
}

impl Product {
    /// Attribute value at a schema index
    #[inline]
    pub fn attribute(&self, idx: usize) -> Option<&AttributeValue> {
        self.attributes.get(idx).and_then(Option::as_ref)
    }
}

/// A consumer record: external id plus one event log per configured event
/// type, indexed by the type's storage slot.
#[derive(Debug, Clone, Default)]
pub struct Consumer {
    pub external_id: i64,
    pub logs: Vec<EventLog>,
}

impl Consumer {
    pub fn new(external_id: i64, log_count: usize) -> Self {
        Self {
            external_id,
            logs: (0..log_count).map(|_| EventLog::default()).collect(),
        }
    }

    /// Event log at an event-type storage slot
    #[inline]
    pub fn log(&self, slot: usize) -> Option<&EventLog> {
        self.logs.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_map_round_trip() {
        let mut map = IdMap::new();
        let a = map.insert(1001);
        let b = map.insert(1002);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(map.insert(1001), a);
        assert_eq!(map.index_of(1002), b);
        assert_eq!(map.external_of(b), Some(1002));
    }

    #[test]
    fn test_missing_id_resolves_to_sentinel() {
        let map = IdMap::new();
        assert_eq!(map.index_of(404), SENTINEL_INDEX);
        assert!(ProductIdx(map.index_of(404)).is_sentinel());
    }

    #[test]
    fn test_from_externals_rebuild() {
        let mut map = IdMap::new();
        map.insert(5);
        map.insert(9);
        let rebuilt = IdMap::from_externals(map.externals().to_vec());
        assert_eq!(rebuilt, map);
    }
}
