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

//! Store Orchestrator
//!
//! [`Store`] owns the committed-generation pointer. Readers call
//! [`Store::current`] through a shared reference and get an
//! `Arc<Generation>` from an atomic load; they never block and keep their
//! generation alive for as long as they hold the `Arc`.
//!
//! All mutation goes through [`Store::commit`], which takes `&mut self`:
//! the single-writer rule is a compile-time property, not a runtime lock.
//! A slow prepare runs wherever the caller likes (worker thread, inline)
//! against a generation `Arc`; only the final swap needs the writer.

use std::sync::Arc;

use arc_swap::ArcSwap;
use pasand_core::{Domain, PasandError, Result};
use tracing::{debug, info};

use crate::event_type::EventTypeDescriptor;
use crate::generation::{Generation, GenerationId};
use crate::reader::{RawEvent, Reader};
use crate::update::{
    apply, prepare_catalog_update, prepare_consumer_update, prepare_event_batches,
    prepare_full_load, StagedDelta,
};

/// The single-writer, multi-reader store.
#[derive(Debug)]
pub struct Store {
    current: ArcSwap<Generation>,
}

impl Store {
    /// An empty store over a domain and event-type configuration.
    ///
    /// Event type slots must be dense and in declaration order; every
    /// consumer's log vector is indexed by them.
    pub fn new(domain: Arc<Domain>, event_types: Vec<EventTypeDescriptor>) -> Result<Self> {
        for (position, descriptor) in event_types.iter().enumerate() {
            if descriptor.slot != position {
                return Err(PasandError::InvalidArgument(format!(
                    "event type '{}' declares slot {} at position {}",
                    descriptor.name, descriptor.slot, position
                )));
            }
        }
        Ok(Self {
            current: ArcSwap::from_pointee(Generation::empty(domain, event_types)),
        })
    }

    /// Construct a store from an already committed generation (snapshot
    /// restore)
    pub fn from_generation(generation: Generation) -> Self {
        Self { current: ArcSwap::from_pointee(generation) }
    }

    /// Build a store by pulling schema, catalog and consumers from a reader
    pub fn bootstrap(
        reader: &mut dyn Reader,
        event_types: Vec<EventTypeDescriptor>,
    ) -> Result<Self> {
        let schema = reader.schema()?;
        let domain = Arc::new(Domain::from_schema(&schema));
        let mut store = Self::new(domain, event_types)?;
        let catalog = reader.load_catalog()?;
        let consumers = reader.load_consumers()?;
        let base = store.current();
        let delta = prepare_full_load(&base, catalog, consumers)?;
        let id = store.commit(delta)?;
        info!(generation = id, "store bootstrapped from reader");
        Ok(store)
    }

    /// The committed generation. Lock-free; safe from any thread.
    #[inline]
    pub fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    /// Commit a staged delta, producing the next generation.
    ///
    /// Rejects a delta prepared against anything but the current
    /// generation: applying it would silently lose or double-count work.
    pub fn commit(&mut self, delta: StagedDelta) -> Result<GenerationId> {
        let base = self.current.load_full();
        if delta.base != base.id() {
            return Err(PasandError::StaleBase { expected: delta.base, actual: base.id() });
        }
        let next_id = base.id() + 1;
        let next = apply(&base, delta.payload, next_id);
        self.current.store(Arc::new(next));
        debug!(generation = next_id, "commit applied");
        Ok(next_id)
    }

    /// Pull one bounded batch of new events per event type, stage it, and
    /// commit. One full incremental update cycle.
    pub fn ingest_batch(&mut self, reader: &mut dyn Reader) -> Result<GenerationId> {
        let base = self.current();
        let mut batches = Vec::with_capacity(base.event_types.len());
        for descriptor in base.event_types.iter() {
            batches.push((descriptor.slot, reader.next_event_batch(descriptor)?));
        }
        let delta = prepare_event_batches(&base, batches)?;
        self.commit(delta)
    }

    /// Rebuild the product table from the reader's catalog diff, renumber
    /// indices, remap history, and commit.
    pub fn refresh_catalog(&mut self, reader: &mut dyn Reader) -> Result<GenerationId> {
        let base = self.current();
        let rows = reader.catalog_diff()?;
        let delta = prepare_catalog_update(&base, rows)?;
        self.commit(delta)
    }

    /// Stage and commit an update limited to one consumer's events
    pub fn update_consumer(
        &mut self,
        consumer_external: i64,
        batches: Vec<(usize, Vec<RawEvent>)>,
    ) -> Result<GenerationId> {
        let base = self.current();
        let delta = prepare_consumer_update(&base, consumer_external, batches)?;
        self.commit(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::MetadataColumnKind;
    use crate::update::prepare_event_batches;
    use pasand_core::{AttributeDescriptor, AttributeKind, DomainSchema};

    fn empty_store() -> Store {
        let schema = DomainSchema {
            attributes: vec![AttributeDescriptor {
                name: "title".into(),
                kind: AttributeKind::Text,
            }],
        };
        let domain = Arc::new(Domain::from_schema(&schema));
        let event_types =
            vec![EventTypeDescriptor::new("view", 0, vec![MetadataColumnKind::Timestamp])];
        Store::new(domain, event_types).unwrap()
    }

    #[test]
    fn test_slot_mismatch_rejected() {
        let schema = DomainSchema::default();
        let domain = Arc::new(Domain::from_schema(&schema));
        let bad = vec![EventTypeDescriptor::new("view", 3, Vec::new())];
        assert!(Store::new(domain, bad).is_err());
    }

    #[test]
    fn test_stale_base_commit_rejected() {
        let mut store = empty_store();
        let base = store.current();

        // Two prepares race against the same base; the second commit loses.
        let first = prepare_event_batches(&base, vec![(0, Vec::new())]).unwrap();
        let second = prepare_event_batches(&base, vec![(0, Vec::new())]).unwrap();
        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert!(matches!(err, PasandError::StaleBase { expected: 0, actual: 1 }));
    }

    #[test]
    fn test_readers_keep_their_generation() {
        let mut store = empty_store();
        let before = store.current();
        let delta = prepare_event_batches(&before, vec![(0, Vec::new())]).unwrap();
        store.commit(delta).unwrap();
        let after = store.current();
        assert_eq!(before.id(), 0);
        assert_eq!(after.id(), 1);
        // The old generation stays fully readable.
        assert_eq!(before.consumer_count(), 0);
    }
}
