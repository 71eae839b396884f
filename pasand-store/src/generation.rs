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

//! Committed Store Generations
//!
//! A [`Generation`] is one internally consistent, committed snapshot of the
//! whole store: domain globals, product table, consumer table, both id maps,
//! and the per-type ingestion watermarks. Readers hold an `Arc<Generation>`
//! and never see partial updates; writers build the next generation from
//! this one plus a commit payload (see [`crate::update`]).
//!
//! Sub-structures are individually `Arc`'d so that an incremental commit
//! shares everything it did not touch. An untouched consumer is the same
//! allocation across arbitrarily many generations.
//!
//! Dense indices are stable within a generation. Only a catalog-update
//! commit renumbers them, and it remaps every consumer's event logs in the
//! same payload.

use std::sync::Arc;

use pasand_core::Domain;

use crate::entity::{Consumer, ConsumerIdx, IdMap, Product, ProductIdx};
use crate::event_type::EventTypeDescriptor;

/// Monotonically increasing id of a committed generation
pub type GenerationId = u64;

/// The buildable interior of a generation, produced by prepare phases and
/// snapshot restore.
#[derive(Debug, Clone, Default)]
pub struct GenerationParts {
    pub domain: Arc<Domain>,
    /// Product records by dense index; `None` = id known but record absent
    pub products: Vec<Option<Arc<Product>>>,
    pub product_ids: Arc<IdMap>,
    pub consumers: Vec<Arc<Consumer>>,
    pub consumer_ids: Arc<IdMap>,
    pub event_types: Arc<Vec<EventTypeDescriptor>>,
}

/// One committed snapshot of the store.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    id: GenerationId,
    pub domain: Arc<Domain>,
    pub products: Vec<Option<Arc<Product>>>,
    pub product_ids: Arc<IdMap>,
    pub consumers: Vec<Arc<Consumer>>,
    pub consumer_ids: Arc<IdMap>,
    pub event_types: Arc<Vec<EventTypeDescriptor>>,
}

impl Generation {
    /// Seal parts into a committed generation with the given id
    pub fn from_parts(id: GenerationId, parts: GenerationParts) -> Self {
        Self {
            id,
            domain: parts.domain,
            products: parts.products,
            product_ids: parts.product_ids,
            consumers: parts.consumers,
            consumer_ids: parts.consumer_ids,
            event_types: parts.event_types,
        }
    }

    /// An empty generation over a domain and event-type configuration
    pub fn empty(domain: Arc<Domain>, event_types: Vec<EventTypeDescriptor>) -> Self {
        Self {
            id: 0,
            domain,
            products: Vec::new(),
            product_ids: Arc::new(IdMap::new()),
            consumers: Vec::new(),
            consumer_ids: Arc::new(IdMap::new()),
            event_types: Arc::new(event_types),
        }
    }

    /// This generation's id
    #[inline]
    pub fn id(&self) -> GenerationId {
        self.id
    }

    /// Clone the interior for use as a prepare base
    pub fn to_parts(&self) -> GenerationParts {
        GenerationParts {
            domain: self.domain.clone(),
            products: self.products.clone(),
            product_ids: self.product_ids.clone(),
            consumers: self.consumers.clone(),
            consumer_ids: self.consumer_ids.clone(),
            event_types: self.event_types.clone(),
        }
    }

    /// Dense index of a product by external id; sentinel on miss
    #[inline]
    pub fn product_index(&self, external: i64) -> ProductIdx {
        ProductIdx(self.product_ids.index_of(external))
    }

    /// Product record at a dense index
    #[inline]
    pub fn product(&self, idx: ProductIdx) -> Option<&Arc<Product>> {
        if idx.is_sentinel() {
            return None;
        }
        self.products.get(idx.as_usize()).and_then(Option::as_ref)
    }

    /// Product record by external id
    pub fn product_by_external(&self, external: i64) -> Option<&Arc<Product>> {
        self.product(self.product_index(external))
    }

    /// Dense index of a consumer by external id; sentinel on miss
    #[inline]
    pub fn consumer_index(&self, external: i64) -> ConsumerIdx {
        ConsumerIdx(self.consumer_ids.index_of(external))
    }

    /// Consumer record at a dense index
    #[inline]
    pub fn consumer(&self, idx: ConsumerIdx) -> Option<&Arc<Consumer>> {
        if idx.is_sentinel() {
            return None;
        }
        self.consumers.get(idx.as_usize())
    }

    /// Consumer record by external id
    pub fn consumer_by_external(&self, external: i64) -> Option<&Arc<Consumer>> {
        self.consumer(self.consumer_index(external))
    }

    /// Iterate present product records with their dense indices
    pub fn iter_products(&self) -> impl Iterator<Item = (ProductIdx, &Arc<Product>)> {
        self.products
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (ProductIdx(i as u32), p)))
    }

    /// Iterate consumer records with their dense indices
    pub fn iter_consumers(&self) -> impl Iterator<Item = (ConsumerIdx, &Arc<Consumer>)> {
        self.consumers
            .iter()
            .enumerate()
            .map(|(i, c)| (ConsumerIdx(i as u32), c))
    }

    /// Event type descriptor by name
    pub fn event_type(&self, name: &str) -> Option<&EventTypeDescriptor> {
        self.event_types.iter().find(|t| t.name == name)
    }

    #[inline]
    pub fn product_count(&self) -> usize {
        self.products.iter().filter(|p| p.is_some()).count()
    }

    #[inline]
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}
