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

//! The Reader Collaborator Boundary
//!
//! The store never talks to a database itself. A [`Reader`] implementation
//! supplies raw rows on demand: the schema descriptor, the initial full
//! catalog and consumer list, bounded batches of new events per type, and a
//! full catalog diff for product updates. The engine owns all semantics;
//! the reader owns IO.

use pasand_core::{DomainSchema, Result};
use serde::{Deserialize, Serialize};

use crate::event_type::EventTypeDescriptor;

/// An attribute value as it arrives from the reader, strings not yet
/// dictionary-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawAttribute {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f64),
    Text(String),
    TextSet(Vec<String>),
    /// (value, frequency rank) pairs, most frequent first
    RankedText(Vec<(String, u32)>),
}

/// One catalog product row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRow {
    pub external_id: i64,
    pub public_id: String,
    pub kind: u8,
    /// Values in domain schema order; `None` = attribute absent
    pub attributes: Vec<Option<RawAttribute>>,
}

/// One consumer row from the initial load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConsumerRow {
    pub external_id: i64,
}

/// One raw event row.
///
/// `values` aligns positionally with the event type's declared metadata
/// columns. Entries are raw strings; parsing (and the logged-and-defaulted
/// malformed path) happens in the prepare phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub external_event_id: i64,
    pub external_consumer_id: i64,
    pub external_product_id: i64,
    pub timestamp: i64,
    pub values: Vec<Option<String>>,
}

/// Pull-only source of raw store input.
pub trait Reader {
    /// The attribute schema used to build the domain
    fn schema(&mut self) -> Result<DomainSchema>;

    /// The full product catalog (initial load)
    fn load_catalog(&mut self) -> Result<Vec<CatalogRow>>;

    /// The full consumer list (initial load)
    fn load_consumers(&mut self) -> Result<Vec<ConsumerRow>>;

    /// One bounded batch of events newer than the descriptor's watermark,
    /// at most `descriptor.batch_size` rows, ascending by external event id
    fn next_event_batch(&mut self, descriptor: &EventTypeDescriptor) -> Result<Vec<RawEvent>>;

    /// The full post-diff catalog for a product update
    fn catalog_diff(&mut self) -> Result<Vec<CatalogRow>>;
}
