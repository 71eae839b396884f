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

//! PasandDB Store
//!
//! The indexed entity/event store and its incremental update protocol.
//!
//! - **Entities**: dense-indexed product and consumer records with
//!   bidirectional external-id maps ([`entity`])
//! - **Event logs**: per-consumer, per-type append-only columnar history
//!   with retention and remapping ([`event_log`], [`event_type`])
//! - **Generations**: immutable committed snapshots readers never block on
//!   ([`generation`])
//! - **Updates**: pure prepare phases staging `ReplaceAll` / `MergeDelta` /
//!   `Compound` payloads, applied by a single-writer commit ([`update`],
//!   [`store`])
//! - **Snapshots**: the sequential durable stream ([`snapshot`])
//! - **Reader**: the pull-only raw-row collaborator boundary ([`reader`])

pub mod entity;
pub mod event_log;
pub mod event_type;
pub mod generation;
pub mod reader;
pub mod snapshot;
pub mod store;
pub mod update;

pub use entity::{Consumer, ConsumerIdx, IdMap, Product, ProductIdx, SENTINEL_INDEX};
pub use event_log::{EventLog, MetadataColumn, MetadataColumnKind, MetadataValue};
pub use event_type::{EventTypeDescriptor, RatingTransform, RetentionPolicy};
pub use generation::{Generation, GenerationId, GenerationParts};
pub use reader::{CatalogRow, ConsumerRow, RawAttribute, RawEvent, Reader};
pub use snapshot::{read_snapshot, write_snapshot};
pub use store::Store;
pub use update::{
    apply, prepare_catalog_update, prepare_consumer_update, prepare_event_batches,
    prepare_full_load, CommitPayload, DeltaParts, StagedDelta,
};
