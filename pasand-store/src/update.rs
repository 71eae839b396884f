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

//! Incremental Update Protocol
//!
//! Every mutation of the store is a two-phase object:
//!
//! - **Prepare** is a pure function of one committed generation plus new
//!   input. It allocates wholly new structures, writes no shared state, and
//!   may run for minutes concurrently with reads against the old
//!   generation.
//! - **Commit** is a short single-writer application of the staged payload,
//!   producing the next generation.
//!
//! ```text
//!            reads ───────────► Generation N ◄──────── prepare(N, input)
//!                                    │                        │
//!                                    │                   StagedDelta
//!                                    ▼                        │
//!            commit(&mut Store) ── apply ◄───────────────────┘
//!                                    │
//!            reads ───────────► Generation N+1
//! ```
//!
//! Payloads form an explicit sum type: [`CommitPayload::ReplaceAll`] swaps
//! in a complete new state (snapshot load, catalog update),
//! [`CommitPayload::MergeDelta`] folds newly observed counts and keys into
//! existing tables without discarding history, and
//! [`CommitPayload::Compound`] applies several sub-payloads as one unit.
//!
//! Every staged delta is stamped with the generation id its prepare
//! observed. Commit rejects a delta whose base is not the current
//! generation: an out-of-order commit would silently lose or double-count
//! a delta otherwise. Concurrent prepares against the same base are safe;
//! at most one of them can win the commit.

use std::collections::HashMap;
use std::sync::Arc;

use pasand_core::{
    AttributeDescriptor, AttributeKind, AttributeValue, Domain, DomainGrowth, PasandError, Result,
    StagedDictionary,
};
use tracing::{debug, error, warn};

use crate::entity::{Consumer, IdMap, Product, ProductIdx};
use crate::event_log::{EventLog, MetadataColumnKind, MetadataValue};
use crate::event_type::{EventTypeDescriptor, RetentionPolicy};
use crate::generation::{Generation, GenerationId, GenerationParts};
use crate::reader::{CatalogRow, ConsumerRow, RawAttribute, RawEvent};

// =============================================================================
// Payloads
// =============================================================================

/// A prepared, not yet committed, store mutation.
#[derive(Debug)]
pub struct StagedDelta {
    /// Generation id the prepare phase observed
    pub base: GenerationId,
    pub payload: CommitPayload,
}

/// The commit payload sum type.
#[derive(Debug)]
pub enum CommitPayload {
    /// Swap in a complete new state
    ReplaceAll(Box<GenerationParts>),
    /// Fold a delta into the current state
    MergeDelta(DeltaParts),
    /// Apply several sub-payloads as one unit
    Compound(Vec<CommitPayload>),
}

/// The incremental pieces a merge commit folds in.
#[derive(Debug, Default)]
pub struct DeltaParts {
    /// Copy-on-write replacements for consumers whose logs changed,
    /// by base dense index
    pub replaced_consumers: Vec<(u32, Arc<Consumer>)>,
    /// Consumers first seen in this delta, in index-assignment order
    pub new_consumers: Vec<Arc<Consumer>>,
    /// Occurrence-count deltas by product dense index
    pub frequency_deltas: Vec<(u32, i64)>,
    /// Ingestion watermark advances: (slot, last_event_id, last_event_ts)
    pub watermarks: Vec<(usize, i64, i64)>,
    /// Dictionary additions staged during prepare
    pub domain_growth: DomainGrowth,
}

impl DeltaParts {
    /// True when committing this delta cannot change observable state
    pub fn is_empty(&self) -> bool {
        self.replaced_consumers.is_empty()
            && self.new_consumers.is_empty()
            && self.frequency_deltas.is_empty()
            && self.watermarks.is_empty()
            && self.domain_growth.is_empty()
    }
}

// =============================================================================
// The pure transition function
// =============================================================================

/// Apply a payload to a base generation, producing the next one.
///
/// Pure: the base is only read. Shared sub-structures the payload does not
/// touch are carried over by `Arc` clone.
pub fn apply(base: &Generation, payload: CommitPayload, next_id: GenerationId) -> Generation {
    match payload {
        CommitPayload::ReplaceAll(parts) => Generation::from_parts(next_id, *parts),
        CommitPayload::MergeDelta(parts) => apply_merge(base, parts, next_id),
        CommitPayload::Compound(payloads) => {
            let mut generation = base.clone();
            for sub in payloads {
                generation = apply(&generation, sub, next_id);
            }
            generation
        }
    }
}

fn apply_merge(base: &Generation, parts: DeltaParts, next_id: GenerationId) -> Generation {
    let mut next = base.to_parts();

    if !parts.domain_growth.is_empty() {
        next.domain = Arc::new(next.domain.with_growth(parts.domain_growth));
    }

    if !parts.new_consumers.is_empty() {
        let mut ids = (*next.consumer_ids).clone();
        for consumer in parts.new_consumers {
            let idx = ids.insert(consumer.external_id);
            debug_assert_eq!(idx as usize, next.consumers.len());
            next.consumers.push(consumer);
        }
        next.consumer_ids = Arc::new(ids);
    }

    for (idx, consumer) in parts.replaced_consumers {
        match next.consumers.get_mut(idx as usize) {
            Some(slot) => *slot = consumer,
            None => warn!(idx, "merge delta replaces a consumer index out of range"),
        }
    }

    for (idx, delta) in parts.frequency_deltas {
        let Some(Some(product)) = next.products.get_mut(idx as usize) else {
            warn!(idx, "frequency delta for an absent product");
            continue;
        };
        let record = Arc::make_mut(product);
        let merged = record.frequency as i64 + delta;
        if merged < 0 {
            error!(
                product = record.external_id,
                merged, "occurrence counter went negative after merge, clamping to zero"
            );
            record.frequency = 0;
        } else {
            record.frequency = merged as u64;
        }
    }

    if !parts.watermarks.is_empty() {
        let mut types = (*next.event_types).clone();
        for (slot, last_id, last_ts) in parts.watermarks {
            match types.get_mut(slot) {
                Some(descriptor) => {
                    descriptor.last_event_id = descriptor.last_event_id.max(last_id);
                    descriptor.last_event_ts = descriptor.last_event_ts.max(last_ts);
                }
                None => warn!(slot, "watermark advance for an unknown event type slot"),
            }
        }
        next.event_types = Arc::new(types);
    }

    Generation::from_parts(next_id, next)
}

// =============================================================================
// Prepare: event ingestion
// =============================================================================

/// Stage an incremental batch update: new events, grouped per event type
/// slot, folded into copy-on-write consumer replacements.
///
/// Ingestion watermarks advance to the maximum event id/timestamp seen per
/// slot. Empty input stages an empty delta whose commit leaves the state
/// observably identical.
pub fn prepare_event_batches(
    base: &Generation,
    batches: Vec<(usize, Vec<RawEvent>)>,
) -> Result<StagedDelta> {
    prepare_events_inner(base, batches, None, true)
}

/// Stage an update limited to a single consumer's events.
///
/// Events belonging to other consumers are skipped. Watermarks do not
/// advance: on-demand refresh of one consumer must not make the global
/// incremental cycle skip those events for everyone else.
pub fn prepare_consumer_update(
    base: &Generation,
    consumer_external: i64,
    batches: Vec<(usize, Vec<RawEvent>)>,
) -> Result<StagedDelta> {
    prepare_events_inner(base, batches, Some(consumer_external), false)
}

struct WorkingConsumer {
    base_index: Option<u32>,
    consumer: Consumer,
}

fn prepare_events_inner(
    base: &Generation,
    batches: Vec<(usize, Vec<RawEvent>)>,
    only_consumer: Option<i64>,
    advance_watermarks: bool,
) -> Result<StagedDelta> {
    let slot_count = base.event_types.len();
    let metadata_slot = base.domain.metadata_slot();
    let mut metadata_stage = base
        .domain
        .dictionary(metadata_slot)
        .expect("domain always has a metadata dictionary")
        .stage();

    // Working copies keyed by external id; touch order kept for
    // deterministic index assignment of new consumers.
    let mut working: HashMap<i64, WorkingConsumer> = HashMap::new();
    let mut touch_order: Vec<i64> = Vec::new();
    let mut frequency: HashMap<u32, i64> = HashMap::new();
    let mut watermarks: Vec<(usize, i64, i64)> = Vec::new();

    for (slot, events) in batches {
        let descriptor = base
            .event_types
            .get(slot)
            .ok_or_else(|| PasandError::UnknownEventType(format!("slot {slot}")))?;
        let mut max_id = descriptor.last_event_id;
        let mut max_ts = descriptor.last_event_ts;
        let mut ingested = false;

        for event in &events {
            if let Some(only) = only_consumer {
                if event.external_consumer_id != only {
                    continue;
                }
            }
            max_id = max_id.max(event.external_event_id);
            max_ts = max_ts.max(event.timestamp);

            let product = ProductIdx(base.product_ids.index_of(event.external_product_id));
            if product.is_sentinel() {
                // Referential gaps are expected under live ingestion.
                debug!(
                    product = event.external_product_id,
                    "event references an unknown product, skipped"
                );
                continue;
            }

            let entry = working.entry(event.external_consumer_id).or_insert_with(|| {
                touch_order.push(event.external_consumer_id);
                let base_idx = base.consumer_ids.index_of(event.external_consumer_id);
                if base_idx == crate::entity::SENTINEL_INDEX {
                    WorkingConsumer {
                        base_index: None,
                        consumer: new_consumer(event.external_consumer_id, &base.event_types),
                    }
                } else {
                    let mut consumer = (*base.consumers[base_idx as usize]).clone();
                    ensure_log_slots(&mut consumer, &base.event_types, slot_count);
                    WorkingConsumer { base_index: Some(base_idx), consumer }
                }
            });

            let values = parse_metadata(descriptor, event, &mut metadata_stage);
            entry.consumer.logs[slot].append(product, &values);
            *frequency.entry(product.0).or_insert(0) += 1;
            ingested = true;
        }

        // Retention runs against the advanced watermark so that replayed
        // historical streams trim identically to live ones.
        match descriptor.retention {
            RetentionPolicy::KeepAll => {}
            RetentionPolicy::KeepLast(keep) => {
                for entry in working.values_mut() {
                    entry.consumer.logs[slot].trim_keep_last(keep);
                }
            }
            RetentionPolicy::KeepWithin { seconds } => {
                let cutoff = max_ts.saturating_sub(seconds);
                for entry in working.values_mut() {
                    entry.consumer.logs[slot].trim_older_than(cutoff);
                }
            }
        }

        if advance_watermarks && ingested {
            watermarks.push((slot, max_id, max_ts));
        }
    }

    let mut replaced = Vec::new();
    let mut fresh = Vec::new();
    for external in touch_order {
        let Some(mut entry) = working.remove(&external) else { continue };
        // Committed copies are immutable until the next copy-on-write
        // clone, so growth slack can be trimmed now.
        for log in &mut entry.consumer.logs {
            log.finalize();
        }
        match entry.base_index {
            Some(idx) => replaced.push((idx, Arc::new(entry.consumer))),
            None => fresh.push(Arc::new(entry.consumer)),
        }
    }

    let mut domain_growth: DomainGrowth = Vec::new();
    if metadata_stage.staged_count() > 0 {
        domain_growth.push((metadata_slot, metadata_stage.into_additions()));
    }

    let mut frequency_deltas: Vec<(u32, i64)> = frequency.into_iter().collect();
    frequency_deltas.sort_unstable();

    Ok(StagedDelta {
        base: base.id(),
        payload: CommitPayload::MergeDelta(DeltaParts {
            replaced_consumers: replaced,
            new_consumers: fresh,
            frequency_deltas,
            watermarks,
            domain_growth,
        }),
    })
}

fn new_consumer(external_id: i64, event_types: &[EventTypeDescriptor]) -> Consumer {
    let mut consumer = Consumer { external_id, logs: Vec::new() };
    ensure_log_slots(&mut consumer, event_types, event_types.len());
    consumer
}

fn ensure_log_slots(
    consumer: &mut Consumer,
    event_types: &[EventTypeDescriptor],
    slot_count: usize,
) {
    while consumer.logs.len() < slot_count {
        let slot = consumer.logs.len();
        let log = event_types
            .iter()
            .find(|t| t.slot == slot)
            .map(|t| EventLog::new(&t.columns))
            .unwrap_or_default();
        consumer.logs.push(log);
    }
}

fn parse_metadata(
    descriptor: &EventTypeDescriptor,
    event: &RawEvent,
    metadata_stage: &mut StagedDictionary<'_>,
) -> Vec<Option<MetadataValue>> {
    descriptor
        .columns
        .iter()
        .enumerate()
        .map(|(column, kind)| {
            let raw = event.values.get(column).and_then(|v| v.as_deref());
            let value = match kind {
                MetadataColumnKind::Timestamp => match raw {
                    None => MetadataValue::Timestamp(event.timestamp),
                    Some(s) => match s.parse::<i64>() {
                        Ok(ts) => MetadataValue::Timestamp(ts),
                        Err(_) => {
                            warn!(column, value = s, "malformed timestamp, using event time");
                            MetadataValue::Timestamp(event.timestamp)
                        }
                    },
                },
                MetadataColumnKind::Rating => match raw {
                    None => MetadataValue::Rating(0),
                    Some(s) => match s.parse::<f32>() {
                        Ok(r) => MetadataValue::Rating(descriptor.rating_transform.apply(r)),
                        Err(_) => {
                            warn!(column, value = s, "malformed rating, stored default");
                            MetadataValue::Rating(0)
                        }
                    },
                },
                MetadataColumnKind::Code => match raw {
                    None => MetadataValue::Code(0),
                    Some(s) => MetadataValue::Code(metadata_stage.get_or_intern(s)),
                },
            };
            Some(value)
        })
        .collect()
}

// =============================================================================
// Prepare: catalog
// =============================================================================

/// Stage a full initial load: schema-built domain, catalog, consumers with
/// empty logs.
pub fn prepare_full_load(
    base: &Generation,
    catalog: Vec<CatalogRow>,
    consumer_rows: Vec<ConsumerRow>,
) -> Result<StagedDelta> {
    let (domain, products, product_ids) = build_catalog(&base.domain, &catalog, None);

    let mut consumer_ids = IdMap::with_capacity(consumer_rows.len());
    let mut consumers = Vec::with_capacity(consumer_rows.len());
    for row in consumer_rows {
        let idx = consumer_ids.insert(row.external_id);
        if (idx as usize) < consumers.len() {
            warn!(consumer = row.external_id, "duplicate consumer row in initial load");
            continue;
        }
        consumers.push(Arc::new(new_consumer(row.external_id, &base.event_types)));
    }

    Ok(StagedDelta {
        base: base.id(),
        payload: CommitPayload::ReplaceAll(Box::new(GenerationParts {
            domain: Arc::new(domain),
            products,
            product_ids: Arc::new(product_ids),
            consumers,
            consumer_ids: Arc::new(consumer_ids),
            event_types: base.event_types.clone(),
        })),
    })
}

/// Stage a catalog update: rebuild the product table from the diffed
/// catalog, renumber dense indices, and remap every consumer's event logs
/// in the same payload.
///
/// A product present in history but missing from the new catalog keeps a
/// sentinel index in the logs (warned) so historical counts survive.
pub fn prepare_catalog_update(base: &Generation, rows: Vec<CatalogRow>) -> Result<StagedDelta> {
    let (domain, products, product_ids) = build_catalog(&base.domain, &rows, Some(base));

    // Dense old→new remap table; ids absent from the new catalog go to the
    // sentinel.
    let old_externals = base.product_ids.externals();
    let mut remap = Vec::with_capacity(old_externals.len());
    let mut dropped = 0usize;
    for &external in old_externals {
        let new_idx = product_ids.index_of(external);
        if new_idx == crate::entity::SENTINEL_INDEX {
            dropped += 1;
        }
        remap.push(new_idx);
    }
    if dropped > 0 {
        warn!(dropped, "products missing from the new catalog, history keeps sentinel indices");
    }

    let consumers: Vec<Arc<Consumer>> = base
        .consumers
        .iter()
        .map(|consumer| {
            let mut remapped = (**consumer).clone();
            for log in &mut remapped.logs {
                log.remap_products(&remap);
            }
            Arc::new(remapped)
        })
        .collect();

    Ok(StagedDelta {
        base: base.id(),
        payload: CommitPayload::ReplaceAll(Box::new(GenerationParts {
            domain: Arc::new(domain),
            products,
            product_ids: Arc::new(product_ids),
            consumers,
            consumer_ids: base.consumer_ids.clone(),
            event_types: base.event_types.clone(),
        })),
    })
}

/// Build products + id map from catalog rows, interning attribute strings
/// against staged copies of the base domain's dictionaries. When `carry` is
/// given, occurrence counters carry over by external id.
fn build_catalog(
    base_domain: &Domain,
    rows: &[CatalogRow],
    carry: Option<&Generation>,
) -> (Domain, Vec<Option<Arc<Product>>>, IdMap) {
    let mut stages: Vec<StagedDictionary<'_>> = base_domain
        .dictionaries()
        .iter()
        .map(|dict| dict.stage())
        .collect();

    let mut product_ids = IdMap::with_capacity(rows.len());
    let mut products: Vec<Option<Arc<Product>>> = Vec::with_capacity(rows.len());
    for row in rows {
        let idx = product_ids.insert(row.external_id);
        if (idx as usize) < products.len() {
            warn!(product = row.external_id, "duplicate catalog row, first occurrence kept");
            continue;
        }
        let frequency = carry
            .and_then(|g| g.product_by_external(row.external_id))
            .map(|p| p.frequency)
            .unwrap_or(0);
        let mut attributes: Vec<Option<AttributeValue>> =
            Vec::with_capacity(base_domain.attr_count());
        for (attr_idx, descriptor) in base_domain.descriptors().enumerate() {
            let slot = base_domain.dict_slot(attr_idx);
            let encoded = row
                .attributes
                .get(attr_idx)
                .and_then(Clone::clone)
                .and_then(|raw| encode_attribute(descriptor, slot, &mut stages, raw));
            attributes.push(encoded);
        }
        if row.attributes.len() > base_domain.attr_count() {
            warn!(
                product = row.external_id,
                extra = row.attributes.len() - base_domain.attr_count(),
                "catalog row carries more attributes than the schema, extras ignored"
            );
        }
        products.push(Some(Arc::new(Product {
            external_id: row.external_id,
            public_id: row.public_id.clone(),
            kind: row.kind,
            attributes,
            frequency,
        })));
    }

    let growth: DomainGrowth = stages
        .into_iter()
        .enumerate()
        .filter(|(_, stage)| stage.staged_count() > 0)
        .map(|(slot, stage)| (slot, stage.into_additions()))
        .collect();
    let domain = base_domain.with_growth(growth);

    (domain, products, product_ids)
}

fn encode_attribute(
    descriptor: &AttributeDescriptor,
    slot: Option<usize>,
    stages: &mut [StagedDictionary<'_>],
    raw: RawAttribute,
) -> Option<AttributeValue> {
    let mismatch = |raw: &RawAttribute| {
        warn!(
            attribute = descriptor.name.as_str(),
            expected = ?descriptor.kind,
            got = ?raw,
            "attribute value kind mismatch, treated as absent"
        );
        None
    };
    match (descriptor.kind, raw) {
        (AttributeKind::Bool, RawAttribute::Bool(b)) => Some(AttributeValue::Bool(b)),
        (AttributeKind::Int, RawAttribute::Int(v)) => Some(AttributeValue::Int(v)),
        (AttributeKind::Long, RawAttribute::Long(v)) => Some(AttributeValue::Long(v)),
        (AttributeKind::Float, RawAttribute::Float(v)) => Some(AttributeValue::Float(v)),
        (AttributeKind::Text, RawAttribute::Text(s)) => {
            let stage = &mut stages[slot?];
            Some(AttributeValue::Text(stage.get_or_intern(&s)))
        }
        (AttributeKind::TextSet, RawAttribute::TextSet(values)) => {
            let stage = &mut stages[slot?];
            let mut codes: Vec<u32> = values.iter().map(|v| stage.get_or_intern(v)).collect();
            codes.sort_unstable();
            codes.dedup();
            Some(AttributeValue::TextSet(codes))
        }
        (AttributeKind::RankedText, RawAttribute::RankedText(pairs)) => {
            let stage = &mut stages[slot?];
            Some(AttributeValue::RankedText(
                pairs
                    .iter()
                    .map(|(value, rank)| (stage.get_or_intern(value), *rank))
                    .collect(),
            ))
        }
        (_, raw) => mismatch(&raw),
    }
}
