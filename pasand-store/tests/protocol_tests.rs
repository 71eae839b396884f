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

//! End-to-end update protocol and snapshot tests driven through a mock
//! reader: bootstrap, incremental cycles, catalog diffs, and the durable
//! round trip.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom};
use std::sync::Arc;

use pasand_core::{AttributeDescriptor, AttributeKind, DomainSchema, Result};
use pasand_store::{
    read_snapshot, write_snapshot, CatalogRow, ConsumerRow, EventTypeDescriptor, Generation,
    MetadataColumnKind, RatingTransform, RawAttribute, RawEvent, Reader, RetentionPolicy, Store,
};

// =============================================================================
// Mock reader
// =============================================================================

struct VecReader {
    schema: DomainSchema,
    catalog: Vec<CatalogRow>,
    consumers: Vec<ConsumerRow>,
    /// Queued event batches per event type slot
    batches: Vec<VecDeque<Vec<RawEvent>>>,
    diff: Vec<CatalogRow>,
}

impl VecReader {
    fn new(schema: DomainSchema, catalog: Vec<CatalogRow>, consumers: Vec<ConsumerRow>) -> Self {
        Self { schema, catalog, consumers, batches: Vec::new(), diff: Vec::new() }
    }

    fn queue_batch(&mut self, slot: usize, events: Vec<RawEvent>) {
        while self.batches.len() <= slot {
            self.batches.push(VecDeque::new());
        }
        self.batches[slot].push_back(events);
    }
}

impl Reader for VecReader {
    fn schema(&mut self) -> Result<DomainSchema> {
        Ok(self.schema.clone())
    }

    fn load_catalog(&mut self) -> Result<Vec<CatalogRow>> {
        Ok(self.catalog.clone())
    }

    fn load_consumers(&mut self) -> Result<Vec<ConsumerRow>> {
        Ok(self.consumers.clone())
    }

    fn next_event_batch(&mut self, descriptor: &EventTypeDescriptor) -> Result<Vec<RawEvent>> {
        Ok(self
            .batches
            .get_mut(descriptor.slot)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }

    fn catalog_diff(&mut self) -> Result<Vec<CatalogRow>> {
        Ok(self.diff.clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn movie_schema() -> DomainSchema {
    DomainSchema {
        attributes: vec![
            AttributeDescriptor { name: "title".into(), kind: AttributeKind::Text },
            AttributeDescriptor { name: "genres".into(), kind: AttributeKind::TextSet },
            AttributeDescriptor { name: "year".into(), kind: AttributeKind::Int },
        ],
    }
}

fn movie(external: i64, title: &str, genres: &[&str], year: i32) -> CatalogRow {
    CatalogRow {
        external_id: external,
        public_id: format!("m-{external}"),
        kind: 1,
        attributes: vec![
            Some(RawAttribute::Text(title.into())),
            Some(RawAttribute::TextSet(genres.iter().map(|g| g.to_string()).collect())),
            Some(RawAttribute::Int(year)),
        ],
    }
}

fn rate_event(id: i64, consumer: i64, product: i64, ts: i64, rating: &str) -> RawEvent {
    RawEvent {
        external_event_id: id,
        external_consumer_id: consumer,
        external_product_id: product,
        timestamp: ts,
        values: vec![None, Some(rating.to_owned())],
    }
}

fn rating_type() -> EventTypeDescriptor {
    let mut descriptor = EventTypeDescriptor::new(
        "rate",
        0,
        vec![MetadataColumnKind::Timestamp, MetadataColumnKind::Rating],
    );
    descriptor.rating_transform = RatingTransform::Linear { scale: 50.0, offset: -50.0 };
    descriptor.retention = RetentionPolicy::KeepLast(100);
    descriptor
}

fn bootstrapped() -> (Store, VecReader) {
    let mut reader = VecReader::new(
        movie_schema(),
        vec![
            movie(1, "Alpha", &["comedy"], 2001),
            movie(2, "Beta", &["drama"], 2002),
            movie(3, "Gamma", &["comedy", "drama"], 2003),
        ],
        vec![ConsumerRow { external_id: 100 }, ConsumerRow { external_id: 101 }],
    );
    let store = Store::bootstrap(&mut reader, vec![rating_type()]).unwrap();
    (store, reader)
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_bootstrap_then_incremental_cycles() {
    let (mut store, mut reader) = bootstrapped();
    let generation = store.current();
    assert_eq!(generation.id(), 1);
    assert_eq!(generation.product_count(), 3);
    assert_eq!(generation.consumer_count(), 2);

    reader.queue_batch(
        0,
        vec![
            rate_event(10, 100, 1, 1_000, "5.0"),
            rate_event(11, 100, 2, 1_001, "3.0"),
            rate_event(12, 101, 1, 1_002, "4.0"),
        ],
    );
    let id = store.ingest_batch(&mut reader).unwrap();
    assert_eq!(id, 2);

    let generation = store.current();
    assert_eq!(generation.consumer_by_external(100).unwrap().logs[0].len(), 2);
    assert_eq!(generation.consumer_by_external(101).unwrap().logs[0].len(), 1);
    assert_eq!(generation.product_by_external(1).unwrap().frequency, 2);
    assert_eq!(generation.event_types[0].last_event_id, 12);

    // A second cycle with no queued events commits an observably identical
    // state.
    let id = store.ingest_batch(&mut reader).unwrap();
    assert_eq!(id, 3);
    let next = store.current();
    assert_eq!(next.event_types[0].last_event_id, 12);
    assert!(Arc::ptr_eq(
        generation.consumer_by_external(100).unwrap(),
        next.consumer_by_external(100).unwrap()
    ));
}

#[test]
fn test_catalog_diff_preserves_survivors_and_history() {
    let (mut store, mut reader) = bootstrapped();
    reader.queue_batch(0, vec![rate_event(10, 100, 2, 1_000, "5.0")]);
    store.ingest_batch(&mut reader).unwrap();

    // Product 1 disappears; 4 arrives; 2 and 3 survive reordered.
    reader.diff = vec![
        movie(4, "Delta", &["drama"], 2004),
        movie(3, "Gamma", &["comedy", "drama"], 2003),
        movie(2, "Beta", &["drama"], 2002),
    ];
    store.refresh_catalog(&mut reader).unwrap();
    let generation = store.current();

    // Survivors keep their logical record and carried frequency.
    let beta = generation.product_by_external(2).unwrap();
    assert_eq!(beta.public_id, "m-2");
    assert_eq!(beta.frequency, 1);
    // The removed id resolves to the sentinel.
    assert!(generation.product_index(1).is_sentinel());
    // History still references the surviving product under its new index.
    let log = &generation.consumer_by_external(100).unwrap().logs[0];
    assert_eq!(log.product_at(0), Some(generation.product_index(2)));
}

#[test]
fn test_snapshot_round_trip() {
    let (mut store, mut reader) = bootstrapped();
    reader.queue_batch(
        0,
        vec![rate_event(10, 100, 1, 1_000, "5.0"), rate_event(11, 101, 3, 1_005, "2.0")],
    );
    store.ingest_batch(&mut reader).unwrap();
    let generation = store.current();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.snap");
    let mut file = BufWriter::new(File::create(&path).unwrap());
    write_snapshot(&generation, &mut file).unwrap();
    drop(file);

    let mut file = BufReader::new(File::open(&path).unwrap());
    let parts = read_snapshot(&mut file, &movie_schema(), vec![rating_type()]).unwrap();
    let restored = Generation::from_parts(generation.id(), parts);

    // Identical id maps.
    assert_eq!(restored.product_ids.externals(), generation.product_ids.externals());
    assert_eq!(restored.consumer_ids.externals(), generation.consumer_ids.externals());
    // Identical attribute values and counters.
    for (idx, product) in generation.iter_products() {
        let twin = restored.product(idx).unwrap();
        assert_eq!(twin.attributes, product.attributes);
        assert_eq!(twin.frequency, product.frequency);
        assert_eq!(twin.public_id, product.public_id);
    }
    // Identical dictionaries.
    for (slot, dictionary) in generation.domain.dictionaries().iter().enumerate() {
        let twin = restored.domain.dictionary(slot).unwrap();
        assert_eq!(twin.len(), dictionary.len());
        for (code, value) in dictionary.iter() {
            assert_eq!(twin.resolve(code), Some(value));
        }
    }
    // Identical logs and watermarks.
    for (idx, consumer) in generation.iter_consumers() {
        assert_eq!(restored.consumer(idx).unwrap().logs, consumer.logs);
    }
    assert_eq!(restored.event_types[0].last_event_id, 11);
    assert_eq!(restored.event_types[0].last_event_ts, 1_005);

    // The restored generation keeps serving.
    let store = Store::from_generation(restored);
    assert!(store.current().product_by_external(3).is_some());
}

#[test]
fn test_snapshot_rejects_event_type_mismatch() {
    let (store, _) = bootstrapped();
    let mut buf = Vec::new();
    write_snapshot(&store.current(), &mut buf).unwrap();
    let mut cursor = std::io::Cursor::new(buf);
    cursor.seek(SeekFrom::Start(0)).unwrap();
    let err = read_snapshot(&mut cursor, &movie_schema(), Vec::new()).unwrap_err();
    assert!(matches!(err, pasand_core::PasandError::SchemaMismatch(_)));
}

#[test]
fn test_time_window_retention_over_cycles() {
    let mut reader = VecReader::new(
        movie_schema(),
        vec![movie(1, "Alpha", &["comedy"], 2001)],
        vec![ConsumerRow { external_id: 100 }],
    );
    let mut descriptor = EventTypeDescriptor::new(
        "view",
        0,
        vec![MetadataColumnKind::Timestamp],
    );
    descriptor.retention = RetentionPolicy::KeepWithin { seconds: 50 };
    let mut store = Store::bootstrap(&mut reader, vec![descriptor]).unwrap();

    let view = |id: i64, ts: i64| RawEvent {
        external_event_id: id,
        external_consumer_id: 100,
        external_product_id: 1,
        timestamp: ts,
        values: vec![None],
    };
    reader.queue_batch(0, vec![view(1, 100), view(2, 120), view(3, 180)]);
    store.ingest_batch(&mut reader).unwrap();

    // Watermark is 180; the window keeps events at ts >= 130.
    let current = store.current();
    let log = &current.consumer_by_external(100).unwrap().logs[0];
    assert_eq!(log.len(), 1);
    assert_eq!(log.timestamp_at(0), Some(180));
}
