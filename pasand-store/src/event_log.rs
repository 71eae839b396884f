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

//! Columnar Event Logs
//!
//! Each consumer keeps one append-only log per configured event type. A log
//! is a set of parallel arrays: the product dense-index column plus N typed
//! metadata columns registered by the event type (timestamp, rating byte,
//! interned-string code).
//!
//! ```text
//! products:   [ 17,  3,  98,  3, ... ]   ProductIdx per event
//! timestamps: [ t0, t1,  t2, t3, ... ]   i64 epoch seconds
//! ratings:    [  5,  4,   0,  5, ... ]   u8 rating byte
//! ```
//!
//! All columns always hold exactly `len` rows. Retention trimming removes
//! the same index set from every column; remapping rewrites only the
//! product column. Appends grow geometrically (Vec doubling); `finalize`
//! trims capacity to exact size after bulk load.
//!
//! A malformed or missing metadata value is logged and replaced by the
//! column's default; the surrounding event is still ingested.

use tracing::warn;

use crate::entity::ProductIdx;

/// Kind tag of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MetadataColumnKind {
    /// i64 epoch-seconds timestamp
    Timestamp,
    /// u8 rating byte (post rating-transform)
    Rating,
    /// u32 interned-string code
    Code,
}

/// One typed metadata value, as parsed from a raw event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetadataValue {
    Timestamp(i64),
    Rating(u8),
    Code(u32),
}

impl MetadataValue {
    #[inline]
    pub fn kind(&self) -> MetadataColumnKind {
        match self {
            Self::Timestamp(_) => MetadataColumnKind::Timestamp,
            Self::Rating(_) => MetadataColumnKind::Rating,
            Self::Code(_) => MetadataColumnKind::Code,
        }
    }
}

/// A typed metadata column.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataColumn {
    Timestamps(Vec<i64>),
    Ratings(Vec<u8>),
    Codes(Vec<u32>),
}

impl MetadataColumn {
    pub fn new(kind: MetadataColumnKind) -> Self {
        match kind {
            MetadataColumnKind::Timestamp => Self::Timestamps(Vec::new()),
            MetadataColumnKind::Rating => Self::Ratings(Vec::new()),
            MetadataColumnKind::Code => Self::Codes(Vec::new()),
        }
    }

    #[inline]
    pub fn kind(&self) -> MetadataColumnKind {
        match self {
            Self::Timestamps(_) => MetadataColumnKind::Timestamp,
            Self::Ratings(_) => MetadataColumnKind::Rating,
            Self::Codes(_) => MetadataColumnKind::Code,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Timestamps(v) => v.len(),
            Self::Ratings(v) => v.len(),
            Self::Codes(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a value; a kind mismatch appends the default and reports false
    fn push(&mut self, value: MetadataValue) -> bool {
        match (self, value) {
            (Self::Timestamps(v), MetadataValue::Timestamp(t)) => v.push(t),
            (Self::Ratings(v), MetadataValue::Rating(r)) => v.push(r),
            (Self::Codes(v), MetadataValue::Code(c)) => v.push(c),
            (col, _) => {
                col.push_default();
                return false;
            }
        }
        true
    }

    /// Append the column's safe default (zero)
    fn push_default(&mut self) {
        match self {
            Self::Timestamps(v) => v.push(0),
            Self::Ratings(v) => v.push(0),
            Self::Codes(v) => v.push(0),
        }
    }

    /// Keep only rows whose mask entry is true, preserving order
    fn retain_by_mask(&mut self, mask: &[bool]) {
        match self {
            Self::Timestamps(v) => retain_masked(v, mask),
            Self::Ratings(v) => retain_masked(v, mask),
            Self::Codes(v) => retain_masked(v, mask),
        }
    }

    /// Drop the first `count` rows
    fn drop_front(&mut self, count: usize) {
        match self {
            Self::Timestamps(v) => drop(v.drain(..count)),
            Self::Ratings(v) => drop(v.drain(..count)),
            Self::Codes(v) => drop(v.drain(..count)),
        }
    }

    fn shrink_to_fit(&mut self) {
        match self {
            Self::Timestamps(v) => v.shrink_to_fit(),
            Self::Ratings(v) => v.shrink_to_fit(),
            Self::Codes(v) => v.shrink_to_fit(),
        }
    }
}

fn retain_masked<T: Copy>(values: &mut Vec<T>, mask: &[bool]) {
    let mut idx = 0;
    values.retain(|_| {
        let keep = mask.get(idx).copied().unwrap_or(true);
        idx += 1;
        keep
    });
}

/// One consumer's append-only history for one event type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    products: Vec<u32>,
    columns: Vec<MetadataColumn>,
}

impl EventLog {
    /// Create an empty log with the event type's declared metadata columns
    pub fn new(kinds: &[MetadataColumnKind]) -> Self {
        Self {
            products: Vec::new(),
            columns: kinds.iter().map(|&k| MetadataColumn::new(k)).collect(),
        }
    }

    /// Rebuild from raw parts (snapshot restore). Columns shorter or longer
    /// than the product column are a corruption error at the decode layer;
    /// this constructor trusts its caller.
    pub fn from_parts(products: Vec<u32>, columns: Vec<MetadataColumn>) -> Self {
        Self { products, columns }
    }

    /// Append one event.
    ///
    /// `values` pairs up with the declared columns by position. A missing
    /// entry or a kind mismatch is logged and the column default is stored;
    /// the event is ingested either way.
    pub fn append(&mut self, product: ProductIdx, values: &[Option<MetadataValue>]) {
        self.products.push(product.0);
        for (slot, column) in self.columns.iter_mut().enumerate() {
            match values.get(slot).copied().flatten() {
                Some(value) => {
                    if !column.push(value) {
                        warn!(
                            slot,
                            expected = ?column.kind(),
                            got = ?value.kind(),
                            "metadata kind mismatch, stored default"
                        );
                    }
                }
                None => {
                    column.push_default();
                    warn!(slot, kind = ?column.kind(), "missing metadata value, stored default");
                }
            }
        }
    }

    /// Trim capacity to exact size after a bulk load
    pub fn finalize(&mut self) {
        self.products.shrink_to_fit();
        for column in &mut self.columns {
            column.shrink_to_fit();
        }
    }

    /// Keep only the `keep` most recently appended events
    pub fn trim_keep_last(&mut self, keep: usize) {
        if self.products.len() <= keep {
            return;
        }
        let excess = self.products.len() - keep;
        self.products.drain(..excess);
        for column in &mut self.columns {
            column.drop_front(excess);
        }
    }

    /// Drop events whose timestamp is strictly older than `cutoff_ts`.
    ///
    /// Requires a Timestamp column; a log without one is left untouched
    /// (warned once per call). Returns the number of events removed.
    pub fn trim_older_than(&mut self, cutoff_ts: i64) -> usize {
        let Some(MetadataColumn::Timestamps(timestamps)) = self
            .columns
            .iter()
            .find(|c| c.kind() == MetadataColumnKind::Timestamp)
        else {
            warn!("time-window retention on a log without a timestamp column");
            return 0;
        };
        let mask: Vec<bool> = timestamps.iter().map(|&ts| ts >= cutoff_ts).collect();
        let removed = mask.iter().filter(|&&keep| !keep).count();
        if removed == 0 {
            return 0;
        }
        let mut idx = 0;
        self.products.retain(|_| {
            let keep = mask[idx];
            idx += 1;
            keep
        });
        for column in &mut self.columns {
            column.retain_by_mask(&mask);
        }
        removed
    }

    /// Rewrite every product index through a dense old→new table.
    ///
    /// Indices absent from the table (or already sentinel) become the
    /// sentinel; history is kept, not dropped. Used by catalog-update
    /// commits after renumbering.
    pub fn remap_products(&mut self, table: &[u32]) {
        let mut orphaned = 0usize;
        for idx in &mut self.products {
            if *idx == ProductIdx::SENTINEL.0 {
                continue;
            }
            let mapped = table.get(*idx as usize).copied().unwrap_or(ProductIdx::SENTINEL.0);
            if mapped == ProductIdx::SENTINEL.0 {
                orphaned += 1;
            }
            *idx = mapped;
        }
        if orphaned > 0 {
            warn!(orphaned, "event log references products absent from the new catalog");
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Product index of the event at `row`
    #[inline]
    pub fn product_at(&self, row: usize) -> Option<ProductIdx> {
        self.products.get(row).map(|&i| ProductIdx(i))
    }

    /// Raw product column
    pub fn products(&self) -> &[u32] {
        &self.products
    }

    /// Metadata column at a declared slot
    #[inline]
    pub fn column(&self, slot: usize) -> Option<&MetadataColumn> {
        self.columns.get(slot)
    }

    /// All metadata columns in declared order
    pub fn columns(&self) -> &[MetadataColumn] {
        &self.columns
    }

    /// Timestamp of the event at `row`, if a timestamp column exists
    pub fn timestamp_at(&self, row: usize) -> Option<i64> {
        self.columns.iter().find_map(|c| match c {
            MetadataColumn::Timestamps(v) => v.get(row).copied(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: &[MetadataColumnKind] =
        &[MetadataColumnKind::Timestamp, MetadataColumnKind::Rating];

    fn log_with_events(events: &[(u32, i64, u8)]) -> EventLog {
        let mut log = EventLog::new(KINDS);
        for &(product, ts, rating) in events {
            log.append(
                ProductIdx(product),
                &[
                    Some(MetadataValue::Timestamp(ts)),
                    Some(MetadataValue::Rating(rating)),
                ],
            );
        }
        log
    }

    #[test]
    fn test_append_keeps_columns_parallel() {
        let log = log_with_events(&[(1, 10, 5), (2, 20, 4)]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.product_at(1), Some(ProductIdx(2)));
        assert_eq!(log.timestamp_at(1), Some(20));
        for column in log.columns() {
            assert_eq!(column.len(), log.len());
        }
    }

    #[test]
    fn test_missing_metadata_defaults_and_ingests() {
        let mut log = EventLog::new(KINDS);
        log.append(ProductIdx(7), &[Some(MetadataValue::Timestamp(99)), None]);
        assert_eq!(log.len(), 1);
        assert_eq!(log.column(1), Some(&MetadataColumn::Ratings(vec![0])));
    }

    #[test]
    fn test_kind_mismatch_defaults_and_ingests() {
        let mut log = EventLog::new(KINDS);
        // A code where a rating is declared: default stored, event kept.
        log.append(
            ProductIdx(7),
            &[Some(MetadataValue::Timestamp(99)), Some(MetadataValue::Code(3))],
        );
        assert_eq!(log.len(), 1);
        assert_eq!(log.column(1), Some(&MetadataColumn::Ratings(vec![0])));
    }

    #[test]
    fn test_trim_keep_last_two_of_five() {
        // Worked example: a 5-entry log trimmed to "keep last 2" retains
        // exactly the 2 most recently appended entries, paired metadata
        // trimmed identically, relative order preserved.
        let mut log =
            log_with_events(&[(1, 10, 1), (2, 20, 2), (3, 30, 3), (4, 40, 4), (5, 50, 5)]);
        log.trim_keep_last(2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.products(), &[4, 5]);
        assert_eq!(log.column(0), Some(&MetadataColumn::Timestamps(vec![40, 50])));
        assert_eq!(log.column(1), Some(&MetadataColumn::Ratings(vec![4, 5])));
    }

    #[test]
    fn test_finalize_trims_capacity_not_content() {
        let mut log = log_with_events(&[(1, 10, 1), (2, 20, 2)]);
        log.finalize();
        assert_eq!(log.len(), 2);
        assert_eq!(log.products(), &[1, 2]);
        assert_eq!(log.timestamp_at(1), Some(20));
    }

    #[test]
    fn test_trim_keep_last_noop_when_short() {
        let mut log = log_with_events(&[(1, 10, 1)]);
        log.trim_keep_last(5);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_trim_older_than_removes_same_rows_everywhere() {
        let mut log = log_with_events(&[(1, 10, 1), (2, 20, 2), (3, 30, 3)]);
        let removed = log.trim_older_than(20);
        assert_eq!(removed, 1);
        assert_eq!(log.products(), &[2, 3]);
        assert_eq!(log.column(1), Some(&MetadataColumn::Ratings(vec![2, 3])));
    }

    #[test]
    fn test_remap_orphans_to_sentinel() {
        let mut log = log_with_events(&[(0, 10, 1), (1, 20, 2), (2, 30, 3)]);
        // Product 1 is gone from the new catalog; 0 and 2 renumber.
        log.remap_products(&[5, ProductIdx::SENTINEL.0, 0]);
        assert_eq!(log.products(), &[5, ProductIdx::SENTINEL.0, 0]);
        // History survives: the orphaned row is retained at the sentinel.
        assert_eq!(log.len(), 3);
    }
}
