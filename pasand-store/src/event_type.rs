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

//! Event Type Descriptors
//!
//! A configured consumer-activity category: its storage slot in every
//! consumer's log vector, ingestion watermarks (last processed external
//! event id and timestamp), batch size for incremental pulls, the rating
//! transform applied before storage, the retention policy, and the declared
//! metadata columns.
//!
//! Time-window retention trims relative to the per-type `last_event_ts`
//! watermark, not wall clock, so replaying a historical stream behaves
//! exactly like live ingestion.

use serde::{Deserialize, Serialize};

use crate::event_log::MetadataColumnKind;

/// Transform applied to a raw rating before it is stored as a byte.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RatingTransform {
    /// Store the raw value as-is (clamped)
    Identity,
    /// `raw * scale + offset` (clamped)
    Linear { scale: f32, offset: f32 },
}

impl RatingTransform {
    /// Apply the transform and clamp the result to the rating byte range
    pub fn apply(&self, raw: f32) -> u8 {
        let value = match self {
            Self::Identity => raw,
            Self::Linear { scale, offset } => raw * scale + offset,
        };
        if value.is_nan() {
            return 0;
        }
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// Per-type event retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RetentionPolicy {
    /// Never trim
    KeepAll,
    /// Keep only the N most recently appended events
    KeepLast(usize),
    /// Keep events newer than `last_event_ts - seconds`
    KeepWithin { seconds: i64 },
}

/// Configuration and ingestion state for one event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTypeDescriptor {
    /// Type name, e.g. "view" or "purchase"
    pub name: String,
    /// Storage slot into every consumer's log vector
    pub slot: usize,
    /// External id of the last processed event
    pub last_event_id: i64,
    /// Timestamp of the last processed event
    pub last_event_ts: i64,
    /// Bound on events pulled per incremental batch
    pub batch_size: usize,
    /// Transform from raw rating to stored byte
    pub rating_transform: RatingTransform,
    /// Retention policy for consumer logs of this type
    pub retention: RetentionPolicy,
    /// Declared metadata columns, in storage order
    pub columns: Vec<MetadataColumnKind>,
}

impl EventTypeDescriptor {
    /// A descriptor with empty watermarks and default knobs
    pub fn new(name: impl Into<String>, slot: usize, columns: Vec<MetadataColumnKind>) -> Self {
        Self {
            name: name.into(),
            slot,
            last_event_id: 0,
            last_event_ts: 0,
            batch_size: 10_000,
            rating_transform: RatingTransform::Identity,
            retention: RetentionPolicy::KeepAll,
            columns,
        }
    }

    /// The time-window cutoff for [`RetentionPolicy::KeepWithin`], if that
    /// policy is active
    pub fn retention_cutoff(&self) -> Option<i64> {
        match self.retention {
            RetentionPolicy::KeepWithin { seconds } => {
                Some(self.last_event_ts.saturating_sub(seconds))
            }
            _ => None,
        }
    }
}
