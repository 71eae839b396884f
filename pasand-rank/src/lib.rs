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

//! PasandDB Ranking
//!
//! The scoring plugin contract and the constrained top-K selection
//! pipeline.
//!
//! - [`score`]: the `Scorer`/`ScorerState` contract, the similarity bucket
//!   arena, and the bundled reference scorers
//! - [`params`]: per-request selection parameters from a flat string map
//! - [`select`]: the strict/relaxed/forced quota pipeline

pub mod params;
pub mod score;
pub mod select;

pub use params::{SelectionParams, DEFAULT_MAX_ITEMS};
pub use score::{
    BucketArena, CandidateBuilder, CompositeScorer, CooccurrenceScorer, FrequencyScorer,
    ScoredCandidate, Scorer, ScorerDelta, ScorerState,
};
pub use select::{normalized_title, select, RankingMode};
