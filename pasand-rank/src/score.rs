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

//! Scoring Plugin Contract
//!
//! Scoring algorithms are interchangeable numerical modules behind one
//! narrow contract: annotate (consumer, candidate) pairs with a score, an
//! optional machine-readable explanation, and weighted human-readable
//! "pretty" explanations; answer "products similar to a seed set".
//!
//! A plugin attaches to a generation exactly once via [`Scorer::attach`],
//! yielding its [`ScorerState`]. From then on it maintains that state with
//! the same prepare/commit discipline as the store: [`ScorerState::prepare`]
//! is pure and may be slow, [`ScorerState::commit`] is a cheap swap. A
//! composite scorer wraps its children's deltas into one compound delta so
//! all sub-states move together.
//!
//! Symmetric similarity structures live in a [`BucketArena`]: a flat arena
//! of link lists keyed by product dense index, updated explicitly on both
//! sides. No cyclic object graphs.

use std::any::Any;

use pasand_core::Result;
use pasand_store::{ConsumerIdx, Generation, ProductIdx};
use smallvec::SmallVec;
use tracing::debug;

/// One candidate annotated (or about to be annotated) with a score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub product: ProductIdx,
    pub external_id: i64,
    /// Presentation title, used for de-duplication
    pub title: String,
    /// Tags the selection quotas apply to
    pub tags: SmallVec<[String; 4]>,
    pub score: f64,
    /// Machine-readable explanation
    pub explanation: Option<String>,
    /// (weight, text) human-readable explanations
    pub pretty: Vec<(f32, String)>,
}

/// A staged scorer-state delta. Concrete types downcast through `as_any`.
pub trait ScorerDelta: Send {
    fn as_any(self: Box<Self>) -> Box<dyn Any>;
}

/// A scoring algorithm factory: one-time attachment to a generation.
pub trait Scorer {
    /// Plugin name for logs and composition
    fn name(&self) -> &str;

    /// Build this plugin's state from a committed generation. Called once;
    /// steady-state updates go through the state's prepare/commit.
    fn attach(&self, generation: &Generation) -> Result<Box<dyn ScorerState>>;
}

/// Attached, serving state of a scoring plugin.
pub trait ScorerState: Send {
    /// Annotate one consumer's candidate batch in place
    fn score_batch(
        &self,
        generation: &Generation,
        consumer: ConsumerIdx,
        candidates: &mut [ScoredCandidate],
    );

    /// Products similar to a fixed seed set, best first
    fn similar(
        &self,
        generation: &Generation,
        seeds: &[ProductIdx],
        limit: usize,
    ) -> Vec<ScoredCandidate>;

    /// Stage this plugin's incremental update against a newer generation.
    /// Pure; runs concurrently with scoring against the old state.
    fn prepare(&self, generation: &Generation) -> Box<dyn ScorerDelta>;

    /// Fold a staged delta in. Cheap; the only mutating call.
    fn commit(&mut self, delta: Box<dyn ScorerDelta>);

    /// Annotate a batch grouped by consumer
    fn score_all(
        &self,
        generation: &Generation,
        groups: &mut [(ConsumerIdx, Vec<ScoredCandidate>)],
    ) {
        for (consumer, candidates) in groups {
            self.score_batch(generation, *consumer, candidates);
        }
    }
}

// =============================================================================
// Bucket arena
// =============================================================================

/// Flat arena of symmetric similarity buckets keyed by product dense index.
///
/// A link between A and B is stored in both buckets; both sides are
/// updated by the same [`BucketArena::link`] call, so the symmetry
/// invariant holds by construction.
#[derive(Debug, Clone, Default)]
pub struct BucketArena {
    buckets: Vec<Vec<(u32, f32)>>,
}

impl BucketArena {
    pub fn new(capacity: usize) -> Self {
        Self { buckets: vec![Vec::new(); capacity] }
    }

    /// Add `weight` to the symmetric link between `a` and `b`.
    ///
    /// Self-links and out-of-range ids are ignored.
    pub fn link(&mut self, a: u32, b: u32, weight: f32) {
        if a == b || a as usize >= self.buckets.len() || b as usize >= self.buckets.len() {
            return;
        }
        Self::accumulate(&mut self.buckets[a as usize], b, weight);
        Self::accumulate(&mut self.buckets[b as usize], a, weight);
    }

    fn accumulate(bucket: &mut Vec<(u32, f32)>, neighbor: u32, weight: f32) {
        match bucket.iter_mut().find(|(id, _)| *id == neighbor) {
            Some((_, w)) => *w += weight,
            None => bucket.push((neighbor, weight)),
        }
    }

    /// Accumulated link weight between `a` and `b`
    pub fn weight(&self, a: u32, b: u32) -> f32 {
        self.buckets
            .get(a as usize)
            .and_then(|bucket| bucket.iter().find(|(id, _)| *id == b))
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// All neighbors of `a` with their weights
    pub fn neighbors(&self, a: u32) -> &[(u32, f32)] {
        self.buckets.get(a as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

// =============================================================================
// Candidate construction
// =============================================================================

/// Builds presentation candidates from product records: which attributes
/// carry the title and the quota tags.
#[derive(Debug, Clone, Copy)]
pub struct CandidateBuilder {
    title_attr: usize,
    tag_attr: usize,
}

impl CandidateBuilder {
    /// Resolve the title and tag attributes by name in the domain
    pub fn new(generation: &Generation, title_attr: &str, tag_attr: &str) -> Option<Self> {
        Some(Self {
            title_attr: generation.domain.attr_index(title_attr)?,
            tag_attr: generation.domain.attr_index(tag_attr)?,
        })
    }

    /// Build a candidate for a product, with the given score
    pub fn build(
        &self,
        generation: &Generation,
        product: ProductIdx,
        score: f64,
    ) -> Option<ScoredCandidate> {
        let record = generation.product(product)?;
        let title = record
            .attribute(self.title_attr)
            .and_then(|v| v.as_text_code())
            .and_then(|code| generation.domain.resolve_text(self.title_attr, code))
            .unwrap_or("")
            .to_owned();
        let tags: SmallVec<[String; 4]> = record
            .attribute(self.tag_attr)
            .and_then(|v| v.as_text_set())
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|&code| generation.domain.resolve_text(self.tag_attr, code))
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Some(ScoredCandidate {
            product,
            external_id: record.external_id,
            title,
            tags,
            score,
            explanation: None,
            pretty: Vec::new(),
        })
    }
}

// =============================================================================
// Reference scorer: occurrence frequency
// =============================================================================

/// Scores candidates by their catalog-wide occurrence frequency.
///
/// The simplest possible plugin; mainly a reference for the attach +
/// prepare/commit discipline.
#[derive(Debug, Default)]
pub struct FrequencyScorer;

struct FrequencyState {
    frequencies: Vec<u64>,
    total: u64,
}

struct FrequencyDelta {
    frequencies: Vec<u64>,
    total: u64,
}

impl ScorerDelta for FrequencyDelta {
    fn as_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn collect_frequencies(generation: &Generation) -> (Vec<u64>, u64) {
    let mut frequencies = vec![0u64; generation.products.len()];
    let mut total = 0u64;
    for (idx, product) in generation.iter_products() {
        frequencies[idx.as_usize()] = product.frequency;
        total += product.frequency;
    }
    (frequencies, total)
}

impl Scorer for FrequencyScorer {
    fn name(&self) -> &str {
        "frequency"
    }

    fn attach(&self, generation: &Generation) -> Result<Box<dyn ScorerState>> {
        let (frequencies, total) = collect_frequencies(generation);
        debug!(products = frequencies.len(), total, "frequency scorer attached");
        Ok(Box::new(FrequencyState { frequencies, total }))
    }
}

impl ScorerState for FrequencyState {
    fn score_batch(
        &self,
        _generation: &Generation,
        _consumer: ConsumerIdx,
        candidates: &mut [ScoredCandidate],
    ) {
        let total = self.total.max(1) as f64;
        for candidate in candidates {
            let frequency = self
                .frequencies
                .get(candidate.product.as_usize())
                .copied()
                .unwrap_or(0);
            candidate.score = frequency as f64 / total;
            candidate.explanation = Some(format!("freq:{frequency}"));
            if frequency > 0 {
                candidate.pretty.push((1.0, "Popular with other users".to_owned()));
            }
        }
    }

    fn similar(
        &self,
        generation: &Generation,
        seeds: &[ProductIdx],
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        // Frequency knows no affinity; "similar" degrades to "most popular
        // outside the seed set".
        let Some(builder) = builder_for(generation) else {
            return Vec::new();
        };
        let total = self.total.max(1) as f64;
        let mut ranked: Vec<(u64, ProductIdx)> = generation
            .iter_products()
            .filter(|(idx, _)| !seeds.contains(idx))
            .map(|(idx, product)| (product.frequency, idx))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked
            .into_iter()
            .take(limit)
            .filter_map(|(frequency, idx)| {
                builder.build(generation, idx, frequency as f64 / total)
            })
            .collect()
    }

    fn prepare(&self, generation: &Generation) -> Box<dyn ScorerDelta> {
        let (frequencies, total) = collect_frequencies(generation);
        Box::new(FrequencyDelta { frequencies, total })
    }

    fn commit(&mut self, delta: Box<dyn ScorerDelta>) {
        if let Ok(delta) = delta.as_any().downcast::<FrequencyDelta>() {
            self.frequencies = delta.frequencies;
            self.total = delta.total;
        }
    }
}

fn builder_for(generation: &Generation) -> Option<CandidateBuilder> {
    CandidateBuilder::new(generation, "title", "genres")
}

// =============================================================================
// Co-occurrence scorer
// =============================================================================

/// Scores by within-log co-occurrence: products appearing in the same
/// consumer histories link symmetrically in a [`BucketArena`].
#[derive(Debug)]
pub struct CooccurrenceScorer {
    /// Event type slot whose logs feed the similarity table
    pub slot: usize,
    /// Only the most recent W events per log contribute pairs
    pub window: usize,
}

impl Default for CooccurrenceScorer {
    fn default() -> Self {
        Self { slot: 0, window: 50 }
    }
}

struct CooccurrenceState {
    arena: BucketArena,
    slot: usize,
    window: usize,
}

struct CooccurrenceDelta {
    arena: BucketArena,
}

impl ScorerDelta for CooccurrenceDelta {
    fn as_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn build_arena(generation: &Generation, slot: usize, window: usize) -> BucketArena {
    let mut arena = BucketArena::new(generation.products.len());
    for (_, consumer) in generation.iter_consumers() {
        let Some(log) = consumer.log(slot) else { continue };
        let start = log.len().saturating_sub(window);
        let recent: Vec<u32> = log.products()[start..]
            .iter()
            .copied()
            .filter(|&p| p != pasand_store::SENTINEL_INDEX)
            .collect();
        for (i, &a) in recent.iter().enumerate() {
            for &b in &recent[i + 1..] {
                arena.link(a, b, 1.0);
            }
        }
    }
    arena
}

impl Scorer for CooccurrenceScorer {
    fn name(&self) -> &str {
        "cooccurrence"
    }

    fn attach(&self, generation: &Generation) -> Result<Box<dyn ScorerState>> {
        let arena = build_arena(generation, self.slot, self.window);
        debug!(buckets = arena.len(), "co-occurrence scorer attached");
        Ok(Box::new(CooccurrenceState { arena, slot: self.slot, window: self.window }))
    }
}

impl ScorerState for CooccurrenceState {
    fn score_batch(
        &self,
        generation: &Generation,
        consumer: ConsumerIdx,
        candidates: &mut [ScoredCandidate],
    ) {
        let history: Vec<u32> = generation
            .consumer(consumer)
            .and_then(|c| c.log(self.slot))
            .map(|log| {
                let start = log.len().saturating_sub(self.window);
                log.products()[start..].to_vec()
            })
            .unwrap_or_default();
        for candidate in candidates {
            let mut affinity = 0.0f64;
            for &seen in &history {
                affinity += self.arena.weight(seen, candidate.product.0) as f64;
            }
            candidate.score = affinity;
            if affinity > 0.0 {
                candidate.explanation = Some(format!("cooc:{affinity:.1}"));
                candidate
                    .pretty
                    .push((0.8, "Watched together with titles from your history".to_owned()));
            }
        }
    }

    fn similar(
        &self,
        generation: &Generation,
        seeds: &[ProductIdx],
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        let Some(builder) = builder_for(generation) else {
            return Vec::new();
        };
        let mut affinity: std::collections::HashMap<u32, f64> = std::collections::HashMap::new();
        for seed in seeds {
            for &(neighbor, weight) in self.arena.neighbors(seed.0) {
                *affinity.entry(neighbor).or_insert(0.0) += weight as f64;
            }
        }
        for seed in seeds {
            affinity.remove(&seed.0);
        }
        let mut ranked: Vec<(u32, f64)> = affinity.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
            .into_iter()
            .take(limit)
            .filter_map(|(idx, score)| builder.build(generation, ProductIdx(idx), score))
            .collect()
    }

    fn prepare(&self, generation: &Generation) -> Box<dyn ScorerDelta> {
        Box::new(CooccurrenceDelta { arena: build_arena(generation, self.slot, self.window) })
    }

    fn commit(&mut self, delta: Box<dyn ScorerDelta>) {
        if let Ok(delta) = delta.as_any().downcast::<CooccurrenceDelta>() {
            self.arena = delta.arena;
        }
    }
}

// =============================================================================
// Composite scorer
// =============================================================================

/// Averages the scores of several sub-scorers; updates all of them as one
/// unit through a compound delta.
pub struct CompositeScorer {
    pub children: Vec<Box<dyn Scorer>>,
}

struct CompositeState {
    children: Vec<Box<dyn ScorerState>>,
}

struct CompoundDelta {
    deltas: Vec<Box<dyn ScorerDelta>>,
}

impl ScorerDelta for CompoundDelta {
    fn as_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Scorer for CompositeScorer {
    fn name(&self) -> &str {
        "composite"
    }

    fn attach(&self, generation: &Generation) -> Result<Box<dyn ScorerState>> {
        let children = self
            .children
            .iter()
            .map(|child| child.attach(generation))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(CompositeState { children }))
    }
}

impl ScorerState for CompositeState {
    fn score_batch(
        &self,
        generation: &Generation,
        consumer: ConsumerIdx,
        candidates: &mut [ScoredCandidate],
    ) {
        if self.children.is_empty() {
            return;
        }
        let mut sums = vec![0.0f64; candidates.len()];
        let mut scratch = candidates.to_vec();
        for child in &self.children {
            for candidate in scratch.iter_mut() {
                candidate.score = 0.0;
            }
            child.score_batch(generation, consumer, &mut scratch);
            for (sum, candidate) in sums.iter_mut().zip(scratch.iter()) {
                *sum += candidate.score;
            }
        }
        // Explanations accumulate on the scratch copy across children.
        for ((candidate, scratch), sum) in
            candidates.iter_mut().zip(scratch.into_iter()).zip(sums)
        {
            candidate.score = sum / self.children.len() as f64;
            candidate.explanation = scratch.explanation;
            candidate.pretty = scratch.pretty;
        }
    }

    fn similar(
        &self,
        generation: &Generation,
        seeds: &[ProductIdx],
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        // First child with an answer wins; children are ordered by
        // preference.
        for child in &self.children {
            let result = child.similar(generation, seeds, limit);
            if !result.is_empty() {
                return result;
            }
        }
        Vec::new()
    }

    fn prepare(&self, generation: &Generation) -> Box<dyn ScorerDelta> {
        Box::new(CompoundDelta {
            deltas: self.children.iter().map(|c| c.prepare(generation)).collect(),
        })
    }

    fn commit(&mut self, delta: Box<dyn ScorerDelta>) {
        if let Ok(compound) = delta.as_any().downcast::<CompoundDelta>() {
            // One unit: every child state moves, in child order.
            for (child, delta) in self.children.iter_mut().zip(compound.deltas) {
                child.commit(delta);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_arena_is_symmetric() {
        let mut arena = BucketArena::new(4);
        arena.link(0, 2, 1.0);
        arena.link(0, 2, 0.5);
        assert_eq!(arena.weight(0, 2), 1.5);
        assert_eq!(arena.weight(2, 0), 1.5);
        assert_eq!(arena.weight(1, 2), 0.0);
    }

    #[test]
    fn test_bucket_arena_ignores_self_and_out_of_range() {
        let mut arena = BucketArena::new(2);
        arena.link(1, 1, 1.0);
        arena.link(0, 9, 1.0);
        assert!(arena.neighbors(1).is_empty());
        assert!(arena.neighbors(0).is_empty());
    }
}
