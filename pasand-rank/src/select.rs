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

//! Constrained Candidate Selection
//!
//! Turns scored candidates into a bounded, quota-respecting recommendation
//! list. Pure, single-threaded, per-request; no state survives a call.
//!
//! ## Pipeline
//!
//! 1. Rank by effective weight: the raw score, or `score × U(0,1)` in
//!    randomized mode (still biased toward higher scores, but varying
//!    across requests).
//! 2. **Strict pass** — accept while the normalized title is unseen, no
//!    primary-tag quota is exhausted, and no secondary-tag quota is
//!    exhausted; stop at the cap.
//! 3. **Relaxed pass** — if still short, re-walk ignoring secondary
//!    quotas.
//! 4. **Forced pass** — if still short, re-walk ignoring all quotas,
//!    keeping only de-duplication.
//! 5. **Force-include** — explicitly named ids enter unconditionally,
//!    bypassing quotas and the cap. An unmatched id is logged, telling
//!    "unknown to the catalog" apart from "known but not a candidate".
//! 6. Present in descending average per-tag rank weight, independent of
//!    prediction score; ties keep acceptance order.
//!
//! A candidate whose normalized title is empty is conservatively treated
//! as already seen and only ever enters via force-include.

use std::collections::{HashMap, HashSet};

use pasand_store::Generation;
use rand::Rng;
use tracing::warn;

use crate::params::SelectionParams;
use crate::score::ScoredCandidate;

/// Length, in characters, of the normalized-title de-duplication key
const TITLE_DEDUP_PREFIX: usize = 40;

/// How candidate order is derived from scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingMode {
    /// Rank by raw score
    Deterministic,
    /// Rank by `score × U(0,1)`
    Randomized,
}

/// Normalize a title into its de-duplication key: trimmed, lowercased,
/// inner whitespace collapsed, truncated to a fixed prefix.
pub fn normalized_title(title: &str) -> String {
    let mut key = String::with_capacity(title.len().min(TITLE_DEDUP_PREFIX));
    let mut count = 0usize;
    'outer: for (i, word) in title.split_whitespace().enumerate() {
        if i > 0 {
            key.push(' ');
            count += 1;
        }
        for ch in word.chars() {
            for lowered in ch.to_lowercase() {
                if count >= TITLE_DEDUP_PREFIX {
                    break 'outer;
                }
                key.push(lowered);
                count += 1;
            }
        }
    }
    key
}

/// Select a bounded, quota-respecting list from scored candidates.
///
/// `generation` is only consulted to classify unmatched force-include ids;
/// pass `None` when no catalog is at hand.
pub fn select(
    candidates: Vec<ScoredCandidate>,
    params: &SelectionParams,
    mode: RankingMode,
    generation: Option<&Generation>,
) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let ranked = rank(&candidates, mode);
    let mut state = PassState::new(candidates.len());

    // Strict, relaxed, forced.
    run_pass(&candidates, &ranked, params, &mut state, PassRules {
        primary: true,
        secondary: true,
        explanation: params.require_explanation,
    });
    if state.selected.len() < params.max_items {
        run_pass(&candidates, &ranked, params, &mut state, PassRules {
            primary: true,
            secondary: false,
            explanation: params.require_explanation,
        });
    }
    if state.selected.len() < params.max_items {
        run_pass(&candidates, &ranked, params, &mut state, PassRules {
            primary: false,
            secondary: false,
            explanation: false,
        });
    }

    force_include(&candidates, params, generation, &mut state);

    present(candidates, params, state.selected)
}

fn rank(candidates: &[ScoredCandidate], mode: RankingMode) -> Vec<usize> {
    let mut rng = rand::thread_rng();
    let mut weighted: Vec<(f64, usize)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let weight = match mode {
                RankingMode::Deterministic => c.score,
                RankingMode::Randomized => c.score * rng.gen::<f64>(),
            };
            (weight, i)
        })
        .collect();
    weighted.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    weighted.into_iter().map(|(_, i)| i).collect()
}

struct PassRules {
    primary: bool,
    secondary: bool,
    explanation: bool,
}

struct PassState {
    selected: Vec<usize>,
    chosen: Vec<bool>,
    seen_titles: HashSet<String>,
    primary_counts: HashMap<String, u32>,
    secondary_counts: HashMap<String, u32>,
}

impl PassState {
    fn new(len: usize) -> Self {
        Self {
            selected: Vec::new(),
            chosen: vec![false; len],
            seen_titles: HashSet::new(),
            primary_counts: HashMap::new(),
            secondary_counts: HashMap::new(),
        }
    }

    fn accept(&mut self, index: usize, title_key: String, candidate: &ScoredCandidate,
              params: &SelectionParams) {
        self.chosen[index] = true;
        self.selected.push(index);
        self.seen_titles.insert(title_key);
        for tag in &candidate.tags {
            if params.primary_quotas.contains_key(tag.as_str()) {
                *self.primary_counts.entry(tag.clone()).or_insert(0) += 1;
            }
            if params.secondary_quotas.contains_key(tag.as_str()) {
                *self.secondary_counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }
    }
}

fn quota_ok(
    candidate: &ScoredCandidate,
    quotas: &HashMap<String, u32>,
    counts: &HashMap<String, u32>,
) -> bool {
    candidate.tags.iter().all(|tag| match quotas.get(tag.as_str()) {
        Some(&quota) => counts.get(tag.as_str()).copied().unwrap_or(0) < quota,
        None => true,
    })
}

fn run_pass(
    candidates: &[ScoredCandidate],
    ranked: &[usize],
    params: &SelectionParams,
    state: &mut PassState,
    rules: PassRules,
) {
    for &index in ranked {
        if state.selected.len() >= params.max_items {
            return;
        }
        if state.chosen[index] {
            continue;
        }
        let candidate = &candidates[index];
        let key = normalized_title(&candidate.title);
        // An unreadable title cannot be de-duplicated; treat it as seen.
        if key.is_empty() || state.seen_titles.contains(&key) {
            continue;
        }
        if rules.explanation && candidate.explanation.is_none() {
            continue;
        }
        if rules.primary && !quota_ok(candidate, &params.primary_quotas, &state.primary_counts) {
            continue;
        }
        if rules.secondary
            && !quota_ok(candidate, &params.secondary_quotas, &state.secondary_counts)
        {
            continue;
        }
        state.accept(index, key, candidate, params);
    }
}

fn force_include(
    candidates: &[ScoredCandidate],
    params: &SelectionParams,
    generation: Option<&Generation>,
    state: &mut PassState,
) {
    for &external in &params.force_include {
        match candidates.iter().position(|c| c.external_id == external) {
            Some(index) => {
                if !state.chosen[index] {
                    state.chosen[index] = true;
                    state.selected.push(index);
                }
            }
            None => match generation {
                Some(generation) if generation.product_index(external).is_sentinel() => {
                    warn!(product = external, "force-include id not found in catalog");
                }
                Some(_) => {
                    warn!(
                        product = external,
                        "force-include id in catalog but not among candidates"
                    );
                }
                None => {
                    warn!(product = external, "force-include id not among candidates");
                }
            },
        }
    }
}

/// Order the accepted set by descending average configured rank weight
/// over each item's tags. Stable: ties keep acceptance order.
fn present(
    candidates: Vec<ScoredCandidate>,
    params: &SelectionParams,
    mut selected: Vec<usize>,
) -> Vec<ScoredCandidate> {
    let weight_of = |index: usize| -> f64 {
        let tags = &candidates[index].tags;
        if tags.is_empty() {
            return 0.0;
        }
        let sum: f64 = tags
            .iter()
            .map(|tag| params.rank_weights.get(tag.as_str()).copied().unwrap_or(0.0))
            .sum();
        sum / tags.len() as f64
    };
    selected.sort_by(|&a, &b| {
        weight_of(b)
            .partial_cmp(&weight_of(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut slots: Vec<Option<ScoredCandidate>> = candidates.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;
    use std::collections::HashMap as Map;

    fn candidate(external: i64, title: &str, tags: &[&str], score: f64) -> ScoredCandidate {
        ScoredCandidate {
            product: pasand_store::ProductIdx(external as u32),
            external_id: external,
            title: title.to_owned(),
            tags: tags.iter().map(|t| t.to_string()).collect::<SmallVec<[String; 4]>>(),
            score,
            explanation: Some("test".into()),
            pretty: Vec::new(),
        }
    }

    /// Ten descending-sorted candidates; ranks 1,2,3,7 are comedies.
    fn comedy_drama_fixture() -> Vec<ScoredCandidate> {
        (1..=10)
            .map(|rank| {
                let tags: &[&str] = if [1, 2, 3, 7].contains(&rank) {
                    &["comedy"]
                } else {
                    &["drama"]
                };
                candidate(rank, &format!("title-{rank}"), tags, 11.0 - rank as f64)
            })
            .collect()
    }

    fn quota_params(pairs: &[(&str, u32)], cap: usize) -> SelectionParams {
        let mut params = SelectionParams { max_items: cap, ..Default::default() };
        for (tag, quota) in pairs {
            params.primary_quotas.insert(tag.to_string(), *quota);
        }
        params
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let params = SelectionParams::default();
        assert!(select(Vec::new(), &params, RankingMode::Deterministic, None).is_empty());
    }

    #[test]
    fn test_comedy_drama_worked_example() {
        // cap=5, comedy max 2, drama max 3 → ranks {1,2,4,5,6}.
        let params = quota_params(&[("comedy", 2), ("drama", 3)], 5);
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn test_cap_is_never_exceeded() {
        let params = quota_params(&[], 3);
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_forced_pass_fills_to_distinct_eligible() {
        // Zero quotas starve the strict and relaxed passes entirely; the
        // forced pass must still fill min(cap, distinct candidates).
        let params = quota_params(&[("comedy", 0), ("drama", 0)], 5);
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        assert_eq!(result.len(), 5);
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_zero_quota_excludes_tag_from_quota_passes() {
        // Comedy quota 0: the top-ranked comedies are passed over and the
        // cap fills with dramas inside the strict pass alone.
        let params = quota_params(&[("comedy", 0)], 3);
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
    }

    #[test]
    fn test_duplicate_normalized_titles_collapse() {
        let candidates = vec![
            candidate(1, "The  Matrix ", &[], 3.0),
            candidate(2, "the matrix", &[], 2.0),
            candidate(3, "Inception", &[], 1.0),
        ];
        let params = SelectionParams::default();
        let result = select(candidates, &params, RankingMode::Deterministic, None);
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_empty_title_only_enters_via_force_include() {
        let candidates = vec![
            candidate(1, "   ", &[], 9.0),
            candidate(2, "Readable", &[], 1.0),
        ];
        let params = SelectionParams::default();
        let result = select(candidates.clone(), &params, RankingMode::Deterministic, None);
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![2]);

        let params = SelectionParams { force_include: vec![1], ..Default::default() };
        let result = select(candidates, &params, RankingMode::Deterministic, None);
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert!(ids.contains(&1));
    }

    #[test]
    fn test_force_include_bypasses_quotas_and_cap() {
        let mut params = quota_params(&[("comedy", 0), ("drama", 0)], 2);
        params.force_include = vec![7, 10];
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        // Cap held for the passes, then both forced ids were appended.
        assert_eq!(result.len(), 4);
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert!(ids.contains(&7) && ids.contains(&10));
    }

    #[test]
    fn test_unmatched_force_include_is_skipped() {
        let mut params = SelectionParams::default();
        params.force_include = vec![999];
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        assert!(result.iter().all(|c| c.external_id != 999));
    }

    #[test]
    fn test_require_explanation_filters_quota_passes() {
        let mut unexplained = candidate(1, "First", &[], 9.0);
        unexplained.explanation = None;
        let candidates = vec![unexplained, candidate(2, "Second", &[], 1.0)];
        let params = SelectionParams {
            max_items: 1,
            require_explanation: true,
            ..Default::default()
        };
        let result = select(candidates, &params, RankingMode::Deterministic, None);
        assert_eq!(result[0].external_id, 2);
    }

    #[test]
    fn test_secondary_quotas_relax_before_primary() {
        // All candidates share the secondary tag with quota 1; primary is
        // unlimited. Strict admits one, the relaxed pass fills the rest.
        let candidates: Vec<_> = (1..=4)
            .map(|i| candidate(i, &format!("t{i}"), &["fresh"], 5.0 - i as f64))
            .collect();
        let mut params = SelectionParams { max_items: 3, ..Default::default() };
        params.secondary_quotas.insert("fresh".into(), 1);
        let result = select(candidates, &params, RankingMode::Deterministic, None);
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_presentation_order_follows_rank_weights() {
        let params = {
            let mut p = quota_params(&[("comedy", 2), ("drama", 3)], 5);
            p.rank_weights = Map::from([
                ("drama".to_string(), 1.0),
                ("comedy".to_string(), 0.2),
            ]);
            p
        };
        let result = select(
            comedy_drama_fixture(),
            &params,
            RankingMode::Deterministic,
            None,
        );
        // Same accepted set as the worked example, dramas presented first.
        let ids: Vec<i64> = result.iter().map(|c| c.external_id).collect();
        assert_eq!(ids, vec![4, 5, 6, 1, 2]);
    }

    #[test]
    fn test_randomized_mode_holds_invariants() {
        let params = quota_params(&[("comedy", 2), ("drama", 3)], 5);
        for _ in 0..20 {
            let result = select(
                comedy_drama_fixture(),
                &params,
                RankingMode::Randomized,
                None,
            );
            assert!(result.len() <= 5);
            let comedies = result.iter().filter(|c| c.tags.contains(&"comedy".to_string())).count();
            let dramas = result.iter().filter(|c| c.tags.contains(&"drama".to_string())).count();
            assert!(comedies <= 2, "comedy quota violated: {comedies}");
            assert!(dramas <= 3, "drama quota violated: {dramas}");
        }
    }

    #[test]
    fn test_normalized_title() {
        assert_eq!(normalized_title("  The  MATRIX  "), "the matrix");
        assert_eq!(normalized_title(""), "");
        assert_eq!(normalized_title("   "), "");
        let long = "x".repeat(100);
        assert_eq!(normalized_title(&long).len(), TITLE_DEDUP_PREFIX);
    }
}
