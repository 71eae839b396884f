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

//! Selection Parameters
//!
//! Selection is configured per request through a flat string map:
//!
//! | key | value |
//! |-----|-------|
//! | `max_items` | overall result cap |
//! | `primary_tags` | comma-delimited primary quota tags |
//! | `quota.<tag>` | primary quota for `<tag>` |
//! | `secondary_tags` | comma-delimited secondary quota tags |
//! | `secondary_quota.<tag>` | secondary quota for `<tag>` |
//! | `rank_weight.<tag>` | presentation rank weight for `<tag>` |
//! | `require_explanation` | only accept explained candidates |
//! | `force_include` | comma-delimited external product ids |
//! | `now_override` | epoch seconds used as "now" for backtesting |
//!
//! A malformed numeric value is logged and falls back to the default; a
//! request never fails over its parameters. A tag listed without an
//! explicit quota is tracked but unlimited.

use std::collections::HashMap;

use tracing::warn;

/// Default overall result cap
pub const DEFAULT_MAX_ITEMS: usize = 10;

/// Parsed per-request selection configuration.
#[derive(Debug, Clone)]
pub struct SelectionParams {
    pub max_items: usize,
    /// Primary per-tag quotas (strict and relaxed passes)
    pub primary_quotas: HashMap<String, u32>,
    /// Secondary per-tag quotas (strict pass only)
    pub secondary_quotas: HashMap<String, u32>,
    /// Per-tag presentation rank weights
    pub rank_weights: HashMap<String, f64>,
    /// Only candidates carrying an explanation are eligible
    pub require_explanation: bool,
    /// External product ids added unconditionally
    pub force_include: Vec<i64>,
    /// Fixed "now" for deterministic backtests
    pub now_override: Option<i64>,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            primary_quotas: HashMap::new(),
            secondary_quotas: HashMap::new(),
            rank_weights: HashMap::new(),
            require_explanation: false,
            force_include: Vec::new(),
            now_override: None,
        }
    }
}

impl SelectionParams {
    /// Parse a flat string map. Unknown keys are ignored; malformed values
    /// warn and default.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut params = Self::default();

        if let Some(raw) = map.get("max_items") {
            params.max_items = parse_or(raw, "max_items", DEFAULT_MAX_ITEMS);
        }
        params.require_explanation = map
            .get("require_explanation")
            .map(|raw| matches!(raw.trim(), "true" | "1" | "yes"))
            .unwrap_or(false);
        if let Some(raw) = map.get("now_override") {
            params.now_override = match raw.trim().parse::<i64>() {
                Ok(ts) => Some(ts),
                Err(_) => {
                    warn!(value = raw.as_str(), "malformed now_override, ignored");
                    None
                }
            };
        }
        if let Some(raw) = map.get("force_include") {
            params.force_include = split_list(raw)
                .filter_map(|id| match id.parse::<i64>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!(value = id, "malformed force_include id, skipped");
                        None
                    }
                })
                .collect();
        }

        params.primary_quotas = parse_quotas(map, "primary_tags", "quota.");
        params.secondary_quotas = parse_quotas(map, "secondary_tags", "secondary_quota.");
        for tag in params
            .primary_quotas
            .keys()
            .chain(params.secondary_quotas.keys())
        {
            if let Some(raw) = map.get(&format!("rank_weight.{tag}")) {
                params
                    .rank_weights
                    .insert(tag.clone(), parse_or(raw, "rank_weight", 0.0));
            }
        }
        params
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_or<T: std::str::FromStr + Copy>(raw: &str, key: &str, default: T) -> T {
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = raw, "malformed numeric parameter, using default");
            default
        }
    }
}

fn parse_quotas(
    map: &HashMap<String, String>,
    list_key: &str,
    quota_prefix: &str,
) -> HashMap<String, u32> {
    let Some(tags) = map.get(list_key) else {
        return HashMap::new();
    };
    split_list(tags)
        .map(|tag| {
            let quota = map
                .get(&format!("{quota_prefix}{tag}"))
                .map(|raw| parse_or(raw, quota_prefix, u32::MAX))
                .unwrap_or(u32::MAX);
            (tag.to_owned(), quota)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_on_empty_map() {
        let params = SelectionParams::from_map(&HashMap::new());
        assert_eq!(params.max_items, DEFAULT_MAX_ITEMS);
        assert!(params.primary_quotas.is_empty());
        assert!(!params.require_explanation);
        assert!(params.now_override.is_none());
    }

    #[test]
    fn test_full_parse() {
        let params = SelectionParams::from_map(&map(&[
            ("max_items", "5"),
            ("primary_tags", "comedy, drama"),
            ("quota.comedy", "2"),
            ("quota.drama", "3"),
            ("secondary_tags", "recent"),
            ("secondary_quota.recent", "1"),
            ("rank_weight.comedy", "0.9"),
            ("require_explanation", "true"),
            ("force_include", "42, 77"),
            ("now_override", "1700000000"),
        ]));
        assert_eq!(params.max_items, 5);
        assert_eq!(params.primary_quotas["comedy"], 2);
        assert_eq!(params.primary_quotas["drama"], 3);
        assert_eq!(params.secondary_quotas["recent"], 1);
        assert_eq!(params.rank_weights["comedy"], 0.9);
        assert!(params.require_explanation);
        assert_eq!(params.force_include, vec![42, 77]);
        assert_eq!(params.now_override, Some(1_700_000_000));
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let params = SelectionParams::from_map(&map(&[
            ("max_items", "many"),
            ("primary_tags", "comedy"),
            ("quota.comedy", "two"),
            ("force_include", "42,oops,77"),
            ("now_override", "yesterday"),
        ]));
        assert_eq!(params.max_items, DEFAULT_MAX_ITEMS);
        assert_eq!(params.primary_quotas["comedy"], u32::MAX);
        assert_eq!(params.force_include, vec![42, 77]);
        assert!(params.now_override.is_none());
    }

    #[test]
    fn test_listed_tag_without_quota_is_unlimited() {
        let params =
            SelectionParams::from_map(&map(&[("primary_tags", "comedy"), ("quota.drama", "1")]));
        assert_eq!(params.primary_quotas["comedy"], u32::MAX);
        // Quota for an unlisted tag is ignored.
        assert!(!params.primary_quotas.contains_key("drama"));
    }
}
