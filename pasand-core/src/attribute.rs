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

//! Polymorphic Attribute Values
//!
//! Products carry a vector of heterogeneous attribute values following one
//! shared schema (see [`crate::domain::Domain`]). This module provides the
//! type-tagged value representation plus the packed integer keys used to
//! address a single (attribute, value) pair across scoring tables.
//!
//! ## Representation
//!
//! Text-like attributes never store strings inline. They store small integer
//! codes into the domain's shared dictionaries, so a value compares and
//! hashes as a machine word:
//!
//! ```text
//! Text      → u32 dictionary code
//! TextSet   → sorted Vec<u32> of codes
//! RankedText→ Vec<(code, frequency rank)> in rank order
//! ```
//!
//! ## Packed attribute keys
//!
//! Scoring tables key their counters by `attr_index * ATTR_KEY_BASE + code`.
//! Every producer and consumer of such keys must go through
//! [`PackedAttrKey`]; mixing bases collides silently.

use serde::{Deserialize, Serialize};

/// Base for packed (attribute, value) keys.
///
/// Dictionary codes must stay below this bound for packing to be injective.
/// The context encoder's soft cap keeps codes far below it in practice.
pub const ATTR_KEY_BASE: u64 = 1_000_000;

/// A polymorphic attribute value.
///
/// Each variant maps to one [`crate::domain::AttributeKind`]. Accessors
/// return `None` on a variant mismatch rather than panicking; callers on
/// the scoring path treat a mismatch like a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Boolean flag
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit float
    Float(f64),
    /// Dictionary code of a single text value
    Text(u32),
    /// Dictionary codes of a multi-valued set, sorted ascending
    TextSet(Vec<u32>),
    /// (dictionary code, frequency rank) pairs, most frequent first
    RankedText(Vec<(u32, u32)>),
}

impl AttributeValue {
    /// Boolean payload, if this is a `Bool`
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`
    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Long payload, if this is a `Long`
    #[inline]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if this is a `Float`
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Dictionary code, if this is a `Text`
    #[inline]
    pub fn as_text_code(&self) -> Option<u32> {
        match self {
            Self::Text(c) => Some(*c),
            _ => None,
        }
    }

    /// Dictionary codes, if this is a `TextSet`
    #[inline]
    pub fn as_text_set(&self) -> Option<&[u32]> {
        match self {
            Self::TextSet(codes) => Some(codes),
            _ => None,
        }
    }

    /// (code, rank) pairs, if this is a `RankedText`
    #[inline]
    pub fn as_ranked_text(&self) -> Option<&[(u32, u32)]> {
        match self {
            Self::RankedText(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// All dictionary codes this value references, in storage order.
    ///
    /// Empty for scalar variants. Used by the context encoder and by the
    /// snapshot writer's dictionary-reference validation.
    pub fn referenced_codes(&self) -> Vec<u32> {
        match self {
            Self::Text(c) => vec![*c],
            Self::TextSet(codes) => codes.clone(),
            Self::RankedText(pairs) => pairs.iter().map(|(c, _)| *c).collect(),
            _ => Vec::new(),
        }
    }
}

/// A packed (attribute index, value code) key.
///
/// Layout: `attr_index * ATTR_KEY_BASE + code`. The single shared base makes
/// keys from different producers comparable; a code at or above the base
/// would alias into the next attribute's range, so packing asserts the bound
/// in debug builds and saturates in release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedAttrKey(u64);

impl PackedAttrKey {
    /// Pack an attribute index and a value code into one key
    #[inline]
    pub fn pack(attr_index: u32, code: u32) -> Self {
        debug_assert!((code as u64) < ATTR_KEY_BASE, "value code {code} exceeds key base");
        let code = (code as u64).min(ATTR_KEY_BASE - 1);
        Self(attr_index as u64 * ATTR_KEY_BASE + code)
    }

    /// Recover (attribute index, value code)
    #[inline]
    pub fn unpack(self) -> (u32, u32) {
        ((self.0 / ATTR_KEY_BASE) as u32, (self.0 % ATTR_KEY_BASE) as u32)
    }

    /// Raw key value (for use as a table key or context input)
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild from a raw key value
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_match_variant() {
        assert_eq!(AttributeValue::Bool(true).as_bool(), Some(true));
        assert_eq!(AttributeValue::Int(7).as_int(), Some(7));
        assert_eq!(AttributeValue::Long(-9).as_long(), Some(-9));
        assert_eq!(AttributeValue::Float(0.5).as_float(), Some(0.5));
        assert_eq!(AttributeValue::Text(3).as_text_code(), Some(3));
        assert_eq!(AttributeValue::Int(7).as_bool(), None);
        assert_eq!(AttributeValue::Bool(false).as_float(), None);
    }

    #[test]
    fn test_referenced_codes() {
        assert!(AttributeValue::Int(1).referenced_codes().is_empty());
        assert_eq!(AttributeValue::Text(5).referenced_codes(), vec![5]);
        assert_eq!(
            AttributeValue::TextSet(vec![2, 4, 9]).referenced_codes(),
            vec![2, 4, 9]
        );
        assert_eq!(
            AttributeValue::RankedText(vec![(8, 1), (3, 2)]).referenced_codes(),
            vec![8, 3]
        );
    }

    #[test]
    fn test_packed_key_round_trip() {
        let key = PackedAttrKey::pack(12, 345);
        assert_eq!(key.unpack(), (12, 345));
        assert_eq!(PackedAttrKey::from_raw(key.raw()), key);
    }

    #[test]
    fn test_packed_keys_distinct_across_attributes() {
        // Same code under different attributes must never collide.
        let a = PackedAttrKey::pack(0, 42);
        let b = PackedAttrKey::pack(1, 42);
        assert_ne!(a, b);
        assert_eq!(a.unpack().1, b.unpack().1);
    }
}
