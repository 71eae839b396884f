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

//! Product Domain Schema
//!
//! The domain is the ordered attribute schema shared by every product in the
//! catalog, together with the shared value dictionaries ("globals") that
//! text-like attributes encode into. There is exactly one [`Domain`] per
//! generation; products hold codes, never their own dictionaries.
//!
//! Dictionary slots are laid out in attribute order, with one trailing slot
//! reserved for interned event-metadata strings. The snapshot stream writes
//! slots in this order, so globals always precede the attribute values that
//! reference them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dictionary::ValueDictionary;

/// Discriminant of an attribute value variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Bool,
    Int,
    Long,
    Float,
    Text,
    TextSet,
    RankedText,
}

impl AttributeKind {
    /// Whether values of this kind encode through a shared dictionary
    #[inline]
    pub fn uses_dictionary(&self) -> bool {
        matches!(self, Self::Text | Self::TextSet | Self::RankedText)
    }
}

/// One attribute's schema entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute name, unique within the schema
    pub name: String,
    /// Value kind
    pub kind: AttributeKind,
}

/// The raw schema as supplied by the reader collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainSchema {
    pub attributes: Vec<AttributeDescriptor>,
}

/// Dictionary additions keyed by slot, produced by a prepare phase and
/// folded in at commit.
pub type DomainGrowth = Vec<(usize, Vec<String>)>;

/// The shared product schema plus its dictionary globals.
#[derive(Debug, Clone, Default)]
pub struct Domain {
    attributes: Vec<AttributeDescriptor>,
    by_name: HashMap<String, usize>,
    /// Dictionary slot per attribute; `None` for scalar kinds
    dict_slots: Vec<Option<usize>>,
    /// Shared dictionaries in slot order; the last slot is the
    /// event-metadata dictionary
    dictionaries: Vec<ValueDictionary>,
}

impl Domain {
    /// Build a domain from a reader-supplied schema, with empty dictionaries
    pub fn from_schema(schema: &DomainSchema) -> Self {
        let mut by_name = HashMap::with_capacity(schema.attributes.len());
        let mut dict_slots = Vec::with_capacity(schema.attributes.len());
        let mut dictionaries = Vec::new();
        for (idx, attr) in schema.attributes.iter().enumerate() {
            by_name.insert(attr.name.clone(), idx);
            if attr.kind.uses_dictionary() {
                dict_slots.push(Some(dictionaries.len()));
                dictionaries.push(ValueDictionary::new());
            } else {
                dict_slots.push(None);
            }
        }
        // Trailing slot for interned event-metadata strings.
        dictionaries.push(ValueDictionary::new());
        Self {
            attributes: schema.attributes.clone(),
            by_name,
            dict_slots,
            dictionaries,
        }
    }

    /// Number of attributes in the schema
    #[inline]
    pub fn attr_count(&self) -> usize {
        self.attributes.len()
    }

    /// Index of an attribute by name
    #[inline]
    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Descriptor of the attribute at `idx`
    #[inline]
    pub fn descriptor(&self, idx: usize) -> Option<&AttributeDescriptor> {
        self.attributes.get(idx)
    }

    /// Iterate descriptors in schema order
    pub fn descriptors(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.iter()
    }

    /// Dictionary slot backing the attribute at `idx`, if dictionary-encoded
    #[inline]
    pub fn dict_slot(&self, idx: usize) -> Option<usize> {
        self.dict_slots.get(idx).copied().flatten()
    }

    /// Slot of the event-metadata dictionary
    #[inline]
    pub fn metadata_slot(&self) -> usize {
        self.dictionaries.len() - 1
    }

    /// Dictionary at a slot
    #[inline]
    pub fn dictionary(&self, slot: usize) -> Option<&ValueDictionary> {
        self.dictionaries.get(slot)
    }

    /// All dictionaries in slot order (snapshot layout)
    pub fn dictionaries(&self) -> &[ValueDictionary] {
        &self.dictionaries
    }

    /// Resolve a text code for the attribute at `idx`
    pub fn resolve_text(&self, idx: usize, code: u32) -> Option<&str> {
        self.dictionary(self.dict_slot(idx)?)?.resolve(code)
    }

    /// Clone this domain with staged dictionary growth folded in.
    ///
    /// Growth entries reference slots; codes come out contiguous with the
    /// stage that produced them. Applied during commit only.
    pub fn with_growth(&self, growth: DomainGrowth) -> Self {
        if growth.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        for (slot, additions) in growth {
            if let Some(dict) = next.dictionaries.get_mut(slot) {
                dict.apply_growth(additions);
            }
        }
        next
    }

    /// Rebuild from schema plus pre-loaded dictionaries (snapshot restore).
    ///
    /// The dictionary count must match the schema's slot layout.
    pub fn from_parts(
        schema: &DomainSchema,
        dictionaries: Vec<ValueDictionary>,
    ) -> crate::error::Result<Self> {
        let mut domain = Self::from_schema(schema);
        if dictionaries.len() != domain.dictionaries.len() {
            return Err(crate::error::PasandError::SchemaMismatch(format!(
                "expected {} dictionary slots, snapshot has {}",
                domain.dictionaries.len(),
                dictionaries.len()
            )));
        }
        domain.dictionaries = dictionaries;
        Ok(domain)
    }
}
