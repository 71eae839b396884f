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

//! PasandDB Core
//!
//! Fundamental types shared by the store and ranking crates:
//!
//! - **Attribute model**: polymorphic product attribute values and packed
//!   (attribute, value) keys
//! - **Domain**: the ordered attribute schema and its shared value
//!   dictionaries
//! - **Context encoding**: raw signal keys → small integer context positions
//! - **Errors**: the crate-wide error enum and `Result` alias

pub mod attribute;
pub mod context;
pub mod dictionary;
pub mod domain;
pub mod error;

pub use attribute::{AttributeValue, PackedAttrKey, ATTR_KEY_BASE};
pub use context::{ContextEncoder, ContextSource, KeySetContext, NO_CONTEXT};
pub use dictionary::{StagedDictionary, ValueDictionary};
pub use domain::{AttributeDescriptor, AttributeKind, Domain, DomainGrowth, DomainSchema};
pub use error::{PasandError, Result};
