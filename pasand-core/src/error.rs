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

//! Error types for PasandDB

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasandError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Stale base generation: delta prepared against {expected}, current is {actual}")]
    StaleBase { expected: u64, actual: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for PasandDB operations
pub type Result<T> = std::result::Result<T, PasandError>;
