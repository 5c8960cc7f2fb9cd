// OpScan - zkEVM Opcode Compatibility Scanner
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
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

//! OpScan common - shared functionality for OpScan components
//!
//! This crate provides the pieces shared by the fetch layer, the analysis
//! engine and the CLI: opcode tables and upgrade rule sets, the persisted
//! data model (contract index, opcode index, conflict maps, trace cache),
//! JSON stores with checkpoint flushing, network presets and logging setup.

/// Network presets and fetch tuning knobs
pub mod config;
/// Logging setup and utilities for consistent logging across OpScan components
pub mod logging;
/// Opcode byte newtype, mnemonic lookup and upgrade rule sets
pub mod opcode;
/// On-disk JSON stores and the data directory layout
pub mod store;
/// Persisted data model shared across the pipeline
pub mod types;

pub use config::*;
pub use opcode::*;
pub use store::*;
pub use types::*;
