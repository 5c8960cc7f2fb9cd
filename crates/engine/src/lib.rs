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

//! OpScan engine - static analysis and dynamic confirmation
//!
//! Four stages over the downloaded history: the [`indexer`] turns raw
//! transaction units into the contract index, the [`scanner`] turns runtime
//! bytecode into opcode histograms, [`conflicts`] aggregates histograms and
//! flags candidate transactions, and [`reconcile`] confirms candidates
//! against real execution traces. [`report`] renders the persisted artifacts
//! into a human-readable summary.

/// Opcode-index aggregation and candidate conflict detection
pub mod conflicts;
/// Contract classification over downloaded transaction units
pub mod indexer;
/// Trace-backed confirmation of candidate conflicts
pub mod reconcile;
/// Summary report over persisted artifacts
pub mod report;
/// Runtime bytecode opcode scanner
pub mod scanner;

pub use conflicts::{build_opcode_index, detect_conflicts};
pub use indexer::{index_transactions, IndexerStats};
pub use reconcile::Reconciler;
pub use scanner::{scan_runtime, ScanError};
