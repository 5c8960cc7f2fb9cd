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

//! CLI subcommands, one pipeline stage each.

/// Scan bytecode and detect candidate conflicts
pub mod analyze;
/// Confirm candidates against execution traces
pub mod confirm;
/// Download batches into resumable unit files
pub mod download;
/// Classify downloaded transactions into the contract index
pub mod index;
/// Print the summary report
pub mod report;
