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

//! OpScan fetch - concurrent, retrying JSON-RPC retrieval
//!
//! One fetch mechanism serves three retrieval kinds: batch bodies by batch
//! number, runtime bytecode by address, and execution traces by transaction
//! hash. The [`client`] module speaks raw JSON-RPC (single and batched
//! envelopes) with bounded retries; the [`engine`] module fans a work list
//! out over worker tasks and joins their locally accumulated results; the
//! [`ops`] module wraps both into the typed variants the pipeline consumes.

/// Raw JSON-RPC client with retry, backoff and throttle handling
pub mod client;
/// Worker fan-out/fan-in over batched RPC calls
pub mod engine;
/// Typed fetch variants and chain-head helpers
pub mod ops;

pub use client::{BatchCall, RpcClient};
pub use engine::{FetchEngine, FetchOutcome, FetchStats};
pub use ops::*;
