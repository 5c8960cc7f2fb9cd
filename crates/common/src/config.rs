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

//! Network presets and fetch tuning knobs.

use std::{fmt, str::FromStr, time::Duration};

/// Environment variable selecting the network preset.
pub const OPSCAN_NETWORK: &str = "OPSCAN_NETWORK";

/// Environment variable overriding the regular RPC endpoint.
pub const OPSCAN_RPC_URL: &str = "OPSCAN_RPC_URL";

/// Environment variable providing the debug (trace) RPC endpoint.
///
/// Public gateways do not expose `debug_traceTransaction`; confirmation runs
/// need an endpoint with the debug namespace enabled.
pub const OPSCAN_DEBUG_RPC_URL: &str = "OPSCAN_DEBUG_RPC_URL";

/// Environment variable overriding the data directory root.
pub const OPSCAN_DATA_DIR: &str = "OPSCAN_DATA_DIR";

/// Known zkEVM networks with endpoint and data directory presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// zkEVM mainnet.
    Mainnet,
    /// Cardona public testnet.
    Cardona,
    /// Bali internal testnet.
    Bali,
}

impl Network {
    /// Default public RPC endpoint for this network.
    pub fn rpc_url(self) -> &'static str {
        match self {
            Self::Mainnet => "https://zkevm-rpc.com",
            Self::Cardona => "https://rpc.cardona.zkevm-rpc.com",
            Self::Bali => "https://rpc.internal.zkevm-rpc.com",
        }
    }

    /// Data directory name for this network's artifacts.
    pub fn data_dir_name(self) -> &'static str {
        match self {
            Self::Mainnet => "zkevm_mainnet",
            Self::Cardona => "zkevm_cardona",
            Self::Bali => "zkevm_bali",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mainnet => "mainnet",
            Self::Cardona => "cardona",
            Self::Bali => "bali",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "cardona" => Ok(Self::Cardona),
            "bali" => Ok(Self::Bali),
            other => Err(format!("unknown network {other:?}, expected mainnet, cardona or bali")),
        }
    }
}

/// Tuning knobs for the fetch engine and its per-call chunking.
///
/// Trace payloads are far larger than batch bodies or bytecode, so the trace
/// variant uses its own, smaller queries-per-request value.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Worker task count per engine invocation.
    pub workers: usize,
    /// Work items per batched RPC call for batch and code fetches.
    pub queries_per_request: usize,
    /// Work items per batched RPC call for trace fetches.
    pub trace_queries_per_request: usize,
    /// Candidate transactions handed to the trace engine per reconciliation
    /// pass.
    pub traces_per_pass: usize,
    /// Batch ids downloaded into one on-disk unit.
    pub batches_per_unit: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queries_per_request: 20,
            trace_queries_per_request: 5,
            traces_per_pass: 500,
            batches_per_unit: 10_000,
        }
    }
}

/// Retry budgets and pauses for the RPC client.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Transport attempt budget per HTTP round trip (timeouts, 5xx, 429).
    pub max_attempts: u32,
    /// Fixed pause after an HTTP 429 before the next attempt.
    pub throttle_cooldown: Duration,
    /// Resubmission budget when a single-call envelope carries an error.
    pub error_retries: u32,
    /// Whole-batch resend budget when a batched element carries an
    /// unexpected error.
    pub batch_retries: u32,
    /// Base pause before a batch resend; grows linearly with the retries
    /// already spent.
    pub batch_retry_pause: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            throttle_cooldown: Duration::from_secs(10),
            error_retries: 3,
            batch_retries: 5,
            batch_retry_pause: Duration::from_secs(2),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(usize::from).unwrap_or(4)
}
