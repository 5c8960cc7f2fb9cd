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

//! Persisted data model shared across the pipeline.
//!
//! Every type here round-trips through the on-disk JSON artifacts, so field
//! names and key formats are part of the interface: contract maps are keyed
//! by lowercase address, opcode maps by two-hex-char instruction byte, trace
//! caches by transaction hash. `alloy` primitives give us the lowercase hex
//! serde forms for free.

use crate::opcode::OpcodeByte;
use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-contract instruction histogram: instruction byte to occurrence count.
pub type OpcodeHistogram = BTreeMap<OpcodeByte, u64>;

/// The full contract index, keyed by contract address.
pub type ContractIndex = BTreeMap<Address, ContractRecord>;

/// Addresses proven not to hold code (EOA senders, empty-code recipients).
/// The value is always `true`; the map shape matches the persisted artifact.
pub type NoContractCache = BTreeMap<Address, bool>;

/// Candidate conflicts: opcode byte to contract to transaction hashes.
pub type ConflictMap = BTreeMap<OpcodeByte, BTreeMap<Address, Vec<TxHash>>>;

/// Confirmed issues: opcode mnemonic to contract to transaction hashes.
pub type IssueMap = BTreeMap<String, BTreeMap<Address, Vec<TxHash>>>;

/// Executed-opcode sets by transaction hash. Append-only: a mined
/// transaction's trace never changes, so entries are never invalidated.
pub type TraceCache = BTreeMap<TxHash, BTreeSet<String>>;

/// One contract discovered in the transaction history.
///
/// Creation metadata is present only for contracts seen through their
/// deployment transaction; a contract first seen as a call recipient has no
/// direct creation record and carries only its runtime and call bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// Hash of the deployment transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_tx_hash: Option<TxHash>,
    /// Block number of the deployment transaction (hex string as reported).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_block: Option<String>,
    /// Deployer address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Address>,
    /// Deployment calldata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Deployed runtime bytecode as a 0x-prefixed hex string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Number of calls made to this contract.
    #[serde(default)]
    pub tx_count: u64,
    /// Hashes of successful transactions targeting this contract, in
    /// discovery order.
    #[serde(default)]
    pub txs: Vec<TxHash>,
    /// Hashes of failed transactions targeting this contract, in discovery
    /// order.
    #[serde(default)]
    pub failed_txs: Vec<TxHash>,
    /// Cached instruction histogram of `runtime`, built lazily during
    /// analysis and persisted so it is never recomputed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcodes: Option<OpcodeHistogram>,
}

/// Per-contract usage of one opcode: `[occurrences_in_code, contract_tx_count]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractUsage(pub u64, pub u64);

/// The aggregated opcode index persisted as `opcodes.json`.
///
/// Top-level keys are instruction bytes mapping to per-contract usage, plus
/// the reserved `"totals"` key holding the opcode totals across all
/// contracts. Two-hex-char opcode keys can never collide with `"totals"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpcodeIndex {
    /// Total occurrences of each opcode across all contracts.
    pub totals: BTreeMap<OpcodeByte, u64>,
    /// Per-opcode, per-contract usage.
    #[serde(flatten)]
    pub per_opcode: BTreeMap<OpcodeByte, BTreeMap<Address, ContractUsage>>,
}

impl OpcodeIndex {
    /// Record one contract's histogram entry for `opcode`.
    pub fn record(&mut self, opcode: OpcodeByte, address: Address, usage: ContractUsage) {
        *self.totals.entry(opcode).or_default() += usage.0;
        self.per_opcode.entry(opcode).or_default().insert(address, usage);
    }

    /// Contracts using `opcode`, with their usage counts.
    pub fn contracts_using(&self, opcode: OpcodeByte) -> Option<&BTreeMap<Address, ContractUsage>> {
        self.per_opcode.get(&opcode)
    }
}

/// Typed view of one transaction as returned inside a batch body.
///
/// Downloaded units keep the node's raw JSON; the indexer deserializes each
/// element into this view and ignores the fields it does not need.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchTransaction {
    /// Transaction hash.
    pub hash: TxHash,
    /// Sender address. A sender can never be a contract on this chain.
    pub from: Address,
    /// Recipient address; absent for deployment transactions.
    #[serde(default)]
    pub to: Option<Address>,
    /// Calldata.
    #[serde(default)]
    pub input: Option<String>,
    /// Block number (hex string as reported).
    #[serde(default, rename = "blockNumber")]
    pub block_number: Option<String>,
    /// Attached receipt.
    #[serde(default)]
    pub receipt: Option<BatchReceipt>,
}

/// Receipt fields the indexer cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchReceipt {
    /// Execution status, `"0x1"` on success.
    #[serde(default)]
    pub status: Option<String>,
    /// Address of the created contract, present on deployments.
    #[serde(default, rename = "contractAddress")]
    pub contract_address: Option<Address>,
}

impl BatchTransaction {
    /// Whether the receipt reports successful execution.
    pub fn is_success(&self) -> bool {
        self.receipt.as_ref().and_then(|r| r.status.as_deref()) == Some("0x1")
    }

    /// The contract created by this transaction, if its receipt records one.
    pub fn created_contract(&self) -> Option<Address> {
        self.receipt.as_ref().and_then(|r| r.contract_address)
    }
}
