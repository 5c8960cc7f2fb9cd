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

//! Contract classification over downloaded transaction units.
//!
//! One pass per unit, updating two persistent caches: the contract index and
//! the no-contract cache. Senders can never be contracts on this chain, so
//! every `from` lands in the no-contract cache for free. Recipients resolve
//! through the caches first and fall back to a single `eth_getCode` call
//! only for addresses never seen before; both caches make a redone unit
//! cheap and idempotent.

use alloy_primitives::TxHash;
use eyre::Result;
use opscan_common::{BatchTransaction, ContractIndex, ContractRecord, NoContractCache};
use opscan_fetch::{fetch_code, fetch_contract_codes, FetchEngine, FetchStats, RpcClient};
use serde_json::Value;
use tracing::{debug, warn};

/// Per-unit classification counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerStats {
    /// Contracts discovered in this unit.
    pub new_contracts: usize,
    /// Addresses newly proven not to be contracts.
    pub new_no_contracts: usize,
    /// Calls that resolved against an already-known contract.
    pub contract_hits: usize,
    /// Calls that resolved against the no-contract cache.
    pub no_contract_hits: usize,
    /// Recipients that needed an `eth_getCode` round trip.
    pub rpc_calls: usize,
    /// Elements that could not be parsed as transactions.
    pub skipped: usize,
}

/// Classify every transaction of one downloaded unit.
///
/// Re-running a unit is idempotent: hash lists are ordered sets (duplicates
/// are not appended) and `tx_count` only advances with a newly recorded
/// hash.
pub async fn index_transactions(
    transactions: &[Value],
    contracts: &mut ContractIndex,
    no_contracts: &mut NoContractCache,
    client: &RpcClient,
) -> Result<IndexerStats> {
    let mut stats = IndexerStats::default();

    for raw in transactions {
        let tx: BatchTransaction = match serde_json::from_value(raw.clone()) {
            Ok(tx) => tx,
            Err(e) => {
                warn!("Skipping unparseable transaction element: {e}");
                stats.skipped += 1;
                continue;
            }
        };

        // An externally-owned sender can never be a contract.
        if no_contracts.insert(tx.from, true).is_none() {
            stats.new_no_contracts += 1;
        }

        // Direct contract creation carries its metadata in the receipt.
        if let Some(created) = tx.created_contract() {
            contracts.insert(
                created,
                ContractRecord {
                    create_tx_hash: Some(tx.hash),
                    create_block: tx.block_number.clone(),
                    creator: Some(tx.from),
                    input: tx.input.clone(),
                    ..Default::default()
                },
            );
            stats.new_contracts += 1;
            continue;
        }

        let Some(to) = tx.to else {
            warn!(hash = %tx.hash, "Transaction has neither recipient nor created contract");
            stats.skipped += 1;
            continue;
        };

        // Regular execution on a known contract.
        if let Some(record) = contracts.get_mut(&to) {
            record_call(record, tx.hash, tx.is_success());
            stats.contract_hits += 1;
            continue;
        }

        // Already checked and not a contract.
        if no_contracts.contains_key(&to) {
            stats.no_contract_hits += 1;
            continue;
        }

        // Never seen before: ask the node for code to be sure.
        let code = fetch_code(client, to).await?;
        stats.rpc_calls += 1;
        match code {
            Some(code) if !code.is_empty() && code != "0x" => {
                let mut record = ContractRecord {
                    runtime: Some(code),
                    ..Default::default()
                };
                record_call(&mut record, tx.hash, tx.is_success());
                contracts.insert(to, record);
                stats.new_contracts += 1;
            }
            _ => {
                // Empty code, or the node kept failing the lookup: either
                // way there is nothing to scan behind this address.
                no_contracts.insert(to, true);
                stats.new_no_contracts += 1;
            }
        }
    }

    debug!(?stats, "Unit indexed");
    Ok(stats)
}

/// Fetch runtime bytecode for every contract that still lacks it.
///
/// Contracts discovered through their deployment transaction are recorded
/// before their runtime exists on chain-side view of the unit, so the
/// runtime is backfilled in one batched pass at the end.
pub async fn backfill_runtimes(
    engine: &FetchEngine,
    contracts: &mut ContractIndex,
) -> FetchStats {
    let missing: Vec<_> = contracts
        .iter()
        .filter(|(_, record)| record.runtime.is_none())
        .map(|(address, _)| *address)
        .collect();

    if missing.is_empty() {
        return FetchStats::default();
    }

    let (codes, stats) = fetch_contract_codes(engine, &missing).await;
    for (address, code) in codes {
        if let Some(record) = contracts.get_mut(&address) {
            record.runtime = Some(code);
        }
    }
    stats
}

fn record_call(record: &mut ContractRecord, hash: TxHash, success: bool) {
    let list = if success { &mut record.txs } else { &mut record.failed_txs };
    if !list.contains(&hash) {
        list.push(hash);
        record.tx_count += 1;
    }
}
