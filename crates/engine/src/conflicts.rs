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

//! Opcode-index aggregation and candidate conflict detection.
//!
//! Aggregation is the only consumer of the scanner: histograms are built
//! lazily, cached on the contract record, and rolled up into the global
//! opcode index. Detection then cross-references the index with each
//! contract's transaction outcomes: an unsupported opcode makes the
//! contract's *failed* transactions suspect (the opcode may be why they
//! failed), a changed opcode makes its *successful* transactions suspect
//! (they would run under different semantics now).

use crate::scanner::scan_runtime;
use opscan_common::{ConflictMap, ContractIndex, ContractUsage, OpcodeIndex, UpgradeSpec};
use tracing::{error, info};

/// Build the global opcode index, computing and caching per-contract
/// histograms where missing.
///
/// Returns the index and whether any contract record was modified (callers
/// persist the contract index only when it was). A contract whose runtime is
/// missing or unscannable is skipped with a diagnostic; the build goes on
/// for every other contract.
pub fn build_opcode_index(contracts: &mut ContractIndex) -> (OpcodeIndex, bool) {
    let mut index = OpcodeIndex::default();
    let mut modified = false;

    for (address, record) in contracts.iter_mut() {
        if record.opcodes.is_none() {
            match record.runtime.as_deref() {
                Some(runtime) => match scan_runtime(runtime) {
                    Ok(histogram) => {
                        record.opcodes = Some(histogram);
                        modified = true;
                    }
                    Err(e) => {
                        error!(%address, "Skipping contract with unscannable runtime: {e}");
                        continue;
                    }
                },
                None => {
                    error!(%address, "Skipping contract without runtime bytecode");
                    continue;
                }
            }
        }

        let call_count = record.tx_count;
        if let Some(histogram) = &record.opcodes {
            for (opcode, count) in histogram {
                index.record(*opcode, *address, ContractUsage(*count, call_count));
            }
        }
    }

    info!(
        contracts = contracts.len(),
        opcodes = index.per_opcode.len(),
        "Opcode index built"
    );
    (index, modified)
}

/// Cross-reference the opcode index with transaction outcomes to produce
/// candidate conflicts for both upgrade directions.
///
/// Every rule opcode gets an entry, possibly empty. A candidate is only
/// statically plausible: the opcode exists in the contract's code and the
/// contract has transactions of the relevant outcome. Confirmation against
/// real traces is the reconciler's job.
pub fn detect_conflicts(
    contracts: &ContractIndex,
    index: &OpcodeIndex,
    upgrade: &UpgradeSpec,
) -> ConflictMap {
    let mut conflicts = ConflictMap::new();

    // Failed txs on contracts with unsupported opcodes: they could have
    // failed because of the soon-to-be-unsupported opcode.
    for rule in &upgrade.unsupported {
        let entry = conflicts.entry(rule.opcode).or_default();
        let Some(users) = index.contracts_using(rule.opcode) else { continue };
        for (address, usage) in users {
            if usage.0 == 0 {
                continue;
            }
            if let Some(record) = contracts.get(address) {
                if !record.failed_txs.is_empty() {
                    entry.insert(*address, record.failed_txs.clone());
                }
            }
        }
    }

    // Successful txs on contracts with changed opcodes: they could behave
    // differently now.
    for rule in &upgrade.changed {
        let entry = conflicts.entry(rule.opcode).or_default();
        let Some(users) = index.contracts_using(rule.opcode) else { continue };
        for (address, usage) in users {
            if usage.0 == 0 {
                continue;
            }
            if let Some(record) = contracts.get(address) {
                if !record.txs.is_empty() {
                    entry.insert(*address, record.txs.clone());
                }
            }
        }
    }

    conflicts
}
