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

//! Summary report over persisted artifacts.

use opscan_common::{ConflictMap, ContractIndex, IssueMap, NoContractCache, UpgradeSpec};
use std::fmt::Write;

/// Everything the summary draws on, loaded by the caller from the persisted
/// artifacts.
#[derive(Debug)]
pub struct ReportInputs<'a> {
    /// Network label for the headline.
    pub network: &'a str,
    /// Highest batch covered by the downloaded units, if any were found.
    pub last_batch: Option<u64>,
    /// Total transactions across all downloaded units.
    pub total_txs: usize,
    /// The contract index.
    pub contracts: &'a ContractIndex,
    /// The no-contract cache.
    pub no_contracts: &'a NoContractCache,
    /// Candidate conflicts.
    pub conflicts: &'a ConflictMap,
    /// The upgrade rule sets (for mnemonics in the candidate section).
    pub upgrade: &'a UpgradeSpec,
    /// Confirmed issues for the unsupported direction.
    pub reverted: &'a IssueMap,
    /// Confirmed issues for the changed direction.
    pub changed: &'a IssueMap,
}

const TOP_CONTRACTS: usize = 5;

/// Render the human-readable run summary.
pub fn render_summary(inputs: &ReportInputs<'_>) -> String {
    let mut out = String::new();

    match inputs.last_batch {
        Some(last_batch) => {
            let _ = writeln!(
                out,
                "Processed network {} until batch {} with a total of {} txs.",
                inputs.network, last_batch, inputs.total_txs
            );
        }
        None => {
            let _ = writeln!(out, "No downloaded units found for network {}.", inputs.network);
        }
    }
    let _ = writeln!(out, "- Addresses identified as contracts: {}", inputs.contracts.len());
    let _ = writeln!(out, "- Addresses identified as NO contracts: {}", inputs.no_contracts.len());

    let _ = writeln!(out, "\nContracts carrying unsupported opcodes:");
    for rule in &inputs.upgrade.unsupported {
        candidate_line(&mut out, inputs, rule.opcode, &rule.mnemonic, "unsupported");
    }

    let _ = writeln!(out, "\nContracts carrying changed opcodes:");
    for rule in &inputs.upgrade.changed {
        candidate_line(&mut out, inputs, rule.opcode, &rule.mnemonic, "changed");
    }

    let _ = writeln!(
        out,
        "\nTracing confirmed these failures involved an unsupported opcode:"
    );
    confirmed_section(&mut out, inputs.reverted, "reverted");

    let _ = writeln!(
        out,
        "\nTracing confirmed these successful txs executed a changed opcode:"
    );
    confirmed_section(&mut out, inputs.changed, "affected");

    out
}

fn candidate_line(
    out: &mut String,
    inputs: &ReportInputs<'_>,
    opcode: opscan_common::OpcodeByte,
    mnemonic: &str,
    kind: &str,
) {
    let per_contract = inputs.conflicts.get(&opcode);
    let n_contracts = per_contract.map_or(0, |m| m.len());
    let n_txs = per_contract.map_or(0, |m| m.values().map(Vec::len).sum());
    let _ = writeln!(
        out,
        "\t- {n_contracts} contracts with {kind} opcode {mnemonic} having a total of {n_txs} transactions."
    );
}

fn confirmed_section(out: &mut String, issues: &IssueMap, verb: &str) {
    for (mnemonic, per_contract) in issues {
        let n_contracts = per_contract.len();
        let n_txs: usize = per_contract.values().map(Vec::len).sum();
        let _ = writeln!(
            out,
            "\t- {n_contracts} contracts with {verb} txs for opcode {mnemonic} having a total of {n_txs} transactions."
        );
        if per_contract.is_empty() {
            continue;
        }

        let _ = writeln!(out, "\tTop contracts with most {verb} txs for {mnemonic}:");
        let mut top: Vec<_> = per_contract.iter().collect();
        top.sort_by_key(|(_, txs)| std::cmp::Reverse(txs.len()));
        for (address, txs) in top.into_iter().take(TOP_CONTRACTS) {
            let _ = writeln!(
                out,
                "\t\t- Contract {address} with {} {verb} txs using this opcode.",
                txs.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, TxHash};
    use opscan_common::{ContractRecord, OpcodeByte};

    #[test]
    fn test_summary_counts() {
        let addr = Address::repeat_byte(0xaa);

        let mut contracts = ContractIndex::new();
        contracts.insert(addr, ContractRecord::default());
        let mut no_contracts = NoContractCache::new();
        no_contracts.insert(Address::repeat_byte(0x01), true);
        no_contracts.insert(Address::repeat_byte(0x02), true);

        let mut conflicts = ConflictMap::new();
        conflicts
            .entry(OpcodeByte(0x5c))
            .or_default()
            .insert(addr, vec![TxHash::repeat_byte(0x01), TxHash::repeat_byte(0x02)]);

        let mut reverted = IssueMap::new();
        reverted
            .entry("TLOAD".to_string())
            .or_default()
            .insert(addr, vec![TxHash::repeat_byte(0x01)]);
        let changed = IssueMap::new();

        let summary = render_summary(&ReportInputs {
            network: "mainnet",
            last_batch: Some(1234),
            total_txs: 42,
            contracts: &contracts,
            no_contracts: &no_contracts,
            conflicts: &conflicts,
            upgrade: &UpgradeSpec::default(),
            reverted: &reverted,
            changed: &changed,
        });

        assert!(summary.contains("until batch 1234 with a total of 42 txs"));
        assert!(summary.contains("Addresses identified as contracts: 1"));
        assert!(summary.contains("Addresses identified as NO contracts: 2"));
        assert!(summary
            .contains("1 contracts with unsupported opcode TLOAD having a total of 2 transactions"));
        assert!(summary
            .contains("1 contracts with reverted txs for opcode TLOAD having a total of 1 transactions"));
        assert!(summary.contains(&addr.to_string()));
    }

    #[test]
    fn test_summary_without_units() {
        let contracts = ContractIndex::new();
        let no_contracts = NoContractCache::new();
        let conflicts = ConflictMap::new();
        let reverted = IssueMap::new();
        let changed = IssueMap::new();

        let summary = render_summary(&ReportInputs {
            network: "cardona",
            last_batch: None,
            total_txs: 0,
            contracts: &contracts,
            no_contracts: &no_contracts,
            conflicts: &conflicts,
            upgrade: &UpgradeSpec::default(),
            reverted: &reverted,
            changed: &changed,
        });

        assert!(summary.contains("No downloaded units found for network cardona."));
        assert!(summary.contains("0 contracts with unsupported opcode BLOBHASH"));
    }
}
