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

//! Static analysis: histograms, opcode index, candidate conflicts.

use eyre::Result;
use opscan_common::{dump_json, ContractIndex, JsonStore, UpgradeSpec};
use opscan_engine::{build_opcode_index, detect_conflicts};
use tracing::info;

/// Build the opcode index and candidate conflict map from the contract
/// index, persisting both.
pub async fn run(cli: &crate::Cli) -> Result<()> {
    let data_dir = cli.data_dir();

    let mut contracts: JsonStore<ContractIndex> = JsonStore::open(data_dir.contracts_file());
    if contracts.data().is_empty() {
        eyre::bail!("contract index is empty; run `opscan index` first");
    }

    let total_txs: usize = contracts.data().values().map(|r| r.txs.len()).sum();
    let total_failed: usize = contracts.data().values().map(|r| r.failed_txs.len()).sum();
    info!(
        contracts = contracts.data().len(),
        total_txs, total_failed, "Analyzing contract index"
    );

    let (index, modified) = build_opcode_index(contracts.data_mut());
    if modified {
        info!("Saving contracts with newly scanned histograms");
        contracts.flush()?;
    }
    dump_json(&data_dir.opcodes_file(), &index)?;

    let upgrade = UpgradeSpec::default();
    let conflicts = detect_conflicts(contracts.data(), &index, &upgrade);

    for (opcode, per_contract) in &conflicts {
        let total: usize = per_contract.values().map(Vec::len).sum();
        info!(
            opcode = %opcode,
            contracts = per_contract.len(),
            txs = total,
            "Candidate conflicts"
        );
    }
    dump_json(&data_dir.conflicts_file(), &conflicts)?;

    Ok(())
}
