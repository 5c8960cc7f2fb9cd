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

//! Human-readable summary over all persisted artifacts.

use crate::units::{parse_unit_range, sorted_unit_files};
use eyre::{Result, WrapErr};
use opscan_common::{
    load_json, ConflictMap, ContractIndex, IssueMap, NoContractCache, UpgradeSpec,
};
use opscan_engine::report::{render_summary, ReportInputs};
use serde_json::Value;

/// Compose and print the run summary.
pub async fn run(cli: &crate::Cli) -> Result<()> {
    let data_dir = cli.data_dir();
    let network = cli.network.to_string();

    let contracts: ContractIndex = load_json(&data_dir.contracts_file())
        .wrap_err("no contract index found; run `opscan index` first")?;
    let no_contracts: NoContractCache =
        load_json(&data_dir.no_contracts_file()).unwrap_or_default();

    // Later stages may not have run yet; the report shows what exists.
    let conflicts: ConflictMap = load_json(&data_dir.conflicts_file()).unwrap_or_default();
    let reverted: IssueMap = load_json(&data_dir.reverted_file()).unwrap_or_default();
    let changed: IssueMap = load_json(&data_dir.changed_file()).unwrap_or_default();

    let tx_dir = data_dir.transactions_dir();
    let units = if tx_dir.is_dir() { sorted_unit_files(&tx_dir)? } else { Vec::new() };
    let last_batch = units
        .last()
        .and_then(|p| p.file_name()?.to_str())
        .and_then(parse_unit_range)
        .map(|(_, end)| end);

    let mut total_txs = 0usize;
    for unit in &units {
        let transactions: Vec<Value> = load_json(unit)?;
        total_txs += transactions.len();
    }

    let summary = render_summary(&ReportInputs {
        network: &network,
        last_batch,
        total_txs,
        contracts: &contracts,
        no_contracts: &no_contracts,
        conflicts: &conflicts,
        upgrade: &UpgradeSpec::default(),
        reverted: &reverted,
        changed: &changed,
    });

    println!();
    println!("*** SUMMARY ***");
    println!("{summary}");
    Ok(())
}
