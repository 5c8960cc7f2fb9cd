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

//! Contract classification over all downloaded units.

use crate::units::sorted_unit_files;
use eyre::Result;
use opscan_common::{load_json, ContractIndex, JsonStore, NoContractCache};
use opscan_engine::indexer::{backfill_runtimes, index_transactions};
use opscan_fetch::{FetchEngine, RpcClient};
use serde_json::Value;
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

/// Walk every unit file in batch order and keep the contract stores current.
pub async fn run(cli: &crate::Cli) -> Result<()> {
    let data_dir = cli.data_dir();

    let mut contracts: JsonStore<ContractIndex> = JsonStore::open(data_dir.contracts_file());
    let mut no_contracts: JsonStore<NoContractCache> =
        JsonStore::open(data_dir.no_contracts_file());

    let client = Arc::new(RpcClient::new(cli.rpc_url(), cli.retry_config())?);

    for unit in sorted_unit_files(&data_dir.transactions_dir())? {
        info!(file = %unit.display(), "Processing unit");
        let transactions: Vec<Value> = load_json(&unit)?;

        let started = Instant::now();
        let stats = index_transactions(
            &transactions,
            contracts.data_mut(),
            no_contracts.data_mut(),
            &client,
        )
        .await?;

        info!(
            new_contracts = stats.new_contracts,
            new_no_contracts = stats.new_no_contracts,
            contract_hits = stats.contract_hits,
            no_contract_hits = stats.no_contract_hits,
            rpc_calls = stats.rpc_calls,
            total_contracts = contracts.data().len(),
            elapsed_s = format!("{:.2}", started.elapsed().as_secs_f64()),
            "Unit processed"
        );

        // Flush after each unit, just in case we get killed in between.
        contracts.flush()?;
        no_contracts.flush()?;
    }

    // Contracts recorded through their deployment still lack runtime code.
    let fetch = cli.fetch_config();
    let engine = FetchEngine::new(client, fetch.workers, fetch.queries_per_request);
    let stats = backfill_runtimes(&engine, contracts.data_mut()).await;
    if !stats.is_complete() {
        warn!(
            lost_calls = stats.lost_calls,
            failed_workers = stats.failed_workers,
            "Runtime backfill incomplete; re-run index to fill the gaps"
        );
    }
    contracts.flush()?;

    info!(total_contracts = contracts.data().len(), "Index complete");
    Ok(())
}
