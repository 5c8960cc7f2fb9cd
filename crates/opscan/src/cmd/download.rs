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

//! Resumable batch download.
//!
//! Each iteration fetches one range of batches through the engine and dumps
//! the flattened transactions into one unit file. The last unit on disk is
//! always treated as partial and redone, so a killed run resumes cleanly.

use crate::units::{resume_point, unit_file_name};
use eyre::Result;
use opscan_fetch::{fetch_batch_transactions, latest_verified_batch, FetchEngine, RpcClient};
use std::{fs, sync::Arc, time::Instant};
use tracing::{info, warn};

/// Download every verified batch that is not on disk yet.
pub async fn run(cli: &crate::Cli) -> Result<()> {
    let data_dir = cli.data_dir();
    let tx_dir = data_dir.transactions_dir();
    fs::create_dir_all(&tx_dir)?;

    let first_batch = resume_point(&tx_dir)?;

    let retry = cli.retry_config();
    let client = Arc::new(RpcClient::new(cli.rpc_url(), retry)?);

    // Foundational call: without the chain head there is nothing to do.
    let last_batch = latest_verified_batch(&client).await?;
    info!(first_batch, last_batch, "Getting batches");

    let fetch = cli.fetch_config();
    let engine = FetchEngine::new(client, fetch.workers, fetch.queries_per_request);

    let run_started = Instant::now();
    let mut unit_start = first_batch;
    while unit_start <= last_batch {
        let unit_end = last_batch.min(unit_start + fetch.batches_per_unit - 1);
        let batch_ids: Vec<u64> = (unit_start..=unit_end).collect();

        info!(unit_start, unit_end, "Downloading unit");
        let started = Instant::now();
        let (transactions, stats) = fetch_batch_transactions(&engine, &batch_ids).await;

        if !stats.is_complete() {
            // The unit is not written, so the next run resumes right here.
            warn!(
                lost_calls = stats.lost_calls,
                failed_workers = stats.failed_workers,
                "Unit fetched incomplete, stopping; re-run download to retry"
            );
            eyre::bail!("unit {unit_start}..={unit_end} fetched incomplete");
        }

        opscan_common::dump_json(
            &tx_dir.join(unit_file_name(unit_start, unit_end)),
            &transactions,
        )?;

        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            batches = unit_end - unit_start + 1,
            txs = transactions.len(),
            elapsed_s = format!("{elapsed:.2}"),
            txs_per_s = format!("{:.0}", transactions.len() as f64 / elapsed),
            "Unit downloaded"
        );

        unit_start = unit_end + 1;
    }

    info!(elapsed_s = format!("{:.2}", run_started.elapsed().as_secs_f64()), "Download complete");
    Ok(())
}
