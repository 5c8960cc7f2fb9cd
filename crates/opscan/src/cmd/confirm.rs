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

//! Dynamic confirmation of candidate conflicts through execution traces.

use eyre::{Result, WrapErr};
use opscan_common::{dump_json, load_json, ConflictMap, JsonStore, TraceCache, UpgradeSpec};
use opscan_engine::Reconciler;
use opscan_fetch::{FetchEngine, RpcClient};
use std::sync::Arc;
use tracing::info;

/// Reconcile both upgrade directions against real traces and persist the
/// confirmed issue maps.
pub async fn run(cli: &crate::Cli) -> Result<()> {
    let data_dir = cli.data_dir();

    let conflicts: ConflictMap = load_json(&data_dir.conflicts_file())
        .wrap_err("no candidate conflicts found; run `opscan analyze` first")?;

    // Traces need the debug namespace, which public gateways do not expose.
    let debug_url = cli.debug_rpc_url()?;
    let client = Arc::new(RpcClient::new(debug_url, cli.retry_config())?);

    let fetch = cli.fetch_config();
    let engine = FetchEngine::new(client, fetch.workers, fetch.trace_queries_per_request);

    let mut trace_store: JsonStore<TraceCache> = JsonStore::open(data_dir.trace_cache_file());
    info!(cached_traces = trace_store.data().len(), "Trace cache loaded");

    let upgrade = UpgradeSpec::default();
    let mut reconciler = Reconciler::new(&engine, &mut trace_store, fetch.traces_per_pass);

    // Failed txs that really executed a soon-to-be-unsupported opcode.
    let reverted = reconciler.confirm(&conflicts, &upgrade.unsupported).await?;
    dump_json(&data_dir.reverted_file(), &reverted)?;

    // Successful txs that really executed an opcode with changed semantics.
    let changed = reconciler.confirm(&conflicts, &upgrade.changed).await?;
    dump_json(&data_dir.changed_file(), &changed)?;

    info!(
        reverted_opcodes = reverted.values().filter(|m| !m.is_empty()).count(),
        changed_opcodes = changed.values().filter(|m| !m.is_empty()).count(),
        "Confirmation complete"
    );
    Ok(())
}
