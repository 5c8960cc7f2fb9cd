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

//! Trace-backed confirmation of candidate conflicts.
//!
//! A candidate only proves the opcode exists in the contract's code; the
//! reconciler asks the node what each candidate transaction actually
//! executed. Traces are expensive, so every reconciled transaction lands in
//! a persistent cache keyed by hash (a mined transaction's trace never
//! changes), and the cache is flushed after each opcode: a crash mid-opcode
//! redoes at most that opcode, and cached transactions cost zero further
//! RPC calls.

use eyre::Result;
use opscan_common::{ConflictMap, IssueMap, JsonStore, OpcodeRule, TraceCache};
use opscan_fetch::{fetch_executed_opcodes, FetchEngine};
use tracing::{info, warn};

/// Confirms candidate conflicts against real execution traces.
pub struct Reconciler<'a> {
    engine: &'a FetchEngine,
    trace_store: &'a mut JsonStore<TraceCache>,
    traces_per_pass: usize,
}

impl<'a> Reconciler<'a> {
    /// New reconciler fetching through `engine` (which should use the
    /// smaller trace chunk size) and memoizing into `trace_store`.
    /// `traces_per_pass` bounds how many candidate transactions are handed
    /// to the engine at once.
    pub fn new(
        engine: &'a FetchEngine,
        trace_store: &'a mut JsonStore<TraceCache>,
        traces_per_pass: usize,
    ) -> Self {
        Self { engine, trace_store, traces_per_pass: traces_per_pass.max(1) }
    }

    /// Confirm the candidates of one upgrade direction.
    ///
    /// A transaction is confirmed for every rule mnemonic of this direction
    /// that appears in its executed-opcode set: for an unsupported opcode
    /// that means the opcode really ran and so really caused (or at least
    /// accompanied) the original failure; for a changed opcode it means the
    /// opcode really executed during a successful run, so the semantic
    /// change is relevant.
    ///
    /// Every rule mnemonic gets an entry in the result, possibly empty.
    pub async fn confirm(
        &mut self,
        conflicts: &ConflictMap,
        rules: &[OpcodeRule],
    ) -> Result<IssueMap> {
        let mut issues: IssueMap =
            rules.iter().map(|rule| (rule.mnemonic.clone(), Default::default())).collect();

        for rule in rules {
            let Some(candidates) = conflicts.get(&rule.opcode) else { continue };
            let mut dirty = false;

            for (address, tx_hashes) in candidates {
                let to_trace: Vec<_> = tx_hashes
                    .iter()
                    .filter(|hash| !self.trace_store.data().contains_key(*hash))
                    .copied()
                    .collect();

                info!(
                    %address,
                    opcode = %rule.opcode,
                    candidates = tx_hashes.len(),
                    to_trace = to_trace.len(),
                    "Reconciling candidate set"
                );

                for pass in to_trace.chunks(self.traces_per_pass) {
                    let (executed, stats) = fetch_executed_opcodes(self.engine, pass).await;
                    if !stats.is_complete() {
                        warn!(
                            lost_calls = stats.lost_calls,
                            failed_workers = stats.failed_workers,
                            "Trace fetch incomplete, unresolved candidates stay unconfirmed"
                        );
                    }
                    if !executed.is_empty() {
                        self.trace_store.data_mut().extend(executed);
                        dirty = true;
                    }
                }

                for tx_hash in tx_hashes {
                    let Some(executed) = self.trace_store.data().get(tx_hash) else {
                        warn!(%tx_hash, "No trace available, candidate left unconfirmed");
                        continue;
                    };

                    for hit in rules.iter().filter(|r| executed.contains(&r.mnemonic)) {
                        let txs = issues
                            .entry(hit.mnemonic.clone())
                            .or_default()
                            .entry(*address)
                            .or_default();
                        if !txs.contains(tx_hash) {
                            txs.push(*tx_hash);
                        }
                    }
                }
            }

            // Persist after each opcode so a crash redoes at most one opcode
            // and never re-fetches what is already cached.
            if dirty {
                self.trace_store.flush()?;
            }
        }

        Ok(issues)
    }
}
