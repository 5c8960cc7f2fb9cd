//! Worker fan-out/fan-in over batched RPC calls.
//!
//! One engine invocation partitions its work items into contiguous
//! per-worker slices and spawns a task per non-empty slice. Each worker
//! walks its slice in sub-chunks, issues one batched RPC call per sub-chunk
//! and accumulates the returned elements locally, so nothing is shared while
//! workers run. The engine completes only after every worker has terminated;
//! results are concatenated in worker-start order, which is NOT the original
//! item order. Callers must key elements by the correlation attribute they
//! carry, never by position.

use crate::client::{BatchCall, RpcClient};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Delivery counters for one engine invocation.
///
/// Under-delivery is an explicit, observable condition here rather than a
/// log line: a lost call means a batched request exhausted its retry budget
/// (the unit's data must be fetched again later), a failed worker means a
/// fatal transport error or panic cut a slice short. Elements dropped
/// because the server reported no data behind their id are legitimate
/// absences and do not count as loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Work items submitted to this invocation.
    pub requested: usize,
    /// Batched calls that were lost after exhausting their retry budget.
    pub lost_calls: usize,
    /// Workers that aborted before finishing their slice.
    pub failed_workers: usize,
}

impl FetchStats {
    /// Whether every batched call of the run was answered.
    pub fn is_complete(&self) -> bool {
        self.lost_calls == 0 && self.failed_workers == 0
    }
}

/// Raw result of one engine invocation.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Returned elements, concatenated in worker-start order.
    pub elements: Vec<Value>,
    /// Delivery counters.
    pub stats: FetchStats,
}

/// The parametrized fetch engine.
///
/// The same mechanism serves batch-by-number, code-by-address and
/// trace-by-hash retrieval; invocations differ only in the request builder,
/// the correlation tag and the chunk size.
pub struct FetchEngine {
    client: Arc<RpcClient>,
    workers: usize,
    chunk_size: usize,
}

impl FetchEngine {
    /// New engine issuing batched calls of at most `chunk_size` items,
    /// fanned out over at most `workers` tasks.
    pub fn new(client: Arc<RpcClient>, workers: usize, chunk_size: usize) -> Self {
        Self { client, workers: workers.max(1), chunk_size: chunk_size.max(1) }
    }

    /// The client this engine fetches through.
    pub fn client(&self) -> &Arc<RpcClient> {
        &self.client
    }

    /// Fetch all `items`, building one call per item with `builder` and
    /// tagging each response element's correlation id under `tag`.
    pub async fn run<I, B>(&self, items: Vec<I>, builder: B, tag: &'static str) -> FetchOutcome
    where
        I: Send + Sync + 'static,
        B: Fn(&I) -> BatchCall + Send + Sync + 'static,
    {
        let requested = items.len();
        if requested == 0 {
            return FetchOutcome { stats: FetchStats { requested, ..Default::default() }, ..Default::default() };
        }

        // Slices are ⌈N/W⌉ rounded up to a chunk multiple: sub-chunks then
        // never straddle workers, and the whole run issues exactly ⌈N/c⌉
        // batched calls.
        let per_worker =
            requested.div_ceil(self.workers).next_multiple_of(self.chunk_size);

        let mut slices = Vec::new();
        let mut items = items;
        while items.len() > per_worker {
            let tail = items.split_off(per_worker);
            slices.push(items);
            items = tail;
        }
        slices.push(items);

        debug!(
            requested,
            workers = slices.len(),
            per_worker,
            chunk_size = self.chunk_size,
            tag,
            "Fanning out fetch"
        );

        let builder = Arc::new(builder);
        let mut handles = Vec::with_capacity(slices.len());
        for (worker_id, slice) in slices.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let builder = Arc::clone(&builder);
            let chunk_size = self.chunk_size;

            handles.push(tokio::spawn(async move {
                let mut elements = Vec::new();
                let mut lost_calls = 0usize;
                let mut failed = false;

                for sub_chunk in slice.chunks(chunk_size) {
                    let calls: Vec<BatchCall> =
                        sub_chunk.iter().map(|item| builder(item)).collect();
                    match client.call_batch(&calls, tag).await {
                        Ok(Some(mut batch)) => elements.append(&mut batch),
                        Ok(None) => {
                            lost_calls += 1;
                            warn!(
                                worker_id,
                                items = calls.len(),
                                "Batched call lost, its items must be fetched again later"
                            );
                        }
                        Err(e) => {
                            // Fatal for this worker only; siblings keep going.
                            error!(worker_id, "Worker aborting on fatal RPC error: {e:#}");
                            failed = true;
                            break;
                        }
                    }
                }

                (elements, lost_calls, failed)
            }));
        }

        // Join barrier: every worker is awaited, in spawn order, before the
        // engine returns. There is no cooperative cancellation.
        let mut outcome =
            FetchOutcome { stats: FetchStats { requested, ..Default::default() }, ..Default::default() };
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((mut elements, lost_calls, failed)) => {
                    outcome.elements.append(&mut elements);
                    outcome.stats.lost_calls += lost_calls;
                    if failed {
                        outcome.stats.failed_workers += 1;
                    }
                }
                Err(e) => {
                    error!("Fetch worker panicked: {e}");
                    outcome.stats.failed_workers += 1;
                }
            }
        }

        if !outcome.stats.is_complete() {
            warn!(
                lost_calls = outcome.stats.lost_calls,
                failed_workers = outcome.stats.failed_workers,
                "Fetch finished incomplete"
            );
        }

        outcome
    }
}
