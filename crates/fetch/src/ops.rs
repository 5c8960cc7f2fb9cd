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

//! Typed fetch variants and chain-head helpers.
//!
//! The three instantiations of the fetch engine differ only in method name,
//! parameter shape and correlation tag; this module owns those differences
//! and converts raw elements into the forms the pipeline consumes.

use crate::{
    client::{BatchCall, RpcClient},
    engine::{FetchEngine, FetchStats},
};
use alloy_primitives::{Address, TxHash};
use eyre::{eyre, Result};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Fetch full batch bodies for `batch_ids` and flatten them into one
/// transaction list.
///
/// A batch body without a `transactions` field (empty batches) contributes
/// nothing, matching the normalize-to-empty-list rule. Transactions carry no
/// defined order across workers.
pub async fn fetch_batch_transactions(
    engine: &FetchEngine,
    batch_ids: &[u64],
) -> (Vec<Value>, FetchStats) {
    let outcome = engine
        .run(
            batch_ids.to_vec(),
            |batch_number| BatchCall {
                method: "zkevm_getBatchByNumber",
                params: json!([format!("{batch_number:#x}"), true]),
                id: json!(batch_number),
            },
            "number",
        )
        .await;

    let mut transactions = Vec::new();
    for mut batch in outcome.elements {
        let Some(body) = batch.as_object_mut() else {
            warn!("Skipping non-object batch body");
            continue;
        };
        if let Some(Value::Array(txs)) = body.remove("transactions") {
            transactions.extend(txs);
        }
        // missing or null transactions: the batch is simply empty
    }

    (transactions, outcome.stats)
}

/// Fetch runtime bytecode for `addresses`.
///
/// Returns `(address, code)` pairs keyed by the correlation attribute each
/// element carries; addresses the node answered with malformed elements are
/// skipped with a warning and show up as under-delivery to the caller.
pub async fn fetch_contract_codes(
    engine: &FetchEngine,
    addresses: &[Address],
) -> (Vec<(Address, String)>, FetchStats) {
    let outcome = engine
        .run(
            addresses.to_vec(),
            |address| BatchCall {
                method: "eth_getCode",
                params: json!([address, "latest"]),
                id: json!(address),
            },
            "address",
        )
        .await;

    let mut codes = Vec::new();
    for element in outcome.elements {
        let address = element
            .get("address")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Address>().ok());
        let code = element.get("result").and_then(Value::as_str);
        match (address, code) {
            (Some(address), Some(code)) => codes.push((address, code.to_string())),
            _ => warn!(%element, "Skipping malformed code element"),
        }
    }

    (codes, outcome.stats)
}

/// Fetch execution traces for `tx_hashes` and reduce each to the set of
/// opcode mnemonics it executed.
///
/// Storage, stack, memory and return-data capture are disabled: only the
/// step list matters and trace payloads are large even without them. The
/// engine driving this should use the smaller trace chunk size.
pub async fn fetch_executed_opcodes(
    engine: &FetchEngine,
    tx_hashes: &[TxHash],
) -> (BTreeMap<TxHash, BTreeSet<String>>, FetchStats) {
    let outcome = engine
        .run(
            tx_hashes.to_vec(),
            |tx_hash| BatchCall {
                method: "debug_traceTransaction",
                params: json!([tx_hash, {
                    "disableStorage": true,
                    "disableStack": true,
                    "disableMemory": true,
                    "disableReturnData": true,
                }]),
                id: json!(tx_hash),
            },
            "tx_hash",
        )
        .await;

    let mut executed = BTreeMap::new();
    for element in outcome.elements {
        let tx_hash = element
            .get("tx_hash")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<TxHash>().ok());
        let Some(tx_hash) = tx_hash else {
            warn!("Skipping trace element without a usable tx_hash tag");
            continue;
        };

        let mut opcodes = BTreeSet::new();
        if let Some(steps) = element.get("structLogs").and_then(Value::as_array) {
            for step in steps {
                if let Some(op) = step.get("op").and_then(Value::as_str) {
                    opcodes.insert(op.to_string());
                }
            }
        }
        executed.insert(tx_hash, opcodes);
    }

    (executed, outcome.stats)
}

/// Latest verified batch number. Foundational: absence is fatal.
pub async fn latest_verified_batch(client: &RpcClient) -> Result<u64> {
    let result = client
        .call("zkevm_verifiedBatchNumber", json!([]))
        .await?
        .ok_or_else(|| eyre!("node returned no result for zkevm_verifiedBatchNumber"))?;
    parse_hex_u64(&result)
}

/// Latest (trusted) batch number. Foundational: absence is fatal.
pub async fn latest_batch(client: &RpcClient) -> Result<u64> {
    let result = client
        .call("zkevm_batchNumber", json!([]))
        .await?
        .ok_or_else(|| eyre!("node returned no result for zkevm_batchNumber"))?;
    parse_hex_u64(&result)
}

/// Latest block number. Foundational: absence is fatal.
pub async fn latest_block(client: &RpcClient) -> Result<u64> {
    let result = client
        .call("eth_blockNumber", json!([]))
        .await?
        .ok_or_else(|| eyre!("node returned no result for eth_blockNumber"))?;
    parse_hex_u64(&result)
}

/// Fetch one contract's runtime bytecode with a single call.
///
/// Used by the indexer to resolve recipients it has never seen before.
/// `Ok(None)` means the node kept failing the call; an empty or `"0x"` code
/// still comes back as `Ok(Some(..))` and means no contract.
pub async fn fetch_code(client: &RpcClient, address: Address) -> Result<Option<String>> {
    let result = client.call("eth_getCode", json!([address, "latest"])).await?;
    Ok(result.and_then(|v| v.as_str().map(str::to_string)))
}

fn parse_hex_u64(value: &Value) -> Result<u64> {
    let raw = value.as_str().ok_or_else(|| eyre!("expected hex string, got {value}"))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    Ok(u64::from_str_radix(digits, 16)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opscan_common::RetryConfig;
    use std::{sync::Arc, time::Duration};
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            throttle_cooldown: Duration::from_millis(10),
            error_retries: 1,
            batch_retries: 1,
            batch_retry_pause: Duration::from_millis(10),
        }
    }

    fn engine_for(uri: String, chunk_size: usize) -> FetchEngine {
        let client = Arc::new(RpcClient::new(uri, fast_retry()).unwrap());
        FetchEngine::new(client, 2, chunk_size)
    }

    /// Serves batch bodies: batch 1 has two transactions, batch 2 has none
    /// (no `transactions` field at all), batch 3 has a null list.
    struct BatchRpc;

    impl Respond for BatchRpc {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            let elements: Vec<Value> = body
                .as_array()
                .unwrap()
                .iter()
                .map(|call| {
                    let id = call["id"].as_u64().unwrap();
                    let batch = match id {
                        1 => json!({
                            "number": "0x1",
                            "transactions": [ { "hash": "0x01" }, { "hash": "0x02" } ]
                        }),
                        2 => json!({ "number": "0x2" }),
                        _ => json!({ "number": "0x3", "transactions": null }),
                    };
                    json!({ "jsonrpc": "2.0", "id": id, "result": batch })
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(Value::Array(elements))
        }
    }

    #[tokio::test]
    async fn test_fetch_batch_transactions_flattens_and_normalizes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(BatchRpc)
            .mount(&mock_server)
            .await;

        let engine = engine_for(mock_server.uri(), 10);
        let (txs, stats) = fetch_batch_transactions(&engine, &[1, 2, 3]).await;

        assert!(stats.is_complete());
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0]["hash"], "0x01");
        assert_eq!(txs[1]["hash"], "0x02");
    }

    #[tokio::test]
    async fn test_fetch_contract_codes() {
        let mock_server = MockServer::start().await;

        let addr_a = Address::repeat_byte(0xaa);
        let addr_b = Address::repeat_byte(0xbb);

        struct CodeRpc;
        impl Respond for CodeRpc {
            fn respond(&self, request: &Request) -> ResponseTemplate {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let elements: Vec<Value> = body
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|call| {
                        let id = call["id"].clone();
                        json!({ "jsonrpc": "2.0", "id": id, "result": "0x6000" })
                    })
                    .collect();
                ResponseTemplate::new(200).set_body_json(Value::Array(elements))
            }
        }

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(CodeRpc)
            .mount(&mock_server)
            .await;

        let engine = engine_for(mock_server.uri(), 10);
        let (codes, stats) = fetch_contract_codes(&engine, &[addr_a, addr_b]).await;

        assert!(stats.is_complete());
        let codes: BTreeMap<Address, String> = codes.into_iter().collect();
        assert_eq!(codes.get(&addr_a).map(String::as_str), Some("0x6000"));
        assert_eq!(codes.get(&addr_b).map(String::as_str), Some("0x6000"));
    }

    #[tokio::test]
    async fn test_fetch_executed_opcodes_dedups_steps() {
        let mock_server = MockServer::start().await;

        struct TraceRpc;
        impl Respond for TraceRpc {
            fn respond(&self, request: &Request) -> ResponseTemplate {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let elements: Vec<Value> = body
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|call| {
                        let id = call["id"].clone();
                        json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "gas": 21000,
                                "structLogs": [
                                    { "op": "PUSH1", "pc": 0 },
                                    { "op": "TLOAD", "pc": 2 },
                                    { "op": "PUSH1", "pc": 3 }
                                ]
                            }
                        })
                    })
                    .collect();
                ResponseTemplate::new(200).set_body_json(Value::Array(elements))
            }
        }

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(TraceRpc)
            .mount(&mock_server)
            .await;

        let tx = TxHash::repeat_byte(0x11);
        let engine = engine_for(mock_server.uri(), 5);
        let (executed, stats) = fetch_executed_opcodes(&engine, &[tx]).await;

        assert!(stats.is_complete());
        let opcodes = executed.get(&tx).unwrap();
        assert_eq!(opcodes.len(), 2);
        assert!(opcodes.contains("PUSH1"));
        assert!(opcodes.contains("TLOAD"));
    }

    #[tokio::test]
    async fn test_latest_verified_batch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({ "method": "zkevm_verifiedBatchNumber" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x2a"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        assert_eq!(latest_verified_batch(&client).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_latest_verified_batch_absence_is_fatal() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "unavailable" }
            })))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        assert!(latest_verified_batch(&client).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_code_single() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x"
            })))
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let code = fetch_code(&client, Address::repeat_byte(0x01)).await.unwrap();
        assert_eq!(code.as_deref(), Some("0x"));
    }
}
