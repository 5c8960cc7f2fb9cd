//! Raw JSON-RPC client with retry, backoff and throttle handling.
//!
//! Two calling conventions share one transport loop: [`RpcClient::call`]
//! sends a single envelope and unwraps its `result`; [`RpcClient::call_batch`]
//! sends an array of envelopes in one round trip and re-associates each
//! response element with the correlation id the caller chose for it.
//!
//! Failure handling follows a fixed taxonomy. Transport problems (timeouts,
//! connection resets, HTTP 5xx and 429) are retried with quadratic backoff
//! up to a budget; exhausting it is fatal for the call and surfaces as `Err`.
//! Envelope-level errors are retried by plain resubmission and exhaust into
//! `Ok(None)`: the unit's data is missing, the run goes on. One specific
//! error message means "no data behind this id" and is absence, not failure.

use eyre::Result;
use opscan_common::RetryConfig;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Error message the node returns for a batch element with no data behind it
/// (e.g. a batch that contains no transactions). Treated as absence.
const NO_DATA_ERROR: &str = "method handler crashed";

/// One call inside a batched request.
///
/// `id` is the caller-chosen correlation value reflected back by the server;
/// it is not a protocol sequence number. Uniqueness within one batched call
/// is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct BatchCall {
    /// JSON-RPC method name.
    pub method: &'static str,
    /// Positional parameters.
    pub params: Value,
    /// Correlation id (batch number, address or transaction hash).
    pub id: Value,
}

#[derive(Debug, thiserror::Error)]
enum TransportFailure {
    #[error("throttled with HTTP 429")]
    Throttled,
    #[error("server error HTTP {0}")]
    Server(StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response body is not JSON: {0}")]
    Body(reqwest::Error),
}

/// JSON-RPC client bound to one endpoint.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    retry: RetryConfig,
}

impl RpcClient {
    /// New client for `url` with the given retry budgets.
    pub fn new(url: impl Into<String>, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, url: url.into(), retry })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a single JSON-RPC call and return its decoded `result`.
    ///
    /// Returns `Ok(None)` when the node keeps answering with an envelope
    /// error after the resubmission budget; the caller decides whether that
    /// is fatal. Transport exhaustion is always `Err`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Option<Value>> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let mut error_retries = self.retry.error_retries;
        loop {
            let envelope = self.post(&body).await?;

            match envelope.get("result") {
                Some(result) if !result.is_null() => return Ok(Some(result.clone())),
                _ => {
                    if envelope.get("error").is_some() && error_retries > 0 {
                        error_retries -= 1;
                        debug!(
                            method,
                            retries_left = error_retries,
                            "RPC envelope error, resubmitting"
                        );
                        continue;
                    }
                    error!(method, %envelope, "RPC call failed");
                    return Ok(None);
                }
            }
        }
    }

    /// Issue an ordered list of calls as one batched round trip.
    ///
    /// Each response element is re-associated with its correlation id, which
    /// is attached under the `tag` attribute ("number", "address" or
    /// "tx_hash" depending on what the ids mean). Scalar results are coerced
    /// into `{"result": <scalar>}` first so the tag has an object to land in.
    ///
    /// An element whose error message reports no data behind its id is
    /// dropped without spending retries. Any other element error resends the
    /// entire batch after a linearly increasing pause; exhausting that
    /// budget loses the whole batch as `Ok(None)` (logged, non-fatal; the
    /// caller must treat the unit as missing and revisit it later).
    pub async fn call_batch(&self, calls: &[BatchCall], tag: &str) -> Result<Option<Vec<Value>>> {
        let body = Value::Array(
            calls
                .iter()
                .map(|call| {
                    json!({
                        "jsonrpc": "2.0",
                        "method": call.method,
                        "params": call.params,
                        "id": call.id,
                    })
                })
                .collect(),
        );

        let mut retries = self.retry.batch_retries;
        'resend: loop {
            let response = self.post(&body).await?;

            let Some(elements) = response.as_array() else {
                error!(%response, "Batched RPC response is not an array");
                return Ok(None);
            };

            let mut out = Vec::with_capacity(elements.len());
            for element in elements {
                if let Some(result) = element.get("result").filter(|r| !r.is_null()) {
                    let mut entry = if result.is_object() {
                        result.clone()
                    } else {
                        json!({ "result": result })
                    };
                    if let Some(map) = entry.as_object_mut() {
                        map.insert(
                            tag.to_string(),
                            element.get("id").cloned().unwrap_or(Value::Null),
                        );
                    }
                    out.push(entry);
                } else if let Some(rpc_error) = element.get("error") {
                    if rpc_error.get("message").and_then(Value::as_str) == Some(NO_DATA_ERROR) {
                        // No data behind this id; absence, not failure.
                        continue;
                    }
                    if retries > 0 {
                        let spent = self.retry.batch_retries - retries;
                        let pause = self.retry.batch_retry_pause * (spent + 1);
                        retries -= 1;
                        info!(
                            calls = calls.len(),
                            retries_left = retries,
                            ?pause,
                            %rpc_error,
                            "Batched RPC element error, resending whole batch"
                        );
                        tokio::time::sleep(pause).await;
                        continue 'resend;
                    }
                    error!(%rpc_error, "Batched RPC call exhausted its retries, batch lost");
                    return Ok(None);
                } else {
                    error!(%element, "Batched RPC element has neither result nor error");
                    return Ok(None);
                }
            }

            if out.len() != calls.len() {
                warn!(
                    sent = calls.len(),
                    got = out.len(),
                    "Batched RPC returned fewer elements than requested"
                );
            }
            return Ok(Some(out));
        }
    }

    /// One HTTP round trip with transport-level retries.
    async fn post(&self, body: &Value) -> Result<Value> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_post(body).await {
                Ok(json) => return Ok(json),
                Err(failure) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(eyre::Report::new(failure).wrap_err(format!(
                            "RPC transport to {} exhausted after {attempt} attempts",
                            self.url
                        )));
                    }
                    if matches!(failure, TransportFailure::Throttled) {
                        info!(
                            url = %self.url,
                            cooldown = ?self.retry.throttle_cooldown,
                            "Throttled, cooling down"
                        );
                        tokio::time::sleep(self.retry.throttle_cooldown).await;
                    }
                    let backoff = Duration::from_secs(u64::from(attempt) * u64::from(attempt));
                    info!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        url = %self.url,
                        %failure,
                        ?backoff,
                        "RPC transport attempt failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn try_post(&self, body: &Value) -> Result<Value, TransportFailure> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportFailure::Throttled);
        }
        if status.is_server_error() {
            return Err(TransportFailure::Server(status));
        }

        response.json::<Value>().await.map_err(TransportFailure::Body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            throttle_cooldown: Duration::from_millis(10),
            error_retries: 3,
            batch_retries: 1,
            batch_retry_pause: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_single_call_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x1a"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let result = client.call("zkevm_batchNumber", json!([])).await.unwrap();
        assert_eq!(result, Some(json!("0x1a")));
    }

    #[tokio::test]
    async fn test_single_call_envelope_error_resubmission() {
        let mock_server = MockServer::start().await;

        // Two errors, then a valid result: the client resubmits without
        // spending transport attempts.
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "temporarily unavailable" }
            })))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x2"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let result = client.call("zkevm_batchNumber", json!([])).await.unwrap();
        assert_eq!(result, Some(json!("0x2")));
    }

    #[tokio::test]
    async fn test_single_call_envelope_error_exhaustion_is_absence() {
        let mock_server = MockServer::start().await;

        // error_retries = 3 means 1 initial + 3 resubmissions = 4 requests
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "broken" }
            })))
            .expect(4)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let result = client.call("zkevm_batchNumber", json!([])).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_transport_5xx_retries_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x5"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let result = client.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(result, Some(json!("0x5")));
    }

    #[tokio::test]
    async fn test_transport_exhaustion_is_fatal() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&mock_server)
            .await;

        let retry = RetryConfig { max_attempts: 2, ..fast_retry() };
        let client = RpcClient::new(mock_server.uri(), retry).unwrap();
        let result = client.call("eth_blockNumber", json!([])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_throttle_cooldown_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x1"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let result = client.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(result, Some(json!("0x1")));
    }

    #[tokio::test]
    async fn test_batch_scalar_coercion_and_tagging() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "jsonrpc": "2.0", "id": "0xaa", "result": "0x6000" },
                { "jsonrpc": "2.0", "id": "0xbb", "result": { "nested": true } }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let calls = vec![
            BatchCall { method: "eth_getCode", params: json!(["0xaa", "latest"]), id: json!("0xaa") },
            BatchCall { method: "eth_getCode", params: json!(["0xbb", "latest"]), id: json!("0xbb") },
        ];
        let elements = client.call_batch(&calls, "address").await.unwrap().unwrap();

        assert_eq!(elements.len(), 2);
        // scalar result coerced into an object, then tagged
        assert_eq!(elements[0]["result"], "0x6000");
        assert_eq!(elements[0]["address"], "0xaa");
        // object result tagged in place
        assert_eq!(elements[1]["nested"], true);
        assert_eq!(elements[1]["address"], "0xbb");
    }

    #[tokio::test]
    async fn test_batch_no_data_error_is_absence_not_failure() {
        let mock_server = MockServer::start().await;

        // The crashed element is dropped; the others survive; no retry is
        // spent, so the server sees exactly one request.
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "jsonrpc": "2.0", "id": 1, "result": { "number": "0x1" } },
                { "jsonrpc": "2.0", "id": 2, "error": { "code": -32000, "message": "method handler crashed" } },
                { "jsonrpc": "2.0", "id": 3, "result": { "number": "0x3" } }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let calls: Vec<BatchCall> = (1..=3)
            .map(|n| BatchCall {
                method: "zkevm_getBatchByNumber",
                params: json!([format!("{n:#x}"), true]),
                id: json!(n),
            })
            .collect();
        let elements = client.call_batch(&calls, "number").await.unwrap().unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0]["number"], 1);
        assert_eq!(elements[1]["number"], 3);
    }

    #[tokio::test]
    async fn test_batch_element_error_resends_whole_batch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "overloaded" } }
            ])))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "jsonrpc": "2.0", "id": 1, "result": { "number": "0x1" } }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let calls = vec![BatchCall {
            method: "zkevm_getBatchByNumber",
            params: json!(["0x1", true]),
            id: json!(1),
        }];
        let elements = client.call_batch(&calls, "number").await.unwrap().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0]["number"], 1);
    }

    #[tokio::test]
    async fn test_batch_retry_exhaustion_loses_batch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "overloaded" } }
            ])))
            .mount(&mock_server)
            .await;

        let retry = RetryConfig { batch_retries: 0, ..fast_retry() };
        let client = RpcClient::new(mock_server.uri(), retry).unwrap();
        let calls = vec![BatchCall {
            method: "zkevm_getBatchByNumber",
            params: json!(["0x1", true]),
            id: json!(1),
        }];
        let result = client.call_batch(&calls, "number").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_batch_count_mismatch_tolerated() {
        let mock_server = MockServer::start().await;

        // Server silently drops one element; the call still succeeds.
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "jsonrpc": "2.0", "id": 1, "result": { "number": "0x1" } }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = RpcClient::new(mock_server.uri(), fast_retry()).unwrap();
        let calls: Vec<BatchCall> = (1..=2)
            .map(|n| BatchCall {
                method: "zkevm_getBatchByNumber",
                params: json!([format!("{n:#x}"), true]),
                id: json!(n),
            })
            .collect();
        let elements = client.call_batch(&calls, "number").await.unwrap().unwrap();
        assert_eq!(elements.len(), 1);
    }
}
