//! JSON-RPC plumbing for talking to the L1 node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Error object returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl std::error::Error for RpcError {}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes as `None` when `T` is an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": REQUEST_ID.fetch_add(1, Ordering::Relaxed),
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let body: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    decode_response(method, body)
}

fn decode_response<T: DeserializeOwned>(method: &str, body: Value) -> Result<T, anyhow::Error> {
    if let Some(error) = body.get("error") {
        let rpc_error = RpcError {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        };
        return Err(anyhow::Error::new(rpc_error).context(format!("{} failed", method)));
    }

    let result = body.get("result").cloned().context("No result in response")?;

    serde_json::from_value(result)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::U64;
    use serde_json::json;

    #[test]
    fn test_decode_result() {
        let value: U64 =
            decode_response("eth_chainId", json!({"jsonrpc": "2.0", "id": 1, "result": "0x384"}))
                .unwrap();
        assert_eq!(value.to::<u64>(), 900);
    }

    #[test]
    fn test_decode_null_result_as_none() {
        let value: Option<Value> = decode_response(
            "eth_getTransactionReceipt",
            json!({"jsonrpc": "2.0", "id": 1, "result": null}),
        )
        .unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_decode_error_is_typed() {
        let err = decode_response::<Value>(
            "eth_sendRawTransaction",
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "nonce too low"}}),
        )
        .unwrap_err();

        let rpc_error = err.downcast_ref::<RpcError>().unwrap();
        assert_eq!(rpc_error.code, -32000);
        assert_eq!(rpc_error.message, "nonce too low");
        assert!(err.to_string().contains("eth_sendRawTransaction"));
    }
}
