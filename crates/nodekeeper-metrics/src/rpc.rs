//! Minimal JSON-RPC 2.0 client for the execution client's HTTP endpoint

use nodekeeper_core::{NodeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::peers::normalize_peer_id;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<serde_json::Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct AdminPeer {
    id: String,
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call a parameterless method and decode its `result`
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn call<T: DeserializeOwned>(&self, method: &str) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params: Vec::new(),
            id: 1,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| NodeError::Rpc(format!("{}: malformed response: {}", method, e)))?;

        if let Some(err) = body.error {
            return Err(NodeError::Rpc(format!(
                "{} returned error {}: {}",
                method, err.code, err.message
            )));
        }
        body.result
            .ok_or_else(|| NodeError::Rpc(format!("{} returned no result", method)))
    }

    /// `net_peerCount`, decoded from its hex quantity
    pub async fn net_peer_count(&self) -> Result<u32> {
        let raw: String = self.call("net_peerCount").await?;
        parse_hex_quantity(&raw)
    }

    /// Node ids from `admin_peers`, normalized for comparison
    pub async fn admin_peer_ids(&self) -> Result<Vec<String>> {
        let peers: Vec<AdminPeer> = self.call("admin_peers").await?;
        Ok(peers
            .into_iter()
            .map(|peer| normalize_peer_id(&peer.id))
            .collect())
    }
}

/// Parse an Ethereum JSON-RPC quantity such as `0x1a`
pub fn parse_hex_quantity(raw: &str) -> Result<u32> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| NodeError::Rpc(format!("'{}' is not a hex quantity", raw)))?;
    u32::from_str_radix(digits, 16)
        .map_err(|e| NodeError::Rpc(format!("'{}' is not a hex quantity: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_hex_quantity("0X82").unwrap(), 130);
        assert!(parse_hex_quantity("26").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
        assert!(parse_hex_quantity("0x").is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "net_peerCount",
            params: Vec::new(),
            id: 1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"jsonrpc": "2.0", "method": "net_peerCount", "params": [], "id": 1})
        );
    }
}
