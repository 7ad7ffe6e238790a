//! Ownership registry: the ERC-721 contract whose `balanceOf` gates access.

use super::signature::{keccak256, WalletAddress};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;

/// A uint256 balance as returned by the contract (big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenBalance([u8; 32]);

impl TokenBalance {
    pub fn from_u64(value: u64) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        Self(word)
    }

    /// Decode an ABI return word. Ethereum RPC may return minimal hex
    /// (`0x0`, `0x1a3`), so shorter inputs are left-padded.
    pub fn from_hex_word(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.is_empty() {
            bail!("empty eth_call result (is the contract deployed on this network?)");
        }
        if digits.len() > 64 {
            bail!("eth_call result longer than one word: {} hex chars", digits.len());
        }
        let padded = format!("{digits:0>64}");
        let bytes = hex::decode(&padded).context("eth_call result is not valid hex")?;
        let mut word = [0u8; 32];
        word.copy_from_slice(&bytes);
        Ok(Self(word))
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for TokenBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0[..16].iter().all(|b| *b == 0) {
            let mut low = [0u8; 16];
            low.copy_from_slice(&self.0[16..]);
            write!(f, "{}", u128::from_be_bytes(low))
        } else {
            write!(f, "0x{}", hex::encode(self.0))
        }
    }
}

/// Source of truth for token ownership.
#[async_trait]
pub trait OwnershipRegistry: Send + Sync {
    /// Number of gating tokens held by `owner`.
    async fn balance_of(&self, owner: &WalletAddress) -> Result<TokenBalance>;

    fn name(&self) -> &str;
}

/// Encode `balanceOf(address)` calldata.
pub fn encode_balance_of(owner: &WalletAddress) -> Vec<u8> {
    let selector = &keccak256(b"balanceOf(address)")[..4];
    let mut data = Vec::with_capacity(4 + 32);
    data.extend_from_slice(selector);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(owner.as_bytes());
    data
}

/// Registry backed by a JSON-RPC `eth_call` against a node provider.
pub struct JsonRpcRegistry {
    rpc_url: String,
    contract: WalletAddress,
    client: Client,
}

impl JsonRpcRegistry {
    pub fn new(rpc_url: &str, contract: WalletAddress, timeout: Duration) -> Self {
        Self {
            rpc_url: rpc_url.to_string(),
            contract,
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!(
                "{method} HTTP {status}: {}",
                crate::providers::sanitize_api_error(&text)
            );
        }

        let result: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("{method} returned non-JSON body"))?;

        if let Some(error) = result.get("error") {
            bail!("RPC error: {error}");
        }

        result
            .get("result")
            .cloned()
            .with_context(|| format!("{method} response missing 'result' field"))
    }
}

#[async_trait]
impl OwnershipRegistry for JsonRpcRegistry {
    async fn balance_of(&self, owner: &WalletAddress) -> Result<TokenBalance> {
        let data = encode_balance_of(owner);
        let result = self
            .rpc_call(
                "eth_call",
                serde_json::json!([
                    { "to": self.contract.to_checksum(), "data": format!("0x{}", hex::encode(data)) },
                    "latest"
                ]),
            )
            .await?;
        let word = result.as_str().context("Invalid eth_call result")?;
        TokenBalance::from_hex_word(word)
    }

    fn name(&self) -> &str {
        "json_rpc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_of_calldata_layout() {
        let owner: WalletAddress = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        let data = encode_balance_of(&owner);
        assert_eq!(data.len(), 36);
        assert_eq!(
            hex::encode(&data),
            "70a08231000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn decodes_full_and_minimal_words() {
        let full = format!("0x{}", "0".repeat(63) + "2");
        assert_eq!(TokenBalance::from_hex_word(&full).unwrap(), TokenBalance::from_u64(2));
        assert_eq!(TokenBalance::from_hex_word("0x1a3").unwrap(), TokenBalance::from_u64(0x1a3));
        assert!(TokenBalance::from_hex_word("0x0").unwrap().is_zero());
    }

    #[test]
    fn empty_result_is_an_error() {
        let err = TokenBalance::from_hex_word("0x").unwrap_err();
        assert!(err.to_string().contains("empty eth_call result"));
    }

    #[test]
    fn rejects_oversized_or_non_hex_words() {
        assert!(TokenBalance::from_hex_word(&format!("0x{}", "1".repeat(65))).is_err());
        assert!(TokenBalance::from_hex_word("0xzz").is_err());
    }

    #[test]
    fn display_is_decimal_for_small_balances() {
        assert_eq!(TokenBalance::from_u64(0).to_string(), "0");
        assert_eq!(TokenBalance::from_u64(42).to_string(), "42");
        let huge = TokenBalance::from_hex_word(&format!("0x1{}", "0".repeat(63))).unwrap();
        assert!(huge.to_string().starts_with("0x10"));
    }

    use axum::{http::StatusCode, routing::post, Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    const CONTRACT: &str = "0xb022C9c672592c274397557556955eE968052969";
    const OWNER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    /// Serve a fixed JSON-RPC reply and record every request body.
    async fn rpc_node(status: StatusCode, reply: Value) -> (JsonRpcRegistry, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/rpc",
            post(move |Json(body): Json<Value>| {
                let recorded = recorded.clone();
                let reply = reply.clone();
                async move {
                    recorded.lock().push(body);
                    (status, Json(reply))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let registry = JsonRpcRegistry::new(
            &format!("http://{addr}/rpc"),
            CONTRACT.parse().unwrap(),
            Duration::from_secs(5),
        );
        (registry, seen)
    }

    fn owner() -> WalletAddress {
        OWNER.parse().unwrap()
    }

    #[tokio::test]
    async fn eth_call_envelope_and_balance_decode() {
        let word = format!("0x{}2", "0".repeat(63));
        let (registry, seen) =
            rpc_node(StatusCode::OK, json!({"jsonrpc": "2.0", "id": 1, "result": word})).await;

        let balance = registry.balance_of(&owner()).await.unwrap();
        assert_eq!(balance, TokenBalance::from_u64(2));
        assert_eq!(balance.to_string(), "2");

        let requests = seen.lock();
        assert_eq!(requests.len(), 1);
        let body = &requests[0];
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "eth_call");
        let contract: WalletAddress = CONTRACT.parse().unwrap();
        assert_eq!(body["params"][0]["to"], contract.to_checksum());
        assert_eq!(
            body["params"][0]["data"],
            "0x70a08231000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(body["params"][1], "latest");
    }

    #[tokio::test]
    async fn contract_revert_is_an_error() {
        let (registry, _) = rpc_node(
            StatusCode::OK,
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": 3, "message": "execution reverted"}}),
        )
        .await;
        let err = registry.balance_of(&owner()).await.unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (registry, _) =
            rpc_node(StatusCode::SERVICE_UNAVAILABLE, json!({"message": "overloaded"})).await;
        let err = registry.balance_of(&owner()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("overloaded"));
    }

    #[tokio::test]
    async fn missing_result_field_is_an_error() {
        let (registry, _) = rpc_node(StatusCode::OK, json!({"jsonrpc": "2.0", "id": 1})).await;
        let err = registry.balance_of(&owner()).await.unwrap_err();
        assert!(err.to_string().contains("missing 'result'"));
    }

    #[tokio::test]
    async fn unreachable_rpc_endpoint_errors() {
        let registry = JsonRpcRegistry::new(
            "http://127.0.0.1:9/",
            "0xb022C9c672592c274397557556955eE968052969".parse().unwrap(),
            Duration::from_secs(2),
        );
        let owner: WalletAddress = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert!(registry.balance_of(&owner).await.is_err());
    }
}
