//! JSON-RPC 2.0 cluster over HTTP.
//!
//! Transactions travel as hex-encoded JSON. Errors whose code falls in the
//! program error range are decoded back into [`FarmError`].

use crate::config::Commitment;
use crate::error::{ClientError, ClientResult};
use crate::Cluster;
use async_trait::async_trait;
use kfarms_core::{Clock, FarmError, Pubkey, TxSignature};
use kfarms_program::{Account, Transaction};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Sends transactions to and reads accounts from a remote node.
///
/// ```ignore
/// let cluster = RpcCluster::new("http://127.0.0.1:8899".parse()?, Commitment::Confirmed)?;
/// ```
pub struct RpcCluster {
    client: reqwest::Client,
    url: Url,
    commitment: Commitment,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl From<RpcError> for ClientError {
    fn from(e: RpcError) -> Self {
        let program = u32::try_from(e.code).ok().and_then(FarmError::from_code);
        match program {
            Some(err) => ClientError::Program(err),
            None => ClientError::Rpc {
                code: e.code,
                message: e.message,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceValue {
    amount: u64,
}

impl RpcCluster {
    pub fn new(url: Url, commitment: Commitment) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {e}")))?;
        tracing::info!(%url, ?commitment, "rpc cluster");
        Ok(Self {
            client,
            url,
            commitment,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Issues one JSON-RPC call. A `null` result is returned as `None`.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ClientResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, id, url = %self.url, "rpc request");

        let resp = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Transport(format!("{method}: http status {status}")));
        }

        let resp: RpcResponse<T> = resp.json().await?;
        if let Some(err) = resp.error {
            tracing::warn!(method, code = err.code, message = %err.message, "rpc error");
            return Err(err.into());
        }
        Ok(resp.result)
    }

    async fn call_required<T: DeserializeOwned>(&self, method: &str, params: Value) -> ClientResult<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| ClientError::Rpc {
                code: -32603,
                message: format!("{method} returned no result"),
            })
    }
}

#[async_trait]
impl Cluster for RpcCluster {
    async fn send_transaction(&self, tx: &Transaction) -> ClientResult<TxSignature> {
        let encoded = hex::encode(serde_json::to_vec(tx)?);
        let sig: String = self
            .call_required(
                "sendTransaction",
                json!([encoded, { "encoding": "hex", "commitment": self.commitment }]),
            )
            .await?;
        let sig = sig
            .parse::<TxSignature>()
            .map_err(|e| ClientError::Rpc {
                code: -32603,
                message: format!("malformed signature: {e}"),
            })?;
        tracing::info!(signature = %sig, instructions = tx.instructions.len(), "transaction sent");
        Ok(sig)
    }

    async fn get_account(&self, key: &Pubkey) -> ClientResult<Option<Account>> {
        self.call(
            "getAccountInfo",
            json!([key, { "encoding": "json", "commitment": self.commitment }]),
        )
        .await
    }

    async fn get_token_balance(&self, key: &Pubkey) -> ClientResult<Option<u64>> {
        let balance: Option<BalanceValue> = self
            .call(
                "getTokenAccountBalance",
                json!([key, { "commitment": self.commitment }]),
            )
            .await?;
        Ok(balance.map(|b| b.amount))
    }

    async fn get_clock(&self) -> ClientResult<Clock> {
        self.call_required("getClock", json!([{ "commitment": self.commitment }]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use kfarms_program::FarmsInstruction;

    fn cluster(server: &MockServer) -> RpcCluster {
        RpcCluster::new(server.url("/").parse().unwrap(), Commitment::Confirmed).unwrap()
    }

    fn initialize_tx() -> Transaction {
        let admin = Pubkey::repeat_byte(1);
        Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin,
            global_config: Pubkey::repeat_byte(2),
        })
    }

    #[tokio::test]
    async fn send_transaction_returns_signature() {
        let server = MockServer::start_async().await;
        let sig = TxSignature::from_digest(b"sig");
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body_partial(r#"{"jsonrpc":"2.0","method":"sendTransaction"}"#);
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": sig.to_string() }));
            })
            .await;

        let got = cluster(&server).send_transaction(&initialize_tx()).await.unwrap();
        mock.assert_async().await;
        assert_eq!(got, sig);
    }

    #[tokio::test]
    async fn program_error_codes_are_decoded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": FarmError::StakeZero.code(), "message": "custom program error" }
                }));
            })
            .await;

        let err = cluster(&server).send_transaction(&initialize_tx()).await.unwrap_err();
        assert_eq!(err.program_error(), Some(FarmError::StakeZero));
    }

    #[tokio::test]
    async fn other_rpc_errors_keep_code_and_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32601, "message": "Method not found" }
                }));
            })
            .await;

        let err = cluster(&server).get_clock().await.unwrap_err();
        match err {
            ClientError::Rpc { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_failures_are_transport_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(503);
            })
            .await;

        let err = cluster(&server).get_clock().await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test]
    async fn missing_accounts_are_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body_partial(r#"{"method":"getAccountInfo"}"#);
                then.status(200)
                    .json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": null }));
            })
            .await;

        let account = cluster(&server).get_account(&Pubkey::repeat_byte(9)).await.unwrap();
        assert!(account.is_none());
    }

    #[tokio::test]
    async fn token_balance_and_clock_decode() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body_partial(r#"{"method":"getTokenAccountBalance"}"#);
                then.status(200)
                    .json_body(json!({ "jsonrpc": "2.0", "id": 1, "result": { "amount": 42 } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/")
                    .json_body_partial(r#"{"method":"getClock"}"#);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "result": { "slot": 5, "unix_timestamp": 1700000000 }
                }));
            })
            .await;

        let rpc = cluster(&server);
        assert_eq!(rpc.get_token_balance(&Pubkey::repeat_byte(3)).await.unwrap(), Some(42));
        let clock = rpc.get_clock().await.unwrap();
        assert_eq!(clock.slot, 5);
    }
}
