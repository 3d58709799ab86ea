//! Cluster connections and the program handle for kfarms.

pub mod config;
pub mod error;
pub mod local;
pub mod program;
pub mod rpc;

use async_trait::async_trait;
use kfarms_core::{Clock, Pubkey, TxSignature};
use kfarms_program::{Account, Transaction};
use std::sync::Arc;

pub use config::{ClusterUrl, Commitment, ProviderConfig};
pub use error::{ClientError, ClientResult};
pub use local::LocalCluster;
pub use program::{MethodBuilder, Methods, Program};
pub use rpc::RpcCluster;

/// Abstraction over where transactions are executed.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Submits `tx` and waits for it to be committed.
    async fn send_transaction(&self, tx: &Transaction) -> ClientResult<TxSignature>;
    async fn get_account(&self, key: &Pubkey) -> ClientResult<Option<Account>>;
    async fn get_token_balance(&self, key: &Pubkey) -> ClientResult<Option<u64>>;
    async fn get_clock(&self) -> ClientResult<Clock>;
}

/// A cluster connection plus the wallet that pays for and signs transactions.
#[derive(Clone)]
pub struct Provider {
    pub cluster: Arc<dyn Cluster>,
    pub wallet: Pubkey,
}

impl Provider {
    pub fn new(cluster: Arc<dyn Cluster>, wallet: Pubkey) -> Self {
        Self { cluster, wallet }
    }

    pub fn from_config(config: &ProviderConfig) -> ClientResult<Self> {
        let cluster: Arc<dyn Cluster> = match &config.url {
            ClusterUrl::Localnet => Arc::new(LocalCluster::new()),
            ClusterUrl::Remote(url) => Arc::new(RpcCluster::new(url.clone(), config.commitment)?),
        };
        tracing::info!(cluster = %config.url, wallet = %config.wallet, "provider ready");
        Ok(Self::new(cluster, config.wallet))
    }

    /// Provider configured from `KFARMS_PROVIDER_URL` / `KFARMS_WALLET`.
    pub fn env() -> ClientResult<Self> {
        Self::from_config(&ProviderConfig::from_env()?)
    }
}
