//! Provider configuration: which cluster to talk to and which wallet pays.
//!
//! Read from `KFARMS_PROVIDER_URL`, `KFARMS_WALLET` and `KFARMS_COMMITMENT`;
//! all are optional.

use crate::error::{ClientError, ClientResult};
use kfarms_core::{derive_address, Pubkey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const ENV_PROVIDER_URL: &str = "KFARMS_PROVIDER_URL";
pub const ENV_WALLET: &str = "KFARMS_WALLET";
pub const ENV_COMMITMENT: &str = "KFARMS_COMMITMENT";

/// Wallet used when none is configured.
pub const DEFAULT_WALLET: &str = "dev";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterUrl {
    /// In-process ledger.
    Localnet,
    Remote(Url),
}

impl FromStr for ClusterUrl {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "localnet" | "local" => Ok(ClusterUrl::Localnet),
            other => {
                let url = Url::parse(other)
                    .map_err(|e| ClientError::Config(format!("invalid cluster url {other:?}: {e}")))?;
                match url.scheme() {
                    "http" | "https" => Ok(ClusterUrl::Remote(url)),
                    scheme => Err(ClientError::Config(format!(
                        "unsupported cluster url scheme {scheme:?}"
                    ))),
                }
            }
        }
    }
}

impl fmt::Display for ClusterUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterUrl::Localnet => f.write_str("localnet"),
            ClusterUrl::Remote(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl FromStr for Commitment {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(ClientError::Config(format!("unknown commitment {other:?}"))),
        }
    }
}

/// Parses a wallet: a `0x`-prefixed 32-byte hex key, or a name that is
/// hashed into a stable key.
pub fn parse_wallet(s: &str) -> ClientResult<Pubkey> {
    let s = s.trim();
    if let Some(raw) = s.strip_prefix("0x") {
        let bytes = hex::decode(raw)
            .map_err(|e| ClientError::Config(format!("invalid wallet hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(ClientError::Config(format!(
                "wallet key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        return Ok(Pubkey::from_slice(&bytes));
    }
    if s.is_empty() {
        return Err(ClientError::Config("wallet must not be empty".into()));
    }
    Ok(derive_address(&[b"wallet", s.as_bytes()]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub url: ClusterUrl,
    pub wallet: Pubkey,
    pub commitment: Commitment,
}

impl ProviderConfig {
    pub fn new(url: &str, wallet: &str) -> ClientResult<Self> {
        Ok(Self {
            url: url.parse()?,
            wallet: parse_wallet(wallet)?,
            commitment: Commitment::default(),
        })
    }

    /// Reads the process environment.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn with_commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = commitment;
        self
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let url = lookup(ENV_PROVIDER_URL).unwrap_or_else(|| "localnet".to_string());
        let wallet = lookup(ENV_WALLET).unwrap_or_else(|| DEFAULT_WALLET.to_string());
        let mut config = Self::new(&url, &wallet)?;
        if let Some(commitment) = lookup(ENV_COMMITMENT) {
            config.commitment = commitment.trim().parse()?;
        }
        tracing::debug!(
            url = %config.url,
            wallet = %config.wallet,
            commitment = ?config.commitment,
            "provider config"
        );
        Ok(config)
    }
}
