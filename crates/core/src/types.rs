//! Domain types shared by the ledger, the client, and the CLI.

use alloy_primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// A 32-byte account address.
pub type Pubkey = B256;

/// Address of the deployed kfarms program; every derived address is scoped to it.
pub const PROGRAM_ID: Pubkey = B256::new(*b"kfarms-program-id-00000000000000");

/// Program-derived address: `keccak256(program_id || seed_0 || seed_1 || ...)`.
///
/// Each seed is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn derive_address(seeds: &[&[u8]]) -> Pubkey {
    let mut buf = Vec::with_capacity(32 + seeds.iter().map(|s| s.len() + 1).sum::<usize>());
    buf.extend_from_slice(PROGRAM_ID.as_slice());
    for seed in seeds {
        buf.push(seed.len() as u8);
        buf.extend_from_slice(seed);
    }
    keccak256(&buf)
}

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Fresh address for accounts created from a new keypair (global configs, farms, mints).
pub fn unique_pubkey(label: &str) -> Pubkey {
    let n = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut buf = Vec::with_capacity(label.len() + 8);
    buf.extend_from_slice(label.as_bytes());
    buf.extend_from_slice(&n.to_le_bytes());
    keccak256(&buf)
}

// ---------------------------------------------------------------------------
// Transaction signature
// ---------------------------------------------------------------------------

/// Digest identifying a committed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(pub B256);

impl TxSignature {
    pub fn from_digest(bytes: &[u8]) -> Self {
        Self(keccak256(bytes))
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxSignature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| format!("invalid signature hex: {e}"))?;
        if bytes.len() != 32 {
            return Err(format!("signature must be 32 bytes, got {}", bytes.len()));
        }
        Ok(Self(B256::from_slice(&bytes)))
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Cluster clock as observed by a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    pub slot: u64,
    pub unix_timestamp: u64,
}

/// Unit farms measure time in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    #[default]
    Seconds = 0,
    Slots = 1,
}

impl TimeUnit {
    #[inline]
    pub fn now(self, clock: &Clock) -> u64 {
        match self {
            TimeUnit::Seconds => clock.unix_timestamp,
            TimeUnit::Slots => clock.slot,
        }
    }
}
