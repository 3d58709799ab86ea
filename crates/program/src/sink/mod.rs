//! Row exports for ledger reports.
//!
//! Three row schemas:
//! - [`LedgerSummaryRow`]: one per report
//! - [`FarmRow`]: one per farm × reward (denormalized)
//! - [`TransactionRow`]: one per submitted transaction
//!
//! Rows are written as newline-delimited JSON by [`json_stream::JsonStreamSink`].

pub mod json_stream;

pub use json_stream::JsonStreamSink;

use crate::reporter::Report;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummaryRow {
    pub slot: u64,
    pub unix_timestamp: u64,
    pub farms: usize,
    pub committed_txs: usize,
    pub failed_txs: usize,
    pub total_time_ms: u64,
}

/// One row per (farm, reward). Farms without rewards emit a single row with
/// the reward columns unset.
#[derive(Debug, Clone, Serialize)]
pub struct FarmRow {
    pub slot: u64,
    pub farm: String,
    pub stake_mint: String,
    pub delegated: bool,
    pub frozen: bool,
    pub num_users: u64,
    pub total_staked_amount: u64,
    pub total_pending_amount: u64,
    pub slashed_amount_cumulative: u64,
    pub reward_index: Option<usize>,
    pub reward_mint: Option<String>,
    pub rewards_available: Option<u64>,
    pub rewards_issued_unclaimed: Option<u64>,
    pub rewards_issued_cumulative: Option<u64>,
    pub current_rps: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRow {
    pub slot: u64,
    pub label: String,
    pub instructions: usize,
    pub status: &'static str,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<u32>,
}

// ---------------------------------------------------------------------------
// Builder: Report → Rows
// ---------------------------------------------------------------------------

impl Report {
    pub fn summary_row(&self) -> LedgerSummaryRow {
        LedgerSummaryRow {
            slot: self.clock.slot,
            unix_timestamp: self.clock.unix_timestamp,
            farms: self.farms.len(),
            committed_txs: self.committed,
            failed_txs: self.failed,
            total_time_ms: u64::try_from(self.total_time.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn farm_rows(&self) -> Vec<FarmRow> {
        let mut rows = Vec::new();
        for farm in &self.farms {
            let base = FarmRow {
                slot: self.clock.slot,
                farm: farm.key.to_string(),
                stake_mint: farm.stake_mint.to_string(),
                delegated: farm.delegated,
                frozen: farm.frozen,
                num_users: farm.num_users,
                total_staked_amount: farm.total_staked_amount,
                total_pending_amount: farm.total_pending_amount,
                slashed_amount_cumulative: farm.slashed_amount_cumulative,
                reward_index: None,
                reward_mint: None,
                rewards_available: None,
                rewards_issued_unclaimed: None,
                rewards_issued_cumulative: None,
                current_rps: None,
            };
            if farm.rewards.is_empty() {
                rows.push(base);
                continue;
            }
            for r in &farm.rewards {
                rows.push(FarmRow {
                    reward_index: Some(r.index),
                    reward_mint: Some(r.mint.to_string()),
                    rewards_available: Some(r.rewards_available),
                    rewards_issued_unclaimed: Some(r.rewards_issued_unclaimed),
                    rewards_issued_cumulative: Some(r.rewards_issued_cumulative),
                    current_rps: r.current_rps,
                    ..base.clone()
                });
            }
        }
        rows
    }

    pub fn transaction_rows(&self) -> Vec<TransactionRow> {
        self.transactions
            .iter()
            .map(|t| match &t.result {
                Ok(sig) => TransactionRow {
                    slot: t.slot,
                    label: t.label.clone(),
                    instructions: t.instructions,
                    status: "committed",
                    signature: Some(sig.to_string()),
                    error: None,
                    error_code: None,
                },
                Err(e) => TransactionRow {
                    slot: t.slot,
                    label: t.label.clone(),
                    instructions: t.instructions,
                    status: "failed",
                    signature: None,
                    error: Some(e.to_string()),
                    error_code: Some(e.code()),
                },
            })
            .collect()
    }
}
