//! Ledger snapshot report.
//!
//! Summarizes every farm in a [`Ledger`] (stake pools, users, reward
//! emissions) plus the outcome of the transactions that led there, and
//! renders it as a boxed text table.

use crate::processor::Ledger;
use crate::state::FarmState;
use kfarms_core::{Clock, FarmError, Pubkey, TxSignature};
use std::time::Duration;

/// Outcome of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub slot: u64,
    pub label: String,
    pub instructions: usize,
    pub result: Result<TxSignature, FarmError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSummary {
    pub index: usize,
    pub mint: Pubkey,
    pub rewards_available: u64,
    pub rewards_issued_unclaimed: u64,
    pub rewards_issued_cumulative: u64,
    /// `None` when the schedule has not started yet.
    pub current_rps: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmSummary {
    pub key: Pubkey,
    pub stake_mint: Pubkey,
    pub delegated: bool,
    pub frozen: bool,
    pub num_users: u64,
    pub total_staked_amount: u64,
    pub total_pending_amount: u64,
    pub slashed_amount_cumulative: u64,
    pub rewards: Vec<RewardSummary>,
}

impl FarmSummary {
    fn from_state(key: Pubkey, farm: &FarmState, clock: &Clock) -> Self {
        let ts = farm.time_unit.now(clock);
        let rewards = farm
            .reward_infos
            .iter()
            .enumerate()
            .map(|(index, r)| RewardSummary {
                index,
                mint: r.token.mint,
                rewards_available: r.rewards_available,
                rewards_issued_unclaimed: r.rewards_issued_unclaimed,
                rewards_issued_cumulative: r.rewards_issued_cumulative,
                current_rps: r.reward_schedule_curve.current_rps(ts).ok(),
            })
            .collect();

        Self {
            key,
            stake_mint: farm.token.mint,
            delegated: farm.is_delegated(),
            frozen: farm.is_farm_frozen,
            num_users: farm.num_users,
            total_staked_amount: farm.total_staked_amount,
            total_pending_amount: farm.total_pending_amount,
            slashed_amount_cumulative: farm.slashed_amount_cumulative,
            rewards,
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub clock: Clock,
    pub committed: usize,
    pub failed: usize,
    pub farms: Vec<FarmSummary>,
    pub transactions: Vec<TxOutcome>,
    pub total_time: Duration,
}

impl Report {
    pub fn build(
        ledger: &Ledger,
        clock: Clock,
        transactions: Vec<TxOutcome>,
        total_time: Duration,
    ) -> Self {
        let farms = ledger
            .farms()
            .into_iter()
            .map(|(key, farm)| FarmSummary::from_state(key, farm, &clock))
            .collect();
        let committed = transactions.iter().filter(|t| t.result.is_ok()).count();

        Report {
            clock,
            committed,
            failed: transactions.len() - committed,
            farms,
            transactions,
            total_time,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push('\n');
        out.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        out.push_str("║                     KFARMS LEDGER REPORT                     ║\n");
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        out.push_str(&format!("║  Slot:               {:>39} ║\n", self.clock.slot));
        out.push_str(&format!(
            "║  Unix timestamp:     {:>39} ║\n",
            self.clock.unix_timestamp
        ));
        out.push_str(&format!("║  Committed txs:      {:>39} ║\n", self.committed));
        out.push_str(&format!("║  Failed txs:         {:>39} ║\n", self.failed));
        out.push_str(&format!("║  Farms:              {:>39} ║\n", self.farms.len()));
        out.push_str(&format!("║  Total time:         {:>39?} ║\n", self.total_time));
        out.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        if self.farms.is_empty() {
            out.push_str("║  No farms initialized.                                       ║\n");
        }

        for (i, farm) in self.farms.iter().enumerate() {
            let flags = match (farm.delegated, farm.frozen) {
                (true, true) => " [delegated, frozen]",
                (true, false) => " [delegated]",
                (false, true) => " [frozen]",
                (false, false) => "",
            };
            out.push_str(&format!("║  {}. farm {}{}\n", i + 1, farm.key, flags));
            out.push_str(&format!(
                "║     Users: {}  |  Staked: {}  |  Pending: {}  |  Slashed: {}\n",
                farm.num_users,
                farm.total_staked_amount,
                farm.total_pending_amount,
                farm.slashed_amount_cumulative
            ));
            for r in &farm.rewards {
                let rps = r
                    .current_rps
                    .map_or_else(|| "-".to_string(), |v| v.to_string());
                out.push_str(&format!(
                    "║     reward #{} rps {}  |  available {}  |  unclaimed {}  |  issued {}\n",
                    r.index,
                    rps,
                    r.rewards_available,
                    r.rewards_issued_unclaimed,
                    r.rewards_issued_cumulative
                ));
            }
        }

        let failures: Vec<_> = self
            .transactions
            .iter()
            .filter_map(|t| t.result.as_ref().err().map(|e| (t, e)))
            .collect();
        if !failures.is_empty() {
            out.push_str("╠══════════════════════════════════════════════════════════════╣\n");
            out.push_str("║  FAILED TRANSACTIONS                                         ║\n");
            for (t, e) in failures {
                out.push_str(&format!(
                    "║  slot {} {}: {} (code {})\n",
                    t.slot,
                    t.label,
                    e,
                    e.code()
                ));
            }
        }

        out.push_str("╚══════════════════════════════════════════════════════════════╝\n");
        out
    }
}
