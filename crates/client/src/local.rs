//! In-process cluster backed by a [`Ledger`].
//!
//! Every committed transaction advances the slot by one; a rejected one
//! leaves the clock untouched. Time only moves when a test asks for it, so
//! reward accrual is deterministic.

use crate::error::{ClientError, ClientResult};
use crate::Cluster;
use async_trait::async_trait;
use kfarms_core::{Clock, Pubkey, TxSignature};
use kfarms_program::state::OraclePrices;
use kfarms_program::{Account, CrankReport, Ledger, Transaction};
use tokio::sync::Mutex;

/// Unix timestamp of the genesis block.
pub const GENESIS_UNIX_TIMESTAMP: u64 = 1_700_000_000;

struct LocalState {
    ledger: Ledger,
    clock: Clock,
}

pub struct LocalCluster {
    state: Mutex<LocalState>,
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::with_ledger(
            Ledger::new(),
            Clock {
                slot: 0,
                unix_timestamp: GENESIS_UNIX_TIMESTAMP,
            },
        )
    }

    pub fn with_ledger(ledger: Ledger, clock: Clock) -> Self {
        Self {
            state: Mutex::new(LocalState { ledger, clock }),
        }
    }

    /// Jumps forward to `slot`.
    pub async fn warp_to(&self, slot: u64) -> ClientResult<()> {
        let mut state = self.state.lock().await;
        if slot < state.clock.slot {
            return Err(ClientError::InvalidInput(format!(
                "cannot warp back from slot {} to {slot}",
                state.clock.slot
            )));
        }
        tracing::debug!(from = state.clock.slot, to = slot, "warp");
        state.clock.slot = slot;
        Ok(())
    }

    pub async fn advance_time(&self, seconds: u64) {
        let mut state = self.state.lock().await;
        state.clock.unix_timestamp = state.clock.unix_timestamp.saturating_add(seconds);
        tracing::debug!(unix_timestamp = state.clock.unix_timestamp, "advance time");
    }

    pub async fn set_oracle_price(&self, key: Pubkey, prices: OraclePrices) {
        self.state.lock().await.ledger.set_oracle_prices(key, prices);
    }

    /// Refreshes every farm at the current clock.
    pub async fn crank(&self) -> CrankReport {
        let mut state = self.state.lock().await;
        let clock = state.clock;
        state.ledger.refresh_all_farms(&clock)
    }

    /// Runs `f` against the ledger under the lock.
    pub async fn with_ledger_ref<R>(&self, f: impl FnOnce(&Ledger, Clock) -> R) -> R {
        let state = self.state.lock().await;
        f(&state.ledger, state.clock)
    }
}

#[async_trait]
impl Cluster for LocalCluster {
    async fn send_transaction(&self, tx: &Transaction) -> ClientResult<TxSignature> {
        let mut state = self.state.lock().await;
        let clock = Clock {
            slot: state.clock.slot.saturating_add(1),
            ..state.clock
        };
        let sig = state.ledger.execute(tx, &clock)?;
        state.clock = clock;
        Ok(sig)
    }

    async fn get_account(&self, key: &Pubkey) -> ClientResult<Option<Account>> {
        Ok(self.state.lock().await.ledger.account(key).cloned())
    }

    async fn get_token_balance(&self, key: &Pubkey) -> ClientResult<Option<u64>> {
        Ok(self.state.lock().await.ledger.token_balance(key))
    }

    async fn get_clock(&self) -> ClientResult<Clock> {
        Ok(self.state.lock().await.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfarms_core::{unique_pubkey, FarmError};
    use kfarms_program::FarmsInstruction;

    fn initialize(admin: Pubkey) -> Transaction {
        Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin,
            global_config: unique_pubkey("config"),
        })
    }

    #[tokio::test]
    async fn each_transaction_takes_a_slot() {
        let cluster = LocalCluster::new();
        let admin = unique_pubkey("admin");
        cluster.send_transaction(&initialize(admin)).await.unwrap();
        cluster.send_transaction(&initialize(admin)).await.unwrap();
        let clock = cluster.get_clock().await.unwrap();
        assert_eq!(clock.slot, 2);
        assert_eq!(clock.unix_timestamp, GENESIS_UNIX_TIMESTAMP);
    }

    #[tokio::test]
    async fn program_errors_surface_as_client_errors() {
        let cluster = LocalCluster::new();
        let admin = unique_pubkey("admin");
        let tx = Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin: unique_pubkey("not-signing"),
            global_config: unique_pubkey("config"),
        });
        let err = cluster.send_transaction(&tx).await.unwrap_err();
        assert_eq!(err.program_error(), Some(FarmError::MissingSigner));
    }

    #[tokio::test]
    async fn rejected_transactions_do_not_take_a_slot() {
        let cluster = LocalCluster::new();
        let admin = unique_pubkey("admin");
        let config = unique_pubkey("config");
        let tx = Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin,
            global_config: config,
        });
        cluster.send_transaction(&tx).await.unwrap();
        let err = cluster.send_transaction(&tx).await.unwrap_err();
        assert_eq!(err.program_error(), Some(FarmError::AccountAlreadyInUse));
        assert_eq!(cluster.get_clock().await.unwrap().slot, 1);
    }

    #[tokio::test]
    async fn clock_controls() {
        let cluster = LocalCluster::new();
        cluster.warp_to(100).await.unwrap();
        cluster.advance_time(60).await;
        assert!(cluster.warp_to(50).await.is_err());

        let clock = cluster.get_clock().await.unwrap();
        assert_eq!(clock.slot, 100);
        assert_eq!(clock.unix_timestamp, GENESIS_UNIX_TIMESTAMP + 60);
    }
}
