//! Typed handle to the kfarms program.
//!
//! ```ignore
//! let program = Program::new(Provider::env()?);
//! let sig = program.methods().initialize().rpc().await?;
//! ```
//!
//! Builders fill in the provider wallet as owner, payer, and admin. Extra
//! signers are attached with [`MethodBuilder::signer`].

use crate::error::{ClientError, ClientResult};
use crate::Provider;
use kfarms_core::{unique_pubkey, Decimal, FarmError, Pubkey, TxSignature, PROGRAM_ID};
use kfarms_program::instruction as ix;
use kfarms_program::state::{
    FarmConfigUpdate, FarmState, GlobalConfig, GlobalConfigUpdate, UserState,
};
use kfarms_program::{Account, FarmsInstruction, Instruction, TokenInstruction, Transaction};

#[derive(Clone)]
pub struct Program {
    provider: Provider,
}

impl Program {
    pub fn new(provider: Provider) -> Self {
        Self { provider }
    }

    pub fn id(&self) -> Pubkey {
        PROGRAM_ID
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn wallet(&self) -> Pubkey {
        self.provider.wallet
    }

    pub fn methods(&self) -> Methods<'_> {
        Methods {
            program: self,
            scope_prices: None,
        }
    }

    /// User state of the provider wallet in `farm`.
    pub fn user_state_address(&self, farm: &Pubkey) -> Pubkey {
        ix::user_state(farm, &self.provider.wallet)
    }

    async fn fetch(&self, key: &Pubkey) -> ClientResult<Account> {
        self.provider
            .cluster
            .get_account(key)
            .await?
            .ok_or(ClientError::Program(FarmError::AccountNotFound))
    }

    pub async fn global_config(&self, key: &Pubkey) -> ClientResult<GlobalConfig> {
        match self.fetch(key).await? {
            Account::GlobalConfig(v) => Ok(v),
            _ => Err(FarmError::WrongAccountType.into()),
        }
    }

    pub async fn farm_state(&self, key: &Pubkey) -> ClientResult<FarmState> {
        match self.fetch(key).await? {
            Account::FarmState(v) => Ok(*v),
            _ => Err(FarmError::WrongAccountType.into()),
        }
    }

    pub async fn user_state(&self, key: &Pubkey) -> ClientResult<UserState> {
        match self.fetch(key).await? {
            Account::UserState(v) => Ok(*v),
            _ => Err(FarmError::WrongAccountType.into()),
        }
    }

    pub async fn token_balance(&self, key: &Pubkey) -> ClientResult<u64> {
        self.provider
            .cluster
            .get_token_balance(key)
            .await?
            .ok_or(ClientError::Program(FarmError::AccountNotFound))
    }
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Instruction builders bound to a program.
pub struct Methods<'a> {
    program: &'a Program,
    scope_prices: Option<Pubkey>,
}

impl<'a> Methods<'a> {
    /// Passes `key` as the oracle feed to every instruction that reads one.
    pub fn with_scope_prices(mut self, key: Pubkey) -> Self {
        self.scope_prices = Some(key);
        self
    }

    fn wallet(&self) -> Pubkey {
        self.program.provider.wallet
    }

    fn build(&self, instruction: impl Into<Instruction>) -> MethodBuilder<'a> {
        MethodBuilder {
            program: self.program,
            instructions: vec![instruction.into()],
            signers: Vec::new(),
        }
    }

    /// Any instruction, signed by the wallet.
    pub fn instruction(&self, instruction: impl Into<Instruction>) -> MethodBuilder<'a> {
        self.build(instruction)
    }

    /// Bootstraps a fresh global config administered by the wallet.
    pub fn initialize(&self) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::Initialize {
            admin: self.wallet(),
            global_config: unique_pubkey("global-config"),
        })
    }

    pub fn initialize_global_config(&self, global_config: Pubkey) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::InitializeGlobalConfig {
            global_admin: self.wallet(),
            global_config,
        })
    }

    pub fn update_global_config(
        &self,
        global_config: Pubkey,
        update: GlobalConfigUpdate,
    ) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::UpdateGlobalConfig {
            global_admin: self.wallet(),
            global_config,
            update,
        })
    }

    pub fn initialize_farm(
        &self,
        farm_state: Pubkey,
        global_config: Pubkey,
        token_mint: Pubkey,
    ) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::InitializeFarm {
            farm_admin: self.wallet(),
            farm_state,
            global_config,
            token_mint,
        })
    }

    /// `farm_delegate` must also sign.
    pub fn initialize_farm_delegated(
        &self,
        farm_state: Pubkey,
        global_config: Pubkey,
        farm_delegate: Pubkey,
    ) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::InitializeFarmDelegated {
            farm_admin: self.wallet(),
            farm_delegate,
            farm_state,
            global_config,
        })
        .signer(farm_delegate)
    }

    pub fn initialize_reward(&self, farm_state: Pubkey, reward_mint: Pubkey) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::InitializeReward {
            farm_admin: self.wallet(),
            farm_state,
            reward_mint,
        })
    }

    pub fn add_rewards(
        &self,
        farm_state: Pubkey,
        reward_mint: Pubkey,
        payer_reward_ata: Pubkey,
        reward_index: u64,
        amount: u64,
    ) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::AddRewards {
            payer: self.wallet(),
            farm_state,
            reward_mint,
            payer_reward_ata,
            reward_index,
            amount,
            scope_prices: self.scope_prices,
        })
    }

    pub fn update_farm_config(&self, farm_state: Pubkey, update: FarmConfigUpdate) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::UpdateFarmConfig {
            signer: self.wallet(),
            farm_state,
            update,
            scope_prices: self.scope_prices,
        })
    }

    /// Creates the wallet's own user state in a non-delegated farm.
    pub fn initialize_user(&self, farm_state: Pubkey) -> MethodBuilder<'a> {
        let wallet = self.wallet();
        self.build(FarmsInstruction::InitializeUser {
            authority: wallet,
            payer: wallet,
            owner: wallet,
            delegatee: wallet,
            farm_state,
        })
    }

    pub fn stake(&self, farm_state: Pubkey, user_ata: Pubkey, amount: u64) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::Stake {
            owner: self.wallet(),
            user_state: self.program.user_state_address(&farm_state),
            farm_state,
            user_ata,
            amount,
            scope_prices: self.scope_prices,
        })
    }

    pub fn unstake(&self, farm_state: Pubkey, shares: Decimal) -> ClientResult<MethodBuilder<'a>> {
        let stake_shares_scaled = shares
            .to_scaled_val()
            .map_err(|e| ClientError::InvalidInput(format!("unstake shares: {e}")))?;
        Ok(self.build(FarmsInstruction::Unstake {
            owner: self.wallet(),
            user_state: self.program.user_state_address(&farm_state),
            farm_state,
            stake_shares_scaled,
            scope_prices: self.scope_prices,
        }))
    }

    pub fn harvest_reward(
        &self,
        farm_state: Pubkey,
        user_reward_ata: Pubkey,
        reward_index: u64,
    ) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::HarvestReward {
            owner: self.wallet(),
            user_state: self.program.user_state_address(&farm_state),
            farm_state,
            user_reward_ata,
            reward_index,
            scope_prices: self.scope_prices,
        })
    }

    pub fn withdraw_unstaked_deposits(&self, farm_state: Pubkey, user_ata: Pubkey) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::WithdrawUnstakedDeposits {
            owner: self.wallet(),
            user_state: self.program.user_state_address(&farm_state),
            farm_state,
            user_ata,
        })
    }

    pub fn refresh_farm(&self, farm_state: Pubkey) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::RefreshFarm {
            farm_state,
            scope_prices: self.scope_prices,
        })
    }

    pub fn refresh_user_state(&self, farm_state: Pubkey) -> MethodBuilder<'a> {
        self.build(FarmsInstruction::RefreshUserState {
            user_state: self.program.user_state_address(&farm_state),
            farm_state,
            scope_prices: self.scope_prices,
        })
    }

    pub fn create_mint(&self, mint: Pubkey, decimals: u8) -> MethodBuilder<'a> {
        self.build(TokenInstruction::CreateMint {
            mint,
            mint_authority: self.wallet(),
            decimals,
        })
    }

    pub fn create_token_account(&self, account: Pubkey, mint: Pubkey, owner: Pubkey) -> MethodBuilder<'a> {
        self.build(TokenInstruction::CreateAccount { account, mint, owner })
    }

    pub fn mint_to(&self, mint: Pubkey, destination: Pubkey, amount: u64) -> MethodBuilder<'a> {
        self.build(TokenInstruction::MintTo {
            mint,
            destination,
            mint_authority: self.wallet(),
            amount,
        })
    }
}

// ---------------------------------------------------------------------------
// MethodBuilder
// ---------------------------------------------------------------------------

/// One pending transaction. The provider wallet pays and signs.
pub struct MethodBuilder<'a> {
    program: &'a Program,
    instructions: Vec<Instruction>,
    signers: Vec<Pubkey>,
}

impl MethodBuilder<'_> {
    pub fn signer(mut self, key: Pubkey) -> Self {
        self.signers.push(key);
        self
    }

    /// Appends another instruction to the same transaction.
    pub fn instruction(mut self, instruction: impl Into<Instruction>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn transaction(&self) -> Transaction {
        let tx = self
            .signers
            .iter()
            .fold(Transaction::new(self.program.provider.wallet), |tx, s| {
                tx.with_signer(*s)
            });
        self.instructions
            .iter()
            .cloned()
            .fold(tx, |tx, i| tx.with_instruction(i))
    }

    /// Sends the transaction and waits for confirmation.
    pub async fn rpc(self) -> ClientResult<TxSignature> {
        let tx = self.transaction();
        let names: Vec<&str> = tx.instructions.iter().map(|i| i.name()).collect();
        tracing::debug!(?names, signers = tx.signers.len(), "sending");
        self.program.provider.cluster.send_transaction(&tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalCluster;
    use std::sync::Arc;

    fn program() -> (Program, Arc<LocalCluster>) {
        let cluster = Arc::new(LocalCluster::new());
        let provider = Provider::new(cluster.clone(), unique_pubkey("wallet"));
        (Program::new(provider), cluster)
    }

    #[test]
    fn wallet_pays_and_signs() {
        let (program, _) = program();
        let delegate = unique_pubkey("delegate");
        let tx = program
            .methods()
            .initialize_farm_delegated(unique_pubkey("farm"), unique_pubkey("config"), delegate)
            .transaction();
        assert_eq!(tx.fee_payer, program.wallet());
        assert!(tx.is_signer(&program.wallet()));
        assert!(tx.is_signer(&delegate));
    }

    #[test]
    fn scope_prices_flow_into_instructions() {
        let (program, _) = program();
        let scope = unique_pubkey("scope");
        let tx = program
            .methods()
            .with_scope_prices(scope)
            .refresh_farm(unique_pubkey("farm"))
            .transaction();
        assert!(matches!(
            tx.instructions[0],
            Instruction::Farms(FarmsInstruction::RefreshFarm { scope_prices: Some(k), .. }) if k == scope
        ));
    }

    #[tokio::test]
    async fn fetchers_check_account_type() {
        let (program, _) = program();
        let config = unique_pubkey("config");
        program
            .methods()
            .initialize_global_config(config)
            .rpc()
            .await
            .unwrap();

        assert_eq!(program.global_config(&config).await.unwrap().global_admin, program.wallet());
        let err = program.farm_state(&config).await.unwrap_err();
        assert_eq!(err.program_error(), Some(FarmError::WrongAccountType));
        let err = program.user_state(&unique_pubkey("nothing")).await.unwrap_err();
        assert_eq!(err.program_error(), Some(FarmError::AccountNotFound));
    }
}
