//! Instructions and transactions accepted by the ledger.
//!
//! Each farms instruction names the accounts it touches; program-derived
//! accounts (vaults, vault authorities, user states) are derived by the
//! processor from those keys and never supplied by the caller.

use crate::state::{FarmConfigUpdate, GlobalConfigUpdate};
use kfarms_core::consts::{
    BASE_SEED_FARM_VAULT, BASE_SEED_FARM_VAULTS_AUTHORITY, BASE_SEED_REWARD_TREASURY_VAULT,
    BASE_SEED_REWARD_VAULT, BASE_SEED_TREASURY_VAULTS_AUTHORITY, BASE_SEED_USER_STATE,
};
use kfarms_core::{derive_address, Pubkey};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ---------------------------------------------------------------------------
// Derived addresses
// ---------------------------------------------------------------------------

pub fn farm_vault(farm: &Pubkey, mint: &Pubkey) -> Pubkey {
    derive_address(&[BASE_SEED_FARM_VAULT, farm.as_slice(), mint.as_slice()])
}

pub fn reward_vault(farm: &Pubkey, mint: &Pubkey) -> Pubkey {
    derive_address(&[BASE_SEED_REWARD_VAULT, farm.as_slice(), mint.as_slice()])
}

pub fn treasury_vault(global_config: &Pubkey, mint: &Pubkey) -> Pubkey {
    derive_address(&[
        BASE_SEED_REWARD_TREASURY_VAULT,
        global_config.as_slice(),
        mint.as_slice(),
    ])
}

pub fn farm_vaults_authority(farm: &Pubkey) -> Pubkey {
    derive_address(&[BASE_SEED_FARM_VAULTS_AUTHORITY, farm.as_slice()])
}

pub fn treasury_vaults_authority(global_config: &Pubkey) -> Pubkey {
    derive_address(&[BASE_SEED_TREASURY_VAULTS_AUTHORITY, global_config.as_slice()])
}

pub fn user_state(farm: &Pubkey, delegatee: &Pubkey) -> Pubkey {
    derive_address(&[BASE_SEED_USER_STATE, farm.as_slice(), delegatee.as_slice()])
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    Farms(FarmsInstruction),
    Token(TokenInstruction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmsInstruction {
    /// Bootstraps a global config administered by `admin`.
    Initialize {
        admin: Pubkey,
        global_config: Pubkey,
    },
    InitializeGlobalConfig {
        global_admin: Pubkey,
        global_config: Pubkey,
    },
    UpdateGlobalConfig {
        global_admin: Pubkey,
        global_config: Pubkey,
        update: GlobalConfigUpdate,
    },
    UpdateGlobalConfigAdmin {
        pending_global_admin: Pubkey,
        global_config: Pubkey,
    },
    InitializeFarm {
        farm_admin: Pubkey,
        farm_state: Pubkey,
        global_config: Pubkey,
        token_mint: Pubkey,
    },
    InitializeFarmDelegated {
        farm_admin: Pubkey,
        farm_delegate: Pubkey,
        farm_state: Pubkey,
        global_config: Pubkey,
    },
    InitializeReward {
        farm_admin: Pubkey,
        farm_state: Pubkey,
        reward_mint: Pubkey,
    },
    AddRewards {
        payer: Pubkey,
        farm_state: Pubkey,
        reward_mint: Pubkey,
        payer_reward_ata: Pubkey,
        reward_index: u64,
        amount: u64,
        scope_prices: Option<Pubkey>,
    },
    WithdrawReward {
        farm_admin: Pubkey,
        farm_state: Pubkey,
        reward_mint: Pubkey,
        admin_reward_ata: Pubkey,
        reward_index: u64,
        amount: u64,
        scope_prices: Option<Pubkey>,
    },
    UpdateFarmConfig {
        signer: Pubkey,
        farm_state: Pubkey,
        update: FarmConfigUpdate,
        scope_prices: Option<Pubkey>,
    },
    UpdateFarmAdmin {
        pending_farm_admin: Pubkey,
        farm_state: Pubkey,
    },
    UpdateSecondDelegatedAuthority {
        global_admin: Pubkey,
        global_config: Pubkey,
        farm_state: Pubkey,
        new_second_delegated_authority: Pubkey,
    },
    InitializeUser {
        authority: Pubkey,
        payer: Pubkey,
        owner: Pubkey,
        delegatee: Pubkey,
        farm_state: Pubkey,
    },
    TransferOwnership {
        old_owner: Pubkey,
        new_owner: Pubkey,
        old_user_state: Pubkey,
        farm_state: Pubkey,
        scope_prices: Option<Pubkey>,
    },
    RewardUserOnce {
        delegate_authority: Pubkey,
        farm_state: Pubkey,
        user_state: Pubkey,
        reward_index: u64,
        amount: u64,
        expected_reward_issued_unclaimed: u64,
    },
    RefreshFarm {
        farm_state: Pubkey,
        scope_prices: Option<Pubkey>,
    },
    RefreshUserState {
        user_state: Pubkey,
        farm_state: Pubkey,
        scope_prices: Option<Pubkey>,
    },
    Stake {
        owner: Pubkey,
        user_state: Pubkey,
        farm_state: Pubkey,
        user_ata: Pubkey,
        amount: u64,
        scope_prices: Option<Pubkey>,
    },
    SetStakeDelegated {
        delegate_authority: Pubkey,
        user_state: Pubkey,
        farm_state: Pubkey,
        new_amount: u64,
    },
    HarvestReward {
        owner: Pubkey,
        user_state: Pubkey,
        farm_state: Pubkey,
        user_reward_ata: Pubkey,
        reward_index: u64,
        scope_prices: Option<Pubkey>,
    },
    Unstake {
        owner: Pubkey,
        user_state: Pubkey,
        farm_state: Pubkey,
        /// Stake shares, WAD-scaled.
        stake_shares_scaled: u128,
        scope_prices: Option<Pubkey>,
    },
    WithdrawUnstakedDeposits {
        owner: Pubkey,
        user_state: Pubkey,
        farm_state: Pubkey,
        user_ata: Pubkey,
    },
    WithdrawTreasury {
        global_admin: Pubkey,
        global_config: Pubkey,
        reward_mint: Pubkey,
        withdraw_destination: Pubkey,
        amount: u64,
    },
    DepositToFarmVault {
        depositor: Pubkey,
        farm_state: Pubkey,
        depositor_ata: Pubkey,
        amount: u64,
    },
    WithdrawFromFarmVault {
        withdraw_authority: Pubkey,
        farm_state: Pubkey,
        withdrawer_ata: Pubkey,
        amount: u64,
    },
    WithdrawSlashedAmount {
        crank: Pubkey,
        farm_state: Pubkey,
        slashed_amount_spill_address: Pubkey,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenInstruction {
    CreateMint {
        mint: Pubkey,
        mint_authority: Pubkey,
        decimals: u8,
    },
    CreateAccount {
        account: Pubkey,
        mint: Pubkey,
        owner: Pubkey,
    },
    MintTo {
        mint: Pubkey,
        destination: Pubkey,
        mint_authority: Pubkey,
        amount: u64,
    },
    Transfer {
        source: Pubkey,
        destination: Pubkey,
        owner: Pubkey,
        amount: u64,
    },
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Farms(ix) => ix.name(),
            Instruction::Token(ix) => match ix {
                TokenInstruction::CreateMint { .. } => "create_mint",
                TokenInstruction::CreateAccount { .. } => "create_account",
                TokenInstruction::MintTo { .. } => "mint_to",
                TokenInstruction::Transfer { .. } => "transfer",
            },
        }
    }
}

impl FarmsInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            FarmsInstruction::Initialize { .. } => "initialize",
            FarmsInstruction::InitializeGlobalConfig { .. } => "initialize_global_config",
            FarmsInstruction::UpdateGlobalConfig { .. } => "update_global_config",
            FarmsInstruction::UpdateGlobalConfigAdmin { .. } => "update_global_config_admin",
            FarmsInstruction::InitializeFarm { .. } => "initialize_farm",
            FarmsInstruction::InitializeFarmDelegated { .. } => "initialize_farm_delegated",
            FarmsInstruction::InitializeReward { .. } => "initialize_reward",
            FarmsInstruction::AddRewards { .. } => "add_rewards",
            FarmsInstruction::WithdrawReward { .. } => "withdraw_reward",
            FarmsInstruction::UpdateFarmConfig { .. } => "update_farm_config",
            FarmsInstruction::UpdateFarmAdmin { .. } => "update_farm_admin",
            FarmsInstruction::UpdateSecondDelegatedAuthority { .. } => {
                "update_second_delegated_authority"
            }
            FarmsInstruction::InitializeUser { .. } => "initialize_user",
            FarmsInstruction::TransferOwnership { .. } => "transfer_ownership",
            FarmsInstruction::RewardUserOnce { .. } => "reward_user_once",
            FarmsInstruction::RefreshFarm { .. } => "refresh_farm",
            FarmsInstruction::RefreshUserState { .. } => "refresh_user_state",
            FarmsInstruction::Stake { .. } => "stake",
            FarmsInstruction::SetStakeDelegated { .. } => "set_stake_delegated",
            FarmsInstruction::HarvestReward { .. } => "harvest_reward",
            FarmsInstruction::Unstake { .. } => "unstake",
            FarmsInstruction::WithdrawUnstakedDeposits { .. } => "withdraw_unstaked_deposits",
            FarmsInstruction::WithdrawTreasury { .. } => "withdraw_treasury",
            FarmsInstruction::DepositToFarmVault { .. } => "deposit_to_farm_vault",
            FarmsInstruction::WithdrawFromFarmVault { .. } => "withdraw_from_farm_vault",
            FarmsInstruction::WithdrawSlashedAmount { .. } => "withdraw_slashed_amount",
        }
    }
}

impl From<FarmsInstruction> for Instruction {
    fn from(ix: FarmsInstruction) -> Self {
        Instruction::Farms(ix)
    }
}

impl From<TokenInstruction> for Instruction {
    fn from(ix: TokenInstruction) -> Self {
        Instruction::Token(ix)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// An ordered, atomic batch of instructions.
///
/// `signers` lists every key that signed; the fee payer is always a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub fee_payer: Pubkey,
    pub signers: SmallVec<[Pubkey; 4]>,
    pub instructions: SmallVec<[Instruction; 4]>,
}

impl Transaction {
    pub fn new(fee_payer: Pubkey) -> Self {
        let mut signers = SmallVec::new();
        signers.push(fee_payer);
        Self {
            fee_payer,
            signers,
            instructions: SmallVec::new(),
        }
    }

    pub fn with_signer(mut self, signer: Pubkey) -> Self {
        if !self.signers.contains(&signer) {
            self.signers.push(signer);
        }
        self
    }

    pub fn with_instruction(mut self, ix: impl Into<Instruction>) -> Self {
        self.instructions.push(ix.into());
        self
    }

    pub fn is_signer(&self, key: &Pubkey) -> bool {
        self.signers.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_accounts_differ_by_role() {
        let farm = Pubkey::repeat_byte(1);
        let mint = Pubkey::repeat_byte(2);
        assert_ne!(farm_vault(&farm, &mint), reward_vault(&farm, &mint));
        assert_ne!(farm_vaults_authority(&farm), farm_vaults_authority(&mint));
        assert_eq!(user_state(&farm, &mint), user_state(&farm, &mint));
    }

    #[test]
    fn instruction_json_is_keyed_by_program_and_name() {
        let ix: Instruction = FarmsInstruction::Initialize {
            admin: Pubkey::ZERO,
            global_config: Pubkey::ZERO,
        }
        .into();
        let json = serde_json::to_value(&ix).unwrap();
        assert!(json["farms"]["initialize"].is_object());
        assert_eq!(ix.name(), "initialize");
    }

    #[test]
    fn fee_payer_is_signer() {
        let payer = Pubkey::repeat_byte(7);
        let tx = Transaction::new(payer).with_signer(payer);
        assert_eq!(tx.signers.len(), 1);
        assert!(tx.is_signer(&payer));
    }
}
