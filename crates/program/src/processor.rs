//! Account store and instruction processor.
//!
//! [`Ledger::execute`] runs a transaction's instructions in order against a
//! per-transaction write overlay that falls through to the committed accounts
//! on reads. The overlay is merged only when every instruction succeeds, so a
//! failing transaction leaves the ledger untouched.

use crate::farm_operations::{self as ops, HarvestEffects, StakeEffects, WithdrawEffects};
use crate::instruction::{self as ix, FarmsInstruction, Instruction, TokenInstruction, Transaction};
use crate::state::{
    DatedPrice, FarmState, GlobalConfig, LockingMode, OraclePrices, TokenInfo, UserState,
};
use crate::token::{self, Mint, TokenAccount};
use kfarms_core::{Clock, Decimal, FarmError, FarmResult, Pubkey, TxSignature, PROGRAM_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Account {
    GlobalConfig(GlobalConfig),
    FarmState(Box<FarmState>),
    UserState(Box<UserState>),
    Mint(Mint),
    TokenAccount(TokenAccount),
    OraclePrices(OraclePrices),
}

impl Account {
    pub fn kind(&self) -> &'static str {
        match self {
            Account::GlobalConfig(_) => "global_config",
            Account::FarmState(_) => "farm_state",
            Account::UserState(_) => "user_state",
            Account::Mint(_) => "mint",
            Account::TokenAccount(_) => "token_account",
            Account::OraclePrices(_) => "oracle_prices",
        }
    }
}

impl From<GlobalConfig> for Account {
    fn from(v: GlobalConfig) -> Self {
        Account::GlobalConfig(v)
    }
}

impl From<FarmState> for Account {
    fn from(v: FarmState) -> Self {
        Account::FarmState(Box::new(v))
    }
}

impl From<UserState> for Account {
    fn from(v: UserState) -> Self {
        Account::UserState(Box::new(v))
    }
}

impl From<Mint> for Account {
    fn from(v: Mint) -> Self {
        Account::Mint(v)
    }
}

impl From<TokenAccount> for Account {
    fn from(v: TokenAccount) -> Self {
        Account::TokenAccount(v)
    }
}

impl From<OraclePrices> for Account {
    fn from(v: OraclePrices) -> Self {
        Account::OraclePrices(v)
    }
}

/// Result of a crank over every farm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrankReport {
    pub refreshed: usize,
    pub failed: Vec<(Pubkey, FarmError)>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: HashMap<Pubkey, Account>,
    tx_count: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, key: &Pubkey) -> Option<&Account> {
        self.accounts.get(key)
    }

    pub fn global_config(&self, key: &Pubkey) -> Option<&GlobalConfig> {
        match self.accounts.get(key)? {
            Account::GlobalConfig(v) => Some(v),
            _ => None,
        }
    }

    pub fn farm_state(&self, key: &Pubkey) -> Option<&FarmState> {
        match self.accounts.get(key)? {
            Account::FarmState(v) => Some(&**v),
            _ => None,
        }
    }

    pub fn user_state(&self, key: &Pubkey) -> Option<&UserState> {
        match self.accounts.get(key)? {
            Account::UserState(v) => Some(&**v),
            _ => None,
        }
    }

    pub fn token_balance(&self, key: &Pubkey) -> Option<u64> {
        match self.accounts.get(key)? {
            Account::TokenAccount(v) => Some(v.amount),
            _ => None,
        }
    }

    /// Every farm in the ledger, sorted by key.
    pub fn farms(&self) -> Vec<(Pubkey, &FarmState)> {
        let mut farms: Vec<_> = self
            .accounts
            .iter()
            .filter_map(|(k, a)| match a {
                Account::FarmState(f) => Some((*k, &**f)),
                _ => None,
            })
            .collect();
        farms.sort_by_key(|(k, _)| *k);
        farms
    }

    pub fn tx_count(&self) -> u64 {
        self.tx_count
    }

    /// Publishes oracle prices. The feed is owned by an external oracle, so
    /// it is written directly rather than through an instruction.
    pub fn set_oracle_prices(&mut self, key: Pubkey, prices: OraclePrices) {
        self.accounts.insert(key, prices.into());
    }

    /// Seeds accounts directly, bypassing instruction checks. Used to load a
    /// genesis snapshot.
    pub fn load_accounts(&mut self, accounts: impl IntoIterator<Item = (Pubkey, Account)>) {
        self.accounts.extend(accounts);
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Pubkey, &Account)> {
        self.accounts.iter()
    }

    /// Runs `tx` atomically and returns its signature.
    pub fn execute(&mut self, tx: &Transaction, clock: &Clock) -> FarmResult<TxSignature> {
        if !tx.is_signer(&tx.fee_payer) {
            return Err(FarmError::MissingSigner);
        }

        let mut ctx = TxContext {
            base: &self.accounts,
            writes: HashMap::new(),
            signers: &tx.signers,
            clock: *clock,
        };

        for (i, instruction) in tx.instructions.iter().enumerate() {
            if let Err(e) = ctx.process(instruction) {
                tracing::warn!(
                    index = i,
                    instruction = instruction.name(),
                    code = e.code(),
                    error = %e,
                    "transaction failed"
                );
                return Err(e);
            }
        }

        let writes = ctx.writes;
        let touched = writes.len();
        self.accounts.extend(writes);

        let seq = self.tx_count;
        self.tx_count += 1;

        let mut digest = serde_json::to_vec(tx).map_err(|_| FarmError::ConversionFailure)?;
        digest.extend_from_slice(&clock.slot.to_le_bytes());
        digest.extend_from_slice(&seq.to_le_bytes());
        let signature = TxSignature::from_digest(&digest);

        tracing::info!(
            %signature,
            slot = clock.slot,
            instructions = tx.instructions.len(),
            touched,
            "transaction committed"
        );
        Ok(signature)
    }

    /// Refreshes global rewards of every farm in parallel. A farm that fails
    /// to refresh (for instance on a stale oracle) keeps its previous state.
    pub fn refresh_all_farms(&mut self, clock: &Clock) -> CrankReport {
        use rayon::prelude::*;

        let prices: HashMap<Pubkey, Option<DatedPrice>> = self
            .accounts
            .iter()
            .filter_map(|(k, a)| match a {
                Account::FarmState(f) if f.uses_oracle() => {
                    let price = match self.accounts.get(&f.scope_prices) {
                        Some(Account::OraclePrices(p)) => {
                            usize::try_from(f.scope_oracle_price_id)
                                .ok()
                                .and_then(|id| p.prices.get(id).copied())
                        }
                        _ => None,
                    };
                    Some((*k, price))
                }
                _ => None,
            })
            .collect();

        let outcomes: Vec<(Pubkey, FarmResult<()>)> = self
            .accounts
            .par_iter_mut()
            .filter_map(|(k, a)| match a {
                Account::FarmState(farm) => {
                    let price = prices.get(k).copied().flatten();
                    let ts = farm.time_unit.now(clock);
                    let mut updated = FarmState::clone(farm);
                    let res = ops::refresh_global_rewards(&mut updated, price, ts);
                    if res.is_ok() {
                        **farm = updated;
                    }
                    Some((*k, res))
                }
                _ => None,
            })
            .collect();

        let mut report = CrankReport::default();
        for (key, res) in outcomes {
            match res {
                Ok(()) => report.refreshed += 1,
                Err(e) => {
                    tracing::warn!(farm = %key, error = %e, "farm refresh failed");
                    report.failed.push((key, e));
                }
            }
        }
        report.failed.sort_by_key(|(k, _)| *k);

        tracing::info!(
            refreshed = report.refreshed,
            failed = report.failed.len(),
            slot = clock.slot,
            "crank complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Transaction context
// ---------------------------------------------------------------------------

struct TxContext<'a> {
    base: &'a HashMap<Pubkey, Account>,
    writes: HashMap<Pubkey, Account>,
    signers: &'a [Pubkey],
    clock: Clock,
}

fn has_one(expected: &Pubkey, actual: &Pubkey) -> FarmResult<()> {
    if expected != actual {
        tracing::debug!(%expected, %actual, "has_one constraint violated");
        return Err(FarmError::ConstraintHasOne);
    }
    Ok(())
}

fn require(cond: bool, err: FarmError) -> FarmResult<()> {
    if cond {
        Ok(())
    } else {
        Err(err)
    }
}

impl TxContext<'_> {
    fn get(&self, key: &Pubkey) -> Option<&Account> {
        self.writes.get(key).or_else(|| self.base.get(key))
    }

    fn exists(&self, key: &Pubkey) -> bool {
        self.get(key).is_some()
    }

    fn put(&mut self, key: Pubkey, account: impl Into<Account>) {
        self.writes.insert(key, account.into());
    }

    fn create(&mut self, key: Pubkey, account: impl Into<Account>) -> FarmResult<()> {
        if self.exists(&key) {
            tracing::debug!(%key, "account already in use");
            return Err(FarmError::AccountAlreadyInUse);
        }
        self.put(key, account);
        Ok(())
    }

    fn require_signer(&self, key: &Pubkey) -> FarmResult<()> {
        if !self.signers.contains(key) {
            tracing::debug!(%key, "missing signature");
            return Err(FarmError::MissingSigner);
        }
        Ok(())
    }

    fn load(&self, key: &Pubkey) -> FarmResult<&Account> {
        self.get(key).ok_or(FarmError::AccountNotFound)
    }

    fn global_config(&self, key: &Pubkey) -> FarmResult<GlobalConfig> {
        match self.load(key)? {
            Account::GlobalConfig(v) => Ok(v.clone()),
            _ => Err(FarmError::WrongAccountType),
        }
    }

    fn farm(&self, key: &Pubkey) -> FarmResult<FarmState> {
        match self.load(key)? {
            Account::FarmState(v) => Ok(FarmState::clone(v)),
            _ => Err(FarmError::WrongAccountType),
        }
    }

    fn user(&self, key: &Pubkey) -> FarmResult<UserState> {
        match self.load(key)? {
            Account::UserState(v) => Ok(UserState::clone(v)),
            _ => Err(FarmError::WrongAccountType),
        }
    }

    fn mint(&self, key: &Pubkey) -> FarmResult<Mint> {
        match self.load(key)? {
            Account::Mint(v) => Ok(v.clone()),
            _ => Err(FarmError::WrongAccountType),
        }
    }

    fn token_account(&self, key: &Pubkey) -> FarmResult<TokenAccount> {
        match self.load(key)? {
            Account::TokenAccount(v) => Ok(v.clone()),
            _ => Err(FarmError::WrongAccountType),
        }
    }

    /// Loads a user state and checks it belongs to `farm_key`.
    fn farm_user(&self, user_key: &Pubkey, farm_key: &Pubkey) -> FarmResult<UserState> {
        let user = self.user(user_key)?;
        has_one(&user.farm_state, farm_key)?;
        Ok(user)
    }

    fn transfer(&mut self, from: &Pubkey, to: &Pubkey, amount: u64) -> FarmResult<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let mut src = self.token_account(from)?;
        let mut dst = self.token_account(to)?;
        token::transfer(&mut src, &mut dst, amount)?;
        self.put(*from, src);
        self.put(*to, dst);
        Ok(())
    }

    fn scope_price(
        &self,
        farm: &FarmState,
        scope_prices: Option<Pubkey>,
    ) -> FarmResult<Option<DatedPrice>> {
        if !farm.uses_oracle() {
            return Ok(None);
        }
        let key = scope_prices.ok_or(FarmError::InvalidOracleConfig)?;
        if key == Pubkey::ZERO || key == PROGRAM_ID || key != farm.scope_prices {
            return Err(FarmError::InvalidOracleConfig);
        }
        let prices = match self.load(&key)? {
            Account::OraclePrices(p) => p,
            _ => return Err(FarmError::WrongAccountType),
        };
        usize::try_from(farm.scope_oracle_price_id)
            .ok()
            .and_then(|id| prices.prices.get(id).copied())
            .map(Some)
            .ok_or(FarmError::MissingScopePrices)
    }

    fn now(&self, farm: &FarmState) -> u64 {
        farm.time_unit.now(&self.clock)
    }

    fn process(&mut self, instruction: &Instruction) -> FarmResult<()> {
        tracing::debug!(instruction = instruction.name(), "processing");
        match instruction {
            Instruction::Farms(f) => self.process_farms(f),
            Instruction::Token(t) => self.process_token(t),
        }
    }

    // -----------------------------------------------------------------------
    // Token program
    // -----------------------------------------------------------------------

    fn process_token(&mut self, instruction: &TokenInstruction) -> FarmResult<()> {
        match *instruction {
            TokenInstruction::CreateMint {
                mint,
                mint_authority,
                decimals,
            } => self.create(
                mint,
                Mint {
                    mint_authority,
                    decimals,
                    supply: 0,
                },
            ),
            TokenInstruction::CreateAccount {
                account,
                mint,
                owner,
            } => {
                self.mint(&mint)?;
                self.create(account, TokenAccount::new(mint, owner))
            }
            TokenInstruction::MintTo {
                mint,
                destination,
                mint_authority,
                amount,
            } => {
                self.require_signer(&mint_authority)?;
                let mut m = self.mint(&mint)?;
                has_one(&m.mint_authority, &mint_authority)?;
                let mut dst = self.token_account(&destination)?;
                require(dst.mint == mint, FarmError::UnexpectedAccount)?;
                m.mint_to(&mut dst, amount)?;
                self.put(mint, m);
                self.put(destination, dst);
                Ok(())
            }
            TokenInstruction::Transfer {
                source,
                destination,
                owner,
                amount,
            } => {
                self.require_signer(&owner)?;
                has_one(&self.token_account(&source)?.owner, &owner)?;
                self.transfer(&source, &destination, amount)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Farms program
    // -----------------------------------------------------------------------

    fn process_farms(&mut self, instruction: &FarmsInstruction) -> FarmResult<()> {
        match instruction {
            FarmsInstruction::Initialize {
                admin,
                global_config,
            } => self.initialize_global_config(admin, global_config),
            FarmsInstruction::InitializeGlobalConfig {
                global_admin,
                global_config,
            } => self.initialize_global_config(global_admin, global_config),
            FarmsInstruction::UpdateGlobalConfig {
                global_admin,
                global_config,
                update,
            } => {
                self.require_signer(global_admin)?;
                let mut config = self.global_config(global_config)?;
                has_one(&config.global_admin, global_admin)?;
                ops::update_global_config(&mut config, *update)?;
                self.put(*global_config, config);
                Ok(())
            }
            FarmsInstruction::UpdateGlobalConfigAdmin {
                pending_global_admin,
                global_config,
            } => {
                self.require_signer(pending_global_admin)?;
                let mut config = self.global_config(global_config)?;
                has_one(&config.pending_global_admin, pending_global_admin)?;
                tracing::info!(
                    prev = %config.global_admin,
                    new = %config.pending_global_admin,
                    "global admin updated"
                );
                config.global_admin = config.pending_global_admin;
                self.put(*global_config, config);
                Ok(())
            }
            FarmsInstruction::InitializeFarm {
                farm_admin,
                farm_state,
                global_config,
                token_mint,
            } => self.initialize_farm(farm_admin, farm_state, global_config, token_mint),
            FarmsInstruction::InitializeFarmDelegated {
                farm_admin,
                farm_delegate,
                farm_state,
                global_config,
            } => {
                self.require_signer(farm_admin)?;
                self.require_signer(farm_delegate)?;
                self.global_config(global_config)?;
                let farm = FarmState {
                    farm_admin: *farm_admin,
                    pending_farm_admin: *farm_admin,
                    global_config: *global_config,
                    farm_vaults_authority: ix::farm_vaults_authority(farm_state),
                    delegate_authority: *farm_delegate,
                    is_farm_delegated: true,
                    ..Default::default()
                };
                tracing::info!(farm = %farm_state, ts = self.now(&farm), "initialize delegated farm");
                self.create(*farm_state, farm)
            }
            FarmsInstruction::InitializeReward {
                farm_admin,
                farm_state,
                reward_mint,
            } => self.initialize_reward(farm_admin, farm_state, reward_mint),
            FarmsInstruction::AddRewards {
                payer,
                farm_state,
                reward_mint,
                payer_reward_ata,
                reward_index,
                amount,
                scope_prices,
            } => {
                self.require_signer(payer)?;
                let mut farm = self.farm(farm_state)?;
                let ata = self.token_account(payer_reward_ata)?;
                require(ata.mint == *reward_mint, FarmError::RewardAtaRewardMintMissmatch)?;
                require(ata.owner == *payer, FarmError::RewardAtaOwnerNotPayer)?;
                let vault = self.reward_vault_of(&farm, farm_state, *reward_index)?;

                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                let fx = ops::add_reward(&mut farm, price, *reward_mint, *reward_index, *amount, ts)?;
                self.put(*farm_state, farm);
                self.transfer(payer_reward_ata, &vault, fx.reward_amount)
            }
            FarmsInstruction::WithdrawReward {
                farm_admin,
                farm_state,
                reward_mint,
                admin_reward_ata,
                reward_index,
                amount,
                scope_prices,
            } => {
                self.require_signer(farm_admin)?;
                let mut farm = self.farm(farm_state)?;
                has_one(&farm.farm_admin, farm_admin)?;
                let ata = self.token_account(admin_reward_ata)?;
                require(ata.mint == *reward_mint, FarmError::RewardAtaRewardMintMissmatch)?;
                require(ata.owner == *farm_admin, FarmError::RewardAtaOwnerNotAdmin)?;
                let vault = self.reward_vault_of(&farm, farm_state, *reward_index)?;

                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                let fx =
                    ops::withdraw_reward(&mut farm, price, *reward_mint, *reward_index, *amount, ts)?;
                self.put(*farm_state, farm);
                self.transfer(&vault, admin_reward_ata, fx.reward_amount)
            }
            FarmsInstruction::UpdateFarmConfig {
                signer,
                farm_state,
                update,
                scope_prices,
            } => {
                self.require_signer(signer)?;
                let mut farm = self.farm(farm_state)?;
                if update.is_rate_update() {
                    require(
                        farm.delegated_rps_admin == *signer || farm.farm_admin == *signer,
                        FarmError::InvalidFarmConfigUpdateAuthority,
                    )?;
                } else {
                    has_one(&farm.farm_admin, signer)?;
                }
                // A missing or stale feed must not block reconfiguring the oracle.
                let price = self.scope_price(&farm, *scope_prices).ok().flatten();
                let ts = self.now(&farm);
                ops::update_farm_config(&mut farm, price, update.clone(), ts)?;
                self.put(*farm_state, farm);
                Ok(())
            }
            FarmsInstruction::UpdateFarmAdmin {
                pending_farm_admin,
                farm_state,
            } => {
                self.require_signer(pending_farm_admin)?;
                let mut farm = self.farm(farm_state)?;
                has_one(&farm.pending_farm_admin, pending_farm_admin)?;
                tracing::info!(prev = %farm.farm_admin, new = %farm.pending_farm_admin, "farm admin updated");
                farm.farm_admin = farm.pending_farm_admin;
                self.put(*farm_state, farm);
                Ok(())
            }
            FarmsInstruction::UpdateSecondDelegatedAuthority {
                global_admin,
                global_config,
                farm_state,
                new_second_delegated_authority,
            } => {
                self.require_signer(global_admin)?;
                let mut farm = self.farm(farm_state)?;
                has_one(&farm.global_config, global_config)?;
                has_one(&self.global_config(global_config)?.global_admin, global_admin)?;
                tracing::info!(
                    prev = %farm.second_delegated_authority,
                    new = %new_second_delegated_authority,
                    "second delegated authority updated"
                );
                farm.second_delegated_authority = *new_second_delegated_authority;
                self.put(*farm_state, farm);
                Ok(())
            }
            FarmsInstruction::InitializeUser {
                authority,
                payer,
                owner,
                delegatee,
                farm_state,
            } => self.initialize_user(authority, payer, owner, delegatee, farm_state),
            FarmsInstruction::TransferOwnership {
                old_owner,
                new_owner,
                old_user_state,
                farm_state,
                scope_prices,
            } => self.transfer_ownership(old_owner, new_owner, old_user_state, farm_state, *scope_prices),
            FarmsInstruction::RewardUserOnce {
                delegate_authority,
                farm_state,
                user_state,
                reward_index,
                amount,
                expected_reward_issued_unclaimed,
            } => {
                self.require_signer(delegate_authority)?;
                let mut farm = self.farm(farm_state)?;
                has_one(&farm.delegate_authority, delegate_authority)?;
                let mut user = self.farm_user(user_state, farm_state)?;
                require(
                    farm.is_reward_user_once_enabled,
                    FarmError::RewardUserOnceFeatureDisabled,
                )?;
                let idx = usize::try_from(*reward_index)
                    .ok()
                    .filter(|i| *i < farm.num_reward_tokens())
                    .ok_or(FarmError::RewardIndexOutOfRange)?;
                require(
                    user.rewards_issued_unclaimed[idx] == *expected_reward_issued_unclaimed,
                    FarmError::CurrentRewardIssuedUnclaimedMismatch,
                )?;
                ops::reward_user_once(&mut farm, &mut user, *reward_index, *amount)?;
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                Ok(())
            }
            FarmsInstruction::RefreshFarm {
                farm_state,
                scope_prices,
            } => {
                let mut farm = self.farm(farm_state)?;
                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                ops::refresh_global_rewards(&mut farm, price, ts)?;
                self.put(*farm_state, farm);
                Ok(())
            }
            FarmsInstruction::RefreshUserState {
                user_state,
                farm_state,
                scope_prices,
            } => {
                let mut farm = self.farm(farm_state)?;
                let mut user = self.farm_user(user_state, farm_state)?;
                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                ops::user_refresh_state(&mut farm, &mut user, price, ts)?;
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                Ok(())
            }
            FarmsInstruction::Stake {
                owner,
                user_state,
                farm_state,
                user_ata,
                amount,
                scope_prices,
            } => {
                require(*amount != 0, FarmError::StakeZero)?;
                self.require_signer(owner)?;
                let mut farm = self.farm(farm_state)?;
                let mut user = self.farm_user(user_state, farm_state)?;
                has_one(&user.owner, owner)?;
                require(!farm.is_delegated(), FarmError::FarmDelegated)?;
                require(!farm.is_farm_frozen, FarmError::FarmFrozen)?;
                self.check_user_ata(user_ata, owner, &farm.token.mint, FarmError::UserAtaFarmTokenMintMissmatch)?;

                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                let StakeEffects { amount_to_stake } =
                    ops::stake(&mut farm, &mut user, price, *amount, ts)?;
                tracing::info!(user = %user_state, amount = amount_to_stake, ts, "stake");

                let vault = farm.farm_vault;
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                self.transfer(user_ata, &vault, amount_to_stake)
            }
            FarmsInstruction::SetStakeDelegated {
                delegate_authority,
                user_state,
                farm_state,
                new_amount,
            } => {
                self.require_signer(delegate_authority)?;
                let mut farm = self.farm(farm_state)?;
                require(farm.is_delegated(), FarmError::FarmNotDelegated)?;
                require(
                    farm.delegate_authority == *delegate_authority
                        || farm.second_delegated_authority == *delegate_authority,
                    FarmError::AuthorityFarmDelegateMissmatch,
                )?;
                let mut user = self.farm_user(user_state, farm_state)?;
                let ts = self.now(&farm);
                ops::set_stake(&mut farm, &mut user, *new_amount, ts)?;
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                Ok(())
            }
            FarmsInstruction::HarvestReward {
                owner,
                user_state,
                farm_state,
                user_reward_ata,
                reward_index,
                scope_prices,
            } => {
                self.require_signer(owner)?;
                let mut farm = self.farm(farm_state)?;
                let mut user = self.farm_user(user_state, farm_state)?;
                has_one(&user.owner, owner)?;
                let config = self.global_config(&farm.global_config)?;
                let vault = self.reward_vault_of(&farm, farm_state, *reward_index)?;
                let reward_mint = self.reward_mint_of(&farm, *reward_index)?;
                self.check_user_ata(
                    user_reward_ata,
                    owner,
                    &reward_mint,
                    FarmError::UserAtaRewardVaultMintMissmatch,
                )?;

                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                let HarvestEffects {
                    reward_user,
                    reward_treasury,
                } = ops::harvest(&mut farm, &mut user, &config, price, *reward_index, ts)?;
                tracing::info!(
                    owner = %user.owner,
                    reward_user,
                    reward_treasury,
                    "harvest"
                );

                let treasury = ix::treasury_vault(&farm.global_config, &reward_mint);
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                self.transfer(&vault, user_reward_ata, reward_user)?;
                self.transfer(&vault, &treasury, reward_treasury)
            }
            FarmsInstruction::Unstake {
                owner,
                user_state,
                farm_state,
                stake_shares_scaled,
                scope_prices,
            } => {
                require(*stake_shares_scaled != 0, FarmError::UnstakeZero)?;
                self.require_signer(owner)?;
                let mut farm = self.farm(farm_state)?;
                let mut user = self.farm_user(user_state, farm_state)?;
                has_one(&user.owner, owner)?;
                require(!farm.is_delegated(), FarmError::FarmDelegated)?;

                let price = self.scope_price(&farm, *scope_prices)?;
                let ts = self.now(&farm);
                let shares = Decimal::from_scaled_val(*stake_shares_scaled);
                ops::unstake(&mut farm, &mut user, price, shares, ts)?;
                tracing::info!(user = %user_state, %shares, ts, "unstake");
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                Ok(())
            }
            FarmsInstruction::WithdrawUnstakedDeposits {
                owner,
                user_state,
                farm_state,
                user_ata,
            } => {
                self.require_signer(owner)?;
                let mut farm = self.farm(farm_state)?;
                let mut user = self.farm_user(user_state, farm_state)?;
                has_one(&user.owner, owner)?;
                require(!farm.is_delegated(), FarmError::FarmDelegated)?;
                self.check_user_ata(user_ata, owner, &farm.token.mint, FarmError::UserAtaFarmTokenMintMissmatch)?;

                let ts = self.now(&farm);
                let WithdrawEffects { amount_to_withdraw } =
                    ops::withdraw_unstaked_deposits(&mut farm, &mut user, ts)?;
                let vault = farm.farm_vault;
                self.put(*farm_state, farm);
                self.put(*user_state, user);
                self.transfer(&vault, user_ata, amount_to_withdraw)
            }
            FarmsInstruction::WithdrawTreasury {
                global_admin,
                global_config,
                reward_mint,
                withdraw_destination,
                amount,
            } => {
                self.require_signer(global_admin)?;
                let config = self.global_config(global_config)?;
                has_one(&config.global_admin, global_admin)?;
                require(*amount > 0, FarmError::NothingToWithdraw)?;
                let treasury = ix::treasury_vault(global_config, reward_mint);
                tracing::info!(%treasury, amount, "withdraw treasury");
                self.transfer(&treasury, withdraw_destination, *amount)
            }
            FarmsInstruction::DepositToFarmVault {
                depositor,
                farm_state,
                depositor_ata,
                amount,
            } => {
                require(*amount != 0, FarmError::DepositZero)?;
                self.require_signer(depositor)?;
                let mut farm = self.farm(farm_state)?;
                has_one(&farm.farm_admin, depositor)?;
                require(!farm.is_delegated(), FarmError::FarmDelegated)?;
                require(!farm.is_farm_frozen, FarmError::FarmFrozen)?;
                let ata = self.token_account(depositor_ata)?;
                require(ata.mint == farm.token.mint, FarmError::UserAtaFarmTokenMintMissmatch)?;

                ops::deposit_to_farm_vault(&mut farm, *amount)?;
                let vault = farm.farm_vault;
                self.put(*farm_state, farm);
                self.transfer(depositor_ata, &vault, *amount)
            }
            FarmsInstruction::WithdrawFromFarmVault {
                withdraw_authority,
                farm_state,
                withdrawer_ata,
                amount,
            } => {
                let mut farm = self.farm(farm_state)?;
                require(farm.withdraw_authority != Pubkey::ZERO, FarmError::UnexpectedAccount)?;
                self.require_signer(withdraw_authority)?;
                has_one(&farm.withdraw_authority, withdraw_authority)?;
                require(!farm.is_delegated(), FarmError::FarmDelegated)?;

                let withdrawn = ops::withdraw_from_farm_vault(&mut farm, *amount)?;
                tracing::info!(farm = %farm_state, withdrawn, frozen = farm.is_farm_frozen, "withdraw from farm vault");
                let vault = farm.farm_vault;
                self.put(*farm_state, farm);
                self.transfer(&vault, withdrawer_ata, withdrawn)
            }
            FarmsInstruction::WithdrawSlashedAmount {
                crank,
                farm_state,
                slashed_amount_spill_address,
            } => {
                self.require_signer(crank)?;
                let mut farm = self.farm(farm_state)?;
                require(!farm.is_delegated(), FarmError::FarmDelegated)?;
                has_one(&farm.slashed_amount_spill_address, slashed_amount_spill_address)?;

                let amount = ops::withdraw_slashed_amount(&mut farm);
                tracing::info!(farm = %farm_state, amount, "withdraw slashed amount");
                let vault = farm.farm_vault;
                self.put(*farm_state, farm);
                self.transfer(&vault, slashed_amount_spill_address, amount)
            }
        }
    }

    fn reward_vault_of(
        &self,
        farm: &FarmState,
        farm_key: &Pubkey,
        reward_index: u64,
    ) -> FarmResult<Pubkey> {
        let mint = self.reward_mint_of(farm, reward_index)?;
        let vault = ix::reward_vault(farm_key, &mint);
        let info = usize::try_from(reward_index)
            .ok()
            .and_then(|i| farm.reward_infos.get(i))
            .ok_or(FarmError::RewardIndexOutOfRange)?;
        require(info.rewards_vault == vault, FarmError::RewardVaultMismatch)?;
        Ok(vault)
    }

    fn reward_mint_of(&self, farm: &FarmState, reward_index: u64) -> FarmResult<Pubkey> {
        usize::try_from(reward_index)
            .ok()
            .and_then(|i| farm.reward_infos.get(i))
            .map(|r| r.token.mint)
            .ok_or(FarmError::RewardIndexOutOfRange)
    }

    fn check_user_ata(
        &self,
        ata: &Pubkey,
        owner: &Pubkey,
        mint: &Pubkey,
        mint_err: FarmError,
    ) -> FarmResult<()> {
        let account = self.token_account(ata)?;
        has_one(&account.owner, owner)?;
        require(account.mint == *mint, mint_err)
    }

    fn initialize_global_config(&mut self, admin: &Pubkey, key: &Pubkey) -> FarmResult<()> {
        self.require_signer(admin)?;
        let config = GlobalConfig {
            global_admin: *admin,
            pending_global_admin: *admin,
            treasury_fee_bps: 0,
            treasury_vaults_authority: ix::treasury_vaults_authority(key),
        };
        tracing::info!(global_config = %key, admin = %admin, "initialize global config");
        self.create(*key, config)
    }

    fn initialize_farm(
        &mut self,
        farm_admin: &Pubkey,
        farm_key: &Pubkey,
        global_config: &Pubkey,
        token_mint: &Pubkey,
    ) -> FarmResult<()> {
        self.require_signer(farm_admin)?;
        self.global_config(global_config)?;
        let mint = self.mint(token_mint)?;

        let vault = ix::farm_vault(farm_key, token_mint);
        let authority = ix::farm_vaults_authority(farm_key);
        self.create(vault, TokenAccount::new(*token_mint, authority))?;

        let farm = FarmState {
            farm_admin: *farm_admin,
            pending_farm_admin: *farm_admin,
            global_config: *global_config,
            token: TokenInfo {
                mint: *token_mint,
                decimals: mint.decimals,
            },
            farm_vault: vault,
            farm_vaults_authority: authority,
            ..Default::default()
        };
        tracing::info!(farm = %farm_key, ts = self.now(&farm), "initialize farm");
        self.create(*farm_key, farm)
    }

    fn initialize_reward(
        &mut self,
        farm_admin: &Pubkey,
        farm_key: &Pubkey,
        reward_mint: &Pubkey,
    ) -> FarmResult<()> {
        self.require_signer(farm_admin)?;
        let mut farm = self.farm(farm_key)?;
        has_one(&farm.farm_admin, farm_admin)?;
        let config = self.global_config(&farm.global_config)?;
        let mint = self.mint(reward_mint)?;

        let vault = ix::reward_vault(farm_key, reward_mint);
        self.create(
            vault,
            TokenAccount::new(*reward_mint, farm.farm_vaults_authority),
        )?;
        let treasury = ix::treasury_vault(&farm.global_config, reward_mint);
        if !self.exists(&treasury) {
            self.put(
                treasury,
                TokenAccount::new(*reward_mint, config.treasury_vaults_authority),
            );
        }

        let ts = self.now(&farm);
        let token = TokenInfo {
            mint: *reward_mint,
            decimals: mint.decimals,
        };
        ops::initialize_reward(&mut farm, vault, token, ts)?;
        tracing::info!(farm = %farm_key, mint = %reward_mint, ts, "initialize reward");
        self.put(*farm_key, farm);
        Ok(())
    }

    fn initialize_user(
        &mut self,
        authority: &Pubkey,
        payer: &Pubkey,
        owner: &Pubkey,
        delegatee: &Pubkey,
        farm_key: &Pubkey,
    ) -> FarmResult<()> {
        self.require_signer(authority)?;
        self.require_signer(payer)?;
        let mut farm = self.farm(farm_key)?;

        if farm.is_delegated() {
            require(
                farm.delegate_authority == *authority,
                FarmError::AuthorityFarmDelegateMissmatch,
            )?;
        } else {
            require(
                payer == delegatee && authority == payer && payer == owner,
                FarmError::UserDelegatedFarmNonDelegatedMissmatch,
            )?;
        }

        let user_key = ix::user_state(farm_key, delegatee);
        let mut user = UserState::default();
        let ts = self.now(&farm);
        ops::initialize_user(&mut farm, &mut user, *owner, *delegatee, *farm_key, ts)?;
        tracing::info!(user = %user_key, farm = %farm_key, ts, "initialize user");

        self.create(user_key, user)?;
        self.put(*farm_key, farm);
        Ok(())
    }

    fn transfer_ownership(
        &mut self,
        old_owner: &Pubkey,
        new_owner: &Pubkey,
        old_user_key: &Pubkey,
        farm_key: &Pubkey,
        scope_prices: Option<Pubkey>,
    ) -> FarmResult<()> {
        self.require_signer(old_owner)?;
        let mut old_user = self.user(old_user_key)?;
        has_one(&old_user.owner, old_owner)?;
        require(
            old_user.farm_state == *farm_key,
            FarmError::InvalidTransferOwnershipFarmState,
        )?;
        let mut farm = self.farm(farm_key)?;

        require(!farm.is_delegated(), FarmError::FarmDelegated)?;
        require(
            old_user.delegatee == old_user.owner,
            FarmError::InvalidTransferOwnershipUserStateOwnerDelegatee,
        )?;
        require(
            farm.locking_mode == LockingMode::None,
            FarmError::InvalidTransferOwnershipFarmStateLockingMode,
        )?;
        require(
            farm.withdrawal_cooldown_period == 0,
            FarmError::InvalidTransferOwnershipFarmStateWithdrawCooldownPeriod,
        )?;

        let new_user_key = ix::user_state(farm_key, new_owner);
        require(
            new_user_key != *old_user_key,
            FarmError::InvalidTransferOwnershipNewOwner,
        )?;

        let price = self.scope_price(&farm, scope_prices)?;
        let ts = self.now(&farm);

        let mut new_user = if self.exists(&new_user_key) {
            let existing = self.user(&new_user_key)?;
            require(
                existing.delegatee == existing.owner,
                FarmError::InvalidTransferOwnershipUserStateOwnerDelegatee,
            )?;
            require(
                existing.owner == *new_owner,
                FarmError::InvalidTransferOwnershipNewOwner,
            )?;
            require(
                existing.farm_state == old_user.farm_state,
                FarmError::InvalidTransferOwnershipFarmState,
            )?;
            existing
        } else {
            let mut fresh = UserState::default();
            ops::initialize_user(&mut farm, &mut fresh, *new_owner, *new_owner, *farm_key, ts)?;
            fresh
        };

        tracing::info!(
            from = %old_user_key,
            old_owner = %old_owner,
            to = %new_user_key,
            new_owner = %new_owner,
            "transferring stake ownership"
        );

        let stake = old_user.active_stake();
        ops::unstake(&mut farm, &mut old_user, price, stake, ts)?;
        let WithdrawEffects { amount_to_withdraw } =
            ops::withdraw_unstaked_deposits(&mut farm, &mut old_user, ts)?;
        let StakeEffects { amount_to_stake } =
            ops::stake(&mut farm, &mut new_user, price, amount_to_withdraw, ts)?;
        require(
            amount_to_stake == amount_to_withdraw,
            FarmError::InvalidTransferOwnershipStakeAmount,
        )?;

        tracing::info!(amount = amount_to_stake, "stake transferred");
        self.put(*farm_key, farm);
        self.put(*old_user_key, old_user);
        self.put(new_user_key, new_user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FarmConfigUpdate, GlobalConfigUpdate};
    use kfarms_core::unique_pubkey;

    struct Fixture {
        ledger: Ledger,
        clock: Clock,
        admin: Pubkey,
        config: Pubkey,
        farm: Pubkey,
        stake_mint: Pubkey,
        reward_mint: Pubkey,
        admin_reward_ata: Pubkey,
    }

    impl Fixture {
        fn run(&mut self, tx: Transaction) -> FarmResult<TxSignature> {
            self.clock.slot += 1;
            self.ledger.execute(&tx, &self.clock)
        }

        fn at(&mut self, ts: u64) -> &mut Self {
            self.clock.unix_timestamp = ts;
            self
        }

        fn farm_state(&self) -> &FarmState {
            self.ledger.farm_state(&self.farm).unwrap()
        }

        fn new() -> Self {
            let admin = unique_pubkey("admin");
            let config = unique_pubkey("config");
            let farm = unique_pubkey("farm");
            let stake_mint = unique_pubkey("stake-mint");
            let reward_mint = unique_pubkey("reward-mint");
            let admin_reward_ata = unique_pubkey("admin-reward-ata");

            let mut fx = Fixture {
                ledger: Ledger::new(),
                clock: Clock::default(),
                admin,
                config,
                farm,
                stake_mint,
                reward_mint,
                admin_reward_ata,
            };

            let tx = Transaction::new(admin)
                .with_instruction(FarmsInstruction::InitializeGlobalConfig {
                    global_admin: admin,
                    global_config: config,
                })
                .with_instruction(TokenInstruction::CreateMint {
                    mint: stake_mint,
                    mint_authority: admin,
                    decimals: 6,
                })
                .with_instruction(TokenInstruction::CreateMint {
                    mint: reward_mint,
                    mint_authority: admin,
                    decimals: 6,
                })
                .with_instruction(TokenInstruction::CreateAccount {
                    account: admin_reward_ata,
                    mint: reward_mint,
                    owner: admin,
                })
                .with_instruction(TokenInstruction::MintTo {
                    mint: reward_mint,
                    destination: admin_reward_ata,
                    mint_authority: admin,
                    amount: 1_000_000,
                })
                .with_instruction(FarmsInstruction::InitializeFarm {
                    farm_admin: admin,
                    farm_state: farm,
                    global_config: config,
                    token_mint: stake_mint,
                })
                .with_instruction(FarmsInstruction::InitializeReward {
                    farm_admin: admin,
                    farm_state: farm,
                    reward_mint,
                })
                .with_instruction(FarmsInstruction::AddRewards {
                    payer: admin,
                    farm_state: farm,
                    reward_mint,
                    payer_reward_ata: admin_reward_ata,
                    reward_index: 0,
                    amount: 10_000,
                    scope_prices: None,
                })
                .with_instruction(FarmsInstruction::UpdateFarmConfig {
                    signer: admin,
                    farm_state: farm,
                    update: FarmConfigUpdate::UpdateRewardRps {
                        reward_index: 0,
                        value: 10,
                    },
                    scope_prices: None,
                });
            fx.run(tx).unwrap();
            fx
        }

        /// Creates a funded user with stake and reward token accounts.
        fn user(&mut self, funds: u64) -> (Pubkey, Pubkey, Pubkey, Pubkey) {
            let owner = unique_pubkey("owner");
            let ata = unique_pubkey("ata");
            let reward_ata = unique_pubkey("reward-ata");
            let setup = Transaction::new(self.admin)
                .with_instruction(TokenInstruction::CreateAccount {
                    account: ata,
                    mint: self.stake_mint,
                    owner,
                })
                .with_instruction(TokenInstruction::CreateAccount {
                    account: reward_ata,
                    mint: self.reward_mint,
                    owner,
                })
                .with_instruction(TokenInstruction::MintTo {
                    mint: self.stake_mint,
                    destination: ata,
                    mint_authority: self.admin,
                    amount: funds,
                });
            self.run(setup).unwrap();

            let init = Transaction::new(owner).with_instruction(FarmsInstruction::InitializeUser {
                authority: owner,
                payer: owner,
                owner,
                delegatee: owner,
                farm_state: self.farm,
            });
            self.run(init).unwrap();
            (owner, ix::user_state(&self.farm, &owner), ata, reward_ata)
        }

        fn stake(&mut self, owner: Pubkey, user: Pubkey, ata: Pubkey, amount: u64) -> FarmResult<TxSignature> {
            let tx = Transaction::new(owner).with_instruction(FarmsInstruction::Stake {
                owner,
                user_state: user,
                farm_state: self.farm,
                user_ata: ata,
                amount,
                scope_prices: None,
            });
            self.run(tx)
        }

        fn harvest(&mut self, owner: Pubkey, user: Pubkey, reward_ata: Pubkey) -> FarmResult<TxSignature> {
            let tx = Transaction::new(owner).with_instruction(FarmsInstruction::HarvestReward {
                owner,
                user_state: user,
                farm_state: self.farm,
                user_reward_ata: reward_ata,
                reward_index: 0,
                scope_prices: None,
            });
            self.run(tx)
        }
    }

    #[test]
    fn initialize_creates_config_for_signer() {
        let mut ledger = Ledger::new();
        let admin = unique_pubkey("admin");
        let config = unique_pubkey("config");
        let tx = Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin,
            global_config: config,
        });
        let sig = ledger.execute(&tx, &Clock::default()).unwrap();
        assert!(!sig.to_string().is_empty());
        assert_eq!(ledger.global_config(&config).unwrap().global_admin, admin);

        // Same transaction again: account exists, and the signature would differ.
        assert_eq!(
            ledger.execute(&tx, &Clock::default()),
            Err(FarmError::AccountAlreadyInUse)
        );
    }

    #[test]
    fn signatures_are_unique_per_transaction() {
        let mut ledger = Ledger::new();
        let admin = unique_pubkey("admin");
        let a = Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin,
            global_config: unique_pubkey("config"),
        });
        let b = Transaction::new(admin).with_instruction(FarmsInstruction::Initialize {
            admin,
            global_config: unique_pubkey("config"),
        });
        let clock = Clock::default();
        assert_ne!(ledger.execute(&a, &clock).unwrap(), ledger.execute(&b, &clock).unwrap());
        assert_eq!(ledger.tx_count(), 2);
    }

    #[test]
    fn stake_and_harvest_move_tokens() {
        let mut fx = Fixture::new();
        let (owner, user, ata, reward_ata) = fx.user(1_000);
        fx.at(100);
        fx.stake(owner, user, ata, 400).unwrap();

        assert_eq!(fx.ledger.token_balance(&ata), Some(600));
        let vault = fx.farm_state().farm_vault;
        assert_eq!(fx.ledger.token_balance(&vault), Some(400));

        fx.at(150);
        fx.harvest(owner, user, reward_ata).unwrap();
        assert_eq!(fx.ledger.token_balance(&reward_ata), Some(500));
        let reward_vault = ix::reward_vault(&fx.farm, &fx.reward_mint);
        assert_eq!(fx.ledger.token_balance(&reward_vault), Some(9_500));
    }

    #[test]
    fn treasury_fee_lands_in_treasury_vault() {
        let mut fx = Fixture::new();
        let update = Transaction::new(fx.admin).with_instruction(FarmsInstruction::UpdateGlobalConfig {
            global_admin: fx.admin,
            global_config: fx.config,
            update: GlobalConfigUpdate::TreasuryFeeBps(1_000),
        });
        fx.run(update).unwrap();

        let (owner, user, ata, reward_ata) = fx.user(100);
        fx.at(0);
        fx.stake(owner, user, ata, 100).unwrap();
        fx.at(10);
        fx.harvest(owner, user, reward_ata).unwrap();

        let treasury = ix::treasury_vault(&fx.config, &fx.reward_mint);
        assert_eq!(fx.ledger.token_balance(&treasury), Some(10));
        assert_eq!(fx.ledger.token_balance(&reward_ata), Some(90));

        let dest = fx.admin_reward_ata;
        let before = fx.ledger.token_balance(&dest).unwrap();
        let withdraw = Transaction::new(fx.admin).with_instruction(FarmsInstruction::WithdrawTreasury {
            global_admin: fx.admin,
            global_config: fx.config,
            reward_mint: fx.reward_mint,
            withdraw_destination: dest,
            amount: 10,
        });
        fx.run(withdraw).unwrap();
        assert_eq!(fx.ledger.token_balance(&dest), Some(before + 10));
    }

    #[test]
    fn failed_transaction_is_rolled_back() {
        let mut fx = Fixture::new();
        let (owner, user, ata, _) = fx.user(100);
        let tx = Transaction::new(owner)
            .with_instruction(FarmsInstruction::Stake {
                owner,
                user_state: user,
                farm_state: fx.farm,
                user_ata: ata,
                amount: 50,
                scope_prices: None,
            })
            .with_instruction(FarmsInstruction::Stake {
                owner,
                user_state: user,
                farm_state: fx.farm,
                user_ata: ata,
                amount: 0,
                scope_prices: None,
            });
        assert_eq!(fx.run(tx), Err(FarmError::StakeZero));
        assert_eq!(fx.ledger.token_balance(&ata), Some(100));
        assert_eq!(fx.farm_state().total_staked_amount, 0);
    }

    #[test]
    fn stake_requires_owner_signature() {
        let mut fx = Fixture::new();
        let (owner, user, ata, _) = fx.user(100);
        let tx = Transaction::new(fx.admin).with_instruction(FarmsInstruction::Stake {
            owner,
            user_state: user,
            farm_state: fx.farm,
            user_ata: ata,
            amount: 10,
            scope_prices: None,
        });
        assert_eq!(fx.run(tx), Err(FarmError::MissingSigner));
    }

    #[test]
    fn non_delegated_user_must_sign_for_themselves() {
        let mut fx = Fixture::new();
        let owner = unique_pubkey("owner");
        let tx = Transaction::new(fx.admin)
            .with_signer(owner)
            .with_instruction(FarmsInstruction::InitializeUser {
                authority: fx.admin,
                payer: fx.admin,
                owner,
                delegatee: owner,
                farm_state: fx.farm,
            });
        assert_eq!(fx.run(tx), Err(FarmError::UserDelegatedFarmNonDelegatedMissmatch));
    }

    #[test]
    fn rate_updates_accept_delegated_rps_admin_only_for_rates() {
        let mut fx = Fixture::new();
        let rps_admin = unique_pubkey("rps-admin");
        let set = Transaction::new(fx.admin).with_instruction(FarmsInstruction::UpdateFarmConfig {
            signer: fx.admin,
            farm_state: fx.farm,
            update: FarmConfigUpdate::UpdateDelegatedRpsAdmin { value: rps_admin },
            scope_prices: None,
        });
        fx.run(set).unwrap();

        let rate = Transaction::new(rps_admin).with_instruction(FarmsInstruction::UpdateFarmConfig {
            signer: rps_admin,
            farm_state: fx.farm,
            update: FarmConfigUpdate::UpdateRewardRps {
                reward_index: 0,
                value: 3,
            },
            scope_prices: None,
        });
        fx.run(rate).unwrap();

        let cap = Transaction::new(rps_admin).with_instruction(FarmsInstruction::UpdateFarmConfig {
            signer: rps_admin,
            farm_state: fx.farm,
            update: FarmConfigUpdate::DepositCapAmount { value: 1 },
            scope_prices: None,
        });
        assert_eq!(fx.run(cap), Err(FarmError::ConstraintHasOne));
    }

    #[test]
    fn vault_withdrawal_freezes_farm() {
        let mut fx = Fixture::new();
        let (owner, user, ata, _) = fx.user(100);
        fx.stake(owner, user, ata, 100).unwrap();

        let authority = unique_pubkey("withdraw-authority");
        let dest = unique_pubkey("dest");
        let setup = Transaction::new(fx.admin)
            .with_instruction(FarmsInstruction::UpdateFarmConfig {
                signer: fx.admin,
                farm_state: fx.farm,
                update: FarmConfigUpdate::WithdrawAuthority { value: authority },
                scope_prices: None,
            })
            .with_instruction(TokenInstruction::CreateAccount {
                account: dest,
                mint: fx.stake_mint,
                owner: authority,
            });
        fx.run(setup).unwrap();

        let withdraw = Transaction::new(authority).with_instruction(FarmsInstruction::WithdrawFromFarmVault {
            withdraw_authority: authority,
            farm_state: fx.farm,
            withdrawer_ata: dest,
            amount: u64::MAX,
        });
        fx.run(withdraw).unwrap();
        assert!(fx.farm_state().is_farm_frozen);
        assert_eq!(fx.ledger.token_balance(&dest), Some(100));
        assert_eq!(fx.stake(owner, user, ata, 1), Err(FarmError::FarmFrozen));
    }

    #[test]
    fn transfer_ownership_moves_stake() {
        let mut fx = Fixture::new();
        let (owner, user, ata, _) = fx.user(100);
        fx.stake(owner, user, ata, 100).unwrap();

        let heir = unique_pubkey("heir");
        let tx = Transaction::new(owner).with_instruction(FarmsInstruction::TransferOwnership {
            old_owner: owner,
            new_owner: heir,
            old_user_state: user,
            farm_state: fx.farm,
            scope_prices: None,
        });
        fx.run(tx).unwrap();

        let heir_state = fx.ledger.user_state(&ix::user_state(&fx.farm, &heir)).unwrap();
        assert_eq!(heir_state.owner, heir);
        assert_eq!(heir_state.active_stake(), Decimal::from(100));
        assert_eq!(fx.ledger.user_state(&user).unwrap().active_stake_scaled, 0);
        assert_eq!(fx.farm_state().num_users, 2);
    }

    #[test]
    fn transfer_ownership_rejects_locked_farms() {
        let mut fx = Fixture::new();
        let (owner, user, ata, _) = fx.user(100);
        fx.stake(owner, user, ata, 100).unwrap();
        let lock = Transaction::new(fx.admin).with_instruction(FarmsInstruction::UpdateFarmConfig {
            signer: fx.admin,
            farm_state: fx.farm,
            update: FarmConfigUpdate::LockingMode {
                value: LockingMode::Continuous,
            },
            scope_prices: None,
        });
        fx.run(lock).unwrap();

        let tx = Transaction::new(owner).with_instruction(FarmsInstruction::TransferOwnership {
            old_owner: owner,
            new_owner: unique_pubkey("heir"),
            old_user_state: user,
            farm_state: fx.farm,
            scope_prices: None,
        });
        assert_eq!(fx.run(tx), Err(FarmError::InvalidTransferOwnershipFarmStateLockingMode));
    }

    #[test]
    fn delegated_farm_flow() {
        let mut ledger = Ledger::new();
        let clock = Clock::default();
        let admin = unique_pubkey("admin");
        let delegate = unique_pubkey("delegate");
        let config = unique_pubkey("config");
        let farm = unique_pubkey("farm");
        let member = unique_pubkey("member");

        let tx = Transaction::new(admin)
            .with_signer(delegate)
            .with_instruction(FarmsInstruction::InitializeGlobalConfig {
                global_admin: admin,
                global_config: config,
            })
            .with_instruction(FarmsInstruction::InitializeFarmDelegated {
                farm_admin: admin,
                farm_delegate: delegate,
                farm_state: farm,
                global_config: config,
            })
            .with_instruction(FarmsInstruction::InitializeUser {
                authority: delegate,
                payer: admin,
                owner: member,
                delegatee: member,
                farm_state: farm,
            })
            .with_instruction(FarmsInstruction::SetStakeDelegated {
                delegate_authority: delegate,
                user_state: ix::user_state(&farm, &member),
                farm_state: farm,
                new_amount: 500,
            });
        ledger.execute(&tx, &clock).unwrap();
        assert_eq!(ledger.farm_state(&farm).unwrap().total_staked_amount, 500);

        let outsider = Transaction::new(admin).with_instruction(FarmsInstruction::SetStakeDelegated {
            delegate_authority: admin,
            user_state: ix::user_state(&farm, &member),
            farm_state: farm,
            new_amount: 0,
        });
        assert_eq!(
            ledger.execute(&outsider, &clock),
            Err(FarmError::AuthorityFarmDelegateMissmatch)
        );
    }

    #[test]
    fn crank_refreshes_every_farm() {
        let mut fx = Fixture::new();
        let (owner, user, ata, _) = fx.user(100);
        fx.at(0);
        fx.stake(owner, user, ata, 100).unwrap();

        let report = fx.ledger.refresh_all_farms(&Clock {
            slot: 99,
            unix_timestamp: 30,
        });
        assert_eq!(report.refreshed, 1);
        assert!(report.failed.is_empty());
        let reward = &fx.farm_state().reward_infos[0];
        assert_eq!(reward.rewards_issued_unclaimed, 300);
        assert_eq!(reward.last_issuance_ts, 30);
    }

    #[test]
    fn oracle_farm_requires_matching_feed() {
        let mut fx = Fixture::new();
        let feed = unique_pubkey("scope");
        fx.ledger.set_oracle_prices(
            feed,
            OraclePrices {
                prices: vec![DatedPrice {
                    value: 2,
                    exp: 0,
                    unix_timestamp: 0,
                }],
            },
        );
        let configure = Transaction::new(fx.admin)
            .with_instruction(FarmsInstruction::UpdateFarmConfig {
                signer: fx.admin,
                farm_state: fx.farm,
                update: FarmConfigUpdate::ScopePricesAccount { value: feed },
                scope_prices: None,
            })
            .with_instruction(FarmsInstruction::UpdateFarmConfig {
                signer: fx.admin,
                farm_state: fx.farm,
                update: FarmConfigUpdate::ScopeOraclePriceId { value: 0 },
                scope_prices: None,
            });
        fx.run(configure).unwrap();

        let refresh_without = Transaction::new(fx.admin).with_instruction(FarmsInstruction::RefreshFarm {
            farm_state: fx.farm,
            scope_prices: None,
        });
        assert_eq!(fx.run(refresh_without), Err(FarmError::InvalidOracleConfig));

        let refresh_with = Transaction::new(fx.admin).with_instruction(FarmsInstruction::RefreshFarm {
            farm_state: fx.farm,
            scope_prices: Some(feed),
        });
        fx.run(refresh_with).unwrap();
    }
}
