//! Farm state transitions.
//!
//! Every function here is pure over the account structs it receives: it
//! validates, mutates, and returns the token movements the caller must
//! perform. Account lookup, signer checks, and token transfers live in the
//! processor.

use crate::stake_operations as stake_ops;
use crate::state::{
    DatedPrice, FarmConfigUpdate, FarmState, GlobalConfig, GlobalConfigUpdate, RewardInfo,
    RewardScheduleCurve, RewardType, TokenInfo, UserState,
};
use kfarms_core::consts::{BPS_DIV_FACTOR, MAX_REWARDS_TOKENS};
use kfarms_core::math::{ten_pow, u64_mul_div};
use kfarms_core::{Decimal, FarmError, FarmResult, Pubkey};

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StakeEffects {
    pub amount_to_stake: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WithdrawEffects {
    pub amount_to_withdraw: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestEffects {
    pub reward_user: u64,
    pub reward_treasury: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddRewardEffects {
    pub reward_amount: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WithdrawRewardEffects {
    pub reward_amount: u64,
}

fn reward_slot(farm: &FarmState, reward_index: u64) -> FarmResult<usize> {
    let idx = usize::try_from(reward_index).map_err(|_| FarmError::RewardIndexOutOfRange)?;
    if idx >= farm.num_reward_tokens() {
        return Err(FarmError::RewardIndexOutOfRange);
    }
    Ok(idx)
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub fn update_global_config(config: &mut GlobalConfig, update: GlobalConfigUpdate) -> FarmResult<()> {
    match update {
        GlobalConfigUpdate::PendingGlobalAdmin(pubkey) => {
            tracing::info!(
                admin = %config.global_admin,
                pending = %pubkey,
                "changing pending global admin"
            );
            config.pending_global_admin = pubkey;
        }
        GlobalConfigUpdate::TreasuryFeeBps(value) => {
            if value > BPS_DIV_FACTOR {
                tracing::warn!(value, "treasury_fee_bps must be <= 10000");
                return Err(FarmError::InvalidConfigValue);
            }
            tracing::info!(prev = config.treasury_fee_bps, value, "changing treasury fee");
            config.treasury_fee_bps = value;
        }
    }
    Ok(())
}

pub fn update_farm_config(
    farm: &mut FarmState,
    scope_price: Option<DatedPrice>,
    update: FarmConfigUpdate,
    ts: u64,
) -> FarmResult<()> {
    tracing::debug!(?update, "update farm config");

    if let Some(reward_index) = update.reward_index() {
        let idx = reward_slot(farm, reward_index)?;
        refresh_global_rewards(farm, scope_price, ts)?;

        let reward = &mut farm.reward_infos[idx];
        if !reward.is_initialised() {
            return Err(FarmError::NoRewardInList);
        }
        return update_reward_config(reward, update, ts);
    }

    match update {
        FarmConfigUpdate::WithdrawAuthority { value } => {
            tracing::info!(prev = %farm.withdraw_authority, new = %value, "withdraw_authority");
            farm.withdraw_authority = value;
        }
        FarmConfigUpdate::DepositWarmupPeriod { value } => {
            if farm.is_delegated() {
                tracing::warn!("delegated farm cannot change deposit_warmup_period");
                return Err(FarmError::FarmDelegated);
            }
            tracing::info!(prev = farm.deposit_warmup_period, value, "deposit_warmup_period");
            farm.deposit_warmup_period = value;
        }
        FarmConfigUpdate::WithdrawCooldownPeriod { value } => {
            if farm.is_delegated() {
                tracing::warn!("delegated farm cannot change withdrawal_cooldown_period");
                return Err(FarmError::FarmDelegated);
            }
            tracing::info!(
                prev = farm.withdrawal_cooldown_period,
                value,
                "withdrawal_cooldown_period"
            );
            farm.withdrawal_cooldown_period = value;
        }
        FarmConfigUpdate::LockingMode { value } => {
            tracing::info!(prev = ?farm.locking_mode, new = ?value, "locking_mode");
            farm.locking_mode = value;
        }
        FarmConfigUpdate::LockingStartTimestamp { value } => {
            tracing::info!(prev = farm.locking_start_timestamp, value, "locking_start_timestamp");
            farm.locking_start_timestamp = value;
        }
        FarmConfigUpdate::LockingDuration { value } => {
            tracing::info!(prev = farm.locking_duration, value, "locking_duration");
            farm.locking_duration = value;
        }
        FarmConfigUpdate::LockingEarlyWithdrawalPenaltyBps { value } => {
            if value > BPS_DIV_FACTOR {
                return Err(FarmError::InvalidConfigValue);
            }
            tracing::info!(
                prev = farm.locking_early_withdrawal_penalty_bps,
                value,
                "locking_early_withdrawal_penalty_bps"
            );
            farm.locking_early_withdrawal_penalty_bps = value;
        }
        FarmConfigUpdate::DepositCapAmount { value } => {
            tracing::info!(prev = farm.deposit_cap_amount, value, "deposit_cap_amount");
            farm.deposit_cap_amount = value;
        }
        FarmConfigUpdate::SlashedAmountSpillAddress { value } => {
            tracing::info!(
                prev = %farm.slashed_amount_spill_address,
                new = %value,
                "slashed_amount_spill_address"
            );
            farm.slashed_amount_spill_address = value;
        }
        FarmConfigUpdate::ScopePricesAccount { value } => {
            tracing::info!(prev = %farm.scope_prices, new = %value, "scope_prices");
            farm.scope_prices = value;
        }
        FarmConfigUpdate::ScopeOraclePriceId { value } => {
            tracing::info!(prev = farm.scope_oracle_price_id, value, "scope_oracle_price_id");
            farm.scope_oracle_price_id = value;
        }
        FarmConfigUpdate::ScopeOracleMaxAge { value } => {
            tracing::info!(prev = farm.scope_oracle_max_age, value, "scope_oracle_max_age");
            farm.scope_oracle_max_age = value;
        }
        FarmConfigUpdate::UpdatePendingFarmAdmin { value } => {
            tracing::info!(prev = %farm.pending_farm_admin, new = %value, "pending_farm_admin");
            farm.pending_farm_admin = value;
        }
        FarmConfigUpdate::UpdateStrategyId { value } => {
            tracing::info!(prev = %farm.strategy_id, new = %value, "strategy_id");
            farm.strategy_id = value;
        }
        FarmConfigUpdate::UpdateDelegatedRpsAdmin { value } => {
            tracing::info!(prev = %farm.delegated_rps_admin, new = %value, "delegated_rps_admin");
            farm.delegated_rps_admin = value;
        }
        FarmConfigUpdate::RewardUserOnceEnabled { value } => {
            tracing::info!(prev = farm.is_reward_user_once_enabled, value, "reward_user_once");
            farm.is_reward_user_once_enabled = value;
        }
        FarmConfigUpdate::UpdateRewardRps { .. }
        | FarmConfigUpdate::UpdateRewardMinClaimDuration { .. }
        | FarmConfigUpdate::RewardType { .. }
        | FarmConfigUpdate::RpsDecimals { .. }
        | FarmConfigUpdate::UpdateRewardScheduleCurvePoints { .. } => {
            return Err(FarmError::InvalidConfigValue);
        }
    }
    Ok(())
}

/// Applies a per-reward option. Issuance restarts from `ts` afterwards.
pub fn update_reward_config(
    reward: &mut RewardInfo,
    update: FarmConfigUpdate,
    ts: u64,
) -> FarmResult<()> {
    match update {
        FarmConfigUpdate::UpdateRewardRps { value, .. } => {
            tracing::info!(rps = value, last_issuance_ts = ts, "reward rps");
            reward.reward_schedule_curve = RewardScheduleCurve::from_constant(value);
        }
        FarmConfigUpdate::UpdateRewardMinClaimDuration { value, .. } => {
            tracing::info!(prev = reward.min_claim_duration_seconds, value, "min claim duration");
            reward.min_claim_duration_seconds = value;
        }
        FarmConfigUpdate::RewardType { value, .. } => {
            tracing::info!(prev = ?reward.reward_type, new = ?value, "reward type");
            reward.reward_type = value;
        }
        FarmConfigUpdate::RpsDecimals { value, .. } => {
            // 10^decimals must stay representable.
            ten_pow(usize::from(value))?;
            tracing::info!(prev = reward.rewards_per_second_decimals, value, "rps decimals");
            reward.rewards_per_second_decimals = value;
        }
        FarmConfigUpdate::UpdateRewardScheduleCurvePoints { points, .. } => {
            tracing::info!(?points, "reward schedule curve");
            reward.reward_schedule_curve = RewardScheduleCurve::from_points(&points)?;
        }
        _ => return Err(FarmError::InvalidConfigValue),
    }

    reward.last_issuance_ts = ts;
    Ok(())
}

// ---------------------------------------------------------------------------
// Rewards
// ---------------------------------------------------------------------------

pub fn initialize_reward(
    farm: &mut FarmState,
    reward_vault: Pubkey,
    token: TokenInfo,
    ts: u64,
) -> FarmResult<()> {
    if farm.num_reward_tokens() >= MAX_REWARDS_TOKENS {
        return Err(FarmError::MaxRewardNumberReached);
    }
    if farm.reward_infos.iter().any(|r| r.token.mint == token.mint) {
        return Err(FarmError::RewardAlreadyInitialized);
    }

    farm.reward_infos.push(RewardInfo {
        token,
        rewards_vault: reward_vault,
        last_issuance_ts: ts,
        ..Default::default()
    });
    Ok(())
}

pub fn add_reward(
    farm: &mut FarmState,
    scope_price: Option<DatedPrice>,
    mint: Pubkey,
    reward_index: u64,
    amount: u64,
    ts: u64,
) -> FarmResult<AddRewardEffects> {
    tracing::debug!(amount, reward_index, "add reward");
    let idx = reward_slot(farm, reward_index)?;
    refresh_global_rewards(farm, scope_price, ts)?;

    let reward = &mut farm.reward_infos[idx];
    if reward.token.mint != mint {
        return Err(FarmError::RewardDoesNotExist);
    }
    reward.rewards_available = reward
        .rewards_available
        .checked_add(amount)
        .ok_or(FarmError::IntegerOverflow)?;

    Ok(AddRewardEffects {
        reward_amount: amount,
    })
}

/// Takes back undistributed rewards. Only allowed while the reward has no
/// schedule set.
pub fn withdraw_reward(
    farm: &mut FarmState,
    scope_price: Option<DatedPrice>,
    mint: Pubkey,
    reward_index: u64,
    amount: u64,
    ts: u64,
) -> FarmResult<WithdrawRewardEffects> {
    tracing::debug!(amount, reward_index, "withdraw reward");
    if amount == 0 {
        return Err(FarmError::RewardDoesNotExist);
    }
    let idx = reward_slot(farm, reward_index)?;
    refresh_global_rewards(farm, scope_price, ts)?;

    let reward = &mut farm.reward_infos[idx];
    if reward.token.mint != mint {
        return Err(FarmError::RewardDoesNotExist);
    }
    if reward.rewards_available == 0 {
        return Err(FarmError::WithdrawRewardZeroAvailable);
    }
    if reward.reward_schedule_curve != RewardScheduleCurve::default() {
        return Err(FarmError::RewardScheduleCurveSet);
    }

    let withdrawable = reward.rewards_available.min(amount);
    reward.rewards_available -= withdrawable;

    Ok(WithdrawRewardEffects {
        reward_amount: withdrawable,
    })
}

/// Issues rewards accrued since the last issuance into `reward_per_share`.
pub fn refresh_global_reward(
    farm: &mut FarmState,
    scope_price: Option<DatedPrice>,
    ts: u64,
    reward_index: usize,
) -> FarmResult<()> {
    let is_delegated = farm.is_delegated();
    let total_staked = farm.total_staked_amount;
    let total_active_stake_scaled = farm.total_active_stake_scaled;
    let uses_oracle = farm.uses_oracle();
    let max_age = farm.scope_oracle_max_age;

    let reward = &mut farm.reward_infos[reward_index];

    if ts == reward.last_issuance_ts {
        return Ok(());
    }

    if total_active_stake_scaled == 0 {
        reward.last_issuance_ts = ts;
        return Ok(());
    }

    let cumulative = u128::from(
        reward
            .reward_schedule_curve
            .cumulative_amount_issued(reward.last_issuance_ts, ts)?,
    );

    let typed = match reward.reward_type {
        RewardType::Proportional => cumulative,
        RewardType::Constant => cumulative
            .checked_mul(u128::from(total_staked))
            .ok_or(FarmError::MathOverflow)?,
    };

    let decimal_adjusted =
        typed / u128::from(ten_pow(usize::from(reward.rewards_per_second_decimals))?);

    let oracle_adjusted = if uses_oracle {
        let price = scope_price.ok_or(FarmError::MissingScopePrices)?;
        price.check_fresh(ts, max_age)?;
        price.apply(decimal_adjusted)?
    } else {
        decimal_adjusted
    };

    let amount = u64::try_from(oracle_adjusted).map_err(|_| FarmError::IntegerOverflow)?;

    tracing::trace!(
        time_passed = ts - reward.last_issuance_ts,
        reward_type = ?reward.reward_type,
        cumulative,
        decimal_adjusted,
        amount,
        "reward accrual"
    );

    if amount == 0 {
        return Ok(());
    }

    let issued = amount.min(reward.rewards_available);

    tracing::debug!(
        reward_index,
        issued,
        last_ts = reward.last_issuance_ts,
        ts,
        "issuing reward"
    );

    reward.last_issuance_ts = ts;
    reward.rewards_issued_unclaimed = reward
        .rewards_issued_unclaimed
        .checked_add(issued)
        .ok_or(FarmError::IntegerOverflow)?;
    reward.rewards_issued_cumulative = reward
        .rewards_issued_cumulative
        .checked_add(issued)
        .ok_or(FarmError::IntegerOverflow)?;
    reward.rewards_available -= issued;

    // Delegated farms count stake in raw token units.
    let added_per_share = if is_delegated {
        Decimal::from(issued).try_div_int(total_active_stake_scaled)?
    } else {
        Decimal::from(issued).try_div(Decimal::from_scaled_val(total_active_stake_scaled))?
    };
    reward.set_reward_per_share(reward.reward_per_share().try_add(added_per_share)?)?;

    Ok(())
}

pub fn refresh_global_rewards(
    farm: &mut FarmState,
    scope_price: Option<DatedPrice>,
    ts: u64,
) -> FarmResult<()> {
    for reward_index in 0..farm.num_reward_tokens() {
        refresh_global_reward(farm, scope_price, ts, reward_index)?;
    }
    Ok(())
}

/// Restarts issuance from `ts` while nobody is staked, so rewards never accrue
/// to an empty farm.
pub fn initialize_reward_ts_if_needed(farm: &mut FarmState, ts: u64) {
    if farm.total_staked_amount == 0 {
        for reward in farm.reward_infos.iter_mut() {
            reward.last_issuance_ts = ts;
        }
    }
}

pub fn user_refresh_reward(
    farm: &FarmState,
    user: &mut UserState,
    reward_index: usize,
) -> FarmResult<()> {
    let tally = user.rewards_tally(reward_index);
    let reward_per_share = farm.reward_infos[reward_index].reward_per_share();

    let entitled = if farm.is_delegated() {
        reward_per_share.try_mul_int(user.active_stake_scaled)?
    } else {
        reward_per_share.try_mul(user.active_stake())?
    };

    let reward = entitled
        .try_sub(tally)
        .map_err(|_| FarmError::IntegerOverflow)?
        .try_floor()
        .map_err(|_| FarmError::IntegerOverflow)?;

    user.set_rewards_tally(reward_index, tally.try_add(Decimal::from(reward))?)?;
    user.rewards_issued_unclaimed[reward_index] = user.rewards_issued_unclaimed[reward_index]
        .checked_add(reward)
        .ok_or(FarmError::IntegerOverflow)?;

    tracing::trace!(reward_index, reward, "user reward refreshed");
    Ok(())
}

pub fn user_refresh_all_rewards(farm: &FarmState, user: &mut UserState) -> FarmResult<()> {
    if user.active_stake_scaled > 0 {
        for reward_index in 0..farm.num_reward_tokens() {
            user_refresh_reward(farm, user, reward_index)?;
        }
    }
    Ok(())
}

fn update_tally_on_stake_increase(
    farm: &FarmState,
    user: &mut UserState,
    added_shares: Decimal,
) -> FarmResult<()> {
    if added_shares.is_zero() {
        return Ok(());
    }
    for (index, reward) in farm.reward_infos.iter().enumerate() {
        let tally = user
            .rewards_tally(index)
            .try_add(added_shares.try_mul(reward.reward_per_share())?)?;
        user.set_rewards_tally(index, tally)
            .map_err(|_| FarmError::IntegerOverflow)?;
    }
    Ok(())
}

fn user_refresh_stake(farm: &mut FarmState, user: &mut UserState, ts: u64) -> FarmResult<()> {
    initialize_reward_ts_if_needed(farm, ts);

    if user.pending_deposit_stake_scaled > 0 && ts >= user.pending_deposit_stake_ts {
        let (amount, gained) = stake_ops::activate_pending_stake(user, farm)?;
        tracing::debug!(amount, %gained, "pending deposit activated");
        update_tally_on_stake_increase(farm, user, gained)?;
    }
    Ok(())
}

pub fn user_refresh_state(
    farm: &mut FarmState,
    user: &mut UserState,
    scope_price: Option<DatedPrice>,
    ts: u64,
) -> FarmResult<()> {
    refresh_global_rewards(farm, scope_price, ts)?;
    user_refresh_all_rewards(farm, user)?;

    user.is_farm_delegated = farm.is_delegated();
    if !user.is_farm_delegated {
        user_refresh_stake(farm, user, ts)?;
    }
    Ok(())
}

/// Credits `amount` of a reward directly to one user, outside the schedule.
pub fn reward_user_once(
    farm: &mut FarmState,
    user: &mut UserState,
    reward_index: u64,
    amount: u64,
) -> FarmResult<()> {
    let idx = reward_slot(farm, reward_index)?;
    let reward = &mut farm.reward_infos[idx];
    reward.rewards_issued_unclaimed = reward
        .rewards_issued_unclaimed
        .checked_add(amount)
        .ok_or(FarmError::IntegerOverflow)?;
    reward.rewards_issued_cumulative = reward
        .rewards_issued_cumulative
        .checked_add(amount)
        .ok_or(FarmError::IntegerOverflow)?;
    user.rewards_issued_unclaimed[idx] = user.rewards_issued_unclaimed[idx]
        .checked_add(amount)
        .ok_or(FarmError::IntegerOverflow)?;
    Ok(())
}

pub fn harvest(
    farm: &mut FarmState,
    user: &mut UserState,
    global_config: &GlobalConfig,
    scope_price: Option<DatedPrice>,
    reward_index: u64,
    ts: u64,
) -> FarmResult<HarvestEffects> {
    let idx = reward_slot(farm, reward_index)?;
    refresh_global_rewards(farm, scope_price, ts)?;
    user_refresh_reward(farm, user, idx)?;

    let reward = user.rewards_issued_unclaimed[idx];
    let since_last_claim = ts
        .checked_sub(user.last_claim_ts[idx])
        .ok_or(FarmError::IntegerOverflow)?;
    if since_last_claim < farm.reward_infos[idx].min_claim_duration_seconds {
        return Err(FarmError::MinClaimDurationNotReached);
    }
    if reward == 0 {
        return Ok(HarvestEffects::default());
    }

    let info = &mut farm.reward_infos[idx];
    info.rewards_issued_unclaimed = info
        .rewards_issued_unclaimed
        .checked_sub(reward)
        .ok_or(FarmError::IntegerOverflow)?;
    user.rewards_issued_unclaimed[idx] = 0;
    user.last_claim_ts[idx] = ts;

    let reward_treasury = u64_mul_div(reward, global_config.treasury_fee_bps, BPS_DIV_FACTOR)?;
    let reward_user = reward - reward_treasury;

    tracing::info!(reward_index, reward_user, reward_treasury, "harvest");
    Ok(HarvestEffects {
        reward_user,
        reward_treasury,
    })
}

// ---------------------------------------------------------------------------
// Users and stake
// ---------------------------------------------------------------------------

pub fn initialize_user(
    farm: &mut FarmState,
    user: &mut UserState,
    owner: Pubkey,
    delegatee: Pubkey,
    farm_key: Pubkey,
    ts: u64,
) -> FarmResult<()> {
    *user = UserState {
        user_id: farm.num_users,
        farm_state: farm_key,
        owner,
        delegatee,
        is_farm_delegated: farm.is_delegated(),
        last_claim_ts: [ts; MAX_REWARDS_TOKENS],
        ..Default::default()
    };
    farm.num_users = farm
        .num_users
        .checked_add(1)
        .ok_or(FarmError::IntegerOverflow)?;
    Ok(())
}

pub fn stake(
    farm: &mut FarmState,
    user: &mut UserState,
    scope_price: Option<DatedPrice>,
    amount: u64,
    ts: u64,
) -> FarmResult<StakeEffects> {
    tracing::debug!(amount, "stake");
    refresh_global_rewards(farm, scope_price, ts)?;
    user_refresh_all_rewards(farm, user)?;
    user_refresh_stake(farm, user, ts)?;

    if !farm.can_accept_deposit(amount, scope_price, ts)? {
        return Err(FarmError::DepositCapReached);
    }

    if farm.deposit_warmup_period > 0 {
        if user.pending_deposit_stake_scaled != 0 {
            tracing::debug!(
                pending_ts = user.pending_deposit_stake_ts,
                "pending deposit will be extended"
            );
        }
        user.pending_deposit_stake_ts = ts
            .checked_add(u64::from(farm.deposit_warmup_period))
            .ok_or(FarmError::IntegerOverflow)?;
        let gained = stake_ops::add_pending_deposit_stake(user, farm, amount)?;
        tracing::debug!(pending_ts = user.pending_deposit_stake_ts, %gained, "stake pending");
    } else {
        let gained = stake_ops::add_active_stake(user, farm, amount)?;
        tracing::debug!(%gained, "stake active");
        update_tally_on_stake_increase(farm, user, gained)?;
    }

    user.last_stake_ts = ts;

    Ok(StakeEffects {
        amount_to_stake: amount,
    })
}

/// Overwrites a user's stake on a delegated farm. Stake is tracked 1:1 with
/// the token amount there and never passes through the pending pools.
pub fn set_stake(
    farm: &mut FarmState,
    user: &mut UserState,
    new_stake: u64,
    ts: u64,
) -> FarmResult<()> {
    if farm.total_active_stake_scaled != u128::from(farm.total_staked_amount)
        || farm.total_pending_stake_scaled != 0
        || farm.total_pending_amount != 0
        || farm.deposit_warmup_period != 0
        || farm.withdrawal_cooldown_period != 0
    {
        tracing::error!("delegated farm has non-delegated stake accounting");
        return Err(FarmError::FarmNotDelegated);
    }

    let current = u64::try_from(user.active_stake_scaled).map_err(|_| FarmError::IntegerOverflow)?;
    if current == new_stake {
        tracing::debug!("set_stake nothing to do");
        return Ok(());
    }

    refresh_global_rewards(farm, None, ts)?;
    user_refresh_all_rewards(farm, user)?;

    if current > new_stake {
        let diff = current - new_stake;
        farm.total_active_stake_scaled -= u128::from(diff);
        farm.total_staked_amount -= diff;
        user.active_stake_scaled -= u128::from(diff);
    } else {
        let diff = new_stake - current;
        initialize_reward_ts_if_needed(farm, ts);
        user.last_stake_ts = ts;
        if !farm.can_accept_deposit(diff, None, ts)? {
            return Err(FarmError::DepositCapReached);
        }
        farm.total_active_stake_scaled = farm
            .total_active_stake_scaled
            .checked_add(u128::from(diff))
            .ok_or(FarmError::IntegerOverflow)?;
        farm.total_staked_amount = farm
            .total_staked_amount
            .checked_add(diff)
            .ok_or(FarmError::IntegerOverflow)?;
        user.active_stake_scaled += u128::from(diff);
    }

    for (index, reward) in farm.reward_infos.iter().enumerate() {
        user.rewards_tally_scaled[index] = reward
            .reward_per_share_scaled
            .checked_mul(u128::from(new_stake))
            .ok_or(FarmError::MathOverflow)?;
    }

    tracing::info!(from = current, to = new_stake, "delegated stake set");
    Ok(())
}

/// Moves up to `requested` active shares into the cooldown queue.
pub fn unstake(
    farm: &mut FarmState,
    user: &mut UserState,
    scope_price: Option<DatedPrice>,
    requested: Decimal,
    ts: u64,
) -> FarmResult<()> {
    tracing::debug!(%requested, "unstake");
    refresh_global_rewards(farm, scope_price, ts)?;
    user_refresh_all_rewards(farm, user)?;

    let shares = requested.min(user.active_stake());
    if shares.is_zero() {
        return Err(FarmError::NothingToUnstake);
    }

    if user.pending_withdrawal_unstake_scaled > 0 {
        if user.pending_withdrawal_unstake_ts <= ts {
            tracing::warn!("elapsed pending withdrawal must be withdrawn first");
            return Err(FarmError::PendingWithdrawalNotWithdrawnYet);
        }
        tracing::debug!(
            pending = %user.pending_withdrawal_unstake(),
            added = %shares,
            old_ts = user.pending_withdrawal_unstake_ts,
            "extending pending withdrawal"
        );
    }

    user.pending_withdrawal_unstake_ts = ts
        .checked_add(u64::from(farm.withdrawal_cooldown_period))
        .ok_or(FarmError::IntegerOverflow)?;

    let effects = stake_ops::unstake(user, farm, shares, ts)?;
    tracing::debug!(
        amount = effects.amount_unstaked,
        pending = %effects.pending_stake_gained,
        penalty = effects.penalty,
        "unstaked"
    );

    farm.slashed_amount_current = farm
        .slashed_amount_current
        .checked_add(effects.penalty)
        .ok_or(FarmError::IntegerOverflow)?;
    farm.slashed_amount_cumulative = farm
        .slashed_amount_cumulative
        .checked_add(effects.penalty)
        .ok_or(FarmError::IntegerOverflow)?;

    for (index, reward) in farm.reward_infos.iter().enumerate() {
        let tally = user.rewards_tally(index);
        let loss = shares.try_mul(reward.reward_per_share())?;
        if loss >= tally.try_add(Decimal::one())? {
            return Err(FarmError::IntegerOverflow);
        }
        user.rewards_tally_scaled[index] = tally
            .to_scaled_val()?
            .saturating_sub(loss.to_scaled_val()?);
    }

    Ok(())
}

pub fn withdraw_unstaked_deposits(
    farm: &mut FarmState,
    user: &mut UserState,
    ts: u64,
) -> FarmResult<WithdrawEffects> {
    if user.pending_withdrawal_unstake_ts > ts {
        return Err(FarmError::UnstakeNotElapsed);
    }
    if user.pending_withdrawal_unstake_scaled == 0 {
        return Err(FarmError::NothingToWithdraw);
    }
    let amount_to_withdraw = stake_ops::remove_pending_withdrawal_stake(user, farm)?;
    Ok(WithdrawEffects { amount_to_withdraw })
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

pub fn deposit_to_farm_vault(farm: &mut FarmState, amount: u64) -> FarmResult<()> {
    tracing::debug!(amount, "deposit to farm vault");
    stake_ops::increase_total_amount(farm, amount)
}

pub fn withdraw_from_farm_vault(farm: &mut FarmState, amount: u64) -> FarmResult<u64> {
    tracing::debug!(amount, "withdraw from farm vault");
    let effects = stake_ops::withdraw_farm(farm, amount)?;
    if effects.farm_to_freeze {
        farm.is_farm_frozen = true;
    }
    Ok(effects.amount_to_withdraw)
}

pub fn withdraw_slashed_amount(farm: &mut FarmState) -> u64 {
    std::mem::take(&mut farm.slashed_amount_current)
}
