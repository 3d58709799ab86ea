//! Share accounting between token amounts and WAD stake shares.
//!
//! A farm tracks two pools: *active* (earning rewards) and *pending*
//! (warming up before activation or cooling down before withdrawal). Each
//! pool converts amounts to shares at its own `total_stake / total_amount`
//! rate, so direct vault deposits or withdrawals reprice existing shares.

use crate::state::{FarmState, LockingMode, UserState};
use crate::withdrawal_penalty::apply_early_withdrawal_penalty;
use kfarms_core::math::u64_mul_div;
use kfarms_core::{Decimal, FarmError, FarmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnstakeEffects {
    /// Amount moved to the pending-withdrawal pool, after penalty.
    pub amount_unstaked: u64,
    pub pending_stake_gained: Decimal,
    pub penalty: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultWithdrawEffects {
    pub amount_to_withdraw: u64,
    pub farm_to_freeze: bool,
}

pub fn convert_stake_to_amount(
    stake: Decimal,
    total_stake: Decimal,
    total_amount: u64,
    round_up: bool,
) -> FarmResult<u64> {
    if stake.is_zero() {
        return Ok(0);
    }

    let amount = if total_stake.is_zero() {
        Decimal::from(total_amount)
    } else {
        Decimal::full_mul_div(stake, total_amount, total_stake)?
    };

    if round_up {
        amount.try_ceil()
    } else {
        amount.try_floor()
    }
}

pub fn convert_amount_to_stake(
    amount: u64,
    total_stake: Decimal,
    total_amount: u64,
) -> FarmResult<Decimal> {
    if amount == 0 {
        return Ok(Decimal::zero());
    }
    if total_stake.is_zero() || total_amount == 0 {
        if !total_stake.is_zero() {
            tracing::error!(%total_stake, "total amount is zero but total stake is not");
            return Err(FarmError::ConversionFailure);
        }
        return Ok(Decimal::from(amount));
    }
    total_stake.try_mul_int(amount)?.try_div_int(total_amount)
}

fn checked_sub(a: u64, b: u64) -> FarmResult<u64> {
    a.checked_sub(b).ok_or(FarmError::IntegerOverflow)
}

fn checked_add(a: u64, b: u64) -> FarmResult<u64> {
    a.checked_add(b).ok_or(FarmError::IntegerOverflow)
}

pub fn add_pending_deposit_stake(
    user: &mut UserState,
    farm: &mut FarmState,
    deposited_amount: u64,
) -> FarmResult<Decimal> {
    let gained = convert_amount_to_stake(
        deposited_amount,
        farm.total_pending_stake(),
        farm.total_pending_amount,
    )?;

    user.set_pending_deposit_stake(user.pending_deposit_stake().try_add(gained)?)?;
    farm.total_pending_amount = checked_add(farm.total_pending_amount, deposited_amount)?;
    farm.set_total_pending_stake(farm.total_pending_stake().try_add(gained)?)?;

    Ok(gained)
}

pub fn remove_pending_deposit_stake(user: &mut UserState, farm: &mut FarmState) -> FarmResult<u64> {
    let removed = convert_stake_to_amount(
        user.pending_deposit_stake(),
        farm.total_pending_stake(),
        farm.total_pending_amount,
        false,
    )?;

    farm.total_pending_amount = checked_sub(farm.total_pending_amount, removed)?;
    farm.set_total_pending_stake(
        farm.total_pending_stake()
            .try_sub(user.pending_deposit_stake())?,
    )?;
    user.set_pending_deposit_stake(Decimal::zero())?;

    Ok(removed)
}

pub fn add_active_stake(
    user: &mut UserState,
    farm: &mut FarmState,
    staked_amount: u64,
) -> FarmResult<Decimal> {
    let gained = convert_amount_to_stake(
        staked_amount,
        farm.total_active_stake(),
        farm.total_staked_amount,
    )?;

    user.set_active_stake(user.active_stake().try_add(gained)?)?;
    farm.total_staked_amount = checked_add(farm.total_staked_amount, staked_amount)?;
    farm.set_total_active_stake(farm.total_active_stake().try_add(gained)?)?;

    Ok(gained)
}

/// Moves the user's whole pending deposit into the active pool.
pub fn activate_pending_stake(
    user: &mut UserState,
    farm: &mut FarmState,
) -> FarmResult<(u64, Decimal)> {
    let amount = remove_pending_deposit_stake(user, farm)?;
    let gained = add_active_stake(user, farm, amount)?;
    Ok((amount, gained))
}

pub fn remove_active_stake(
    user: &mut UserState,
    farm: &mut FarmState,
    unstaked_shares: Decimal,
) -> FarmResult<u64> {
    if unstaked_shares > user.active_stake() {
        tracing::error!(
            active = %user.active_stake(),
            requested = %unstaked_shares,
            "not enough active stake"
        );
        return Err(FarmError::NothingToUnstake);
    }

    let amount = convert_stake_to_amount(
        unstaked_shares,
        farm.total_active_stake(),
        farm.total_staked_amount,
        false,
    )?;

    user.set_active_stake(user.active_stake().try_sub(unstaked_shares)?)?;
    farm.total_staked_amount = checked_sub(farm.total_staked_amount, amount)?;
    farm.set_total_active_stake(farm.total_active_stake().try_sub(unstaked_shares)?)?;

    Ok(amount)
}

pub fn add_pending_withdrawal_stake(
    user: &mut UserState,
    farm: &mut FarmState,
    unstaked_amount: u64,
) -> FarmResult<Decimal> {
    let gained = convert_amount_to_stake(
        unstaked_amount,
        farm.total_pending_stake(),
        farm.total_pending_amount,
    )?;

    user.set_pending_withdrawal_unstake(user.pending_withdrawal_unstake().try_add(gained)?)?;
    farm.total_pending_amount = checked_add(farm.total_pending_amount, unstaked_amount)?;
    farm.set_total_pending_stake(farm.total_pending_stake().try_add(gained)?)?;

    Ok(gained)
}

/// Removes `shares` of active stake and queues the proceeds for withdrawal,
/// charging the early-withdrawal penalty of locked farms.
pub fn unstake(
    user: &mut UserState,
    farm: &mut FarmState,
    shares: Decimal,
    ts: u64,
) -> FarmResult<UnstakeEffects> {
    let amount = remove_active_stake(user, farm, shares)?;

    let (amount_unstaked, penalty) = match farm.locking_mode {
        LockingMode::None => (amount, 0),
        LockingMode::WithExpiry => apply_early_withdrawal_penalty(
            farm.locking_duration,
            farm.locking_start_timestamp,
            ts,
            farm.locking_early_withdrawal_penalty_bps,
            amount,
        )?,
        LockingMode::Continuous => apply_early_withdrawal_penalty(
            farm.locking_duration,
            user.last_stake_ts,
            ts,
            farm.locking_early_withdrawal_penalty_bps,
            amount,
        )?,
    };

    if farm.locking_mode != LockingMode::None {
        tracing::info!(
            amount,
            mode = ?farm.locking_mode,
            amount_unstaked,
            penalty,
            "unstake from locked farm"
        );
    }

    let pending_stake_gained = add_pending_withdrawal_stake(user, farm, amount_unstaked)?;

    Ok(UnstakeEffects {
        amount_unstaked,
        pending_stake_gained,
        penalty,
    })
}

pub fn remove_pending_withdrawal_stake(
    user: &mut UserState,
    farm: &mut FarmState,
) -> FarmResult<u64> {
    let removed = convert_stake_to_amount(
        user.pending_withdrawal_unstake(),
        farm.total_pending_stake(),
        farm.total_pending_amount,
        false,
    )?;

    farm.total_pending_amount = checked_sub(farm.total_pending_amount, removed)?;
    farm.set_total_pending_stake(
        farm.total_pending_stake()
            .try_sub(user.pending_withdrawal_unstake())?,
    )?;
    user.set_pending_withdrawal_unstake(Decimal::zero())?;

    Ok(removed)
}

/// Direct vault deposit: raises the value of every active share.
pub fn increase_total_amount(farm: &mut FarmState, amount: u64) -> FarmResult<()> {
    farm.total_staked_amount = checked_add(farm.total_staked_amount, amount)?;
    Ok(())
}

/// Withdraws from the vault proportionally across the active and pending
/// pools. Draining the vault entirely freezes the farm.
pub fn withdraw_farm(farm: &mut FarmState, req_amount: u64) -> FarmResult<VaultWithdrawEffects> {
    let vault_amount = checked_add(farm.total_staked_amount, farm.total_pending_amount)?;

    if req_amount >= vault_amount {
        farm.total_staked_amount = 0;
        farm.total_pending_amount = 0;
        tracing::info!(vault_amount, "withdraw all farm vault, farm left frozen");
        return Ok(VaultWithdrawEffects {
            amount_to_withdraw: vault_amount,
            farm_to_freeze: true,
        });
    }

    let removed_active = u64_mul_div(farm.total_staked_amount, req_amount, vault_amount)?;
    let removed_pending = u64_mul_div(farm.total_pending_amount, req_amount, vault_amount)?;

    farm.total_staked_amount -= removed_active;
    farm.total_pending_amount -= removed_pending;

    let amount_to_withdraw = removed_active + removed_pending;
    tracing::info!(
        removed_active,
        removed_pending,
        amount_to_withdraw,
        requested = req_amount,
        "withdraw farm vault"
    );

    Ok(VaultWithdrawEffects {
        amount_to_withdraw,
        farm_to_freeze: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farm() -> FarmState {
        FarmState::default()
    }

    #[test]
    fn first_deposit_mints_one_share_per_token() {
        let mut f = farm();
        let mut u = UserState::default();
        let gained = add_active_stake(&mut u, &mut f, 100).unwrap();
        assert_eq!(gained, Decimal::from(100));
        assert_eq!(f.total_staked_amount, 100);
        assert_eq!(f.total_active_stake(), Decimal::from(100));
        assert_eq!(u.active_stake(), Decimal::from(100));
    }

    #[test]
    fn vault_deposit_reprices_shares() {
        let mut f = farm();
        let mut alice = UserState::default();
        let mut bob = UserState::default();
        add_active_stake(&mut alice, &mut f, 100).unwrap();
        increase_total_amount(&mut f, 100).unwrap();

        // Each share is now worth 2 tokens.
        let gained = add_active_stake(&mut bob, &mut f, 100).unwrap();
        assert_eq!(gained, Decimal::from(50));

        let alice_amount = remove_active_stake(&mut alice, &mut f, Decimal::from(100)).unwrap();
        assert_eq!(alice_amount, 200);
        assert_eq!(f.total_staked_amount, 100);
    }

    #[test]
    fn pending_deposit_activates_in_full() {
        let mut f = farm();
        let mut u = UserState::default();
        add_pending_deposit_stake(&mut u, &mut f, 40).unwrap();
        assert_eq!(f.total_pending_amount, 40);
        assert_eq!(u.pending_deposit_stake(), Decimal::from(40));

        let (amount, gained) = activate_pending_stake(&mut u, &mut f).unwrap();
        assert_eq!(amount, 40);
        assert_eq!(gained, Decimal::from(40));
        assert_eq!(f.total_pending_amount, 0);
        assert!(f.total_pending_stake().is_zero());
        assert!(u.pending_deposit_stake().is_zero());
        assert_eq!(f.total_staked_amount, 40);
    }

    #[test]
    fn cannot_remove_more_than_owned() {
        let mut f = farm();
        let mut u = UserState::default();
        add_active_stake(&mut u, &mut f, 10).unwrap();
        assert_eq!(
            remove_active_stake(&mut u, &mut f, Decimal::from(11)),
            Err(FarmError::NothingToUnstake)
        );
    }

    #[test]
    fn unstake_with_expiry_lock_charges_penalty() {
        let mut f = FarmState {
            locking_mode: LockingMode::WithExpiry,
            locking_start_timestamp: 0,
            locking_duration: 100,
            locking_early_withdrawal_penalty_bps: 1_000,
            ..farm()
        };
        let mut u = UserState::default();
        add_active_stake(&mut u, &mut f, 1_000).unwrap();

        let fx = unstake(&mut u, &mut f, Decimal::from(1_000), 50).unwrap();
        // 1000 bps halfway through -> 500 bps -> 50 tokens.
        assert_eq!(fx.penalty, 50);
        assert_eq!(fx.amount_unstaked, 950);
        assert_eq!(f.total_pending_amount, 950);
        assert_eq!(remove_pending_withdrawal_stake(&mut u, &mut f).unwrap(), 950);
        assert_eq!(f.total_pending_amount, 0);
    }

    #[test]
    fn continuous_lock_runs_from_last_stake() {
        let mut f = FarmState {
            locking_mode: LockingMode::Continuous,
            locking_duration: 100,
            locking_early_withdrawal_penalty_bps: 10_000,
            ..farm()
        };
        let mut u = UserState {
            last_stake_ts: 500,
            ..Default::default()
        };
        add_active_stake(&mut u, &mut f, 10).unwrap();
        assert_eq!(
            unstake(&mut u, &mut f, Decimal::from(10), 550),
            Err(FarmError::EarlyWithdrawalNotAllowed)
        );
        let fx = unstake(&mut u, &mut f, Decimal::from(10), 600).unwrap();
        assert_eq!(fx.penalty, 0);
        assert_eq!(fx.amount_unstaked, 10);
    }

    #[test]
    fn partial_vault_withdraw_is_proportional() {
        let mut f = FarmState {
            total_staked_amount: 300,
            total_pending_amount: 100,
            ..farm()
        };
        let fx = withdraw_farm(&mut f, 200).unwrap();
        assert!(!fx.farm_to_freeze);
        assert_eq!(fx.amount_to_withdraw, 200);
        assert_eq!(f.total_staked_amount, 150);
        assert_eq!(f.total_pending_amount, 50);
    }

    #[test]
    fn full_vault_withdraw_freezes() {
        let mut f = FarmState {
            total_staked_amount: 300,
            total_pending_amount: 100,
            ..farm()
        };
        let fx = withdraw_farm(&mut f, 1_000).unwrap();
        assert!(fx.farm_to_freeze);
        assert_eq!(fx.amount_to_withdraw, 400);
        assert_eq!(f.total_staked_amount, 0);
    }

    #[test]
    fn conversion_rejects_orphaned_shares() {
        assert_eq!(
            convert_amount_to_stake(10, Decimal::from(5), 0),
            Err(FarmError::ConversionFailure)
        );
    }
}
