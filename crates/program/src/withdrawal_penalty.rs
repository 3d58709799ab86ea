//! Early-withdrawal penalty for locked farms.
//!
//! The penalty decays linearly from `penalty_bps` at the start of the lock to
//! zero at maturity.

use kfarms_core::consts::BPS_DIV_FACTOR;
use kfarms_core::math::u64_mul_div;
use kfarms_core::{FarmError, FarmResult};

/// Penalty in bps owed when withdrawing at `now` from a lock spanning
/// `[beginning, maturity)`.
pub fn early_withdrawal_penalty_bps(
    beginning: u64,
    now: u64,
    maturity: u64,
    penalty_bps: u64,
) -> FarmResult<u64> {
    if maturity < beginning {
        return Err(FarmError::InvalidLockingTimestamps);
    }

    // Withdrawing before a WithExpiry lock has even started.
    if now < beginning {
        tracing::debug!(now, beginning, "withdrawal before locking period start");
        return Ok(0);
    }

    if now >= maturity {
        tracing::debug!(now, maturity, "lock matured");
        return Ok(0);
    }

    if penalty_bps > BPS_DIV_FACTOR {
        return Err(FarmError::InvalidPenaltyPercentage);
    }

    // 0 and 100% both mean the lock is hard.
    if penalty_bps == 0 || penalty_bps == BPS_DIV_FACTOR {
        return Err(FarmError::EarlyWithdrawalNotAllowed);
    }

    let time_remaining = maturity - now;
    let total_duration = maturity - beginning;

    u64_mul_div(penalty_bps, time_remaining, total_duration)
}

/// Splits `unstake_amount` into `(amount_after_penalty, penalty_amount)`.
pub fn apply_early_withdrawal_penalty(
    locking_duration: u64,
    locking_start: u64,
    now: u64,
    penalty_bps: u64,
    unstake_amount: u64,
) -> FarmResult<(u64, u64)> {
    let maturity = locking_start
        .checked_add(locking_duration)
        .ok_or(FarmError::IntegerOverflow)?;

    let bps = early_withdrawal_penalty_bps(locking_start, now, maturity, penalty_bps)?;
    let penalty_amount = u64_mul_div(unstake_amount, bps, BPS_DIV_FACTOR)?;

    Ok((unstake_amount - penalty_amount, penalty_amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_decay() {
        assert_eq!(early_withdrawal_penalty_bps(0, 0, 100, 1_000).unwrap(), 1_000);
        assert_eq!(early_withdrawal_penalty_bps(0, 50, 100, 1_000).unwrap(), 500);
        assert_eq!(early_withdrawal_penalty_bps(0, 99, 100, 1_000).unwrap(), 10);
    }

    #[test]
    fn outside_lock_window_is_free() {
        assert_eq!(early_withdrawal_penalty_bps(10, 5, 100, 1_000).unwrap(), 0);
        assert_eq!(early_withdrawal_penalty_bps(10, 100, 100, 1_000).unwrap(), 0);
        // Hard locks still allow withdrawal once matured.
        assert_eq!(early_withdrawal_penalty_bps(10, 200, 100, 0).unwrap(), 0);
    }

    #[test]
    fn invalid_configurations() {
        assert_eq!(
            early_withdrawal_penalty_bps(100, 50, 10, 1_000),
            Err(FarmError::InvalidLockingTimestamps)
        );
        assert_eq!(
            early_withdrawal_penalty_bps(0, 50, 100, 10_001),
            Err(FarmError::InvalidPenaltyPercentage)
        );
        assert_eq!(
            early_withdrawal_penalty_bps(0, 50, 100, 0),
            Err(FarmError::EarlyWithdrawalNotAllowed)
        );
        assert_eq!(
            early_withdrawal_penalty_bps(0, 50, 100, 10_000),
            Err(FarmError::EarlyWithdrawalNotAllowed)
        );
    }

    #[test]
    fn penalty_split_sums_to_amount() {
        let (kept, penalty) = apply_early_withdrawal_penalty(100, 0, 50, 2_000, 1_000).unwrap();
        assert_eq!(penalty, 100);
        assert_eq!(kept, 900);
    }
}
