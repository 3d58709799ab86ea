//! Account layouts owned by the kfarms program.

use kfarms_core::consts::{MAX_REWARDS_TOKENS, REWARD_CURVE_POINTS};
use kfarms_core::math::ten_pow;
use kfarms_core::{Decimal, FarmError, FarmResult, Pubkey, TimeUnit};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Global config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub global_admin: Pubkey,
    pub pending_global_admin: Pubkey,
    pub treasury_fee_bps: u64,
    pub treasury_vaults_authority: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value")]
pub enum GlobalConfigUpdate {
    PendingGlobalAdmin(Pubkey),
    TreasuryFeeBps(u64),
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// A price as `value / 10^exp`, observed at `unix_timestamp`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedPrice {
    pub value: u64,
    pub exp: u64,
    pub unix_timestamp: u64,
}

impl DatedPrice {
    /// `amount * value / 10^exp`.
    pub fn apply(&self, amount: u128) -> FarmResult<u128> {
        let factor = u128::from(ten_pow(self.exp as usize)?);
        amount
            .checked_mul(u128::from(self.value))
            .map(|v| v / factor)
            .ok_or(FarmError::MathOverflow)
    }

    /// Fails when the price is older than `max_age` at `ts`.
    pub fn check_fresh(&self, ts: u64, max_age: u64) -> FarmResult<()> {
        if ts.saturating_sub(self.unix_timestamp) > max_age {
            tracing::warn!(ts, price_ts = self.unix_timestamp, max_age, "stale oracle price");
            return Err(FarmError::ScopeOraclePriceTooOld);
        }
        Ok(())
    }
}

/// Oracle price feed account, indexed by price id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePrices {
    pub prices: Vec<DatedPrice>,
}

// ---------------------------------------------------------------------------
// Reward schedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPerTimeUnitPoint {
    pub ts_start: u64,
    pub reward_per_time_unit: u64,
}

impl RewardPerTimeUnitPoint {
    pub fn new(ts_start: u64, reward_per_time_unit: u64) -> Self {
        Self {
            ts_start,
            reward_per_time_unit,
        }
    }
}

/// Piecewise-constant issuance rate. Each point holds from its `ts_start`
/// until the next point's `ts_start`; the last point holds forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardScheduleCurve {
    points: Vec<RewardPerTimeUnitPoint>,
}

impl Default for RewardScheduleCurve {
    fn default() -> Self {
        Self::from_constant(0)
    }
}

impl RewardScheduleCurve {
    pub fn from_constant(reward_per_time_unit: u64) -> Self {
        Self {
            points: vec![RewardPerTimeUnitPoint::new(0, reward_per_time_unit)],
        }
    }

    /// Builds a validated curve. Trailing `u64::MAX` points are padding and
    /// are dropped.
    pub fn from_points(points: &[RewardPerTimeUnitPoint]) -> FarmResult<Self> {
        let mut curve = Self {
            points: points.to_vec(),
        };
        curve.validate()?;
        let real = curve
            .points
            .iter()
            .take_while(|p| p.ts_start != u64::MAX)
            .count();
        curve.points.truncate(real);
        Ok(curve)
    }

    pub fn points(&self) -> &[RewardPerTimeUnitPoint] {
        &self.points
    }

    pub fn validate(&self) -> FarmResult<()> {
        let pts = &self.points;
        if pts.is_empty() {
            tracing::warn!("reward curve must have at least 1 point");
            return Err(FarmError::InvalidRpsCurvePoint);
        }
        if pts.len() > REWARD_CURVE_POINTS {
            tracing::warn!(points = pts.len(), "reward curve has too many points");
            return Err(FarmError::InvalidRpsCurvePoint);
        }
        if pts[0].ts_start == u64::MAX {
            tracing::warn!("reward curve cannot start at u64::MAX");
            return Err(FarmError::InvalidRpsCurvePoint);
        }
        // u64::MAX marks unused slots; they may repeat but only trail.
        let out_of_order = pts.windows(2).any(|w| {
            let (a, b) = (w[0].ts_start, w[1].ts_start);
            if a == u64::MAX {
                b != u64::MAX
            } else {
                b <= a
            }
        });
        if out_of_order {
            tracing::warn!("reward curve points must be strictly increasing with padding last");
            return Err(FarmError::InvalidRpsCurvePoint);
        }
        Ok(())
    }

    /// Index of the point in force at `ts`.
    fn point_index_at(&self, ts: u64) -> FarmResult<usize> {
        match self.points.iter().position(|p| p.ts_start > ts) {
            Some(0) => {
                tracing::warn!(ts, "reward curve starts after the requested timestamp");
                Err(FarmError::InvalidRpsCurvePoint)
            }
            Some(i) => Ok(i - 1),
            None => Ok(self.points.len() - 1),
        }
    }

    /// Rewards issued over `[last_issued_ts, current_ts)`.
    pub fn cumulative_amount_issued(&self, last_issued_ts: u64, current_ts: u64) -> FarmResult<u64> {
        if last_issued_ts > current_ts {
            return Err(FarmError::InvalidTimestamp);
        }

        let mut cumulative = 0u64;
        let start = self.point_index_at(last_issued_ts)?;

        for (i, point) in self.points.iter().enumerate().skip(start) {
            if point.ts_start >= current_ts {
                break;
            }
            let start_ts = point.ts_start.max(last_issued_ts);
            let end_ts = match self.points.get(i + 1) {
                Some(next) if next.ts_start < current_ts => next.ts_start,
                _ => current_ts,
            };
            let period = point
                .reward_per_time_unit
                .checked_mul(end_ts - start_ts)
                .ok_or(FarmError::IntegerOverflow)?;
            cumulative = cumulative
                .checked_add(period)
                .ok_or(FarmError::IntegerOverflow)?;
        }

        Ok(cumulative)
    }

    pub fn current_rps(&self, current_ts: u64) -> FarmResult<u64> {
        let idx = self.point_index_at(current_ts)?;
        Ok(self.points[idx].reward_per_time_unit)
    }
}

// ---------------------------------------------------------------------------
// Farm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewardType {
    /// Issuance is shared among all stakers.
    #[default]
    Proportional = 0,
    /// Issuance is per staked token.
    Constant = 1,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockingMode {
    #[default]
    None = 0,
    /// Lock runs from each user's last stake.
    Continuous = 1,
    /// Lock runs from a farm-wide start timestamp.
    WithExpiry = 2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub mint: Pubkey,
    pub decimals: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInfo {
    pub token: TokenInfo,
    pub rewards_vault: Pubkey,
    pub rewards_available: u64,
    pub reward_schedule_curve: RewardScheduleCurve,
    pub min_claim_duration_seconds: u64,
    pub last_issuance_ts: u64,
    pub rewards_issued_unclaimed: u64,
    pub rewards_issued_cumulative: u64,
    pub reward_per_share_scaled: u128,
    pub reward_type: RewardType,
    pub rewards_per_second_decimals: u8,
}

impl RewardInfo {
    pub fn reward_per_share(&self) -> Decimal {
        Decimal::from_scaled_val(self.reward_per_share_scaled)
    }

    pub fn set_reward_per_share(&mut self, value: Decimal) -> FarmResult<()> {
        self.reward_per_share_scaled = value.to_scaled_val()?;
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.rewards_vault != Pubkey::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmState {
    pub farm_admin: Pubkey,
    pub pending_farm_admin: Pubkey,
    pub global_config: Pubkey,

    pub token: TokenInfo,
    pub reward_infos: Vec<RewardInfo>,

    pub num_users: u64,
    pub total_staked_amount: u64,

    pub farm_vault: Pubkey,
    pub farm_vaults_authority: Pubkey,

    pub delegate_authority: Pubkey,
    pub second_delegated_authority: Pubkey,
    pub delegated_rps_admin: Pubkey,

    pub time_unit: TimeUnit,
    pub is_farm_frozen: bool,
    pub is_farm_delegated: bool,

    pub withdraw_authority: Pubkey,

    pub deposit_warmup_period: u32,
    pub withdrawal_cooldown_period: u32,

    pub total_active_stake_scaled: u128,
    pub total_pending_stake_scaled: u128,
    pub total_pending_amount: u64,

    pub slashed_amount_current: u64,
    pub slashed_amount_cumulative: u64,
    pub slashed_amount_spill_address: Pubkey,

    pub locking_mode: LockingMode,
    pub locking_start_timestamp: u64,
    pub locking_duration: u64,
    pub locking_early_withdrawal_penalty_bps: u64,

    pub deposit_cap_amount: u64,

    pub scope_prices: Pubkey,
    /// `u64::MAX` disables oracle pricing.
    pub scope_oracle_price_id: u64,
    pub scope_oracle_max_age: u64,

    pub strategy_id: Pubkey,
    pub is_reward_user_once_enabled: bool,
}

impl Default for FarmState {
    fn default() -> Self {
        Self {
            farm_admin: Pubkey::ZERO,
            pending_farm_admin: Pubkey::ZERO,
            global_config: Pubkey::ZERO,
            token: TokenInfo::default(),
            reward_infos: Vec::new(),
            num_users: 0,
            total_staked_amount: 0,
            farm_vault: Pubkey::ZERO,
            farm_vaults_authority: Pubkey::ZERO,
            delegate_authority: Pubkey::ZERO,
            second_delegated_authority: Pubkey::ZERO,
            delegated_rps_admin: Pubkey::ZERO,
            time_unit: TimeUnit::Seconds,
            is_farm_frozen: false,
            is_farm_delegated: false,
            withdraw_authority: Pubkey::ZERO,
            deposit_warmup_period: 0,
            withdrawal_cooldown_period: 0,
            total_active_stake_scaled: 0,
            total_pending_stake_scaled: 0,
            total_pending_amount: 0,
            slashed_amount_current: 0,
            slashed_amount_cumulative: 0,
            slashed_amount_spill_address: Pubkey::ZERO,
            locking_mode: LockingMode::None,
            locking_start_timestamp: 0,
            locking_duration: 0,
            locking_early_withdrawal_penalty_bps: 0,
            deposit_cap_amount: 0,
            scope_prices: Pubkey::ZERO,
            scope_oracle_price_id: u64::MAX,
            scope_oracle_max_age: u64::MAX,
            strategy_id: Pubkey::ZERO,
            is_reward_user_once_enabled: false,
        }
    }
}

impl FarmState {
    pub fn total_active_stake(&self) -> Decimal {
        Decimal::from_scaled_val(self.total_active_stake_scaled)
    }

    pub fn total_pending_stake(&self) -> Decimal {
        Decimal::from_scaled_val(self.total_pending_stake_scaled)
    }

    pub fn set_total_active_stake(&mut self, value: Decimal) -> FarmResult<()> {
        self.total_active_stake_scaled = value.to_scaled_val()?;
        Ok(())
    }

    pub fn set_total_pending_stake(&mut self, value: Decimal) -> FarmResult<()> {
        self.total_pending_stake_scaled = value.to_scaled_val()?;
        Ok(())
    }

    pub fn num_reward_tokens(&self) -> usize {
        self.reward_infos.len()
    }

    pub fn is_delegated(&self) -> bool {
        self.delegate_authority != Pubkey::ZERO
    }

    pub fn uses_oracle(&self) -> bool {
        self.scope_oracle_price_id != u64::MAX
    }

    /// Whether staking `amount` more keeps the farm under its deposit cap.
    pub fn can_accept_deposit(
        &self,
        amount: u64,
        scope_price: Option<DatedPrice>,
        ts: u64,
    ) -> FarmResult<bool> {
        let unadjusted_total = self
            .total_staked_amount
            .checked_add(amount)
            .ok_or(FarmError::IntegerOverflow)?;

        let final_amount = if self.uses_oracle() {
            let price = scope_price.ok_or(FarmError::MissingScopePrices)?;
            price.check_fresh(ts, self.scope_oracle_max_age)?;
            u64::try_from(price.apply(u128::from(unadjusted_total))?)
                .map_err(|_| FarmError::IntegerOverflow)?
        } else {
            unadjusted_total
        };

        Ok(self.deposit_cap_amount == 0 || final_amount <= self.deposit_cap_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum FarmConfigUpdate {
    UpdateRewardRps { reward_index: u64, value: u64 },
    UpdateRewardMinClaimDuration { reward_index: u64, value: u64 },
    RewardType { reward_index: u64, value: RewardType },
    RpsDecimals { reward_index: u64, value: u8 },
    UpdateRewardScheduleCurvePoints {
        reward_index: u64,
        points: Vec<RewardPerTimeUnitPoint>,
    },
    WithdrawAuthority { value: Pubkey },
    DepositWarmupPeriod { value: u32 },
    WithdrawCooldownPeriod { value: u32 },
    LockingMode { value: LockingMode },
    LockingStartTimestamp { value: u64 },
    LockingDuration { value: u64 },
    LockingEarlyWithdrawalPenaltyBps { value: u64 },
    DepositCapAmount { value: u64 },
    SlashedAmountSpillAddress { value: Pubkey },
    ScopePricesAccount { value: Pubkey },
    ScopeOraclePriceId { value: u64 },
    ScopeOracleMaxAge { value: u64 },
    UpdatePendingFarmAdmin { value: Pubkey },
    UpdateStrategyId { value: Pubkey },
    UpdateDelegatedRpsAdmin { value: Pubkey },
    RewardUserOnceEnabled { value: bool },
}

impl FarmConfigUpdate {
    /// The reward slot this update targets, for per-reward options.
    pub fn reward_index(&self) -> Option<u64> {
        match self {
            FarmConfigUpdate::UpdateRewardRps { reward_index, .. }
            | FarmConfigUpdate::UpdateRewardMinClaimDuration { reward_index, .. }
            | FarmConfigUpdate::RewardType { reward_index, .. }
            | FarmConfigUpdate::RpsDecimals { reward_index, .. }
            | FarmConfigUpdate::UpdateRewardScheduleCurvePoints { reward_index, .. } => {
                Some(*reward_index)
            }
            _ => None,
        }
    }

    /// Rate changes may also be signed by the farm's delegated rps admin.
    pub fn is_rate_update(&self) -> bool {
        matches!(
            self,
            FarmConfigUpdate::UpdateRewardRps { .. }
                | FarmConfigUpdate::UpdateRewardScheduleCurvePoints { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: u64,
    pub farm_state: Pubkey,
    pub owner: Pubkey,
    pub delegatee: Pubkey,
    pub is_farm_delegated: bool,

    pub rewards_tally_scaled: [u128; MAX_REWARDS_TOKENS],
    pub rewards_issued_unclaimed: [u64; MAX_REWARDS_TOKENS],
    pub last_claim_ts: [u64; MAX_REWARDS_TOKENS],

    pub active_stake_scaled: u128,

    pub pending_deposit_stake_scaled: u128,
    pub pending_deposit_stake_ts: u64,

    pub pending_withdrawal_unstake_scaled: u128,
    pub pending_withdrawal_unstake_ts: u64,

    pub last_stake_ts: u64,
}

impl UserState {
    pub fn active_stake(&self) -> Decimal {
        Decimal::from_scaled_val(self.active_stake_scaled)
    }

    pub fn pending_deposit_stake(&self) -> Decimal {
        Decimal::from_scaled_val(self.pending_deposit_stake_scaled)
    }

    pub fn pending_withdrawal_unstake(&self) -> Decimal {
        Decimal::from_scaled_val(self.pending_withdrawal_unstake_scaled)
    }

    pub fn rewards_tally(&self, index: usize) -> Decimal {
        Decimal::from_scaled_val(self.rewards_tally_scaled[index])
    }

    pub fn set_active_stake(&mut self, value: Decimal) -> FarmResult<()> {
        self.active_stake_scaled = value.to_scaled_val()?;
        Ok(())
    }

    pub fn set_pending_deposit_stake(&mut self, value: Decimal) -> FarmResult<()> {
        self.pending_deposit_stake_scaled = value.to_scaled_val()?;
        Ok(())
    }

    pub fn set_pending_withdrawal_unstake(&mut self, value: Decimal) -> FarmResult<()> {
        self.pending_withdrawal_unstake_scaled = value.to_scaled_val()?;
        Ok(())
    }

    pub fn set_rewards_tally(&mut self, index: usize, value: Decimal) -> FarmResult<()> {
        self.rewards_tally_scaled[index] = value.to_scaled_val()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(ts: u64, rps: u64) -> RewardPerTimeUnitPoint {
        RewardPerTimeUnitPoint::new(ts, rps)
    }

    #[test]
    fn constant_curve_integrates_linearly() {
        let curve = RewardScheduleCurve::from_constant(5);
        assert_eq!(curve.cumulative_amount_issued(100, 110).unwrap(), 50);
        assert_eq!(curve.cumulative_amount_issued(110, 110).unwrap(), 0);
        assert_eq!(curve.current_rps(1_000).unwrap(), 5);
    }

    #[test]
    fn piecewise_curve_spans_segments() {
        let curve =
            RewardScheduleCurve::from_points(&[pt(0, 1), pt(10, 2), pt(20, 0)]).unwrap();
        // [5,10) at 1 + [10,20) at 2 + [20,25) at 0
        assert_eq!(curve.cumulative_amount_issued(5, 25).unwrap(), 5 + 20);
        assert_eq!(curve.cumulative_amount_issued(12, 15).unwrap(), 6);
        assert_eq!(curve.current_rps(10).unwrap(), 2);
        assert_eq!(curve.current_rps(9).unwrap(), 1);
    }

    #[test]
    fn curve_starting_in_future_rejects_earlier_issuance() {
        let curve = RewardScheduleCurve::from_points(&[pt(100, 1)]).unwrap();
        assert_eq!(
            curve.cumulative_amount_issued(50, 150),
            Err(FarmError::InvalidRpsCurvePoint)
        );
    }

    #[test]
    fn backwards_interval_is_invalid() {
        let curve = RewardScheduleCurve::from_constant(1);
        assert_eq!(
            curve.cumulative_amount_issued(10, 5),
            Err(FarmError::InvalidTimestamp)
        );
    }

    #[test]
    fn curve_validation_rules() {
        assert!(RewardScheduleCurve::from_points(&[]).is_err());
        assert!(RewardScheduleCurve::from_points(&[pt(10, 1), pt(5, 1)]).is_err());
        assert!(RewardScheduleCurve::from_points(&[pt(10, 1), pt(10, 2)]).is_err());
        assert!(RewardScheduleCurve::from_points(&[pt(u64::MAX, 1)]).is_err());
        let too_many: Vec<_> = (0..=REWARD_CURVE_POINTS as u64).map(|i| pt(i, 1)).collect();
        assert!(RewardScheduleCurve::from_points(&too_many).is_err());
        let max: Vec<_> = (0..REWARD_CURVE_POINTS as u64).map(|i| pt(i, 1)).collect();
        assert!(RewardScheduleCurve::from_points(&max).is_ok());
    }

    #[test]
    fn trailing_max_points_are_padding() {
        let curve = RewardScheduleCurve::from_points(&[
            pt(0, 1),
            pt(10, 3),
            pt(u64::MAX, 0),
            pt(u64::MAX, 0),
        ])
        .unwrap();
        assert_eq!(curve.points(), &[pt(0, 1), pt(10, 3)]);
        // the last real point holds forever
        assert_eq!(curve.cumulative_amount_issued(5, 20).unwrap(), 5 + 30);
        assert_eq!(curve.current_rps(1_000_000).unwrap(), 3);
    }

    #[test]
    fn real_point_after_padding_is_rejected() {
        assert_eq!(
            RewardScheduleCurve::from_points(&[pt(0, 1), pt(u64::MAX, 0), pt(20, 2)]),
            Err(FarmError::InvalidRpsCurvePoint)
        );
        assert_eq!(
            RewardScheduleCurve::from_points(&[pt(u64::MAX, 0), pt(u64::MAX, 0)]),
            Err(FarmError::InvalidRpsCurvePoint)
        );
    }

    #[test]
    fn deposit_cap_without_oracle() {
        let farm = FarmState {
            total_staked_amount: 90,
            deposit_cap_amount: 100,
            ..Default::default()
        };
        assert!(farm.can_accept_deposit(10, None, 0).unwrap());
        assert!(!farm.can_accept_deposit(11, None, 0).unwrap());

        let uncapped = FarmState::default();
        assert!(uncapped.can_accept_deposit(u64::MAX, None, 0).unwrap());
    }

    #[test]
    fn deposit_cap_with_oracle_prices_the_total() {
        let farm = FarmState {
            total_staked_amount: 10,
            deposit_cap_amount: 100,
            scope_oracle_price_id: 0,
            scope_oracle_max_age: 60,
            ..Default::default()
        };
        // price 5.0
        let price = DatedPrice {
            value: 50,
            exp: 1,
            unix_timestamp: 1_000,
        };
        assert!(farm.can_accept_deposit(10, Some(price), 1_010).unwrap());
        assert!(!farm.can_accept_deposit(11, Some(price), 1_010).unwrap());
        assert_eq!(
            farm.can_accept_deposit(1, Some(price), 1_061),
            Err(FarmError::ScopeOraclePriceTooOld)
        );
        assert_eq!(
            farm.can_accept_deposit(1, None, 1_010),
            Err(FarmError::MissingScopePrices)
        );
    }
}
