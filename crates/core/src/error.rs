//! Program error taxonomy shared by the ledger and every client.
//!
//! Each variant has a stable numeric code (`6000 + ordinal`) so errors can
//! cross the RPC boundary and be decoded back into the same variant.

use thiserror::Error;

/// First code assigned to a program error.
pub const ERROR_CODE_OFFSET: u32 = 6000;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum FarmError {
    #[error("Cannot stake 0 amount")]
    StakeZero,
    #[error("Cannot unstake 0 amount")]
    UnstakeZero,
    #[error("Nothing to unstake")]
    NothingToUnstake,
    #[error("No reward to harvest")]
    NoRewardToHarvest,
    #[error("Reward not present in reward list")]
    NoRewardInList,
    #[error("Reward already initialized")]
    RewardAlreadyInitialized,
    #[error("Max number of reward tokens reached")]
    MaxRewardNumberReached,
    #[error("Reward does not exist")]
    RewardDoesNotExist,
    #[error("Reward vault pubkey does not match staking pool vault")]
    RewardVaultMismatch,
    #[error("Nothing staked, cannot collect any rewards")]
    NothingStaked,
    #[error("Integer overflow")]
    IntegerOverflow,
    #[error("Conversion failure")]
    ConversionFailure,
    #[error("Unexpected account in instruction")]
    UnexpectedAccount,
    #[error("Operation forbidden")]
    OperationForbidden,
    #[error("Mathematical operation with overflow")]
    MathOverflow,
    #[error("Minimum claim duration has not been reached")]
    MinClaimDurationNotReached,
    #[error("User ata and reward vault have different mints")]
    UserAtaRewardVaultMintMissmatch,
    #[error("User ata and farm token have different mints")]
    UserAtaFarmTokenMintMissmatch,
    #[error("Reward ata mint is different than reward mint")]
    RewardAtaRewardMintMissmatch,
    #[error("Reward ata owner is different than payer")]
    RewardAtaOwnerNotPayer,
    #[error("Mode to update global_config is invalid")]
    InvalidGlobalConfigMode,
    #[error("Reward Index is higher than number of rewards")]
    RewardIndexOutOfRange,
    #[error("No tokens available to withdraw")]
    NothingToWithdraw,
    #[error("user, user_ref, authority and payer must match for non-delegated farm")]
    UserDelegatedFarmNonDelegatedMissmatch,
    #[error("Authority must match farm delegate authority")]
    AuthorityFarmDelegateMissmatch,
    #[error("Farm not delegated, can not set stake")]
    FarmNotDelegated,
    #[error("Operation not allowed for delegated farm")]
    FarmDelegated,
    #[error("Unstake lockup period is not elapsed. Deposit is locked until end of unstake period")]
    UnstakeNotElapsed,
    #[error("Pending withdrawal already exist and not withdrawn yet")]
    PendingWithdrawalNotWithdrawnYet,
    #[error("Cannot deposit zero amount directly to farm vault")]
    DepositZero,
    #[error("Invalid config value")]
    InvalidConfigValue,
    #[error("Invalid penalty percentage")]
    InvalidPenaltyPercentage,
    #[error("Early withdrawal not allowed")]
    EarlyWithdrawalNotAllowed,
    #[error("Invalid locking timestamps")]
    InvalidLockingTimestamps,
    #[error("Invalid reward rate curve point")]
    InvalidRpsCurvePoint,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Deposit cap reached")]
    DepositCapReached,
    #[error("Missing Scope Prices")]
    MissingScopePrices,
    #[error("Scope Oracle Price Too Old")]
    ScopeOraclePriceTooOld,
    #[error("Invalid Oracle Config")]
    InvalidOracleConfig,
    #[error("Reward ata owner is different than farm admin")]
    RewardAtaOwnerNotAdmin,
    #[error("Cannot withdraw reward as available amount is zero")]
    WithdrawRewardZeroAvailable,
    #[error("Cannot withdraw reward as reward schedule is set")]
    RewardScheduleCurveSet,
    #[error("Invalid authority for updating farm config")]
    InvalidFarmConfigUpdateAuthority,
    #[error("Invalid user state for transfer ownership, owner must match delegatee")]
    InvalidTransferOwnershipUserStateOwnerDelegatee,
    #[error("Invalid farm state locking mode for transfer ownership, must be 0")]
    InvalidTransferOwnershipFarmStateLockingMode,
    #[error("Invalid farm state withdrawal cooldown period for transfer ownership, must be 0")]
    InvalidTransferOwnershipFarmStateWithdrawCooldownPeriod,
    #[error("Invalid transfer ownership stake amount, must be equal to unstaked deposits")]
    InvalidTransferOwnershipStakeAmount,
    #[error("Invalid new owner for transfer ownership user state")]
    InvalidTransferOwnershipNewOwner,
    #[error("Invalid farm state for transfer ownership new user state")]
    InvalidTransferOwnershipFarmState,
    #[error("Reward user once feature is disabled for this farm")]
    RewardUserOnceFeatureDisabled,
    #[error("Current reward issued unclaimed does not match the expected value")]
    CurrentRewardIssuedUnclaimedMismatch,
    #[error("Missing required signature")]
    MissingSigner,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account already in use")]
    AccountAlreadyInUse,
    #[error("Account has the wrong type")]
    WrongAccountType,
    #[error("Insufficient token balance")]
    InsufficientFunds,
    #[error("A has one constraint was violated")]
    ConstraintHasOne,
    #[error("Farm is frozen")]
    FarmFrozen,
}

impl FarmError {
    /// Every variant in ordinal order; `ALL[i].code() == ERROR_CODE_OFFSET + i`.
    pub const ALL: &'static [FarmError] = &[
        FarmError::StakeZero,
        FarmError::UnstakeZero,
        FarmError::NothingToUnstake,
        FarmError::NoRewardToHarvest,
        FarmError::NoRewardInList,
        FarmError::RewardAlreadyInitialized,
        FarmError::MaxRewardNumberReached,
        FarmError::RewardDoesNotExist,
        FarmError::RewardVaultMismatch,
        FarmError::NothingStaked,
        FarmError::IntegerOverflow,
        FarmError::ConversionFailure,
        FarmError::UnexpectedAccount,
        FarmError::OperationForbidden,
        FarmError::MathOverflow,
        FarmError::MinClaimDurationNotReached,
        FarmError::UserAtaRewardVaultMintMissmatch,
        FarmError::UserAtaFarmTokenMintMissmatch,
        FarmError::RewardAtaRewardMintMissmatch,
        FarmError::RewardAtaOwnerNotPayer,
        FarmError::InvalidGlobalConfigMode,
        FarmError::RewardIndexOutOfRange,
        FarmError::NothingToWithdraw,
        FarmError::UserDelegatedFarmNonDelegatedMissmatch,
        FarmError::AuthorityFarmDelegateMissmatch,
        FarmError::FarmNotDelegated,
        FarmError::FarmDelegated,
        FarmError::UnstakeNotElapsed,
        FarmError::PendingWithdrawalNotWithdrawnYet,
        FarmError::DepositZero,
        FarmError::InvalidConfigValue,
        FarmError::InvalidPenaltyPercentage,
        FarmError::EarlyWithdrawalNotAllowed,
        FarmError::InvalidLockingTimestamps,
        FarmError::InvalidRpsCurvePoint,
        FarmError::InvalidTimestamp,
        FarmError::DepositCapReached,
        FarmError::MissingScopePrices,
        FarmError::ScopeOraclePriceTooOld,
        FarmError::InvalidOracleConfig,
        FarmError::RewardAtaOwnerNotAdmin,
        FarmError::WithdrawRewardZeroAvailable,
        FarmError::RewardScheduleCurveSet,
        FarmError::InvalidFarmConfigUpdateAuthority,
        FarmError::InvalidTransferOwnershipUserStateOwnerDelegatee,
        FarmError::InvalidTransferOwnershipFarmStateLockingMode,
        FarmError::InvalidTransferOwnershipFarmStateWithdrawCooldownPeriod,
        FarmError::InvalidTransferOwnershipStakeAmount,
        FarmError::InvalidTransferOwnershipNewOwner,
        FarmError::InvalidTransferOwnershipFarmState,
        FarmError::RewardUserOnceFeatureDisabled,
        FarmError::CurrentRewardIssuedUnclaimedMismatch,
        FarmError::MissingSigner,
        FarmError::AccountNotFound,
        FarmError::AccountAlreadyInUse,
        FarmError::WrongAccountType,
        FarmError::InsufficientFunds,
        FarmError::ConstraintHasOne,
        FarmError::FarmFrozen,
    ];

    /// Stable numeric code, as reported over RPC.
    pub fn code(self) -> u32 {
        ERROR_CODE_OFFSET + self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let idx = code.checked_sub(ERROR_CODE_OFFSET)?;
        Self::ALL.get(idx as usize).copied()
    }
}

pub type FarmResult<T> = Result<T, FarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_declaration_order() {
        for (i, err) in FarmError::ALL.iter().enumerate() {
            assert_eq!(err.code(), ERROR_CODE_OFFSET + i as u32, "{err:?}");
        }
    }

    #[test]
    fn code_roundtrips_through_lookup() {
        assert_eq!(FarmError::from_code(6000), Some(FarmError::StakeZero));
        assert_eq!(
            FarmError::from_code(FarmError::FarmFrozen.code()),
            Some(FarmError::FarmFrozen)
        );
        assert_eq!(FarmError::from_code(5999), None);
        assert_eq!(FarmError::from_code(9999), None);
    }
}
