//! WAD fixed-point decimal used for stake shares and reward-per-share.
//!
//! Values are stored scaled by `10^18` in a `U256` so that intermediate
//! products never overflow. Persisted state keeps the scaled value as `u128`.

use crate::error::{FarmError, FarmResult};
use alloy_primitives::U256;
use std::fmt;

/// Scale factor: `1.0 == WAD`.
pub const WAD: u64 = 1_000_000_000_000_000_000;

const WAD_DECIMALS: usize = 18;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(U256);

#[inline]
fn wad() -> U256 {
    U256::from(WAD)
}

impl Decimal {
    pub const fn zero() -> Self {
        Self(U256::ZERO)
    }

    pub fn one() -> Self {
        Self(wad())
    }

    pub fn from_scaled_val(scaled: u128) -> Self {
        Self(U256::from(scaled))
    }

    pub fn to_scaled_val(&self) -> FarmResult<u128> {
        u128::try_from(self.0).map_err(|_| FarmError::MathOverflow)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn try_add(self, rhs: Self) -> FarmResult<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Self)
            .ok_or(FarmError::MathOverflow)
    }

    pub fn try_sub(self, rhs: Self) -> FarmResult<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Self)
            .ok_or(FarmError::MathOverflow)
    }

    /// `self * rhs`, rounded down.
    pub fn try_mul(self, rhs: Self) -> FarmResult<Self> {
        self.0
            .checked_mul(rhs.0)
            .map(|v| Self(v / wad()))
            .ok_or(FarmError::MathOverflow)
    }

    /// Multiply by a plain integer (not scaled).
    pub fn try_mul_int(self, rhs: impl Into<u128>) -> FarmResult<Self> {
        let rhs: u128 = rhs.into();
        self.0
            .checked_mul(U256::from(rhs))
            .map(Self)
            .ok_or(FarmError::MathOverflow)
    }

    /// `self / rhs`, rounded down.
    pub fn try_div(self, rhs: Self) -> FarmResult<Self> {
        if rhs.is_zero() {
            return Err(FarmError::MathOverflow);
        }
        self.0
            .checked_mul(wad())
            .map(|v| Self(v / rhs.0))
            .ok_or(FarmError::MathOverflow)
    }

    /// Divide by a plain integer (not scaled).
    pub fn try_div_int(self, rhs: impl Into<u128>) -> FarmResult<Self> {
        let rhs: u128 = rhs.into();
        self.0
            .checked_div(U256::from(rhs))
            .map(Self)
            .ok_or(FarmError::MathOverflow)
    }

    pub fn try_floor(&self) -> FarmResult<u64> {
        u64::try_from(self.0 / wad()).map_err(|_| FarmError::MathOverflow)
    }

    pub fn try_ceil(&self) -> FarmResult<u64> {
        let rounded = self
            .0
            .checked_add(wad() - U256::from(1u64))
            .ok_or(FarmError::MathOverflow)?;
        u64::try_from(rounded / wad()).map_err(|_| FarmError::MathOverflow)
    }

    /// `a * b / c` computed on the scaled representation without intermediate rounding.
    pub fn full_mul_div(a: Self, b: u64, c: Self) -> FarmResult<Self> {
        if c.is_zero() {
            return Err(FarmError::MathOverflow);
        }
        a.0.checked_mul(wad())
            .and_then(|v| v.checked_mul(U256::from(b)))
            .map(|v| Self(v / c.0))
            .ok_or(FarmError::MathOverflow)
    }
}

impl From<u64> for Decimal {
    fn from(v: u64) -> Self {
        // u64 * 10^18 always fits in 256 bits.
        Self(U256::from(v) * wad())
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / wad();
        let frac = self.0 % wad();
        write!(f, "{int}.{frac:0>width$}", frac = frac.to_string(), width = WAD_DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_roundtrip() {
        let d = Decimal::from(42);
        assert_eq!(d.try_floor().unwrap(), 42);
        assert_eq!(d.try_ceil().unwrap(), 42);
        assert_eq!(d.to_scaled_val().unwrap(), 42 * WAD as u128);
    }

    #[test]
    fn floor_and_ceil_of_fraction() {
        let half = Decimal::one().try_div_int(2u64).unwrap();
        let d = Decimal::from(3).try_add(half).unwrap();
        assert_eq!(d.try_floor().unwrap(), 3);
        assert_eq!(d.try_ceil().unwrap(), 4);
        assert_eq!(d.to_string(), "3.500000000000000000");
    }

    #[test]
    fn mul_div_match_fixed_point_semantics() {
        let a = Decimal::from(6);
        let b = Decimal::from(4);
        assert_eq!(a.try_mul(b).unwrap(), Decimal::from(24));
        assert_eq!(a.try_div(b).unwrap().to_string(), "1.500000000000000000");
        assert_eq!(a.try_mul_int(3u64).unwrap(), Decimal::from(18));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            Decimal::one().try_div(Decimal::zero()),
            Err(FarmError::MathOverflow)
        );
        assert_eq!(
            Decimal::one().try_div_int(0u64),
            Err(FarmError::MathOverflow)
        );
    }

    #[test]
    fn sub_underflow_is_an_error() {
        assert_eq!(
            Decimal::zero().try_sub(Decimal::one()),
            Err(FarmError::MathOverflow)
        );
    }

    #[test]
    fn full_mul_div_keeps_precision() {
        // 1/3 of 10 tokens over a stake of 3.
        let stake = Decimal::from(1);
        let total_stake = Decimal::from(3);
        let amount = Decimal::full_mul_div(stake, 10, total_stake).unwrap();
        assert_eq!(amount.try_floor().unwrap(), 3);
        assert_eq!(amount.try_ceil().unwrap(), 4);
    }

    #[test]
    fn oversized_value_does_not_fit_scaled_u128() {
        let huge = Decimal::from(u64::MAX).try_mul_int(u64::MAX).unwrap();
        assert_eq!(huge.to_scaled_val(), Err(FarmError::MathOverflow));
    }
}
