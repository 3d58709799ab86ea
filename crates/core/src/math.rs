//! Integer helpers with overflow-checked intermediates.

use crate::error::{FarmError, FarmResult};

const POWERS_OF_TEN: [u64; 20] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
];

/// `10^x` for `x` in `0..=19`.
pub fn ten_pow(x: usize) -> FarmResult<u64> {
    POWERS_OF_TEN
        .get(x)
        .copied()
        .ok_or(FarmError::MathOverflow)
}

/// `a * b / c` with a 128-bit intermediate, rounded down.
pub fn u64_mul_div(a: u64, b: u64, c: u64) -> FarmResult<u64> {
    if c == 0 {
        return Err(FarmError::MathOverflow);
    }
    let result = u128::from(a) * u128::from(b) / u128::from(c);
    u64::try_from(result).map_err(|_| FarmError::MathOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_pow_bounds() {
        assert_eq!(ten_pow(0).unwrap(), 1);
        assert_eq!(ten_pow(6).unwrap(), 1_000_000);
        assert_eq!(ten_pow(19).unwrap(), 10_000_000_000_000_000_000);
        assert_eq!(ten_pow(20), Err(FarmError::MathOverflow));
    }

    #[test]
    fn mul_div_uses_wide_intermediate() {
        assert_eq!(u64_mul_div(u64::MAX, 10, 20).unwrap(), u64::MAX / 2);
        assert_eq!(u64_mul_div(1_000, 2_500, 10_000).unwrap(), 250);
        assert_eq!(u64_mul_div(1, 1, 0), Err(FarmError::MathOverflow));
        assert_eq!(u64_mul_div(u64::MAX, 2, 1), Err(FarmError::MathOverflow));
    }
}
