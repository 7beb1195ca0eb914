//! Deterministic integer math shared by the rebase and reward engines

use crate::error::{HalomError, Result};
use crate::types::{BasisPoints, BPS_DENOMINATOR};

/// `floor(a * b / denominator)` without intermediate overflow where the
/// result itself fits in `u128`
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128> {
    if denominator == 0 {
        return Err(HalomError::Overflow("mul_div: zero denominator"));
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / denominator);
    }

    // a = q*d + r  =>  a*b/d = q*b + r*b/d
    let q = a / denominator;
    let r = a % denominator;
    let high = q
        .checked_mul(b)
        .ok_or(HalomError::Overflow("mul_div"))?;
    let low = match r.checked_mul(b) {
        Some(product) => product / denominator,
        None => {
            // r < d, split b the same way
            let bq = b / denominator;
            let br = b % denominator;
            let part = bq.checked_mul(r).ok_or(HalomError::Overflow("mul_div"))?;
            let rest = br
                .checked_mul(r)
                .ok_or(HalomError::Overflow("mul_div"))?
                / denominator;
            part.checked_add(rest).ok_or(HalomError::Overflow("mul_div"))?
        }
    };
    high.checked_add(low).ok_or(HalomError::Overflow("mul_div"))
}

/// `floor(amount * bps / 10_000)`
pub fn apply_bps(amount: u128, bps: BasisPoints) -> Result<u128> {
    mul_div(amount, bps as u128, BPS_DENOMINATOR)
}

/// Signed `floor(|a| * b / d)` carrying the sign of `a`
pub fn mul_div_signed(a: i128, b: u128, denominator: u128) -> Result<i128> {
    let magnitude = mul_div(a.unsigned_abs(), b, denominator)?;
    let magnitude = i128::try_from(magnitude).map_err(|_| HalomError::Overflow("mul_div_signed"))?;
    Ok(if a < 0 { -magnitude } else { magnitude })
}

/// Floor integer square root by binary search
pub fn isqrt(x: u128) -> u128 {
    // sqrt(u128::MAX) < 2^64
    let mut lo: u64 = 0;
    let mut hi: u64 = u64::MAX;
    while lo < hi {
        let diff = hi - lo;
        let mid = lo + (diff / 2) + (diff % 2);
        if (mid as u128) * (mid as u128) <= x {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo as u128
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mul_div_small() {
        assert_eq!(mul_div(10, 20, 3).unwrap(), 66);
        assert_eq!(apply_bps(1_000, 1_000).unwrap(), 100);
        assert!(mul_div(1, 1, 0).is_err());
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 2^100 * 2^60 / 2^80 = 2^80
        let a = 1u128 << 100;
        let b = 1u128 << 60;
        assert_eq!(mul_div(a, b, 1u128 << 80).unwrap(), 1u128 << 80);
    }

    #[test]
    fn test_mul_div_result_overflow() {
        assert!(mul_div(u128::MAX, u128::MAX, 1).is_err());
    }

    #[test]
    fn test_mul_div_signed() {
        assert_eq!(mul_div_signed(-100, 3, 10).unwrap(), -30);
        assert_eq!(mul_div_signed(100, 3, 10).unwrap(), 30);
    }

    #[test]
    fn test_isqrt_edges() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u128::MAX), u64::MAX as u128);
    }

    proptest! {
        #[test]
        fn isqrt_is_floor(x in any::<u128>()) {
            let r = isqrt(x);
            prop_assert!(r * r <= x);
            if let Some(next) = (r + 1).checked_mul(r + 1) {
                prop_assert!(next > x);
            }
        }

        #[test]
        fn mul_div_matches_narrow_math(a in any::<u64>(), b in any::<u64>(), d in 1u64..) {
            let expected = (a as u128) * (b as u128) / (d as u128);
            prop_assert_eq!(mul_div(a as u128, b as u128, d as u128).unwrap(), expected);
        }
    }
}
