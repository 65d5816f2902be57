//! Plaintext kernels run inside the executor.
//!
//! These stand in for the homomorphic circuits. They are written without
//! data-dependent branches so the executor's own control flow does not
//! depend on the values it is computing on.

use subtle::{Choice, ConditionallySelectable, ConstantTimeEq, ConstantTimeGreater, ConstantTimeLess};

fn from_choice(choice: Choice) -> u64 {
    u64::from(choice.unwrap_u8())
}

fn to_choice(flag: u64) -> Choice {
    Choice::from((flag & 1) as u8)
}

/// a + b, clamped to `max`.
pub(crate) fn add(a: u64, b: u64, max: u64) -> u64 {
    let (sum, overflow) = a.overflowing_add(b);
    let clamp = Choice::from(overflow as u8) | sum.ct_gt(&max);
    u64::conditional_select(&sum, &max, clamp)
}

/// a - b, saturating at zero.
pub(crate) fn sub(a: u64, b: u64) -> u64 {
    let underflow = a.ct_lt(&b);
    u64::conditional_select(&a.wrapping_sub(b), &0, underflow)
}

pub(crate) fn lt(a: u64, b: u64) -> u64 {
    from_choice(a.ct_lt(&b))
}

pub(crate) fn le(a: u64, b: u64) -> u64 {
    from_choice(!b.ct_lt(&a))
}

pub(crate) fn eq(a: u64, b: u64) -> u64 {
    from_choice(a.ct_eq(&b))
}

pub(crate) fn and(a: u64, b: u64) -> u64 {
    (a & b) & 1
}

pub(crate) fn not(a: u64) -> u64 {
    (a ^ 1) & 1
}

/// `cond ? a : b`
pub(crate) fn select(cond: u64, a: u64, b: u64) -> u64 {
    u64::conditional_select(&b, &a, to_choice(cond))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_clamps_to_type_width() {
        assert_eq!(add(2, 3, u64::MAX), 5);
        assert_eq!(add(u64::MAX, 1, u64::MAX), u64::MAX);
        assert_eq!(add(200, 100, 255), 255);
    }

    #[test]
    fn test_sub_saturates_at_zero() {
        assert_eq!(sub(10, 3), 7);
        assert_eq!(sub(3, 10), 0);
        assert_eq!(sub(0, 0), 0);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(lt(1, 2), 1);
        assert_eq!(lt(2, 2), 0);
        assert_eq!(le(2, 2), 1);
        assert_eq!(le(3, 2), 0);
        assert_eq!(eq(7, 7), 1);
        assert_eq!(eq(7, 8), 0);
    }

    #[test]
    fn test_boolean_and_select() {
        assert_eq!(and(1, 1), 1);
        assert_eq!(and(1, 0), 0);
        assert_eq!(not(0), 1);
        assert_eq!(not(1), 0);
        assert_eq!(select(1, 10, 20), 10);
        assert_eq!(select(0, 10, 20), 20);
    }
}
