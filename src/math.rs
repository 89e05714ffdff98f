//! Checked integer arithmetic for the fixed-point model.
//!
//! Every protocol amount is a `u128`. Nothing in the engine is allowed to
//! wrap, so all helpers return `MathError` instead of panicking or saturating.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

pub fn checked_add(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Bump a counter by one.
pub fn increment(counter: u64) -> Result<u64, MathError> {
    counter.checked_add(1).ok_or(MathError::Overflow)
}

pub fn checked_sub(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

pub fn checked_mul(a: u128, b: u128) -> Result<u128, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// floor(a * b / denom) without requiring `a * b` to fit in 128 bits.
///
/// Splits `a = q * denom + r` so the large product is `q * b` (exact) and the
/// fractional part `r * b / denom` only involves a value smaller than `denom`.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }

    let whole = (a / denom).checked_mul(b).ok_or(MathError::Overflow)?;
    let rem = a % denom;

    let frac = rem
        .checked_mul(b)
        .map(|p| p / denom)
        .or_else(|| {
            let head = rem.checked_mul(b / denom)?;
            let tail = rem.checked_mul(b % denom)? / denom;
            head.checked_add(tail)
        })
        .ok_or(MathError::Overflow)?;

    whole.checked_add(frac).ok_or(MathError::Overflow)
}

/// ceil(a * b / denom). needs `a * b` to fit in 128 bits.
pub fn mul_div_ceil(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    let product = checked_mul(a, b)?;
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    let floor = product / denom;
    if product % denom == 0 {
        Ok(floor)
    } else {
        checked_add(floor, 1)
    }
}
