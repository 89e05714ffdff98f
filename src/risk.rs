//! Solvency and borrow-rate math.
//!
//! Pure functions only. A position is either solvent or liquidatable: the
//! health ratio (realizable value over total debt) is compared against a single
//! threshold. There is no warning tier.
//!
//! The borrow rate follows a kinked utilization curve quoted per
//! `RATE_PERIOD_BLOCKS` blocks: a gentle slope up to the optimal utilization
//! and a steep one above it.

use crate::math::{self, MathError};
use crate::types::{Amount, Ratio, PRECISION};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Borrow-rate curve parameters. every rate is per 360 blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCurve {
    /// Rate charged at zero utilization.
    pub base_rate: Ratio,
    /// Utilization where the curve kinks.
    pub optimal_utilization: Ratio,
    /// Rate added between zero and optimal utilization.
    pub slope_below: Ratio,
    /// Rate added between optimal and full utilization.
    pub slope_above: Ratio,
}

impl Default for RateCurve {
    fn default() -> Self {
        Self {
            base_rate: Ratio::from_decimal(dec!(0.0001)),
            optimal_utilization: Ratio::from_decimal(dec!(0.8)),
            slope_below: Ratio::from_decimal(dec!(0.0004)),
            slope_above: Ratio::from_decimal(dec!(0.005)),
        }
    }
}

impl RateCurve {
    /// Highest rate the curve can produce (at 100% utilization).
    pub fn max_rate(&self) -> Result<Ratio, MathError> {
        let top = math::checked_add(self.base_rate.value(), self.slope_below.value())?;
        math::checked_add(top, self.slope_above.value()).map(Ratio::new)
    }
}

/// Result of a solvency assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub current_value: Amount,
    pub total_debt: Amount,
    pub health_ratio: Ratio,
    pub liquidatable: bool,
}

/// Fraction of `capacity` currently lent out, clamped to [0, 1].
pub fn utilization(borrowed: Amount, capacity: Amount) -> Ratio {
    if borrowed.is_zero() {
        return Ratio::ZERO;
    }
    if capacity.is_zero() || borrowed >= capacity {
        return Ratio::ONE;
    }
    // borrowed < capacity so the quotient is below PRECISION
    Ratio::of(borrowed.value(), capacity.value()).unwrap_or(Ratio::ONE)
}

/// Per-360-block borrow rate for a utilization level.
///
/// Monotonically non-decreasing over [0, PRECISION]; inputs above
/// PRECISION are clamped.
pub fn dynamic_borrow_rate_per_360(utilization: Ratio, curve: &RateCurve) -> Result<Ratio, MathError> {
    let u = utilization.value().min(PRECISION);
    let kink = curve.optimal_utilization.value().min(PRECISION);

    let below = if kink == 0 {
        curve.slope_below.value()
    } else {
        math::mul_div(curve.slope_below.value(), u.min(kink), kink)?
    };

    let above = if u <= kink || kink == PRECISION {
        0
    } else {
        math::mul_div(curve.slope_above.value(), u - kink, PRECISION - kink)?
    };

    let rate = math::checked_add(curve.base_rate.value(), below)?;
    math::checked_add(rate, above).map(Ratio::new)
}

/// current_value * PRECISION / total_debt. no debt means maximally healthy.
pub fn health_ratio(current_value: Amount, total_debt: Amount) -> Result<Ratio, MathError> {
    if total_debt.is_zero() {
        return Ok(Ratio::MAX);
    }
    Ratio::of(current_value.value(), total_debt.value())
}

pub fn is_liquidatable(health: Ratio, liquidation_threshold: Ratio) -> bool {
    health < liquidation_threshold
}

pub fn assess(current_value: Amount, total_debt: Amount, liquidation_threshold: Ratio) -> Result<HealthCheck, MathError> {
    let health = health_ratio(current_value, total_debt)?;
    Ok(HealthCheck {
        current_value,
        total_debt,
        health_ratio: health,
        liquidatable: is_liquidatable(health, liquidation_threshold),
    })
}
