//! Lazy borrow-fee accrual.
//!
//! Nothing ticks in the background. Whenever a position's exact debt matters
//! (health check, close, liquidation, collateral top-up) the fee owed since
//! its last update block is computed from the utilization at that moment:
//!
//!   accrued = stored + borrowed * rate_per_360(u) * elapsed / (PRECISION * 360)
//!
//! Reading is side-effect free, so asking twice in the same block returns
//! the same number. `settle` folds the accrual into the position and moves
//! its checkpoint to the current block.

use crate::math::{self, MathError};
use crate::position::Position;
use crate::risk::{dynamic_borrow_rate_per_360, RateCurve};
use crate::types::{Amount, BlockNumber, Ratio, PRECISION, RATE_PERIOD_BLOCKS};

/// Fee accrued since the position's last checkpoint, excluding the stored part.
pub fn pending_fees(
    position: &Position,
    utilization: Ratio,
    current_block: BlockNumber,
    curve: &RateCurve,
) -> Result<Amount, MathError> {
    if !position.is_active || position.borrowed.is_zero() {
        return Ok(Amount::zero());
    }

    let elapsed = current_block.blocks_since(position.last_update_block);
    if elapsed == 0 {
        return Ok(Amount::zero());
    }

    let rate = dynamic_borrow_rate_per_360(utilization, curve)?;
    let rate_blocks = math::checked_mul(rate.value(), elapsed as u128)?;
    let denom = math::checked_mul(PRECISION, RATE_PERIOD_BLOCKS as u128)?;

    math::mul_div(position.borrowed.value(), rate_blocks, denom).map(Amount::new)
}

/// Total fees owed by the position as of `current_block`.
pub fn accrued_fees(
    position: &Position,
    utilization: Ratio,
    current_block: BlockNumber,
    curve: &RateCurve,
) -> Result<Amount, MathError> {
    if !position.is_active {
        return Ok(Amount::zero());
    }
    let pending = pending_fees(position, utilization, current_block, curve)?;
    position.accrued_fees.checked_add(pending)
}

/// borrowed + accrued fees.
pub fn total_debt(
    position: &Position,
    utilization: Ratio,
    current_block: BlockNumber,
    curve: &RateCurve,
) -> Result<Amount, MathError> {
    let fees = accrued_fees(position, utilization, current_block, curve)?;
    position.borrowed.checked_add(fees)
}

/// Fold pending fees into the position and checkpoint it. returns the new stored total.
pub fn settle(
    position: &mut Position,
    utilization: Ratio,
    current_block: BlockNumber,
    curve: &RateCurve,
) -> Result<Amount, MathError> {
    let total = accrued_fees(position, utilization, current_block, curve)?;
    if position.is_active && current_block > position.last_update_block {
        position.accrued_fees = total;
        position.last_update_block = current_block;
    }
    Ok(total)
}
