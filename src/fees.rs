//! Fee splitting and lazy pro-rata distribution.
//!
//! Every fee event is cut three ways (LP, liquidator, protocol) by a
//! per-category split that must sum to exactly PRECISION. LP and liquidator
//! cuts are never paid out per holder at fee time. Instead a global
//! accumulator grows by `fee * PRECISION / total_shares` and each holder
//! keeps a checkpoint of the accumulator it last settled against:
//!
//!   claimable = shares * (acc - checkpoint) / PRECISION
//!
//! so a fee event costs O(1) no matter how many holders exist. Holders must
//! settle before their share count changes.

use crate::config::ConfigError;
use crate::math::{self, MathError};
use crate::types::{Amount, Ratio, PRECISION};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCategory {
    Trading,
    Borrowing,
    Liquidation,
}

impl fmt::Display for FeeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeCategory::Trading => "trading",
            FeeCategory::Borrowing => "borrowing",
            FeeCategory::Liquidation => "liquidation",
        };
        write!(f, "{}", name)
    }
}

/// Three-way split of one fee category. shares are PRECISION-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub lp_share: Ratio,
    pub liquidator_share: Ratio,
    pub protocol_share: Ratio,
}

impl FeeSplit {
    pub fn new(lp_share: Ratio, liquidator_share: Ratio, protocol_share: Ratio) -> Self {
        Self {
            lp_share,
            liquidator_share,
            protocol_share,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.lp_share
            .value()
            .checked_add(self.liquidator_share.value())
            .and_then(|s| s.checked_add(self.protocol_share.value()))
            == Some(PRECISION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub trading: FeeSplit,
    pub borrowing: FeeSplit,
    pub liquidation: FeeSplit,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            trading: FeeSplit::new(
                Ratio::from_decimal(dec!(0.6)),
                Ratio::from_decimal(dec!(0.1)),
                Ratio::from_decimal(dec!(0.3)),
            ),
            borrowing: FeeSplit::new(
                Ratio::from_decimal(dec!(0.7)),
                Ratio::from_decimal(dec!(0.1)),
                Ratio::from_decimal(dec!(0.2)),
            ),
            liquidation: FeeSplit::new(
                Ratio::ZERO,
                Ratio::from_decimal(dec!(0.5)),
                Ratio::from_decimal(dec!(0.5)),
            ),
        }
    }
}

impl FeeSchedule {
    pub fn split_for(&self, category: FeeCategory) -> &FeeSplit {
        match category {
            FeeCategory::Trading => &self.trading,
            FeeCategory::Borrowing => &self.borrowing,
            FeeCategory::Liquidation => &self.liquidation,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in [FeeCategory::Trading, FeeCategory::Borrowing, FeeCategory::Liquidation] {
            if !self.split_for(category).is_balanced() {
                return Err(ConfigError::DistributionInvalid { category });
            }
        }
        Ok(())
    }
}

/// How one fee amount was cut. the protocol cut absorbs rounding so the parts always sum to `total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeShares {
    pub total: Amount,
    pub lp: Amount,
    pub liquidator: Amount,
    pub protocol: Amount,
}

impl FeeShares {
    pub fn zero() -> Self {
        Self {
            total: Amount::zero(),
            lp: Amount::zero(),
            liquidator: Amount::zero(),
            protocol: Amount::zero(),
        }
    }
}

pub fn split_fee(amount: Amount, split: &FeeSplit) -> Result<FeeShares, MathError> {
    let lp = amount.mul_ratio(split.lp_share)?;
    let liquidator = amount.mul_ratio(split.liquidator_share)?;
    let protocol = amount.checked_sub(lp)?.checked_sub(liquidator)?;
    Ok(FeeShares {
        total: amount,
        lp,
        liquidator,
        protocol,
    })
}

/// 5.1: global reward-per-share accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAccumulator {
    /// Rewards per share, scaled by PRECISION. never decreases.
    pub acc_per_share: u128,
    pub total_shares: u128,
    /// Rewards waiting for shares to exist, plus rounding carry.
    pub undistributed: Amount,
    pub total_distributed: Amount,
}

impl RewardAccumulator {
    pub fn distribute(&mut self, amount: Amount) -> Result<(), MathError> {
        let available = self.undistributed.checked_add(amount)?;
        if self.total_shares == 0 || available.is_zero() {
            self.undistributed = available;
            return Ok(());
        }

        let increment = math::mul_div(available.value(), PRECISION, self.total_shares)?;
        // rounded up so the fractions holders collect across many increments never
        // exceed what was put in. the rest carries over
        let credited = Amount::new(math::mul_div_ceil(increment, self.total_shares, PRECISION)?);

        self.acc_per_share = math::checked_add(self.acc_per_share, increment)?;
        self.undistributed = available.checked_sub(credited)?;
        self.total_distributed = self.total_distributed.checked_add(credited)?;
        Ok(())
    }

    pub fn pending(&self, shares: u128, checkpoint: u128) -> Result<Amount, MathError> {
        let delta = math::checked_sub(self.acc_per_share, checkpoint)?;
        math::mul_div(shares, delta, PRECISION).map(Amount::new)
    }
}

/// A holder's view of an accumulator: share count, checkpoint, unclaimed rewards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCheckpoint {
    pub shares: u128,
    pub checkpoint: u128,
    pub pending: Amount,
    pub claimed: Amount,
}

impl RewardCheckpoint {
    /// Move everything earned so far into `pending` and catch up to the accumulator.
    pub fn settle(&mut self, acc: &RewardAccumulator) -> Result<Amount, MathError> {
        let earned = acc.pending(self.shares, self.checkpoint)?;
        self.pending = self.pending.checked_add(earned)?;
        self.checkpoint = acc.acc_per_share;
        Ok(self.pending)
    }

    pub fn set_shares(&mut self, shares: u128, acc: &mut RewardAccumulator) -> Result<(), MathError> {
        self.settle(acc)?;
        let without = math::checked_sub(acc.total_shares, self.shares)?;
        acc.total_shares = math::checked_add(without, shares)?;
        self.shares = shares;
        Ok(())
    }

    pub fn claimable(&self, acc: &RewardAccumulator) -> Result<Amount, MathError> {
        self.pending.checked_add(acc.pending(self.shares, self.checkpoint)?)
    }

    pub fn take_pending(&mut self, acc: &RewardAccumulator) -> Result<Amount, MathError> {
        let amount = self.settle(acc)?;
        self.pending = Amount::zero();
        self.claimed = self.claimed.checked_add(amount)?;
        Ok(amount)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTotals {
    pub trading: Amount,
    pub borrowing: Amount,
    pub liquidation: Amount,
}

impl FeeTotals {
    fn add(&mut self, category: FeeCategory, amount: Amount) -> Result<(), MathError> {
        let slot = match category {
            FeeCategory::Trading => &mut self.trading,
            FeeCategory::Borrowing => &mut self.borrowing,
            FeeCategory::Liquidation => &mut self.liquidation,
        };
        *slot = slot.checked_add(amount)?;
        Ok(())
    }
}

/// 5.0: routes every fee event into the LP and liquidator accumulators and the protocol cut.
///
/// The liquidator cut of a liquidation fee is paid to the liquidator by the
/// caller; for trading and borrowing fees it feeds the liquidator accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistributor {
    pub lp_rewards: RewardAccumulator,
    pub liquidator_rewards: RewardAccumulator,
    pub collected: FeeTotals,
    pub protocol_fees: Amount,
}

impl FeeDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distribute(
        &mut self,
        category: FeeCategory,
        amount: Amount,
        schedule: &FeeSchedule,
    ) -> Result<FeeShares, MathError> {
        if amount.is_zero() {
            return Ok(FeeShares::zero());
        }

        let shares = split_fee(amount, schedule.split_for(category))?;

        self.lp_rewards.distribute(shares.lp)?;
        if category != FeeCategory::Liquidation {
            self.liquidator_rewards.distribute(shares.liquidator)?;
        }
        self.protocol_fees = self.protocol_fees.checked_add(shares.protocol)?;
        self.collected.add(category, amount)?;

        Ok(shares)
    }

    pub fn acc_lp_fees_per_share(&self) -> u128 {
        self.lp_rewards.acc_per_share
    }
}
