// 3.0 liquidity.rs: LP capital that backs every borrow.
// LPs deposit native currency and receive shares proportional to the pool value they
// add. a provider's claim on the pool is its shares times the pool value per share,
// so bad debt written down against the pool lowers every claim pro rata. the pool
// tracks what is lent out per asset and refuses withdrawals that would push
// utilization past the cap. fee rewards are tracked through the LP accumulator in
// fees.rs, so every share change settles the provider's checkpoint first.

use crate::engine::ProtocolError;
use crate::fees::{RewardAccumulator, RewardCheckpoint};
use crate::guards::CircuitBreaker;
use crate::journal::{Journaled, JournaledMap};
use crate::math::{self, MathError};
use crate::risk;
use crate::types::{AccountId, AlphaAmount, Amount, AssetId, BlockNumber, Ratio};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityProvider {
    pub shares: u128,
    /// Capital put in, net of withdrawals. not written down by losses.
    pub deposited: Amount,
    pub is_active: bool,
    pub rewards: RewardCheckpoint,
    pub last_deposit_block: Option<BlockNumber>,
}

impl LiquidityProvider {
    fn sync_active(&mut self) {
        if self.shares == 0 {
            self.deposited = Amount::zero();
        }
        self.is_active = self.shares > 0;
    }
}

/// Per-asset aggregates of open positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPool {
    pub total_collateral: Amount,
    pub total_borrowed: Amount,
    pub total_alpha: AlphaAmount,
    pub open_positions: u64,
}

/// 3.1: shares, stakes and borrow totals for the whole protocol.
#[derive(Debug, Clone, Default)]
pub struct LiquidityPool {
    providers: JournaledMap<AccountId, LiquidityProvider>,
    assets: JournaledMap<AssetId, AssetPool>,
    totals: PoolTotals,
    saved: Option<PoolTotals>,
    pub breaker: CircuitBreaker,
    saved_breaker: Option<CircuitBreaker>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PoolTotals {
    // pool value: deposits less withdrawals less written-down losses
    stakes: Amount,
    shares: u128,
    borrowed: Amount,
}

impl LiquidityPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(&self, who: AccountId) -> Option<&LiquidityProvider> {
        self.providers.get(&who)
    }

    pub fn providers(&self) -> impl Iterator<Item = (&AccountId, &LiquidityProvider)> {
        self.providers.iter()
    }

    pub fn asset(&self, asset: AssetId) -> Option<&AssetPool> {
        self.assets.get(&asset)
    }

    pub fn total_stakes(&self) -> Amount {
        self.totals.stakes
    }

    pub fn total_shares(&self) -> u128 {
        self.totals.shares
    }

    pub fn total_borrowed(&self) -> Amount {
        self.totals.borrowed
    }

    /// What `who` could withdraw at the current value per share.
    pub fn value_of(&self, who: AccountId) -> Result<Amount, MathError> {
        let shares = self.providers.get(&who).map(|lp| lp.shares).unwrap_or(0);
        if shares == 0 || self.totals.shares == 0 {
            return Ok(Amount::zero());
        }
        math::mul_div(shares, self.totals.stakes.value(), self.totals.shares).map(Amount::new)
    }

    /// Share of all LP capital currently lent out.
    pub fn utilization(&self) -> Ratio {
        risk::utilization(self.totals.borrowed, self.totals.stakes)
    }

    /// Utilization attributable to one asset's borrowers. drives that asset's borrow rate.
    pub fn asset_utilization(&self, asset: AssetId) -> Ratio {
        let borrowed = self.assets.get(&asset).map(|a| a.total_borrowed).unwrap_or_default();
        risk::utilization(borrowed, self.totals.stakes)
    }

    /// Most that can still be lent out under `max_utilization`.
    pub fn available_to_borrow(&self, max_utilization: Ratio) -> Result<Amount, ProtocolError> {
        let cap = self.totals.stakes.mul_ratio(max_utilization)?;
        Ok(cap.saturating_sub(self.totals.borrowed))
    }

    pub fn ensure_can_borrow(&self, amount: Amount, max_utilization: Ratio) -> Result<(), ProtocolError> {
        let available = self.available_to_borrow(max_utilization)?;
        if amount > available {
            return Err(ProtocolError::InsufficientLiquidity {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Shares minted for `amount` at the current pool value.
    pub fn shares_for_deposit(&self, amount: Amount) -> Result<u128, ProtocolError> {
        if self.totals.shares == 0 || self.totals.stakes.is_zero() {
            return Ok(amount.value());
        }
        Ok(math::mul_div(amount.value(), self.totals.shares, self.totals.stakes.value())?)
    }

    pub fn deposit(
        &mut self,
        who: AccountId,
        amount: Amount,
        min_deposit: Amount,
        block: BlockNumber,
        acc: &mut RewardAccumulator,
    ) -> Result<u128, ProtocolError> {
        if amount < min_deposit {
            return Err(ProtocolError::LpMinDeposit {
                amount,
                minimum: min_deposit,
            });
        }
        let minted = self.shares_for_deposit(amount)?;
        if minted == 0 {
            return Err(ProtocolError::ZeroAmount);
        }

        let lp = self.providers.get_or_default(who);
        let shares = math::checked_add(lp.shares, minted)?;
        lp.rewards.set_shares(shares, acc)?;
        lp.shares = shares;
        lp.deposited = lp.deposited.checked_add(amount)?;
        lp.last_deposit_block = Some(block);
        lp.sync_active();

        self.totals.shares = math::checked_add(self.totals.shares, minted)?;
        self.totals.stakes = self.totals.stakes.checked_add(amount)?;
        Ok(minted)
    }

    /// Withdraw `amount` of pool value, burning the shares it is worth (rounded up).
    pub fn withdraw(
        &mut self,
        who: AccountId,
        amount: Amount,
        max_utilization: Ratio,
        min_liquidity: Amount,
        acc: &mut RewardAccumulator,
    ) -> Result<u128, ProtocolError> {
        if self.breaker.is_active() {
            return Err(ProtocolError::CircuitBreakerActive);
        }
        if amount.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }
        let held = self
            .providers
            .get(&who)
            .filter(|lp| lp.is_active)
            .map(|lp| lp.shares)
            .ok_or(ProtocolError::LpNotFound(who))?;
        let value = self.value_of(who)?;
        if amount > value {
            return Err(ProtocolError::InsufficientLpStake {
                requested: amount,
                stake: value,
            });
        }

        let burned = if amount == value {
            held
        } else {
            let (shares, stakes) = (self.totals.shares, self.totals.stakes.value());
            let floor = math::mul_div(amount.value(), shares, stakes)?;
            if math::mul_div(floor, stakes, shares)? < amount.value() {
                math::checked_add(floor, 1)?.min(held)
            } else {
                floor.min(held)
            }
        };

        let remaining = self.totals.stakes.checked_sub(amount)?;
        let cap = remaining.mul_ratio(max_utilization)?;
        if self.totals.borrowed > cap {
            return Err(ProtocolError::UtilizationExceeded { max: max_utilization });
        }
        if !remaining.is_zero() && remaining < min_liquidity {
            return Err(ProtocolError::LiquidityBelowThreshold {
                remaining,
                minimum: min_liquidity,
            });
        }

        let lp = self.providers.get_mut(&who).ok_or(ProtocolError::LpNotFound(who))?;
        let shares = math::checked_sub(lp.shares, burned)?;
        lp.rewards.set_shares(shares, acc)?;
        lp.shares = shares;
        lp.deposited = lp.deposited.saturating_sub(amount);
        lp.sync_active();

        self.totals.shares = math::checked_sub(self.totals.shares, burned)?;
        self.totals.stakes = remaining;
        Ok(burned)
    }

    /// Take an unrecoverable loss out of pool value. shares are untouched, so every
    /// provider's claim shrinks in proportion.
    pub fn write_down(&mut self, loss: Amount) -> Result<(), MathError> {
        self.totals.stakes = self.totals.stakes.checked_sub(loss)?;
        Ok(())
    }

    pub fn claimable_rewards(&self, who: AccountId, acc: &RewardAccumulator) -> Result<Amount, ProtocolError> {
        match self.providers.get(&who) {
            Some(lp) => Ok(lp.rewards.claimable(acc)?),
            None => Ok(Amount::zero()),
        }
    }

    pub fn take_rewards(&mut self, who: AccountId, acc: &RewardAccumulator) -> Result<Amount, ProtocolError> {
        let lp = self.providers.get_mut(&who).ok_or(ProtocolError::LpNotFound(who))?;
        Ok(lp.rewards.take_pending(acc)?)
    }

    pub fn record_open(
        &mut self,
        asset: AssetId,
        collateral: Amount,
        borrowed: Amount,
        alpha: AlphaAmount,
    ) -> Result<(), ProtocolError> {
        let pool = self.assets.get_or_default(asset);
        pool.total_collateral = pool.total_collateral.checked_add(collateral)?;
        pool.total_borrowed = pool.total_borrowed.checked_add(borrowed)?;
        pool.total_alpha = pool.total_alpha.checked_add(alpha)?;
        pool.open_positions = math::increment(pool.open_positions)?;
        self.totals.borrowed = self.totals.borrowed.checked_add(borrowed)?;
        Ok(())
    }

    pub fn record_collateral(&mut self, asset: AssetId, collateral: Amount, alpha: AlphaAmount) -> Result<(), ProtocolError> {
        let pool = self.assets.get_or_default(asset);
        pool.total_collateral = pool.total_collateral.checked_add(collateral)?;
        pool.total_alpha = pool.total_alpha.checked_add(alpha)?;
        Ok(())
    }

    /// Remove a position's (or slice's) contribution. `closed` drops the open count.
    pub fn record_release(
        &mut self,
        asset: AssetId,
        collateral: Amount,
        borrowed: Amount,
        alpha: AlphaAmount,
        closed: bool,
    ) -> Result<(), ProtocolError> {
        let pool = self.assets.get_or_default(asset);
        pool.total_collateral = pool.total_collateral.checked_sub(collateral)?;
        pool.total_borrowed = pool.total_borrowed.checked_sub(borrowed)?;
        pool.total_alpha = pool.total_alpha.checked_sub(alpha)?;
        if closed {
            pool.open_positions = pool.open_positions.saturating_sub(1);
        }
        self.totals.borrowed = self.totals.borrowed.checked_sub(borrowed)?;
        Ok(())
    }
}

impl Journaled for LiquidityPool {
    fn begin(&mut self) {
        self.providers.begin();
        self.assets.begin();
        self.saved = Some(self.totals);
        self.saved_breaker = Some(self.breaker.clone());
    }

    fn commit(&mut self) {
        self.providers.commit();
        self.assets.commit();
        self.saved = None;
        self.saved_breaker = None;
    }

    fn rollback(&mut self) {
        self.providers.rollback();
        self.assets.rollback();
        if let Some(totals) = self.saved.take() {
            self.totals = totals;
        }
        if let Some(breaker) = self.saved_breaker.take() {
            self.breaker = breaker;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tao(v: rust_decimal::Decimal) -> Amount {
        Amount::from_tao(v)
    }

    fn max_util() -> Ratio {
        Ratio::from_decimal(dec!(0.9))
    }

    #[test]
    fn first_deposit_mints_one_to_one() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        let shares = pool
            .deposit(AccountId(1), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        assert_eq!(shares, tao(dec!(100)).value());
        assert_eq!(acc.total_shares, shares);
        assert!(pool.provider(AccountId(1)).unwrap().is_active);
    }

    #[test]
    fn below_min_deposit_rejected() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        let err = pool
            .deposit(AccountId(1), tao(dec!(0.5)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::LpMinDeposit { .. }));
    }

    #[test]
    fn withdraw_everything_clears_provider() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(50)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        pool.withdraw(AccountId(1), tao(dec!(50)), max_util(), tao(dec!(10)), &mut acc)
            .unwrap();

        let lp = pool.provider(AccountId(1)).unwrap();
        assert_eq!(lp.shares, 0);
        assert!(lp.deposited.is_zero());
        assert!(!lp.is_active);
        assert_eq!(pool.total_shares(), 0);
        assert_eq!(acc.total_shares, 0);
    }

    #[test]
    fn withdrawal_blocked_by_utilization() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        pool.record_open(AssetId(1), tao(dec!(10)), tao(dec!(80)), AlphaAmount::new(1))
            .unwrap();

        // 80 borrowed needs at least 88.9 staked at 90%
        let err = pool
            .withdraw(AccountId(1), tao(dec!(20)), max_util(), tao(dec!(10)), &mut acc)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UtilizationExceeded { .. }));
        assert!(pool
            .withdraw(AccountId(1), tao(dec!(10)), max_util(), tao(dec!(10)), &mut acc)
            .is_ok());
    }

    #[test]
    fn pool_cannot_be_left_below_floor() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(20)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        let err = pool
            .withdraw(AccountId(1), tao(dec!(15)), max_util(), tao(dec!(10)), &mut acc)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::LiquidityBelowThreshold { .. }));
    }

    #[test]
    fn breaker_blocks_withdrawals() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(20)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        pool.breaker.trip(BlockNumber(1), "test");
        assert_eq!(
            pool.withdraw(AccountId(1), tao(dec!(20)), max_util(), tao(dec!(10)), &mut acc),
            Err(ProtocolError::CircuitBreakerActive)
        );
    }

    #[test]
    fn borrow_capacity() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        assert_eq!(pool.available_to_borrow(max_util()).unwrap(), tao(dec!(90)));
        assert!(pool.ensure_can_borrow(tao(dec!(90)), max_util()).is_ok());
        assert!(matches!(
            pool.ensure_can_borrow(tao(dec!(91)), max_util()),
            Err(ProtocolError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn asset_utilization_uses_lp_capital() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        pool.record_open(AssetId(2), tao(dec!(10)), tao(dec!(25)), AlphaAmount::new(1))
            .unwrap();
        assert_eq!(pool.asset_utilization(AssetId(2)), Ratio::from_decimal(dec!(0.25)));
        assert_eq!(pool.asset_utilization(AssetId(3)), Ratio::ZERO);
    }

    #[test]
    fn write_down_lowers_every_claim_pro_rata() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(300)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        pool.deposit(AccountId(2), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();

        pool.write_down(tao(dec!(40))).unwrap();
        assert_eq!(pool.total_stakes(), tao(dec!(360)));
        assert_eq!(pool.value_of(AccountId(1)).unwrap(), tao(dec!(270)));
        assert_eq!(pool.value_of(AccountId(2)).unwrap(), tao(dec!(90)));

        // the old stake is no longer there to take
        let err = pool
            .withdraw(AccountId(2), tao(dec!(100)), max_util(), tao(dec!(10)), &mut acc)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InsufficientLpStake {
                requested: tao(dec!(100)),
                stake: tao(dec!(90)),
            }
        );
        pool.withdraw(AccountId(2), tao(dec!(90)), max_util(), tao(dec!(10)), &mut acc)
            .unwrap();
        assert_eq!(pool.provider(AccountId(2)).unwrap().shares, 0);
        assert_eq!(pool.total_stakes(), tao(dec!(270)));
    }

    #[test]
    fn deposit_after_loss_mints_more_shares() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();
        pool.write_down(tao(dec!(50))).unwrap();
        let minted = pool
            .deposit(AccountId(2), tao(dec!(50)), tao(dec!(1)), BlockNumber(1), &mut acc)
            .unwrap();
        assert_eq!(minted, tao(dec!(100)).value());
        assert_eq!(pool.value_of(AccountId(2)).unwrap(), tao(dec!(50)));
    }

    #[test]
    fn open_count_never_wraps() {
        let mut pool = LiquidityPool::new();
        pool.record_open(AssetId(1), tao(dec!(1)), Amount::zero(), AlphaAmount::new(1))
            .unwrap();
        pool.assets.get_mut(&AssetId(1)).unwrap().open_positions = u64::MAX;
        assert_eq!(
            pool.record_open(AssetId(1), tao(dec!(1)), Amount::zero(), AlphaAmount::new(1)),
            Err(ProtocolError::Math(MathError::Overflow))
        );
    }

    #[test]
    fn rollback_restores_providers_and_totals() {
        let mut pool = LiquidityPool::new();
        let mut acc = RewardAccumulator::default();
        pool.deposit(AccountId(1), tao(dec!(100)), tao(dec!(1)), BlockNumber(0), &mut acc)
            .unwrap();

        pool.begin();
        pool.deposit(AccountId(2), tao(dec!(50)), tao(dec!(1)), BlockNumber(1), &mut acc)
            .unwrap();
        pool.record_open(AssetId(1), tao(dec!(10)), tao(dec!(20)), AlphaAmount::new(1))
            .unwrap();
        pool.breaker.trip(BlockNumber(1), "test");
        pool.rollback();

        assert!(pool.provider(AccountId(2)).is_none());
        assert!(pool.asset(AssetId(1)).is_none());
        assert_eq!(pool.total_stakes(), tao(dec!(100)));
        assert_eq!(pool.total_borrowed(), Amount::zero());
        assert!(!pool.breaker.is_active());
    }
}
