// 10.0 services.rs: the external collaborators the engine calls but does not own.
// price quoting, stake movement and native transfers all speak through these traits.
// the oracle and stake service work in rao; the engine converts at the boundary.
//
// 10.1 MockHost is an in-memory host for tests and the simulation binary.

use crate::math;
use crate::types::{AccountId, AlphaAmount, Amount, AssetId, Rao, Ratio, ValidatorRef, ALPHA_UNIT, RAO_PER_TAO};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

pub trait PriceOracle {
    /// Simulated, non-committing value of selling `amount` of `asset`.
    fn quote(&self, asset: AssetId, amount: AlphaAmount) -> Result<Rao, ServiceError>;

    /// Rao per whole unit of `asset`.
    fn spot_price(&self, asset: AssetId) -> Result<Rao, ServiceError>;
}

pub trait StakeService {
    /// Stake native currency into `asset` through `validator`. returns the alpha received.
    fn stake(&mut self, validator: ValidatorRef, asset: AssetId, amount: Rao) -> Result<AlphaAmount, ServiceError>;

    /// Redeem alpha back to native currency. returns what was actually received.
    fn redeem(&mut self, validator: ValidatorRef, amount: AlphaAmount, asset: AssetId) -> Result<Rao, ServiceError>;
}

pub trait Bank {
    /// Pay `amount` out of protocol custody.
    fn transfer(&mut self, to: AccountId, amount: Amount) -> Result<(), ServiceError>;
}

/// Everything the engine needs from its runtime. the transaction hooks let a host
/// journal its own side effects so a failed operation leaves no trace there either.
pub trait Host: PriceOracle + StakeService + Bank {
    fn begin(&mut self) {}
    fn commit(&mut self) {}
    fn rollback(&mut self) {}
}

#[derive(Debug, Clone, Default)]
struct MockState {
    prices: HashMap<AssetId, Rao>,
    redeem_haircut: Ratio,
    redeem_override: Option<Rao>,
    fail_stake: bool,
    fail_redeem: bool,
    failing_recipients: HashSet<AccountId>,
    balances: HashMap<AccountId, Amount>,
    payouts: Vec<(AccountId, Amount)>,
    staked: HashMap<(ValidatorRef, AssetId), AlphaAmount>,
}

/// In-memory host. prices are rao per whole alpha; redemptions realize the quote
/// minus an optional haircut, or an exact override, so realized and simulated
/// values can be made to diverge.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    state: MockState,
    journal: Option<MockState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price_tao(mut self, asset: AssetId, tao_per_alpha: Decimal) -> Self {
        self.set_price_tao(asset, tao_per_alpha);
        self
    }

    pub fn set_price(&mut self, asset: AssetId, rao_per_alpha: Rao) {
        self.state.prices.insert(asset, rao_per_alpha);
    }

    /// Convenience for human-readable prices. negative or oversized values become zero.
    pub fn set_price_tao(&mut self, asset: AssetId, tao_per_alpha: Decimal) {
        let rao = tao_per_alpha
            .checked_mul(Decimal::from(RAO_PER_TAO as u64))
            .and_then(|r| r.trunc().to_u128())
            .unwrap_or(0);
        self.set_price(asset, Rao::new(rao));
    }

    pub fn remove_price(&mut self, asset: AssetId) {
        self.state.prices.remove(&asset);
    }

    pub fn set_redeem_haircut(&mut self, haircut: Ratio) {
        self.state.redeem_haircut = haircut;
    }

    pub fn set_redeem_override(&mut self, realized: Option<Rao>) {
        self.state.redeem_override = realized;
    }

    pub fn set_fail_stake(&mut self, fail: bool) {
        self.state.fail_stake = fail;
    }

    pub fn set_fail_redeem(&mut self, fail: bool) {
        self.state.fail_redeem = fail;
    }

    pub fn fail_transfers_to(&mut self, who: AccountId) {
        self.state.failing_recipients.insert(who);
    }

    pub fn clear_transfer_failures(&mut self) {
        self.state.failing_recipients.clear();
    }

    pub fn balance(&self, who: AccountId) -> Amount {
        self.state.balances.get(&who).copied().unwrap_or_default()
    }

    pub fn payouts(&self) -> &[(AccountId, Amount)] {
        &self.state.payouts
    }

    pub fn staked(&self, validator: ValidatorRef, asset: AssetId) -> AlphaAmount {
        self.state.staked.get(&(validator, asset)).copied().unwrap_or_default()
    }

    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }
}

impl PriceOracle for MockHost {
    fn quote(&self, asset: AssetId, amount: AlphaAmount) -> Result<Rao, ServiceError> {
        let price = self.spot_price(asset)?;
        math::mul_div(amount.value(), price.value(), ALPHA_UNIT)
            .map(Rao::new)
            .map_err(|e| ServiceError::Rejected(e.to_string()))
    }

    fn spot_price(&self, asset: AssetId) -> Result<Rao, ServiceError> {
        self.state
            .prices
            .get(&asset)
            .copied()
            .ok_or_else(|| ServiceError::Unavailable(format!("no price for asset {}", asset.0)))
    }
}

impl StakeService for MockHost {
    fn stake(&mut self, validator: ValidatorRef, asset: AssetId, amount: Rao) -> Result<AlphaAmount, ServiceError> {
        if self.state.fail_stake {
            return Err(ServiceError::Unavailable("stake disabled".to_string()));
        }
        let price = self.spot_price(asset)?;
        if price.is_zero() {
            return Err(ServiceError::Rejected("zero price".to_string()));
        }
        let alpha = math::mul_div(amount.value(), ALPHA_UNIT, price.value())
            .map(AlphaAmount::new)
            .map_err(|e| ServiceError::Rejected(e.to_string()))?;

        let held = self.state.staked.entry((validator, asset)).or_default();
        *held = held.checked_add(alpha).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        Ok(alpha)
    }

    fn redeem(&mut self, validator: ValidatorRef, amount: AlphaAmount, asset: AssetId) -> Result<Rao, ServiceError> {
        if self.state.fail_redeem {
            return Err(ServiceError::Unavailable("redeem disabled".to_string()));
        }
        let held = self.staked(validator, asset);
        let remaining = held
            .checked_sub(amount)
            .map_err(|_| ServiceError::Rejected("redeeming more than staked".to_string()))?;

        let realized = match self.state.redeem_override {
            Some(exact) => exact,
            None => {
                let quoted = self.quote(asset, amount)?;
                let kept = self
                    .state
                    .redeem_haircut
                    .complement()
                    .apply(quoted.value())
                    .map_err(|e| ServiceError::Rejected(e.to_string()))?;
                Rao::new(kept)
            }
        };

        self.state.staked.insert((validator, asset), remaining);
        Ok(realized)
    }
}

impl Bank for MockHost {
    fn transfer(&mut self, to: AccountId, amount: Amount) -> Result<(), ServiceError> {
        if self.state.failing_recipients.contains(&to) {
            return Err(ServiceError::Rejected(format!("recipient {} refused transfer", to.0)));
        }
        let balance = self.state.balances.entry(to).or_default();
        *balance = balance.checked_add(amount).map_err(|e| ServiceError::Rejected(e.to_string()))?;
        self.state.payouts.push((to, amount));
        Ok(())
    }
}

impl Host for MockHost {
    fn begin(&mut self) {
        self.journal = Some(self.state.clone());
    }

    fn commit(&mut self) {
        self.journal = None;
    }

    fn rollback(&mut self) {
        if let Some(saved) = self.journal.take() {
            self.state = saved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ASSET: AssetId = AssetId(3);
    const VALIDATOR: ValidatorRef = ValidatorRef([4u8; 32]);

    #[test]
    fn stake_and_quote_at_spot() {
        let mut host = MockHost::new().with_price_tao(ASSET, dec!(2));
        let alpha = host.stake(VALIDATOR, ASSET, Rao::new(10 * RAO_PER_TAO)).unwrap();
        assert_eq!(alpha, AlphaAmount::new(5 * ALPHA_UNIT));
        assert_eq!(host.quote(ASSET, alpha).unwrap(), Rao::new(10 * RAO_PER_TAO));
        assert_eq!(host.staked(VALIDATOR, ASSET), alpha);
    }

    #[test]
    fn haircut_separates_realized_from_quote() {
        let mut host = MockHost::new().with_price_tao(ASSET, dec!(1));
        let alpha = host.stake(VALIDATOR, ASSET, Rao::new(100)).unwrap();
        host.set_redeem_haircut(Ratio::from_decimal(dec!(0.1)));
        assert_eq!(host.quote(ASSET, alpha).unwrap(), Rao::new(100));
        assert_eq!(host.redeem(VALIDATOR, alpha, ASSET).unwrap(), Rao::new(90));
    }

    #[test]
    fn cannot_redeem_more_than_staked() {
        let mut host = MockHost::new().with_price_tao(ASSET, dec!(1));
        host.stake(VALIDATOR, ASSET, Rao::new(100)).unwrap();
        assert!(host.redeem(VALIDATOR, AlphaAmount::new(101), ASSET).is_err());
    }

    #[test]
    fn rollback_undoes_side_effects() {
        let mut host = MockHost::new();
        host.begin();
        host.transfer(AccountId(1), Amount::new(5)).unwrap();
        host.rollback();
        assert_eq!(host.balance(AccountId(1)), Amount::zero());
        assert!(host.payouts().is_empty());
        assert!(!host.in_transaction());
    }

    #[test]
    fn failing_recipient_refuses() {
        let mut host = MockHost::new();
        host.fail_transfers_to(AccountId(9));
        assert!(host.transfer(AccountId(9), Amount::new(1)).is_err());
        assert!(host.transfer(AccountId(8), Amount::new(1)).is_ok());
    }
}
