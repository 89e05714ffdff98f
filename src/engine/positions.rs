//! Opening, topping up, reducing and closing leveraged positions.

use super::core::Engine;
use super::results::{CloseResult, ProtocolError};
use crate::events::{
    CollateralAddedEvent, EventPayload, PositionClosedEvent, PositionOpenedEvent, PositionReducedEvent,
};
use crate::fees::FeeCategory;
use crate::guards::Operation;
use crate::math;
use crate::position::{split_position, Position, PositionKey};
use crate::services::{Bank, Host, PriceOracle, StakeService};
use crate::types::{rao_to_wei, wei_to_rao, AccountId, AlphaAmount, Amount, AssetId, PositionId, Ratio, ValidatorRef, ALPHA_UNIT};
use log::info;

impl<H: Host> Engine<H> {
    /// Open a leveraged position of `collateral * leverage` staked into `asset`.
    ///
    /// `collateral` is assumed to have been received by the hosting runtime with
    /// the call. The borrowed part is lent from LP capital. `max_slippage` bounds
    /// how far the alpha received may fall short of the spot-price expectation.
    pub fn open_position(
        &mut self,
        user: AccountId,
        asset: AssetId,
        collateral: Amount,
        leverage: Ratio,
        validator_ref: Option<ValidatorRef>,
        max_slippage: Ratio,
    ) -> Result<PositionId, ProtocolError> {
        self.transact("open_position", |engine| {
            engine.open_position_inner(user, asset, collateral, leverage, validator_ref, max_slippage)
        })
    }

    fn open_position_inner(
        &mut self,
        user: AccountId,
        asset: AssetId,
        collateral: Amount,
        leverage: Ratio,
        validator_ref: Option<ValidatorRef>,
        max_slippage: Ratio,
    ) -> Result<PositionId, ProtocolError> {
        self.ensure_enabled(Operation::OpenPosition)?;
        if self.state.liquidity.breaker.is_active() {
            return Err(ProtocolError::CircuitBreakerActive);
        }
        self.ensure_user_cooldown(user)?;
        if collateral.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }

        let key = PositionKey::new(user, asset);
        if self.state.positions.active(&key).is_some() {
            return Err(ProtocolError::PositionAlreadyActive { user, asset });
        }

        let tier = self.tier_for(user);
        let max = tier.max_leverage.min(self.state.config.max_leverage);
        if leverage < Ratio::ONE || leverage > max {
            return Err(ProtocolError::LeverageTooHigh { requested: leverage, max });
        }

        let notional = collateral.mul_ratio(leverage)?;
        let borrowed = notional.checked_sub(collateral)?;

        let config = &self.state.config;
        if self.state.liquidity.total_stakes() < config.min_liquidity_threshold {
            return Err(ProtocolError::InsufficientLiquidity {
                requested: borrowed,
                available: Amount::zero(),
            });
        }
        self.state.liquidity.ensure_can_borrow(borrowed, config.max_utilization)?;

        let trading_fee = notional.mul_ratio(self.trading_fee_rate(user)?)?;
        let stake_rao = wei_to_rao(notional.checked_sub(trading_fee)?);

        let price = self
            .host
            .spot_price(asset)
            .map_err(|_| ProtocolError::InvalidAlphaPrice(asset))?;
        if price.is_zero() {
            return Err(ProtocolError::InvalidAlphaPrice(asset));
        }
        let expected = AlphaAmount::new(math::mul_div(stake_rao.value(), ALPHA_UNIT, price.value())?);

        let validator = validator_ref
            .filter(|v| !v.is_unset())
            .unwrap_or(self.state.config.default_validator);
        let received = self
            .host
            .stake(validator, asset, stake_rao)
            .map_err(|e| ProtocolError::StakeFailed(e.to_string()))?;
        if received.is_zero() {
            return Err(ProtocolError::StakeFailed("no alpha received".to_string()));
        }

        let min_out = AlphaAmount::new(max_slippage.complement().apply(expected.value())?);
        if received < min_out {
            return Err(ProtocolError::SlippageTooHigh { expected, received });
        }

        let entry_price = rao_to_wei(price)?;
        let block = self.current_block;
        let id = self.state.positions.next_id()?;
        let position = Position::open(id, collateral, borrowed, received, leverage, entry_price, block, validator);
        self.state.positions.insert(key, position);

        self.state.liquidity.record_open(asset, collateral, borrowed, received)?;
        self.state.aggregates.total_collateral = self.state.aggregates.total_collateral.checked_add(collateral)?;
        self.record_volume(user, notional)?;
        self.distribute_fee(FeeCategory::Trading, trading_fee)?;
        self.state.user_cooldowns.touch(user, block);

        self.emit(EventPayload::PositionOpened(PositionOpenedEvent {
            user,
            asset,
            position_id: id,
            collateral,
            borrowed,
            asset_amount: received,
            leverage,
            entry_price,
            trading_fee,
            validator,
        }));
        info!(
            "opened position {} for {:?} on asset {}: {} collateral at {}x, {} borrowed, {}",
            id.0, user, asset.0, collateral, leverage, borrowed, received
        );

        Ok(id)
    }

    /// Close the whole position: settle fees, redeem, repay, return the surplus.
    pub fn close_position(&mut self, user: AccountId, asset: AssetId) -> Result<CloseResult, ProtocolError> {
        self.transact("close_position", |engine| {
            let held = engine
                .state
                .positions
                .active(&PositionKey::new(user, asset))
                .map(|p| p.asset_amount)
                .ok_or(ProtocolError::PositionInactive { user, asset })?;
            engine.unwind(Operation::ClosePosition, user, asset, held)
        })
    }

    /// Close the proportional slice of a position backed by `alpha`.
    pub fn reduce_position(
        &mut self,
        user: AccountId,
        asset: AssetId,
        alpha: AlphaAmount,
    ) -> Result<CloseResult, ProtocolError> {
        self.transact("reduce_position", |engine| {
            engine.unwind(Operation::ReducePosition, user, asset, alpha)
        })
    }

    fn unwind(
        &mut self,
        op: Operation,
        user: AccountId,
        asset: AssetId,
        alpha: AlphaAmount,
    ) -> Result<CloseResult, ProtocolError> {
        self.ensure_enabled(op)?;
        self.ensure_user_cooldown(user)?;
        if alpha.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }

        let key = PositionKey::new(user, asset);
        let total_fees = self.settle_position_fees(&key)?;
        let position = self
            .state
            .positions
            .active(&key)
            .cloned()
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        let slice = split_position(&position, alpha, total_fees)?;
        let fully_closed = slice.asset_amount == position.asset_amount;

        let validator = position.validator;
        let realized = self
            .host
            .redeem(validator, slice.asset_amount, asset)
            .map_err(|e| ProtocolError::UnstakeFailed(e.to_string()))?;
        if realized.is_zero() {
            return Err(ProtocolError::UnstakeFailed("zero proceeds".to_string()));
        }
        let proceeds = rao_to_wei(realized)?;

        let debt = slice.borrowed.checked_add(slice.fees)?;
        if proceeds < debt {
            // underwater positions can only leave through liquidation
            return Err(ProtocolError::InsufficientProceeds { proceeds, debt });
        }
        let surplus = proceeds.checked_sub(debt)?;
        let trading_fee = proceeds.mul_ratio(self.trading_fee_rate(user)?)?.min(surplus);
        let returned = surplus.checked_sub(trading_fee)?;

        self.distribute_fee(FeeCategory::Borrowing, slice.fees)?;
        self.distribute_fee(FeeCategory::Trading, trading_fee)?;

        if !returned.is_zero() {
            self.host
                .transfer(user, returned)
                .map_err(|e| ProtocolError::CollateralReturnFailed(e.to_string()))?;
        }

        self.state
            .liquidity
            .record_release(asset, slice.collateral, slice.borrowed, slice.asset_amount, fully_closed)?;
        self.state.aggregates.total_collateral = self.state.aggregates.total_collateral.checked_sub(slice.collateral)?;
        self.record_volume(user, proceeds)?;

        let position = self
            .state
            .positions
            .get_mut(&key)
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        if fully_closed {
            position.clear();
        } else {
            position.collateral = position.collateral.checked_sub(slice.collateral)?;
            position.borrowed = position.borrowed.checked_sub(slice.borrowed)?;
            position.asset_amount = position.asset_amount.checked_sub(slice.asset_amount)?;
            position.accrued_fees = position.accrued_fees.checked_sub(slice.fees)?;
        }
        let position_id = position.id;
        let remaining_alpha = position.asset_amount;
        self.state.user_cooldowns.touch(user, self.current_block);

        if fully_closed {
            self.emit(EventPayload::PositionClosed(PositionClosedEvent {
                user,
                asset,
                position_id,
                proceeds,
                debt_repaid: debt,
                borrow_fees: slice.fees,
                trading_fee,
                returned,
            }));
            info!("closed position {} for {:?} on asset {}: proceeds {}, returned {}", position_id.0, user, asset.0, proceeds, returned);
        } else {
            self.emit(EventPayload::PositionReduced(PositionReducedEvent {
                user,
                asset,
                position_id,
                alpha_sold: slice.asset_amount,
                proceeds,
                debt_repaid: debt,
                returned,
                remaining_alpha,
            }));
            info!("reduced position {} for {:?} on asset {}: sold {}, returned {}", position_id.0, user, asset.0, slice.asset_amount, returned);
        }

        Ok(CloseResult {
            position_id,
            alpha_sold: slice.asset_amount,
            proceeds,
            debt_repaid: debt,
            borrow_fees: slice.fees,
            trading_fee,
            returned,
            fully_closed,
        })
    }

    /// Add collateral to an open position. the new funds are staked alongside the existing holding.
    pub fn add_collateral(&mut self, user: AccountId, asset: AssetId, amount: Amount) -> Result<(), ProtocolError> {
        self.transact("add_collateral", |engine| engine.add_collateral_inner(user, asset, amount))
    }

    fn add_collateral_inner(&mut self, user: AccountId, asset: AssetId, amount: Amount) -> Result<(), ProtocolError> {
        self.ensure_enabled(Operation::AddCollateral)?;
        self.ensure_user_cooldown(user)?;
        if amount.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }

        let key = PositionKey::new(user, asset);
        self.settle_position_fees(&key)?;
        let validator = self
            .state
            .positions
            .active(&key)
            .map(|p| p.validator)
            .ok_or(ProtocolError::PositionInactive { user, asset })?;

        let received = self
            .host
            .stake(validator, asset, wei_to_rao(amount))
            .map_err(|e| ProtocolError::StakeFailed(e.to_string()))?;
        if received.is_zero() {
            return Err(ProtocolError::StakeFailed("no alpha received".to_string()));
        }

        let position = self
            .state
            .positions
            .get_mut(&key)
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        position.collateral = position.collateral.checked_add(amount)?;
        position.asset_amount = position.asset_amount.checked_add(received)?;
        let exposure = position.collateral.checked_add(position.borrowed)?;
        position.leverage = Ratio::of(exposure.value(), position.collateral.value())?;
        let new_collateral = position.collateral;

        self.state.liquidity.record_collateral(asset, amount, received)?;
        self.state.aggregates.total_collateral = self.state.aggregates.total_collateral.checked_add(amount)?;
        self.state.user_cooldowns.touch(user, self.current_block);

        self.emit(EventPayload::CollateralAdded(CollateralAddedEvent {
            user,
            asset,
            amount,
            alpha_added: received,
            new_collateral,
        }));
        info!("added {} collateral to {:?} on asset {}", amount, user, asset.0);
        Ok(())
    }
}
