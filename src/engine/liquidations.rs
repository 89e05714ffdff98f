// 8.4 engine/liquidations.rs: eligibility, forced unwind and the payout waterfall.
// also the advisory review requests and the read-only batch scan for schedulers.
//
// order of a liquidation: eligible-check, price-simulate, debt-settle, unstake,
// waterfall payout, ledger clear, emit. any failure rolls back the whole attempt.

use super::core::Engine;
use super::results::{LiquidationResult, ProtocolError};
use crate::accrual;
use crate::events::{
    BadDebtEvent, CircuitBreakerEvent, EventPayload, LiquidationEvent, LiquidationRequestedEvent,
};
use crate::fees::FeeCategory;
use crate::guards::Operation;
use crate::liquidation::{waterfall, LiquidationRequest, PositionSnapshot};
use crate::math;
use crate::position::PositionKey;
use crate::risk::{self, HealthCheck};
use crate::services::{Bank, Host, PriceOracle, StakeService};
use crate::types::{rao_to_wei, AccountId, Amount, AssetId, ContentHash, Ratio, RequestId};
use log::{info, warn};

impl<H: Host> Engine<H> {
    /// Liquidate an unhealthy position. the caller receives the liquidator cut of the fee.
    pub fn liquidate_position(
        &mut self,
        liquidator: AccountId,
        user: AccountId,
        asset: AssetId,
        justification_ref: &str,
        content_hash: ContentHash,
    ) -> Result<LiquidationResult, ProtocolError> {
        self.transact("liquidate_position", |engine| {
            engine.liquidate_inner(liquidator, user, asset, justification_ref.to_string(), content_hash)
        })
    }

    /// Liquidate the position a live review request points at, using its justification.
    pub fn liquidate_from_request(
        &mut self,
        liquidator: AccountId,
        request_id: RequestId,
    ) -> Result<LiquidationResult, ProtocolError> {
        self.transact("liquidate_from_request", |engine| {
            let request = engine.state.requests.live(&request_id, engine.current_block)?.clone();
            engine.liquidate_inner(
                liquidator,
                request.user,
                request.asset,
                request.justification_ref,
                request.content_hash,
            )
        })
    }

    fn liquidate_inner(
        &mut self,
        liquidator: AccountId,
        user: AccountId,
        asset: AssetId,
        justification_ref: String,
        content_hash: ContentHash,
    ) -> Result<LiquidationResult, ProtocolError> {
        self.ensure_enabled(Operation::Liquidate)?;

        // eligible-check
        let key = PositionKey::new(user, asset);
        let held = self
            .state
            .positions
            .active(&key)
            .map(|p| p.asset_amount)
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        if held.is_zero() {
            return Err(ProtocolError::NoAlpha);
        }

        // debt-settle. fees are folded in first so the debt is exact as of this block
        let accrued = self.settle_position_fees(&key)?;
        let position = self
            .state
            .positions
            .active(&key)
            .cloned()
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        let total_debt = position.borrowed.checked_add(accrued)?;
        let threshold = self.state.config.liquidation_threshold;
        if total_debt.is_zero() {
            return Err(ProtocolError::NotLiquidatable {
                health: Ratio::MAX,
                threshold,
            });
        }

        // price-simulate
        let simulated = self.quote_value(asset, position.asset_amount)?;
        let health = risk::assess(simulated, total_debt, threshold)?;
        if !health.liquidatable {
            return Err(ProtocolError::NotLiquidatable {
                health: health.health_ratio,
                threshold,
            });
        }

        // unstake. the realized amount, not the quote, drives the payout
        let validator = position.validator;
        let realized = self
            .host
            .redeem(validator, position.asset_amount, asset)
            .map_err(|e| ProtocolError::UnstakeFailed(e.to_string()))?;
        if realized.is_zero() {
            return Err(ProtocolError::UnstakeFailed("zero proceeds".to_string()));
        }
        let proceeds = rao_to_wei(realized)?;

        // waterfall
        let payout = waterfall(proceeds, position.borrowed, accrued, self.state.config.liquidation_fee_rate)?;
        self.distribute_fee(FeeCategory::Borrowing, payout.fees_repaid)?;
        let fee_shares = self.distribute_fee(FeeCategory::Liquidation, payout.fee_amount)?;

        if !fee_shares.liquidator.is_zero() {
            self.host
                .transfer(liquidator, fee_shares.liquidator)
                .map_err(|e| ProtocolError::LiquiFeeTransferFailed(e.to_string()))?;
        }
        if !payout.returned_to_user.is_zero() {
            self.host
                .transfer(user, payout.returned_to_user)
                .map_err(|e| ProtocolError::CollateralReturnFailed(e.to_string()))?;
        }

        // ledger-clear
        let block = self.current_block;
        self.state
            .liquidity
            .record_release(asset, position.collateral, position.borrowed, position.asset_amount, true)?;
        let aggregates = &mut self.state.aggregates;
        aggregates.total_collateral = aggregates.total_collateral.checked_sub(position.collateral)?;
        aggregates.total_liquidations = math::increment(aggregates.total_liquidations)?;
        aggregates.total_liquidated_value = aggregates.total_liquidated_value.checked_add(proceeds)?;

        let state = &mut self.state;
        state
            .liquidators
            .record_success(liquidator, fee_shares.liquidator, proceeds, block, &mut state.fees.liquidator_rewards)?;
        if let Some(pos) = state.positions.get_mut(&key) {
            pos.clear();
        }
        if let Some(request_id) = state.requests.live_for(&key, block) {
            state.requests.mark_processed(&request_id)?;
        }

        if !payout.bad_debt.is_zero() {
            self.record_bad_debt(user, asset, payout.bad_debt)?;
        }

        // emit
        self.emit(EventPayload::Liquidation(LiquidationEvent {
            user,
            liquidator,
            asset,
            position_id: position.id,
            simulated_value: simulated,
            realized_value: proceeds,
            debt_repaid: payout.debt_repaid,
            fee_amount: payout.fee_amount,
            liquidator_share: fee_shares.liquidator,
            returned_to_user: payout.returned_to_user,
            justification_ref,
            content_hash,
        }));
        info!(
            "liquidated position {} of {:?} on asset {} by {:?}: realized {} (quoted {}), fee {}",
            position.id.0, user, asset.0, liquidator, proceeds, simulated, payout.fee_amount
        );

        Ok(LiquidationResult {
            user,
            asset,
            position_id: position.id,
            simulated_value: simulated,
            realized_value: proceeds,
            total_debt,
            health_ratio: health.health_ratio,
            debt_repaid: payout.debt_repaid,
            fee_amount: payout.fee_amount,
            liquidator_share: fee_shares.liquidator,
            protocol_share: fee_shares.protocol,
            returned_to_user: payout.returned_to_user,
            bad_debt: payout.bad_debt,
        })
    }

    // the unpaid principal comes out of pool value, so every LP share is worth less.
    // new borrowing and LP exits stop until the owner resets the breaker.
    fn record_bad_debt(&mut self, user: AccountId, asset: AssetId, amount: Amount) -> Result<(), ProtocolError> {
        self.state.liquidity.write_down(amount)?;
        let aggregates = &mut self.state.aggregates;
        aggregates.total_bad_debt = aggregates.total_bad_debt.checked_add(amount)?;
        self.emit(EventPayload::BadDebt(BadDebtEvent { user, asset, amount }));

        if !self.state.liquidity.breaker.is_active() {
            let reason = format!("bad debt of {} on asset {}", amount, asset.0);
            self.state.liquidity.breaker.trip(self.current_block, reason.clone());
            self.emit(EventPayload::CircuitBreakerChanged(CircuitBreakerEvent { active: true, reason }));
        }
        warn!("bad debt {} from {:?} on asset {}", amount, user, asset.0);
        Ok(())
    }

    /// Register a liquidation justification. advisory only, nothing is executed.
    pub fn create_liquidation_request(
        &mut self,
        requester: AccountId,
        user: AccountId,
        asset: AssetId,
        justification_ref: &str,
        content_hash: ContentHash,
    ) -> Result<RequestId, ProtocolError> {
        self.transact("create_liquidation_request", |engine| {
            engine.ensure_enabled(Operation::CreateLiquidationRequest)?;

            let key = PositionKey::new(user, asset);
            let utilization = engine.state.liquidity.asset_utilization(asset);
            let position = engine
                .state
                .positions
                .active(&key)
                .ok_or(ProtocolError::PositionNotFound { user, asset })?;
            let accrued_fees =
                accrual::accrued_fees(position, utilization, engine.current_block, &engine.state.config.rate_curve)?;
            let snapshot = PositionSnapshot {
                collateral: position.collateral,
                borrowed: position.borrowed,
                asset_amount: position.asset_amount,
                accrued_fees,
            };

            let request = LiquidationRequest::new(
                requester,
                user,
                asset,
                engine.current_block,
                justification_ref.to_string(),
                content_hash,
                snapshot,
            );
            let deadline = request.deadline;
            let request_id = engine.state.requests.insert(request)?;

            engine.emit(EventPayload::LiquidationRequested(LiquidationRequestedEvent {
                request_id,
                requester,
                user,
                asset,
                deadline,
                content_hash,
            }));
            Ok(request_id)
        })
    }

    /// Health of an open position as of the current block. read-only.
    pub fn position_health(&self, user: AccountId, asset: AssetId) -> Result<HealthCheck, ProtocolError> {
        let key = PositionKey::new(user, asset);
        let position = self
            .state
            .positions
            .active(&key)
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        let utilization = self.state.liquidity.asset_utilization(asset);
        let debt = accrual::total_debt(position, utilization, self.current_block, &self.state.config.rate_curve)?;
        if debt.is_zero() {
            return Ok(risk::assess(Amount::zero(), debt, self.state.config.liquidation_threshold)?);
        }
        let value = self.quote_value(asset, position.asset_amount)?;
        Ok(risk::assess(value, debt, self.state.config.liquidation_threshold)?)
    }

    pub fn is_liquidatable(&self, user: AccountId, asset: AssetId) -> Result<bool, ProtocolError> {
        let key = PositionKey::new(user, asset);
        match self.state.positions.active(&key) {
            Some(p) if !p.asset_amount.is_zero() => Ok(self.position_health(user, asset)?.liquidatable),
            _ => Ok(false),
        }
    }

    /// Indices of the (user, asset) pairs that could be liquidated right now, ascending.
    /// positions that are inactive or cannot be priced are skipped. any other failure,
    /// such as debt accrual overflowing, is returned.
    pub fn find_liquidatable(&self, users: &[AccountId], assets: &[AssetId]) -> Result<Vec<usize>, ProtocolError> {
        if users.len() != assets.len() {
            return Err(ProtocolError::ArrayLengthMismatch {
                users: users.len(),
                assets: assets.len(),
            });
        }
        let mut flagged = Vec::new();
        for (i, (user, asset)) in users.iter().zip(assets).enumerate() {
            match self.is_liquidatable(*user, *asset) {
                Ok(true) => flagged.push(i),
                Ok(false) | Err(ProtocolError::InvalidValue) | Err(ProtocolError::PositionInactive { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(flagged)
    }
}
