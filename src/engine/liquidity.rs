//! LP deposits, withdrawals and reward claims.

use super::core::Engine;
use super::results::ProtocolError;
use crate::events::{EventPayload, LiquidityEvent, RewardKind, RewardsClaimedEvent};
use crate::guards::Operation;
use crate::services::{Bank, Host};
use crate::types::{AccountId, Amount};
use log::info;

impl<H: Host> Engine<H> {
    /// Deposit `amount` of LP capital. returns the shares minted.
    pub fn add_liquidity(&mut self, provider: AccountId, amount: Amount) -> Result<u128, ProtocolError> {
        self.transact("add_liquidity", |engine| {
            engine.ensure_enabled(Operation::AddLiquidity)?;
            engine.ensure_lp_cooldown(provider)?;

            let block = engine.current_block;
            let min_deposit = engine.state.config.lp_min_deposit;
            let state = &mut engine.state;
            let minted = state
                .liquidity
                .deposit(provider, amount, min_deposit, block, &mut state.fees.lp_rewards)?;
            state.lp_cooldowns.touch(provider, block);

            let total_stakes = engine.state.liquidity.total_stakes();
            engine.emit(EventPayload::LiquidityAdded(LiquidityEvent {
                provider,
                amount,
                shares: minted,
                total_stakes,
            }));
            info!("{:?} added {} of liquidity, pool now {}", provider, amount, total_stakes);
            Ok(minted)
        })
    }

    /// Withdraw `amount` of LP capital. returns the shares burned.
    pub fn remove_liquidity(&mut self, provider: AccountId, amount: Amount) -> Result<u128, ProtocolError> {
        self.transact("remove_liquidity", |engine| {
            engine.ensure_enabled(Operation::RemoveLiquidity)?;
            engine.ensure_lp_cooldown(provider)?;

            let block = engine.current_block;
            let max_utilization = engine.state.config.max_utilization;
            let min_liquidity = engine.state.config.min_liquidity_threshold;
            let state = &mut engine.state;
            let burned = state.liquidity.withdraw(
                provider,
                amount,
                max_utilization,
                min_liquidity,
                &mut state.fees.lp_rewards,
            )?;
            state.lp_cooldowns.touch(provider, block);

            engine
                .host
                .transfer(provider, amount)
                .map_err(|e| ProtocolError::TransferFailed(e.to_string()))?;

            let total_stakes = engine.state.liquidity.total_stakes();
            engine.emit(EventPayload::LiquidityRemoved(LiquidityEvent {
                provider,
                amount,
                shares: burned,
                total_stakes,
            }));
            info!("{:?} removed {} of liquidity, pool now {}", provider, amount, total_stakes);
            Ok(burned)
        })
    }

    /// Pay out the provider's accumulated share of LP fees.
    pub fn claim_lp_rewards(&mut self, provider: AccountId) -> Result<Amount, ProtocolError> {
        self.transact("claim_lp_rewards", |engine| {
            engine.ensure_enabled(Operation::ClaimRewards)?;
            let state = &mut engine.state;
            let amount = state.liquidity.take_rewards(provider, &state.fees.lp_rewards)?;
            engine.pay_rewards(provider, RewardKind::LiquidityProvider, amount)
        })
    }

    /// Pay out the liquidator's score-weighted share of trading and borrowing fees.
    pub fn claim_liquidator_rewards(&mut self, liquidator: AccountId) -> Result<Amount, ProtocolError> {
        self.transact("claim_liquidator_rewards", |engine| {
            engine.ensure_enabled(Operation::ClaimRewards)?;
            let state = &mut engine.state;
            let amount = state
                .liquidators
                .take_rewards(liquidator, &state.fees.liquidator_rewards)?;
            engine.pay_rewards(liquidator, RewardKind::Liquidator, amount)
        })
    }

    fn pay_rewards(&mut self, account: AccountId, kind: RewardKind, amount: Amount) -> Result<Amount, ProtocolError> {
        if amount.is_zero() {
            return Err(ProtocolError::NothingToClaim);
        }
        self.host
            .transfer(account, amount)
            .map_err(|e| ProtocolError::TransferFailed(e.to_string()))?;
        self.emit(EventPayload::RewardsClaimed(RewardsClaimedEvent { account, kind, amount }));
        info!("{:?} claimed {} of {:?} rewards", account, amount, kind);
        Ok(amount)
    }
}
