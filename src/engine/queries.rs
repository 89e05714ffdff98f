// 8.7 engine/queries.rs: read-only getters. nothing here mutates state or calls
// the stake service.

use super::core::{Aggregates, Engine};
use super::results::{ProtocolError, ProtocolStats};
use crate::accrual;
use crate::buyback::BuybackModule;
use crate::config::ProtocolConfig;
use crate::contribution::{compute_weights, ContributionWeight, Participant};
use crate::fees::FeeDistributor;
use crate::guards::Operation;
use crate::liquidation::{LiquidationRequest, LiquidatorRecord};
use crate::liquidity::{AssetPool, LiquidityProvider};
use crate::position::{Position, PositionKey};
use crate::risk;
use crate::services::Host;
use crate::tiers::Tier;
use crate::types::{AccountId, Amount, AssetId, Ratio, RequestId, ValidatorRef};

impl<H: Host> Engine<H> {
    pub fn config(&self) -> &ProtocolConfig {
        &self.state.config
    }

    pub fn stats(&self) -> ProtocolStats {
        let Aggregates {
            total_collateral,
            total_volume,
            total_trades,
            total_liquidations,
            total_liquidated_value,
            total_bad_debt,
        } = self.state.aggregates.clone();

        ProtocolStats {
            total_collateral,
            total_borrowed: self.state.liquidity.total_borrowed(),
            total_volume,
            total_trades,
            protocol_fees: self.state.fees.protocol_fees,
            buyback_pool: self.state.buyback.pool,
            total_lp_stakes: self.state.liquidity.total_stakes(),
            total_lp_shares: self.state.liquidity.total_shares(),
            acc_lp_fees_per_share: self.state.fees.acc_lp_fees_per_share(),
            open_positions: self.state.positions.active_count(),
            total_liquidations,
            total_liquidated_value,
            total_bad_debt,
            circuit_breaker_active: self.state.liquidity.breaker.is_active(),
            paused: self.state.config.paused,
        }
    }

    /// The stored position, active or cleared.
    pub fn position(&self, user: AccountId, asset: AssetId) -> Option<&Position> {
        self.state.positions.get(&PositionKey::new(user, asset))
    }

    /// Borrow fees owed as of the current block, stored plus pending.
    pub fn accrued_fees(&self, user: AccountId, asset: AssetId) -> Result<Amount, ProtocolError> {
        let position = self
            .state
            .positions
            .active(&PositionKey::new(user, asset))
            .ok_or(ProtocolError::PositionInactive { user, asset })?;
        let utilization = self.state.liquidity.asset_utilization(asset);
        Ok(accrual::accrued_fees(
            position,
            utilization,
            self.current_block,
            &self.state.config.rate_curve,
        )?)
    }

    pub fn lp(&self, provider: AccountId) -> Option<&LiquidityProvider> {
        self.state.liquidity.provider(provider)
    }

    pub fn pending_lp_rewards(&self, provider: AccountId) -> Result<Amount, ProtocolError> {
        self.state
            .liquidity
            .claimable_rewards(provider, &self.state.fees.lp_rewards)
    }

    pub fn pending_liquidator_rewards(&self, liquidator: AccountId) -> Result<Amount, ProtocolError> {
        Ok(self
            .state
            .liquidators
            .claimable(liquidator, &self.state.fees.liquidator_rewards)?)
    }

    pub fn liquidator(&self, liquidator: AccountId) -> Option<&LiquidatorRecord> {
        self.state.liquidators.get(liquidator)
    }

    pub fn request(&self, id: &RequestId) -> Option<&LiquidationRequest> {
        self.state.requests.get(id)
    }

    pub fn asset_pool(&self, asset: AssetId) -> Option<&AssetPool> {
        self.state.liquidity.asset(asset)
    }

    pub fn utilization(&self) -> Ratio {
        self.state.liquidity.utilization()
    }

    pub fn asset_utilization(&self, asset: AssetId) -> Ratio {
        self.state.liquidity.asset_utilization(asset)
    }

    /// Current per-360-block borrow rate for `asset`.
    pub fn borrow_rate(&self, asset: AssetId) -> Result<Ratio, ProtocolError> {
        let utilization = self.state.liquidity.asset_utilization(asset);
        Ok(risk::dynamic_borrow_rate_per_360(
            utilization,
            &self.state.config.rate_curve,
        )?)
    }

    pub fn tier_of(&self, account: AccountId) -> Tier {
        self.tier_for(account)
    }

    pub fn account_volume(&self, account: AccountId) -> Amount {
        self.state.volume.get(&account).copied().unwrap_or_default()
    }

    pub fn fee_distributor(&self) -> &FeeDistributor {
        &self.state.fees
    }

    pub fn buyback(&self) -> &BuybackModule {
        &self.state.buyback
    }

    pub fn is_paused(&self) -> bool {
        self.state.config.paused
    }

    /// What a provider could withdraw at the current value per share.
    pub fn lp_value(&self, provider: AccountId) -> Result<Amount, ProtocolError> {
        Ok(self.state.liquidity.value_of(provider)?)
    }

    pub fn circuit_breaker_active(&self) -> bool {
        self.state.liquidity.breaker.is_active()
    }

    pub fn is_permitted(&self, operation: Operation) -> bool {
        self.state.config.is_permitted(operation)
    }

    pub fn hotkey(&self, account: AccountId) -> Option<ValidatorRef> {
        self.state.hotkeys.get(&account).copied()
    }

    /// Weights for every account with an associated hotkey.
    pub fn contribution_weights(&self) -> Vec<ContributionWeight> {
        let participants: Vec<Participant> = self
            .state
            .hotkeys
            .iter()
            .map(|(account, hotkey)| Participant {
                account: *account,
                hotkey: *hotkey,
                lp_stake: self.state.liquidity.value_of(*account).unwrap_or_default(),
                liquidator_score: self.state.liquidators.score(*account),
            })
            .collect();
        compute_weights(&participants)
    }
}
