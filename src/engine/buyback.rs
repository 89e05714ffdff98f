// 8.5 engine/buyback.rs: spends part of the buyback pool staking into the buyback
// asset through the default validator.

use super::core::Engine;
use super::results::ProtocolError;
use crate::buyback::BuybackRecord;
use crate::events::EventPayload;
use crate::guards::Operation;
use crate::services::{Host, StakeService};
use crate::types::{rao_to_wei, wei_to_rao, AccountId};
use log::info;

impl<H: Host> Engine<H> {
    /// Execute a buyback. callable by the owner and managers once the pool is
    /// above its threshold and the interval since the last run has elapsed.
    pub fn execute_buyback(&mut self, caller: AccountId) -> Result<BuybackRecord, ProtocolError> {
        self.transact("execute_buyback", |engine| {
            engine.ensure_enabled(Operation::Buyback)?;
            if !engine.state.config.is_manager(caller) {
                return Err(ProtocolError::Unauthorized(caller));
            }

            let now = engine.current_block;
            let params = engine.state.config.buyback.clone();
            let planned = engine.state.buyback.plan(now, &params)?;

            // only whole rao leave the pool
            let rao = wei_to_rao(planned);
            let spent = rao_to_wei(rao)?;
            if spent.is_zero() {
                return Err(ProtocolError::BuybackConditionsNotMet);
            }

            let validator = engine.state.config.default_validator;
            let alpha = engine
                .host
                .stake(validator, params.asset, rao)
                .map_err(|e| ProtocolError::StakeFailed(e.to_string()))?;

            let record = engine.state.buyback.record(now, spent, alpha)?;
            engine.emit(EventPayload::BuybackExecuted(record));
            info!("buyback spent {} for {} on asset {}", spent, alpha, params.asset.0);
            Ok(record)
        })
    }
}
