// 8.0 engine/core.rs: main engine. owns the protocol state and the host, and runs
// every mutating operation as one atomic transaction.

use super::config::EngineConfig;
use super::results::ProtocolError;
use crate::accrual;
use crate::buyback::BuybackModule;
use crate::config::ProtocolConfig;
use crate::events::{Event, EventId, EventPayload, FeeDistributedEvent};
use crate::fees::{FeeCategory, FeeDistributor, FeeShares};
use crate::guards::{Cooldowns, Operation};
use crate::journal::{Journaled, JournaledMap};
use crate::liquidation::{LiquidatorRegistry, RequestBook};
use crate::liquidity::LiquidityPool;
use crate::math;
use crate::position::{PositionKey, PositionLedger};
use crate::services::{Host, PriceOracle};
use crate::tiers::Tier;
use crate::types::{rao_to_wei, AccountId, AlphaAmount, Amount, AssetId, BlockNumber, Ratio, ValidatorRef};
use log::{debug, warn};

/// Protocol-wide running totals.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub total_collateral: Amount,
    pub total_volume: Amount,
    pub total_trades: u64,
    pub total_liquidations: u64,
    pub total_liquidated_value: Amount,
    pub total_bad_debt: Amount,
}

/** 8.1: every piece of canonical state. keyed parts journal their own writes; the
small scalar parts are saved whole when a transaction begins */
#[derive(Debug, Clone, Default)]
pub struct ProtocolState {
    pub(super) config: ProtocolConfig,
    pub(super) positions: PositionLedger,
    pub(super) liquidity: LiquidityPool,
    pub(super) fees: FeeDistributor,
    pub(super) buyback: BuybackModule,
    pub(super) requests: RequestBook,
    pub(super) liquidators: LiquidatorRegistry,
    pub(super) user_cooldowns: Cooldowns,
    pub(super) lp_cooldowns: Cooldowns,
    pub(super) hotkeys: JournaledMap<AccountId, ValidatorRef>,
    pub(super) volume: JournaledMap<AccountId, Amount>,
    pub(super) aggregates: Aggregates,
    saved: Option<Box<Scalars>>,
}

#[derive(Debug, Clone)]
struct Scalars {
    config: ProtocolConfig,
    fees: FeeDistributor,
    buyback: BuybackModule,
    aggregates: Aggregates,
}

impl Journaled for ProtocolState {
    fn begin(&mut self) {
        self.saved = Some(Box::new(Scalars {
            config: self.config.clone(),
            fees: self.fees.clone(),
            buyback: self.buyback.clone(),
            aggregates: self.aggregates.clone(),
        }));
        self.positions.begin();
        self.liquidity.begin();
        self.requests.begin();
        self.liquidators.begin();
        self.user_cooldowns.begin();
        self.lp_cooldowns.begin();
        self.hotkeys.begin();
        self.volume.begin();
    }

    fn commit(&mut self) {
        self.saved = None;
        self.positions.commit();
        self.liquidity.commit();
        self.requests.commit();
        self.liquidators.commit();
        self.user_cooldowns.commit();
        self.lp_cooldowns.commit();
        self.hotkeys.commit();
        self.volume.commit();
    }

    fn rollback(&mut self) {
        if let Some(saved) = self.saved.take() {
            let Scalars {
                config,
                fees,
                buyback,
                aggregates,
            } = *saved;
            self.config = config;
            self.fees = fees;
            self.buyback = buyback;
            self.aggregates = aggregates;
        }
        self.positions.rollback();
        self.liquidity.rollback();
        self.requests.rollback();
        self.liquidators.rollback();
        self.user_cooldowns.rollback();
        self.lp_cooldowns.rollback();
        self.hotkeys.rollback();
        self.volume.rollback();
    }
}

/** 8.2: the engine. generic over the host that provides prices, staking and transfers */
#[derive(Debug)]
pub struct Engine<H: Host> {
    pub(super) config: EngineConfig,
    pub(super) state: ProtocolState,
    pub(super) host: H,
    pub(super) events: Vec<Event>,
    pub(super) pending: Vec<EventPayload>,
    pub(super) next_event_id: u64,
    pub(super) current_block: BlockNumber,
}

impl<H: Host> Engine<H> {
    pub fn new(protocol: ProtocolConfig, host: H, config: EngineConfig) -> Result<Self, ProtocolError> {
        protocol.validate()?;
        Ok(Self {
            config,
            state: ProtocolState {
                config: protocol,
                positions: PositionLedger::new(),
                ..ProtocolState::default()
            },
            host,
            events: Vec::new(),
            pending: Vec::new(),
            next_event_id: 1,
            current_block: BlockNumber(0),
        })
    }

    pub fn block(&self) -> BlockNumber {
        self.current_block
    }

    pub fn set_block(&mut self, block: BlockNumber) {
        self.current_block = block;
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.current_block = self.current_block.plus(blocks);
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    /// Run `op` atomically. on error every state write is undone, queued events are
    /// dropped and the host rolls back its own side effects.
    pub(super) fn transact<T>(
        &mut self,
        name: &'static str,
        op: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        self.state.begin();
        self.host.begin();

        match op(self) {
            Ok(value) => {
                self.state.commit();
                self.host.commit();
                self.publish_pending();
                Ok(value)
            }
            Err(err) => {
                self.state.rollback();
                self.pending.clear();
                self.host.rollback();
                warn!("{} rolled back at {}: {}", name, self.current_block, err);
                Err(err)
            }
        }
    }

    pub(super) fn emit(&mut self, payload: EventPayload) {
        self.pending.push(payload);
    }

    fn publish_pending(&mut self) {
        for payload in std::mem::take(&mut self.pending) {
            let event = Event::new(EventId(self.next_event_id), self.current_block, payload);
            self.next_event_id = self.next_event_id.saturating_add(1);

            if self.config.log_events {
                debug!("[event {}] {:?}", event.id.0, event.payload);
            }

            self.events.push(event);
        }

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    /// Pause and permission-bit check shared by every operation.
    pub(super) fn ensure_enabled(&self, op: Operation) -> Result<(), ProtocolError> {
        if self.state.config.paused && !op.allowed_while_paused() {
            return Err(ProtocolError::ProtocolPaused);
        }
        if !self.state.config.is_permitted(op) {
            return Err(ProtocolError::FunctionNotPermitted(op));
        }
        Ok(())
    }

    pub(super) fn ensure_user_cooldown(&self, who: AccountId) -> Result<(), ProtocolError> {
        let cooldown = self.state.config.user_cooldown_blocks;
        match self.state.user_cooldowns.blocked_until(who, self.current_block, cooldown) {
            Some(until) => Err(ProtocolError::UserCooldownActive { until }),
            None => Ok(()),
        }
    }

    pub(super) fn ensure_lp_cooldown(&self, who: AccountId) -> Result<(), ProtocolError> {
        let cooldown = self.state.config.lp_cooldown_blocks;
        match self.state.lp_cooldowns.blocked_until(who, self.current_block, cooldown) {
            Some(until) => Err(ProtocolError::LpCooldownActive { until }),
            None => Ok(()),
        }
    }

    pub(super) fn ensure_owner(&self, caller: AccountId) -> Result<(), ProtocolError> {
        if caller != self.state.config.owner {
            return Err(ProtocolError::Unauthorized(caller));
        }
        Ok(())
    }

    pub(super) fn tier_for(&self, account: AccountId) -> Tier {
        let metric = self.state.volume.get(&account).copied().unwrap_or_default();
        let table = &self.state.config.tiers;
        *table.get(table.tier_for(metric))
    }

    pub(super) fn record_volume(&mut self, account: AccountId, amount: Amount) -> Result<(), ProtocolError> {
        let volume = self.state.volume.get_or_default(account);
        *volume = volume.checked_add(amount)?;
        self.state.aggregates.total_volume = self.state.aggregates.total_volume.checked_add(amount)?;
        self.state.aggregates.total_trades = math::increment(self.state.aggregates.total_trades)?;
        Ok(())
    }

    /// Fold accrued borrow fees into the stored position. returns the settled total.
    pub(super) fn settle_position_fees(&mut self, key: &PositionKey) -> Result<Amount, ProtocolError> {
        let utilization = self.state.liquidity.asset_utilization(key.asset);
        let block = self.current_block;
        let curve = self.state.config.rate_curve.clone();
        let position = self
            .state
            .positions
            .get_mut(key)
            .filter(|p| p.is_active)
            .ok_or(ProtocolError::PositionInactive {
                user: key.user,
                asset: key.asset,
            })?;
        Ok(accrual::settle(position, utilization, block, &curve)?)
    }

    /// Simulated value of `alpha` in wei. a failed or zero quote is `InvalidValue`.
    pub(super) fn quote_value(&self, asset: AssetId, alpha: AlphaAmount) -> Result<Amount, ProtocolError> {
        let rao = self.host.quote(asset, alpha).map_err(|_| ProtocolError::InvalidValue)?;
        if rao.is_zero() {
            return Err(ProtocolError::InvalidValue);
        }
        Ok(rao_to_wei(rao)?)
    }

    /// Split a fee and credit every cut. the protocol cut also funds the buyback pool.
    pub(super) fn distribute_fee(&mut self, category: FeeCategory, amount: Amount) -> Result<FeeShares, ProtocolError> {
        if amount.is_zero() {
            return Ok(FeeShares::zero());
        }
        let shares = self
            .state
            .fees
            .distribute(category, amount, &self.state.config.fee_schedule)?;
        self.state.buyback.credit(shares.protocol)?;
        self.emit(EventPayload::FeeDistributed(FeeDistributedEvent { category, shares }));
        Ok(shares)
    }

    /// Trading fee rate after the account's tier discount.
    pub(super) fn trading_fee_rate(&self, account: AccountId) -> Result<Ratio, ProtocolError> {
        let discount = self.tier_for(account).fee_discount;
        let rate = self.state.config.trading_fee_rate.apply(discount.complement().value())?;
        Ok(Ratio::new(rate))
    }
}
