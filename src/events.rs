// 11.0: every committed state change produces an event. used for audit trails and for
// notifying off-chain schedulers. events of a rolled-back operation are never published.

use crate::buyback::BuybackRecord;
use crate::fees::{FeeCategory, FeeShares};
use crate::guards::Operation;
use crate::types::{
    AccountId, AlphaAmount, Amount, AssetId, BlockNumber, ContentHash, PositionId, Ratio, RequestId, ValidatorRef,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub block: BlockNumber,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, block: BlockNumber, payload: EventPayload) -> Self {
        Self { id, block, payload }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionOpened(PositionOpenedEvent),
    PositionClosed(PositionClosedEvent),
    PositionReduced(PositionReducedEvent),
    CollateralAdded(CollateralAddedEvent),

    // Liquidity events
    LiquidityAdded(LiquidityEvent),
    LiquidityRemoved(LiquidityEvent),
    RewardsClaimed(RewardsClaimedEvent),
    FeeDistributed(FeeDistributedEvent),

    // Risk events
    Liquidation(LiquidationEvent),
    LiquidationRequested(LiquidationRequestedEvent),
    BadDebt(BadDebtEvent),
    CircuitBreakerChanged(CircuitBreakerEvent),

    // Treasury
    BuybackExecuted(BuybackRecord),

    // Governance
    ConfigUpdated { by: AccountId },
    PauseChanged { paused: bool },
    PermissionChanged { operation: Operation, enabled: bool },
    HotkeyAssociated { account: AccountId, hotkey: ValidatorRef },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub user: AccountId,
    pub asset: AssetId,
    pub position_id: PositionId,
    pub collateral: Amount,
    pub borrowed: Amount,
    pub asset_amount: AlphaAmount,
    pub leverage: Ratio,
    pub entry_price: Amount,
    pub trading_fee: Amount,
    pub validator: ValidatorRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub user: AccountId,
    pub asset: AssetId,
    pub position_id: PositionId,
    pub proceeds: Amount,
    pub debt_repaid: Amount,
    pub borrow_fees: Amount,
    pub trading_fee: Amount,
    pub returned: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionReducedEvent {
    pub user: AccountId,
    pub asset: AssetId,
    pub position_id: PositionId,
    pub alpha_sold: AlphaAmount,
    pub proceeds: Amount,
    pub debt_repaid: Amount,
    pub returned: Amount,
    pub remaining_alpha: AlphaAmount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralAddedEvent {
    pub user: AccountId,
    pub asset: AssetId,
    pub amount: Amount,
    pub alpha_added: AlphaAmount,
    pub new_collateral: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityEvent {
    pub provider: AccountId,
    pub amount: Amount,
    pub shares: u128,
    pub total_stakes: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardKind {
    LiquidityProvider,
    Liquidator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsClaimedEvent {
    pub account: AccountId,
    pub kind: RewardKind,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeDistributedEvent {
    pub category: FeeCategory,
    pub shares: FeeShares,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub user: AccountId,
    pub liquidator: AccountId,
    pub asset: AssetId,
    pub position_id: PositionId,
    pub simulated_value: Amount,
    pub realized_value: Amount,
    pub debt_repaid: Amount,
    pub fee_amount: Amount,
    pub liquidator_share: Amount,
    pub returned_to_user: Amount,
    pub justification_ref: String,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationRequestedEvent {
    pub request_id: RequestId,
    pub requester: AccountId,
    pub user: AccountId,
    pub asset: AssetId,
    pub deadline: BlockNumber,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub user: AccountId,
    pub asset: AssetId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerEvent {
    pub active: bool,
    pub reason: String,
}
