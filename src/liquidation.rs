//! Liquidation payout waterfall, review requests and liquidator records.
//!
//! A liquidation redeems the whole alpha holding and pays out the realized
//! proceeds in strict order:
//!
//! 1. debt (principal first, then accrued fees) up to `min(proceeds, debt)`
//! 2. a liquidation fee on whatever remains, capped at the remainder
//! 3. everything left back to the position owner
//!
//! Principal the proceeds could not cover is bad debt.
//!
//! Review requests are advisory bookkeeping. They never execute anything by
//! themselves and go stale `REVIEW_WINDOW_BLOCKS` after submission; nothing
//! deletes them, so every use checks expiry first.

use crate::engine::ProtocolError;
use crate::fees::{RewardAccumulator, RewardCheckpoint};
use crate::journal::{Journaled, JournaledMap};
use crate::math::{self, MathError};
use crate::position::PositionKey;
use crate::types::{AccountId, AlphaAmount, Amount, AssetId, BlockNumber, ContentHash, Ratio, RequestId, REVIEW_WINDOW_BLOCKS};
use serde::{Deserialize, Serialize};

/// How realized proceeds were paid out. the three payouts always sum to `proceeds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waterfall {
    pub proceeds: Amount,
    pub total_debt: Amount,
    pub debt_repaid: Amount,
    pub principal_repaid: Amount,
    pub fees_repaid: Amount,
    pub fee_amount: Amount,
    pub returned_to_user: Amount,
    pub bad_debt: Amount,
}

pub fn waterfall(proceeds: Amount, borrowed: Amount, accrued_fees: Amount, fee_rate: Ratio) -> Result<Waterfall, MathError> {
    let total_debt = borrowed.checked_add(accrued_fees)?;
    let debt_repaid = proceeds.min(total_debt);
    let principal_repaid = debt_repaid.min(borrowed);
    let fees_repaid = debt_repaid.checked_sub(principal_repaid)?;

    let remainder = proceeds.checked_sub(debt_repaid)?;
    let fee_amount = remainder.mul_ratio(fee_rate)?.min(remainder);
    let returned_to_user = remainder.checked_sub(fee_amount)?;

    Ok(Waterfall {
        proceeds,
        total_debt,
        debt_repaid,
        principal_repaid,
        fees_repaid,
        fee_amount,
        returned_to_user,
        bad_debt: borrowed.checked_sub(principal_repaid)?,
    })
}

/// Snapshot of the position when a review was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub collateral: Amount,
    pub borrowed: Amount,
    pub asset_amount: AlphaAmount,
    pub accrued_fees: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRequest {
    pub id: RequestId,
    pub requester: AccountId,
    pub user: AccountId,
    pub asset: AssetId,
    pub request_block: BlockNumber,
    pub deadline: BlockNumber,
    pub justification_ref: String,
    pub content_hash: ContentHash,
    pub is_processed: bool,
    pub snapshot: PositionSnapshot,
}

impl LiquidationRequest {
    pub fn new(
        requester: AccountId,
        user: AccountId,
        asset: AssetId,
        block: BlockNumber,
        justification_ref: String,
        content_hash: ContentHash,
        snapshot: PositionSnapshot,
    ) -> Self {
        Self {
            id: RequestId::derive(requester, user, asset, block),
            requester,
            user,
            asset,
            request_block: block,
            deadline: block.plus(REVIEW_WINDOW_BLOCKS),
            justification_ref,
            content_hash,
            is_processed: false,
            snapshot,
        }
    }

    pub fn is_expired(&self, now: BlockNumber) -> bool {
        now > self.deadline
    }

    pub fn is_live(&self, now: BlockNumber) -> bool {
        !self.is_processed && !self.is_expired(now)
    }

    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.user, self.asset)
    }
}

/// Every review request ever submitted, plus the latest one per position.
#[derive(Debug, Clone, Default)]
pub struct RequestBook {
    requests: JournaledMap<RequestId, LiquidationRequest>,
    latest: JournaledMap<PositionKey, RequestId>,
}

impl RequestBook {
    pub fn insert(&mut self, request: LiquidationRequest) -> Result<RequestId, ProtocolError> {
        if self.requests.contains_key(&request.id) {
            return Err(ProtocolError::DuplicateRequest);
        }
        let id = request.id;
        self.latest.insert(request.key(), id);
        self.requests.insert(id, request);
        Ok(id)
    }

    pub fn get(&self, id: &RequestId) -> Option<&LiquidationRequest> {
        self.requests.get(id)
    }

    /// A request that may still be acted on. expired and processed ones are rejected.
    pub fn live(&self, id: &RequestId, now: BlockNumber) -> Result<&LiquidationRequest, ProtocolError> {
        let request = self.requests.get(id).ok_or(ProtocolError::RequestNotFound)?;
        if request.is_processed {
            return Err(ProtocolError::RequestAlreadyProcessed);
        }
        if request.is_expired(now) {
            return Err(ProtocolError::RequestExpired {
                deadline: request.deadline,
            });
        }
        Ok(request)
    }

    pub fn live_for(&self, key: &PositionKey, now: BlockNumber) -> Option<RequestId> {
        let id = self.latest.get(key)?;
        self.requests.get(id).filter(|r| r.is_live(now)).map(|r| r.id)
    }

    pub fn mark_processed(&mut self, id: &RequestId) -> Result<(), ProtocolError> {
        let request = self.requests.get_mut(id).ok_or(ProtocolError::RequestNotFound)?;
        request.is_processed = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Journaled for RequestBook {
    fn begin(&mut self) {
        self.requests.begin();
        self.latest.begin();
    }

    fn commit(&mut self) {
        self.requests.commit();
        self.latest.commit();
    }

    fn rollback(&mut self) {
        self.requests.rollback();
        self.latest.rollback();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidatorRecord {
    /// Successful liquidations. doubles as the share count in the liquidator accumulator.
    pub score: u64,
    pub fees_earned: Amount,
    pub value_liquidated: Amount,
    pub last_liquidation: Option<BlockNumber>,
    pub rewards: RewardCheckpoint,
}

#[derive(Debug, Clone, Default)]
pub struct LiquidatorRegistry {
    records: JournaledMap<AccountId, LiquidatorRecord>,
}

impl LiquidatorRegistry {
    pub fn get(&self, who: AccountId) -> Option<&LiquidatorRecord> {
        self.records.get(&who)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, &LiquidatorRecord)> {
        self.records.iter()
    }

    pub fn score(&self, who: AccountId) -> u64 {
        self.records.get(&who).map(|r| r.score).unwrap_or(0)
    }

    pub fn record_success(
        &mut self,
        who: AccountId,
        fee: Amount,
        value: Amount,
        block: BlockNumber,
        acc: &mut RewardAccumulator,
    ) -> Result<(), MathError> {
        let record = self.records.get_or_default(who);
        let score = math::increment(record.score)?;
        record.rewards.set_shares(score as u128, acc)?;
        record.score = score;
        record.fees_earned = record.fees_earned.checked_add(fee)?;
        record.value_liquidated = record.value_liquidated.checked_add(value)?;
        record.last_liquidation = Some(block);
        Ok(())
    }

    pub fn claimable(&self, who: AccountId, acc: &RewardAccumulator) -> Result<Amount, MathError> {
        match self.records.get(&who) {
            Some(record) => record.rewards.claimable(acc),
            None => Ok(Amount::zero()),
        }
    }

    pub fn take_rewards(&mut self, who: AccountId, acc: &RewardAccumulator) -> Result<Amount, MathError> {
        match self.records.get_mut(&who) {
            Some(record) => record.rewards.take_pending(acc),
            None => Ok(Amount::zero()),
        }
    }
}

impl Journaled for LiquidatorRegistry {
    fn begin(&mut self) {
        self.records.begin();
    }

    fn commit(&mut self) {
        self.records.commit();
    }

    fn rollback(&mut self) {
        self.records.rollback();
    }
}
