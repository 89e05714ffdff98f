//! Leveraged positions and the ledger that owns them.
//!
//! One position per (user, asset). A position that is not active carries no
//! value at all: every numeric field is zero and no validator is recorded.
//! Closing or liquidating never removes the entry, it clears it.
//!
//! The validator recorded at open is the one the stake actually went through.
//! Every later unstake of the position is routed back through it.

use crate::journal::{Journaled, JournaledMap};
use crate::math::{self, MathError};
use crate::types::{AccountId, AlphaAmount, Amount, AssetId, BlockNumber, PositionId, Ratio, ValidatorRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub user: AccountId,
    pub asset: AssetId,
}

impl PositionKey {
    pub fn new(user: AccountId, asset: AssetId) -> Self {
        Self { user, asset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub collateral: Amount,
    pub borrowed: Amount,
    pub asset_amount: AlphaAmount,
    pub leverage: Ratio,
    /// Spot price of one whole alpha at open, in wei.
    pub entry_price: Amount,
    pub last_update_block: BlockNumber,
    /// Borrow fees settled into the position but not yet paid.
    pub accrued_fees: Amount,
    pub is_active: bool,
    pub validator: ValidatorRef,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: PositionId,
        collateral: Amount,
        borrowed: Amount,
        asset_amount: AlphaAmount,
        leverage: Ratio,
        entry_price: Amount,
        block: BlockNumber,
        validator: ValidatorRef,
    ) -> Self {
        Self {
            id,
            collateral,
            borrowed,
            asset_amount,
            leverage,
            entry_price,
            last_update_block: block,
            accrued_fees: Amount::zero(),
            is_active: true,
            validator,
        }
    }

    /// The cleared form of a position. keeps only its id.
    pub fn inactive(id: PositionId) -> Self {
        Self {
            id,
            collateral: Amount::zero(),
            borrowed: Amount::zero(),
            asset_amount: AlphaAmount::zero(),
            leverage: Ratio::ZERO,
            entry_price: Amount::zero(),
            last_update_block: BlockNumber(0),
            accrued_fees: Amount::zero(),
            is_active: false,
            validator: ValidatorRef::UNSET,
        }
    }

    pub fn clear(&mut self) {
        *self = Position::inactive(self.id);
    }

    pub fn is_clear(&self) -> bool {
        !self.is_active && *self == Position::inactive(self.id)
    }
}

/// The proportional piece of a position carved off by a partial close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSlice {
    pub asset_amount: AlphaAmount,
    pub collateral: Amount,
    pub borrowed: Amount,
    pub fees: Amount,
}

/// Split `alpha` out of a position whose fees are already settled up to `total_fees`.
/// Closing the whole holding returns everything so no dust is left behind.
pub fn split_position(position: &Position, alpha: AlphaAmount, total_fees: Amount) -> Result<PositionSlice, MathError> {
    let held = position.asset_amount.value();
    if alpha.value() >= held {
        return Ok(PositionSlice {
            asset_amount: position.asset_amount,
            collateral: position.collateral,
            borrowed: position.borrowed,
            fees: total_fees,
        });
    }

    let part = |whole: Amount| -> Result<Amount, MathError> {
        math::mul_div(whole.value(), alpha.value(), held).map(Amount::new)
    };

    Ok(PositionSlice {
        asset_amount: alpha,
        collateral: part(position.collateral)?,
        borrowed: part(position.borrowed)?,
        fees: part(total_fees)?,
    })
}

/// 4.x: canonical store of every position, keyed by (user, asset).
#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    positions: JournaledMap<PositionKey, Position>,
    // ids handed out so far. the next one is this plus one
    issued: u64,
    saved_issued: Option<u64>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> Result<PositionId, MathError> {
        self.issued = math::increment(self.issued)?;
        Ok(PositionId(self.issued))
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn get_mut(&mut self, key: &PositionKey) -> Option<&mut Position> {
        self.positions.get_mut(key)
    }

    pub fn active(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key).filter(|p| p.is_active)
    }

    pub fn insert(&mut self, key: PositionKey, position: Position) {
        self.positions.insert(key, position);
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (&PositionKey, &Position)> {
        self.positions.iter().filter(|(_, p)| p.is_active)
    }

    pub fn active_count(&self) -> usize {
        self.iter_active().count()
    }
}

impl Journaled for PositionLedger {
    fn begin(&mut self) {
        self.positions.begin();
        self.saved_issued = Some(self.issued);
    }

    fn commit(&mut self) {
        self.positions.commit();
        self.saved_issued = None;
    }

    fn rollback(&mut self) {
        self.positions.rollback();
        if let Some(issued) = self.saved_issued.take() {
            self.issued = issued;
        }
    }
}
