// 6.0 guards.rs: everything that can refuse an operation before it touches state.
// per-function permission bits and the pause flag are configuration; cooldowns and
// the liquidity circuit breaker are runtime state owned by the engine.

use crate::journal::{Journaled, JournaledMap};
use crate::types::{AccountId, BlockNumber};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally callable operations. the discriminant is the bit index in `PermissionSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    OpenPosition = 0,
    ClosePosition = 1,
    ReducePosition = 2,
    AddCollateral = 3,
    AddLiquidity = 4,
    RemoveLiquidity = 5,
    Liquidate = 6,
    CreateLiquidationRequest = 7,
    ClaimRewards = 8,
    Buyback = 9,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::OpenPosition,
        Operation::ClosePosition,
        Operation::ReducePosition,
        Operation::AddCollateral,
        Operation::AddLiquidity,
        Operation::RemoveLiquidity,
        Operation::Liquidate,
        Operation::CreateLiquidationRequest,
        Operation::ClaimRewards,
        Operation::Buyback,
    ];

    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> Option<Operation> {
        Self::ALL.get(id as usize).copied()
    }

    /// Operations that keep running while the protocol is paused.
    pub fn allowed_while_paused(&self) -> bool {
        matches!(self, Operation::Liquidate)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::OpenPosition => "open_position",
            Operation::ClosePosition => "close_position",
            Operation::ReducePosition => "reduce_position",
            Operation::AddCollateral => "add_collateral",
            Operation::AddLiquidity => "add_liquidity",
            Operation::RemoveLiquidity => "remove_liquidity",
            Operation::Liquidate => "liquidate",
            Operation::CreateLiquidationRequest => "create_liquidation_request",
            Operation::ClaimRewards => "claim_rewards",
            Operation::Buyback => "buyback",
        };
        write!(f, "{}", name)
    }
}

/// 6.1: function-permission bitmap. bit `op.id()` set means the operation is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(u32);

impl Default for PermissionSet {
    fn default() -> Self {
        Self::all()
    }
}

impl PermissionSet {
    pub fn all() -> Self {
        Self((1u32 << Operation::ALL.len()) - 1)
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_permitted(&self, op: Operation) -> bool {
        self.0 & (1 << op.id()) != 0
    }

    pub fn set(&mut self, op: Operation, enabled: bool) {
        if enabled {
            self.0 |= 1 << op.id();
        } else {
            self.0 &= !(1 << op.id());
        }
    }
}

/// 6.2: last state-changing block per address. one instance per cadence (users, LPs).
#[derive(Debug, Clone, Default)]
pub struct Cooldowns {
    last_action: JournaledMap<AccountId, BlockNumber>,
}

impl Cooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// First block at which `who` may act again, if it is still cooling down.
    pub fn blocked_until(&self, who: AccountId, now: BlockNumber, cooldown_blocks: u64) -> Option<BlockNumber> {
        if cooldown_blocks == 0 {
            return None;
        }
        let until = self.last_action.get(&who)?.plus(cooldown_blocks);
        (now < until).then_some(until)
    }

    pub fn touch(&mut self, who: AccountId, now: BlockNumber) {
        self.last_action.insert(who, now);
    }

    pub fn last_action(&self, who: AccountId) -> Option<BlockNumber> {
        self.last_action.get(&who).copied()
    }
}

impl Journaled for Cooldowns {
    fn begin(&mut self) {
        self.last_action.begin();
    }

    fn commit(&mut self) {
        self.last_action.commit();
    }

    fn rollback(&mut self) {
        self.last_action.rollback();
    }
}

/// 6.3: liquidity circuit breaker. while active, new borrowing and LP withdrawals stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    active: bool,
    tripped_at: Option<BlockNumber>,
    reason: Option<String>,
}

impl CircuitBreaker {
    pub fn trip(&mut self, block: BlockNumber, reason: impl Into<String>) {
        self.active = true;
        self.tripped_at = Some(block);
        self.reason = Some(reason.into());
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn tripped_at(&self) -> Option<BlockNumber> {
        self.tripped_at
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}
