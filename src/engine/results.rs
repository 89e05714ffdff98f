// 8.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::guards::Operation;
use crate::math::MathError;
use crate::types::{AccountId, AlphaAmount, Amount, AssetId, BlockNumber, PositionId, Ratio};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseResult {
    pub position_id: PositionId,
    pub alpha_sold: AlphaAmount,
    pub proceeds: Amount,
    pub debt_repaid: Amount,
    pub borrow_fees: Amount,
    pub trading_fee: Amount,
    pub returned: Amount,
    /// False when a partial close left part of the position open.
    pub fully_closed: bool,
}

/// Breakdown of one liquidation. `debt_repaid + fee_amount + returned_to_user == realized_value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResult {
    pub user: AccountId,
    pub asset: AssetId,
    pub position_id: PositionId,
    pub simulated_value: Amount,
    pub realized_value: Amount,
    pub total_debt: Amount,
    pub health_ratio: Ratio,
    pub debt_repaid: Amount,
    pub fee_amount: Amount,
    pub liquidator_share: Amount,
    pub protocol_share: Amount,
    pub returned_to_user: Amount,
    pub bad_debt: Amount,
}

/// Aggregate counters exposed to tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub total_collateral: Amount,
    pub total_borrowed: Amount,
    pub total_volume: Amount,
    pub total_trades: u64,
    pub protocol_fees: Amount,
    pub buyback_pool: Amount,
    pub total_lp_stakes: Amount,
    pub total_lp_shares: u128,
    pub acc_lp_fees_per_share: u128,
    pub open_positions: usize,
    pub total_liquidations: u64,
    pub total_liquidated_value: Amount,
    pub total_bad_debt: Amount,
    pub circuit_breaker_active: bool,
    pub paused: bool,
}

/// Coarse classification of every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    StateValidity,
    Settlement,
    Guardrail,
    Permission,
    Arithmetic,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    // state validity
    #[error("no active position for {user:?} on asset {asset:?}")]
    PositionInactive { user: AccountId, asset: AssetId },

    #[error("position holds no alpha")]
    NoAlpha,

    #[error("position not liquidatable: health {health} >= threshold {threshold}")]
    NotLiquidatable { health: Ratio, threshold: Ratio },

    #[error("position not found for {user:?} on asset {asset:?}")]
    PositionNotFound { user: AccountId, asset: AssetId },

    #[error("{user:?} already has an open position on asset {asset:?}")]
    PositionAlreadyActive { user: AccountId, asset: AssetId },

    #[error("liquidation request not found")]
    RequestNotFound,

    #[error("liquidation request expired at {deadline}")]
    RequestExpired { deadline: BlockNumber },

    #[error("liquidation request already processed")]
    RequestAlreadyProcessed,

    #[error("a liquidation request with this id already exists")]
    DuplicateRequest,

    #[error("array length mismatch: {users} users, {assets} assets")]
    ArrayLengthMismatch { users: usize, assets: usize },

    #[error("{0:?} is not a liquidity provider")]
    LpNotFound(AccountId),

    #[error("price quote returned zero value")]
    InvalidValue,

    #[error("no usable spot price for asset {0:?}")]
    InvalidAlphaPrice(AssetId),

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("proceeds {proceeds} do not cover debt {debt}")]
    InsufficientProceeds { proceeds: Amount, debt: Amount },

    #[error("nothing to claim")]
    NothingToClaim,

    #[error("hotkey must be set")]
    InvalidHotkey,

    // settlement
    #[error("unstake failed: {0}")]
    UnstakeFailed(String),

    #[error("stake failed: {0}")]
    StakeFailed(String),

    #[error("liquidator fee transfer failed: {0}")]
    LiquiFeeTransferFailed(String),

    #[error("collateral return failed: {0}")]
    CollateralReturnFailed(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    // guardrails
    #[error("withdrawal would push utilization past {max}")]
    UtilizationExceeded { max: Ratio },

    #[error("user cooldown active until {until}")]
    UserCooldownActive { until: BlockNumber },

    #[error("LP cooldown active until {until}")]
    LpCooldownActive { until: BlockNumber },

    #[error("leverage {requested} outside allowed range (max {max})")]
    LeverageTooHigh { requested: Ratio, max: Ratio },

    #[error("insufficient pool liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    #[error("slippage too high: expected {expected}, received {received}")]
    SlippageTooHigh { expected: AlphaAmount, received: AlphaAmount },

    #[error("deposit {amount} below LP minimum {minimum}")]
    LpMinDeposit { amount: Amount, minimum: Amount },

    #[error("pool would be left with {remaining}, below minimum {minimum}")]
    LiquidityBelowThreshold { remaining: Amount, minimum: Amount },

    #[error("withdrawal {requested} exceeds LP stake {stake}")]
    InsufficientLpStake { requested: Amount, stake: Amount },

    #[error("buyback conditions not met")]
    BuybackConditionsNotMet,

    #[error("liquidity circuit breaker is active")]
    CircuitBreakerActive,

    #[error("protocol is paused")]
    ProtocolPaused,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    // permissions
    #[error("operation {0} is disabled")]
    FunctionNotPermitted(Operation),

    #[error("{0:?} is not authorized")]
    Unauthorized(AccountId),

    // arithmetic
    #[error("math error: {0}")]
    Math(#[from] MathError),
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        use ProtocolError::*;
        match self {
            PositionInactive { .. }
            | NoAlpha
            | NotLiquidatable { .. }
            | PositionNotFound { .. }
            | PositionAlreadyActive { .. }
            | RequestNotFound
            | RequestExpired { .. }
            | RequestAlreadyProcessed
            | DuplicateRequest
            | ArrayLengthMismatch { .. }
            | LpNotFound(_)
            | InvalidValue
            | InvalidAlphaPrice(_)
            | ZeroAmount
            | InsufficientProceeds { .. }
            | NothingToClaim
            | InvalidHotkey => ErrorKind::StateValidity,

            UnstakeFailed(_) | StakeFailed(_) | LiquiFeeTransferFailed(_) | CollateralReturnFailed(_) | TransferFailed(_) => {
                ErrorKind::Settlement
            }

            UtilizationExceeded { .. }
            | UserCooldownActive { .. }
            | LpCooldownActive { .. }
            | LeverageTooHigh { .. }
            | InsufficientLiquidity { .. }
            | SlippageTooHigh { .. }
            | LpMinDeposit { .. }
            | LiquidityBelowThreshold { .. }
            | InsufficientLpStake { .. }
            | BuybackConditionsNotMet
            | CircuitBreakerActive
            | ProtocolPaused
            | Config(_) => ErrorKind::Guardrail,

            FunctionNotPermitted(_) | Unauthorized(_) => ErrorKind::Permission,

            Math(_) => ErrorKind::Arithmetic,
        }
    }

    /// True when resubmitting later can succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::UserCooldownActive { .. }
                | ProtocolError::LpCooldownActive { .. }
                | ProtocolError::CircuitBreakerActive
                | ProtocolError::ProtocolPaused
                | ProtocolError::InsufficientLiquidity { .. }
                | ProtocolError::UtilizationExceeded { .. }
                | ProtocolError::BuybackConditionsNotMet
        )
    }
}
