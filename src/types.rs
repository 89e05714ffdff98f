// 1.0: all the primitives live here. nothing in the engine works without these types.
// ids, amounts, ratios, block numbers. each is a newtype so the compiler catches unit mixups
// (wei vs rao vs alpha, plain integer vs PRECISION-scaled ratio).

use crate::math::{self, MathError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Fixed-point scale for every rate, ratio and leverage value. 1e9 = 1.0x.
pub const PRECISION: u128 = 1_000_000_000;

pub const WEI_PER_TAO: u128 = 1_000_000_000_000_000_000;
pub const RAO_PER_TAO: u128 = 1_000_000_000;
pub const WEI_PER_RAO: u128 = WEI_PER_TAO / RAO_PER_TAO;

/// One whole alpha token in its base unit.
pub const ALPHA_UNIT: u128 = 1_000_000_000;

/// Borrow rates are quoted per this many blocks.
pub const RATE_PERIOD_BLOCKS: u64 = 360;

/// Liquidation review requests go stale after this many blocks.
pub const REVIEW_WINDOW_BLOCKS: u64 = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

// subnet id of the yield-bearing asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

// 1.1: block height. the only clock the protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Blocks elapsed since `earlier`. zero if `earlier` is in the future.
    pub fn blocks_since(&self, earlier: BlockNumber) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn plus(&self, blocks: u64) -> BlockNumber {
        BlockNumber(self.0.saturating_add(blocks))
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

// 1.2: validator hotkey used to route stake. all zero means "not set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorRef(pub [u8; 32]);

impl ValidatorRef {
    pub const UNSET: ValidatorRef = ValidatorRef([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn is_unset(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for ValidatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// Commitment to off-chain liquidation evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub [u8; 32]);

impl RequestId {
    /// keccak256(requester || user || asset || block), all big-endian.
    pub fn derive(requester: AccountId, user: AccountId, asset: AssetId, block: BlockNumber) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(requester.0.to_be_bytes());
        hasher.update(user.0.to_be_bytes());
        hasher.update(asset.0.to_be_bytes());
        hasher.update(block.0.to_be_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

// 1.3: native currency amount in wei. collateral, debt, fees, stakes all use this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(wei: u128) -> Self {
        Self(wei)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whole and fractional TAO. negative or unrepresentable input clamps to zero.
    pub fn from_tao(tao: Decimal) -> Self {
        let wei = tao
            .checked_mul(Decimal::from(WEI_PER_TAO as u64))
            .and_then(|w| w.trunc().to_u128())
            .unwrap_or(0);
        Self(wei)
    }

    pub fn to_tao(&self) -> Decimal {
        Decimal::try_from_i128_with_scale(self.0 as i128, 18)
            .map(|d| d.normalize())
            .unwrap_or(Decimal::MAX)
    }

    pub fn checked_add(&self, other: Amount) -> Result<Amount, MathError> {
        math::checked_add(self.0, other.0).map(Amount)
    }

    pub fn checked_sub(&self, other: Amount) -> Result<Amount, MathError> {
        math::checked_sub(self.0, other.0).map(Amount)
    }

    pub fn saturating_sub(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn min(self, other: Amount) -> Amount {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// self * ratio / PRECISION, floored.
    pub fn mul_ratio(&self, ratio: Ratio) -> Result<Amount, MathError> {
        ratio.apply(self.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} TAO", self.to_tao())
    }
}

// 1.4: amount in rao. only the external price and stake services speak this unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rao(u128);

impl Rao {
    pub fn new(rao: u128) -> Self {
        Self(rao)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Scale an external rao amount up to protocol wei.
pub fn rao_to_wei(rao: Rao) -> Result<Amount, MathError> {
    math::checked_mul(rao.0, WEI_PER_RAO).map(Amount)
}

/// Scale protocol wei down to rao. anything below one rao is truncated.
pub fn wei_to_rao(amount: Amount) -> Rao {
    Rao(amount.0 / WEI_PER_RAO)
}

// 1.5: holdings of the yield-bearing asset (alpha), 9 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlphaAmount(u128);

impl AlphaAmount {
    pub fn new(units: u128) -> Self {
        Self(units)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: AlphaAmount) -> Result<AlphaAmount, MathError> {
        math::checked_add(self.0, other.0).map(AlphaAmount)
    }

    pub fn checked_sub(&self, other: AlphaAmount) -> Result<AlphaAmount, MathError> {
        math::checked_sub(self.0, other.0).map(AlphaAmount)
    }
}

impl fmt::Display for AlphaAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = Decimal::try_from_i128_with_scale(self.0 as i128, 9)
            .map(|d| d.normalize())
            .unwrap_or(Decimal::MAX);
        write!(f, "{} alpha", whole)
    }
}

// 1.6: PRECISION-scaled ratio. rates, shares, leverage, health all use this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ratio(u128);

impl Ratio {
    pub const ZERO: Ratio = Ratio(0);
    pub const ONE: Ratio = Ratio(PRECISION);
    pub const MAX: Ratio = Ratio(u128::MAX);

    pub fn new(scaled: u128) -> Self {
        Self(scaled)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// 0.85 → 850_000_000. negative input clamps to zero.
    pub fn from_decimal(value: Decimal) -> Self {
        let scaled = value
            .checked_mul(Decimal::from(PRECISION as u64))
            .and_then(|v| v.trunc().to_u128())
            .unwrap_or(0);
        Self(scaled)
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::try_from_i128_with_scale(self.0 as i128, 9)
            .map(|d| d.normalize())
            .unwrap_or(Decimal::MAX)
    }

    /// 1 - self, floored at zero.
    pub fn complement(&self) -> Ratio {
        Ratio(PRECISION.saturating_sub(self.0))
    }

    /// value * self / PRECISION, floored.
    pub fn apply(&self, value: u128) -> Result<u128, MathError> {
        math::mul_div(value, self.0, PRECISION)
    }

    /// numerator / denominator as a ratio. zero denominator is an error.
    pub fn of(numerator: u128, denominator: u128) -> Result<Ratio, MathError> {
        math::mul_div(numerator, PRECISION, denominator).map(Ratio)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Ratio::MAX {
            return write!(f, "inf");
        }
        write!(f, "{}", self.to_decimal())
    }
}
