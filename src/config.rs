// 7.0 config.rs: every protocol tunable in one place. risk thresholds, fee rates and
// splits, tiers, cooldowns, buyback, permissions.
// 7.1 presets per environment. validate() runs before any config is accepted.

use crate::buyback::BuybackParams;
use crate::fees::{FeeCategory, FeeSchedule};
use crate::guards::{Operation, PermissionSet};
use crate::risk::RateCurve;
use crate::tiers::TierTable;
use crate::types::{AccountId, Amount, Ratio, ValidatorRef};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Validator stake is routed through when a position did not name one.
pub const DEFAULT_VALIDATOR: ValidatorRef = ValidatorRef([
    0x5c, 0x0d, 0x8e, 0x41, 0x2a, 0x6f, 0x93, 0x17, 0xb4, 0x03, 0x7e, 0xc2, 0x55, 0x18, 0xaf, 0x60,
    0x2b, 0x9d, 0x44, 0xe1, 0x70, 0x3c, 0x86, 0x0f, 0xd5, 0x21, 0x6a, 0xb8, 0x0e, 0x97, 0x4c, 0x33,
]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub owner: AccountId,
    // may execute buybacks alongside the owner
    pub managers: Vec<AccountId>,
    // health ratio below this is liquidatable
    pub liquidation_threshold: Ratio,
    // charged on what remains after debt repayment
    pub liquidation_fee_rate: Ratio,
    // charged on notional at open and on proceeds at close
    pub trading_fee_rate: Ratio,
    pub rate_curve: RateCurve,
    // borrowed / LP capital may not exceed this
    pub max_utilization: Ratio,
    // global cap, tiers may only tighten it
    pub max_leverage: Ratio,
    pub lp_min_deposit: Amount,
    // pool must hold at least this before lending and may not be drained below it
    pub min_liquidity_threshold: Amount,
    pub user_cooldown_blocks: u64,
    pub lp_cooldown_blocks: u64,
    pub fee_schedule: FeeSchedule,
    pub tiers: TierTable,
    pub buyback: BuybackParams,
    pub default_validator: ValidatorRef,
    pub paused: bool,
    pub permissions: PermissionSet,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            owner: AccountId(0),
            managers: Vec::new(),
            liquidation_threshold: Ratio::from_decimal(dec!(1.10)),
            liquidation_fee_rate: Ratio::from_decimal(dec!(0.02)),
            trading_fee_rate: Ratio::from_decimal(dec!(0.003)),
            rate_curve: RateCurve::default(),
            max_utilization: Ratio::from_decimal(dec!(0.9)),
            max_leverage: Ratio::from_decimal(dec!(10)),
            lp_min_deposit: Amount::from_tao(dec!(1)),
            min_liquidity_threshold: Amount::from_tao(dec!(10)),
            user_cooldown_blocks: 1,
            lp_cooldown_blocks: 10,
            fee_schedule: FeeSchedule::default(),
            tiers: TierTable::default(),
            buyback: BuybackParams::default(),
            default_validator: DEFAULT_VALIDATOR,
            paused: false,
            permissions: PermissionSet::all(),
        }
    }
}

impl ProtocolConfig {
    pub fn with_owner(owner: AccountId) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    // testnet: short cooldowns, fast buybacks, no trading fee
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.trading_fee_rate = Ratio::ZERO;
        config.lp_cooldown_blocks = 1;
        config.buyback.interval_blocks = 360;
        config.buyback.execution_threshold = Amount::from_tao(dec!(1));
        config
    }

    // mainnet: wider liquidation buffer, 5x cap, slower LP exits
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.liquidation_threshold = Ratio::from_decimal(dec!(1.15));
        config.max_leverage = Ratio::from_decimal(dec!(5));
        config.max_utilization = Ratio::from_decimal(dec!(0.8));
        config.lp_cooldown_blocks = 100;
        config.min_liquidity_threshold = Amount::from_tao(dec!(1_000));
        config
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ProtocolConfig = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fee_schedule.validate()?;
        self.tiers.validate()?;

        let unit_ratios = [
            ("liquidation_fee_rate", self.liquidation_fee_rate),
            ("trading_fee_rate", self.trading_fee_rate),
            ("max_utilization", self.max_utilization),
            ("rate_curve.optimal_utilization", self.rate_curve.optimal_utilization),
            ("buyback.rate", self.buyback.rate),
        ];
        for (field, ratio) in unit_ratios {
            if ratio > Ratio::ONE {
                return Err(ConfigError::RatioOutOfRange { field: field.to_string() });
            }
        }

        if self.liquidation_threshold.is_zero() {
            return Err(ConfigError::RatioOutOfRange {
                field: "liquidation_threshold".to_string(),
            });
        }
        if self.max_leverage < Ratio::ONE {
            return Err(ConfigError::RatioOutOfRange {
                field: "max_leverage".to_string(),
            });
        }
        if self.rate_curve.max_rate().is_err() {
            return Err(ConfigError::RatioOutOfRange {
                field: "rate_curve".to_string(),
            });
        }

        if self.lp_min_deposit.is_zero() {
            return Err(ConfigError::Invalid {
                reason: "LP minimum deposit must be positive".to_string(),
            });
        }
        if self.buyback.interval_blocks == 0 {
            return Err(ConfigError::Invalid {
                reason: "buyback interval must be at least one block".to_string(),
            });
        }
        if self.default_validator.is_unset() {
            return Err(ConfigError::Invalid {
                reason: "default validator must be set".to_string(),
            });
        }

        Ok(())
    }

    pub fn is_manager(&self, who: AccountId) -> bool {
        who == self.owner || self.managers.contains(&who)
    }

    pub fn is_permitted(&self, op: Operation) -> bool {
        self.permissions.is_permitted(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{category} fee split does not sum to PRECISION")]
    DistributionInvalid { category: FeeCategory },

    #[error("tier {tier} {field} is not ascending")]
    TiersNotAscending { tier: usize, field: &'static str },

    #[error("{field} is out of range")]
    RatioOutOfRange { field: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },

    #[error("config parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet_conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
    }

    #[test]
    fn test_mainnet_is_tighter() {
        let dev = ProtocolConfig::default();
        let main = ProtocolConfig::mainnet_conservative();
        assert!(main.liquidation_threshold > dev.liquidation_threshold);
        assert!(main.max_leverage < dev.max_leverage);
    }

    #[test]
    fn test_ratio_above_one_rejected() {
        let mut config = ProtocolConfig::default();
        config.max_utilization = Ratio::from_decimal(dec!(1.2));
        assert_eq!(
            config.validate(),
            Err(ConfigError::RatioOutOfRange {
                field: "max_utilization".to_string()
            })
        );
    }

    #[test]
    fn test_unbalanced_fee_split_rejected() {
        let mut config = ProtocolConfig::default();
        config.fee_schedule.trading.lp_share = Ratio::from_decimal(dec!(0.7));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DistributionInvalid {
                category: FeeCategory::Trading
            })
        ));
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = ProtocolConfig::with_owner(AccountId(42));
        config.permissions.set(Operation::Buyback, false);
        let json = config.to_json().unwrap();
        let back = ProtocolConfig::from_json(&json).unwrap();
        assert_eq!(back, config);
        assert!(!back.is_permitted(Operation::Buyback));
    }

    #[test]
    fn test_from_json_validates() {
        let mut config = ProtocolConfig::default();
        config.tiers.tiers[2].threshold = config.tiers.tiers[1].threshold;
        let json = serde_json::to_string(&config).unwrap();
        assert!(matches!(
            ProtocolConfig::from_json(&json),
            Err(ConfigError::TiersNotAscending { tier: 2, .. })
        ));
        assert!(matches!(ProtocolConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_managers() {
        let mut config = ProtocolConfig::with_owner(AccountId(1));
        config.managers.push(AccountId(2));
        assert!(config.is_manager(AccountId(1)));
        assert!(config.is_manager(AccountId(2)));
        assert!(!config.is_manager(AccountId(3)));
    }
}
