//! Six-step account tiers.
//!
//! Each tier has a qualifying threshold, a trading-fee discount and a leverage
//! cap, all ascending. An account sits in the highest tier whose threshold its
//! qualifying metric (cumulative trading volume) meets.

use crate::config::ConfigError;
use crate::types::{Amount, Ratio};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const TIER_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: Amount,
    pub fee_discount: Ratio,
    pub max_leverage: Ratio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    pub tiers: [Tier; TIER_COUNT],
}

impl Default for TierTable {
    fn default() -> Self {
        let tier = |threshold, discount, leverage| Tier {
            threshold: Amount::from_tao(threshold),
            fee_discount: Ratio::from_decimal(discount),
            max_leverage: Ratio::from_decimal(leverage),
        };
        Self {
            tiers: [
                tier(dec!(0), dec!(0), dec!(2)),
                tier(dec!(100), dec!(0.05), dec!(3)),
                tier(dec!(1_000), dec!(0.1), dec!(4)),
                tier(dec!(5_000), dec!(0.15), dec!(5)),
                tier(dec!(20_000), dec!(0.25), dec!(7)),
                tier(dec!(100_000), dec!(0.4), dec!(10)),
            ],
        }
    }
}

impl TierTable {
    /// Highest tier index whose threshold `metric` meets.
    pub fn tier_for(&self, metric: Amount) -> usize {
        self.tiers
            .iter()
            .rposition(|t| metric >= t.threshold)
            .unwrap_or(0)
    }

    pub fn get(&self, index: usize) -> &Tier {
        &self.tiers[index.min(TIER_COUNT - 1)]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for i in 1..TIER_COUNT {
            let (prev, cur) = (&self.tiers[i - 1], &self.tiers[i]);
            if cur.threshold <= prev.threshold {
                return Err(ConfigError::TiersNotAscending {
                    tier: i,
                    field: "threshold",
                });
            }
            if cur.max_leverage <= prev.max_leverage {
                return Err(ConfigError::TiersNotAscending {
                    tier: i,
                    field: "max_leverage",
                });
            }
            if cur.fee_discount < prev.fee_discount {
                return Err(ConfigError::TiersNotAscending {
                    tier: i,
                    field: "fee_discount",
                });
            }
        }
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.fee_discount > Ratio::ONE {
                return Err(ConfigError::RatioOutOfRange {
                    field: format!("tiers[{}].fee_discount", i),
                });
            }
            if tier.max_leverage < Ratio::ONE {
                return Err(ConfigError::RatioOutOfRange {
                    field: format!("tiers[{}].max_leverage", i),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        assert!(TierTable::default().validate().is_ok());
    }

    #[test]
    fn tier_lookup() {
        let table = TierTable::default();
        assert_eq!(table.tier_for(Amount::zero()), 0);
        assert_eq!(table.tier_for(Amount::from_tao(dec!(99.9))), 0);
        assert_eq!(table.tier_for(Amount::from_tao(dec!(100))), 1);
        assert_eq!(table.tier_for(Amount::from_tao(dec!(7_500))), 3);
        assert_eq!(table.tier_for(Amount::from_tao(dec!(1_000_000))), 5);
    }

    #[test]
    fn flat_leverage_rejected() {
        let mut table = TierTable::default();
        table.tiers[3].max_leverage = table.tiers[2].max_leverage;
        assert_eq!(
            table.validate(),
            Err(ConfigError::TiersNotAscending {
                tier: 3,
                field: "max_leverage"
            })
        );
    }

    #[test]
    fn descending_threshold_rejected() {
        let mut table = TierTable::default();
        table.tiers[5].threshold = Amount::from_tao(dec!(10));
        assert!(matches!(
            table.validate(),
            Err(ConfigError::TiersNotAscending { tier: 5, .. })
        ));
    }
}
