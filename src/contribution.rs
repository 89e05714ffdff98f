// 12.0 contribution.rs: scores each associated participant by what it brings to the
// protocol so an outer network can weight it. 70% LP capital (in TAO), 30% liquidator
// score, normalized to sum to one. all-zero scores fall back to an even split.

use crate::types::{AccountId, Amount, ValidatorRef};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const LIQUIDITY_WEIGHT: Decimal = dec!(0.7);
pub const LIQUIDATOR_WEIGHT: Decimal = dec!(0.3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub account: AccountId,
    pub hotkey: ValidatorRef,
    pub lp_stake: Amount,
    pub liquidator_score: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionWeight {
    pub account: AccountId,
    pub hotkey: ValidatorRef,
    pub score: Decimal,
    pub weight: Decimal,
}

pub fn raw_score(participant: &Participant) -> Decimal {
    LIQUIDITY_WEIGHT * participant.lp_stake.to_tao() + LIQUIDATOR_WEIGHT * Decimal::from(participant.liquidator_score)
}

/// Normalized weights, ordered by account id.
pub fn compute_weights(participants: &[Participant]) -> Vec<ContributionWeight> {
    if participants.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<&Participant> = participants.iter().collect();
    sorted.sort_by_key(|p| p.account);

    let scores: Vec<Decimal> = sorted.iter().map(|p| raw_score(p)).collect();
    let total: Decimal = scores.iter().copied().sum();
    let uniform = Decimal::ONE / Decimal::from(sorted.len() as u64);

    sorted
        .into_iter()
        .zip(scores)
        .map(|(p, score)| ContributionWeight {
            account: p.account,
            hotkey: p.hotkey,
            score,
            weight: if total.is_zero() { uniform } else { score / total },
        })
        .collect()
}
