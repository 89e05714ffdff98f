// 9.0 buyback.rs: the protocol's fee cut accumulates here and is periodically
// spent buying the yield-bearing asset back. gated by an interval and a pool floor.

use crate::engine::ProtocolError;
use crate::math::{self, MathError};
use crate::types::{AlphaAmount, Amount, AssetId, BlockNumber, Ratio};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuybackParams {
    /// Asset bought back with the pool.
    pub asset: AssetId,
    /// Minimum blocks between two executions.
    pub interval_blocks: u64,
    /// The pool must hold strictly more than this to execute.
    pub execution_threshold: Amount,
    /// Fraction of the pool consumed per execution.
    pub rate: Ratio,
}

impl Default for BuybackParams {
    fn default() -> Self {
        Self {
            asset: AssetId(0),
            interval_blocks: 7_200,
            execution_threshold: Amount::from_tao(dec!(10)),
            rate: Ratio::from_decimal(dec!(0.5)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuybackRecord {
    pub block: BlockNumber,
    pub spent: Amount,
    pub alpha_bought: AlphaAmount,
}

/// 9.1: buyback pool and execution history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuybackModule {
    pub pool: Amount,
    pub last_execution: Option<BlockNumber>,
    pub total_spent: Amount,
    pub total_alpha_bought: AlphaAmount,
    pub executions: u64,
}

impl BuybackModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, amount: Amount) -> Result<(), MathError> {
        self.pool = self.pool.checked_add(amount)?;
        Ok(())
    }

    pub fn next_eligible_block(&self, params: &BuybackParams) -> BlockNumber {
        self.last_execution
            .map(|last| last.plus(params.interval_blocks))
            .unwrap_or(BlockNumber(0))
    }

    /// Amount to spend if a buyback may run at `now`.
    pub fn plan(&self, now: BlockNumber, params: &BuybackParams) -> Result<Amount, ProtocolError> {
        if now < self.next_eligible_block(params) || self.pool <= params.execution_threshold {
            return Err(ProtocolError::BuybackConditionsNotMet);
        }
        let spend = self.pool.mul_ratio(params.rate)?;
        if spend.is_zero() {
            return Err(ProtocolError::BuybackConditionsNotMet);
        }
        Ok(spend)
    }

    pub fn record(&mut self, now: BlockNumber, spent: Amount, alpha_bought: AlphaAmount) -> Result<BuybackRecord, MathError> {
        self.pool = self.pool.checked_sub(spent)?;
        self.total_spent = self.total_spent.checked_add(spent)?;
        self.total_alpha_bought = self.total_alpha_bought.checked_add(alpha_bought)?;
        self.last_execution = Some(now);
        self.executions = math::increment(self.executions)?;
        Ok(BuybackRecord {
            block: now,
            spent,
            alpha_bought,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tao(v: rust_decimal::Decimal) -> Amount {
        Amount::from_tao(v)
    }

    #[test]
    fn below_threshold_is_refused() {
        let mut module = BuybackModule::new();
        let params = BuybackParams::default();
        module.credit(tao(dec!(10))).unwrap();
        // must strictly exceed the threshold
        assert!(matches!(
            module.plan(BlockNumber(1), &params),
            Err(ProtocolError::BuybackConditionsNotMet)
        ));
        module.credit(Amount::new(1)).unwrap();
        assert!(module.plan(BlockNumber(1), &params).is_ok());
    }

    #[test]
    fn interval_gates_repeat_executions() {
        let mut module = BuybackModule::new();
        let params = BuybackParams::default();
        module.credit(tao(dec!(100))).unwrap();

        let spend = module.plan(BlockNumber(50), &params).unwrap();
        assert_eq!(spend, tao(dec!(50)));
        module.record(BlockNumber(50), spend, AlphaAmount::new(1_000)).unwrap();
        assert_eq!(module.pool, tao(dec!(50)));

        assert!(module.plan(BlockNumber(50 + 7_199), &params).is_err());
        assert_eq!(module.plan(BlockNumber(50 + 7_200), &params).unwrap(), tao(dec!(25)));
    }

    #[test]
    fn execution_count_never_wraps() {
        let mut module = BuybackModule::new();
        module.credit(tao(dec!(10))).unwrap();
        module.executions = u64::MAX;
        assert_eq!(
            module.record(BlockNumber(1), tao(dec!(1)), AlphaAmount::new(1)),
            Err(MathError::Overflow)
        );
    }
}
