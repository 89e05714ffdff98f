// leverage-core: leveraged staking protocol engine.
// users borrow LP capital to take leveraged exposure to a staked, yield-bearing asset.
// risk-first architecture: health checks and liquidation take priority.
// all computation is deterministic and block-driven; the host supplies prices,
// staking and transfers.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, AssetId, Amount, Rao, AlphaAmount, Ratio
//   1.2  math.rs: checked fixed-point helpers
//   1.3  journal.rs: undo log for keyed state
//   2.x  risk.rs: health ratio, kinked borrow-rate curve
//   2.1  accrual.rs: lazy per-position borrow-fee accrual
//   3.x  liquidity.rs: LP stakes and shares, per-asset borrow totals
//   4.x  position.rs: leveraged positions and the ledger
//   5.x  fees.rs: fee splits, reward-per-share accumulators
//   5.2  tiers.rs: six-tier discount and leverage ladder
//   6.x  guards.rs: permissions, cooldowns, circuit breaker
//   6.1  liquidation.rs: payout waterfall, review requests, liquidator records
//   7.x  config.rs: protocol tunables, env presets
//   8.x  engine/: core engine: positions, liquidity, liquidations, buyback, governance
//   9.x  buyback.rs: protocol-fee buyback pool
//   10.x services.rs: price, stake and transfer traits plus the mock host
//   11.x events.rs: state transition events for audit
//   12.x contribution.rs: participant weight scoring

// core protocol modules
pub mod accrual;
pub mod engine;
pub mod events;
pub mod journal;
pub mod liquidation;
pub mod liquidity;
pub mod math;
pub mod position;
pub mod types;

// risk and safety modules
pub mod guards;
pub mod risk;

// economics
pub mod buyback;
pub mod contribution;
pub mod fees;
pub mod tiers;

// integration modules
pub mod config;
pub mod services;

// re exports for convenience
pub use buyback::*;
pub use engine::*;
pub use events::*;
pub use fees::*;
pub use guards::*;
pub use liquidation::*;
pub use liquidity::*;
pub use position::*;
pub use tiers::*;
pub use types::*;
pub use config::{ConfigError, Environment, ProtocolConfig};
pub use contribution::{compute_weights, ContributionWeight, Participant};
pub use journal::{Journaled, JournaledMap};
pub use math::MathError;
pub use risk::{HealthCheck, RateCurve};
pub use services::{Bank, Host, MockHost, PriceOracle, ServiceError, StakeService};
