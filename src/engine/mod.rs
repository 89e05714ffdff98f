// 8.0: protocol engine. owns every ledger and runs each external operation
// (positions, liquidity, liquidations, buybacks, governance) as one atomic unit.
// deterministic and block-driven; prices, staking and transfers come from the host.

mod buyback;
mod config;
mod core;
mod governance;
mod liquidations;
mod liquidity;
mod positions;
mod queries;
mod results;

pub use self::config::EngineConfig;
pub use self::core::{Aggregates, Engine, ProtocolState};
pub use self::results::{CloseResult, ErrorKind, LiquidationResult, ProtocolError, ProtocolStats};
