// 10.0: core accounting engine. coordinates position changes, funding
// settlements, reserve adjustments and liquidations against one treasury.
// deterministic and event-driven with no external I/O.

mod config;
mod core;
mod positions;
mod funding;
mod liquidations;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, FundingSettlement, LiquidationOutcome, TradeResult};
