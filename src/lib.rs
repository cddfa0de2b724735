// vamm-core: virtual AMM perpetual futures core.
// accounting-first architecture: every quote unit that moves is attributable
// to a curve mutation, a funding leg, or a treasury tier.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: MarketId, TraderId, Side, Price, Quote, Ratio
//   2.x  curve.rs: constant-product reserve curve, swaps, TWAP history
//   3.x  margin.rs: notional, unrealized PnL (spot/twap), margin ratio
//   4.x  position.rs: position struct, increase/reduce transitions
//   5.x  funding.rs: premium fraction, cumulative series, lazy catch-up
//   6.x  adjuster.rs: re-peg and K growth/shrink at settlement
//   6.5  treasury.rs: tiered financing waterfall and distribution
//   7.x  liquidation.rs: gate, penalty split, bad-debt decision
//   8.x  market.rs: market params + runtime state
//   9.x  events.rs: state transition events for audit
//   9.0  oracle.rs: spot/TWAP price source abstraction
//   10.x engine/: core engine: positions, funding, liquidations

pub mod adjuster;
pub mod curve;
pub mod engine;
pub mod events;
pub mod funding;
pub mod liquidation;
pub mod margin;
pub mod market;
pub mod oracle;
pub mod position;
pub mod treasury;
pub mod types;

// re exports for convenience
pub use adjuster::*;
pub use curve::*;
pub use engine::*;
pub use events::*;
pub use funding::*;
pub use liquidation::*;
pub use margin::*;
pub use market::*;
pub use oracle::*;
pub use position::*;
pub use treasury::*;
pub use types::*;
