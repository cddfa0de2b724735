//! Engine knobs. These tune bookkeeping depth, not market behavior; market
//! behavior lives in `MarketParams`.

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Events retained in the audit buffer before the oldest are dropped.
    pub max_events: usize,
    /// Reserve snapshots each market's curve keeps for TWAP reconstruction.
    /// Must cover the funding TWAP window at the market's trade cadence.
    pub twap_snapshot_depth: usize,
    /// Print every event as it is emitted.
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            twap_snapshot_depth: 256,
            verbose: false,
        }
    }
}
