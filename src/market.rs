//! Market configuration and runtime state.
//!
//! A market is one reserve curve plus its funding schedule, adjustment policy
//! and risk parameters. Reserves mutate through trader swaps (K-preserving)
//! or through logged adjuster operations, and only while the market is Open.

use crate::curve::ReserveCurve;
use crate::funding::PremiumSeries;
use crate::liquidation::LiquidationParams;
use crate::margin::MarginParams;
use crate::types::{MarketId, Price, Quote, Ratio, SignedSize, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Trading state. Halted is entered only by the reserve adjuster's
/// affordability check; reopening is an external governance action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Open,
    Halted,
}

impl Default for MarketStatus {
    fn default() -> Self {
        Self::Open
    }
}

/// Static market configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketParams {
    pub id: MarketId,
    /// Human-readable name (e.g., "ETH-PERP")
    pub name: String,
    /// Fee charged on trade notional, routed to the treasury.
    pub spread_ratio: Ratio,
    /// Max relative spot move a single swap may cause. Zero disables.
    pub fluctuation_limit_ratio: Ratio,
    /// Mark-vs-oracle deviation beyond which settlement re-pegs the curve.
    pub repeg_threshold: Ratio,
    /// Re-peg target is oracle spot scaled by this factor.
    pub repeg_price_factor: Decimal,
    /// Reserve bounds for K adjustment. Upper bound beats growth; lower bound
    /// only constrains shrink operations.
    pub quote_reserve_upper_limit: Quote,
    pub quote_reserve_lower_limit: Quote,
    /// Max relative growth / shrink per adjustment.
    pub k_increase_max: Ratio,
    pub k_decrease_max: Ratio,
    /// Fraction of settlement revenue spendable on K growth.
    pub k_cost_cover_rate: Decimal,
    /// Fraction of a settlement cost recovered by shrinking K.
    pub k_revenue_take_rate: Decimal,
    /// Forced shrink step when growth would breach the upper reserve bound.
    pub ptc_base_decrease: Ratio,
    /// Master switch for settlement-time curve mutations, both the re-peg and
    /// every K step. The halt check still runs when this is off.
    pub is_adjustable: bool,
    pub can_lower_k: bool,
    /// Seconds between funding settlements.
    pub funding_period_secs: i64,
    pub margin_params: MarginParams,
    pub liquidation_params: LiquidationParams,
}

impl MarketParams {
    /// Canonical small market used across tests and the simulator:
    /// 1000 quote / 100 base reserves, spot price 10.
    pub fn eth_perp() -> Self {
        Self {
            id: MarketId(1),
            name: "ETH-PERP".to_string(),
            spread_ratio: Ratio::zero(),
            fluctuation_limit_ratio: Ratio::zero(),
            repeg_threshold: Ratio::new(dec!(0.1)).unwrap(),
            repeg_price_factor: Decimal::ONE,
            quote_reserve_upper_limit: Quote::new(dec!(1_000_000)),
            quote_reserve_lower_limit: Quote::new(dec!(1)),
            k_increase_max: Ratio::new(dec!(1)).unwrap(),
            k_decrease_max: Ratio::new(dec!(1)).unwrap(),
            k_cost_cover_rate: Decimal::ONE,
            k_revenue_take_rate: Decimal::ONE,
            ptc_base_decrease: Ratio::new(dec!(0.001)).unwrap(),
            is_adjustable: true,
            can_lower_k: true,
            funding_period_secs: 3600,
            margin_params: MarginParams::default(),
            liquidation_params: LiquidationParams::default(),
        }
    }
}

/// Dynamic market state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub params: MarketParams,
    pub status: MarketStatus,
    pub curve: ReserveCurve,
    /// Append-only cumulative premium series; one entry per settled period.
    pub premium_series: PremiumSeries,
    /// Net base held by traders (longs minus shorts). Drives the aggregate
    /// funding leg and the re-peg cost.
    pub net_open_interest: SignedSize,
    pub next_funding_time: Timestamp,
    /// Spread fees accrued since the last settlement. Already distributed to
    /// the treasury; tracked here only to size the K budget.
    pub net_revenue_since_last_funding: Quote,
}

impl Market {
    pub fn new(
        params: MarketParams,
        quote_reserve: Decimal,
        base_reserve: Decimal,
        now: Timestamp,
    ) -> Self {
        let curve = ReserveCurve::new(
            quote_reserve,
            base_reserve,
            params.fluctuation_limit_ratio.value(),
            now,
        );
        let next_funding_time = now.plus_secs(params.funding_period_secs);
        Self {
            params,
            status: MarketStatus::Open,
            curve,
            premium_series: PremiumSeries::new(),
            net_open_interest: SignedSize::zero(),
            next_funding_time,
            net_revenue_since_last_funding: Quote::zero(),
        }
    }

    pub fn id(&self) -> MarketId {
        self.params.id
    }

    pub fn is_open(&self) -> bool {
        self.status == MarketStatus::Open
    }

    pub fn halt(&mut self) {
        self.status = MarketStatus::Halted;
    }

    pub fn mark_price(&self) -> Price {
        self.curve.spot_price()
    }

    pub fn cumulative_premium(&self) -> Decimal {
        self.premium_series.latest()
    }

    pub fn accrue_fee(&mut self, fee: Quote) {
        self.net_revenue_since_last_funding = self.net_revenue_since_last_funding.add(fee);
    }

    pub fn record_open_interest(&mut self, base_delta: SignedSize) {
        self.net_open_interest = self.net_open_interest.add(base_delta.value());
    }

    pub fn funding_due(&self, now: Timestamp) -> bool {
        now >= self.next_funding_time
    }

    /// Whether mark has drifted far enough from oracle to warrant a re-peg.
    pub fn needs_repeg(&self, oracle_spot: Price) -> bool {
        if !self.params.is_adjustable || self.params.repeg_threshold.is_zero() {
            return false;
        }
        let deviation =
            ((self.mark_price().value() - oracle_spot.value()) / oracle_spot.value()).abs();
        deviation > self.params.repeg_threshold.value()
    }
}
