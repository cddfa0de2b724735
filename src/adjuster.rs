// 6.0: reserve adjuster. runs once per funding settlement, after the funding
// math: optionally re-pegs the curve to the oracle, then grows or shrinks K
// depending on whether the period netted revenue or cost, then settles the
// resulting cash flow against the treasury. the only path that halts a market.
//
// ordering matters: re-peg first, then the K step. the two do not commute
// under the reserve-bound clamps.

use crate::curve::CurveError;
use crate::market::Market;
use crate::treasury::{DistributionOutcome, FinanceOutcome, Treasury};
use crate::types::{Price, Quote, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// One K mutation. quote_delta is the change of the quote reserve: positive
/// for growth (a cost, the spent budget), negative for shrink (revenue).
#[derive(Debug, Clone, Copy)]
pub struct KAdjustment {
    pub quote_delta: Quote,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone)]
pub struct AdjustmentOutcome {
    /// Signed re-peg cost; positive = treasury pays traders.
    pub repeg_cost: Option<Quote>,
    pub k_adjustment: Option<KAdjustment>,
    /// Revenue handed to the treasury at settlement.
    pub distributed: Quote,
    /// Cost drawn from the treasury at settlement.
    pub financed: Quote,
    pub distribution_detail: Option<DistributionOutcome>,
    pub finance_detail: Option<FinanceOutcome>,
    pub halted: bool,
}

/// Apply the post-funding adjustment pass. `funding_payment` is the signed
/// amount the pool collects from (positive) or owes to (negative) open
/// interest for this period.
pub fn settle_adjustments(
    market: &mut Market,
    treasury: &mut Treasury,
    oracle_spot: Option<Price>,
    funding_payment: Quote,
    now: Timestamp,
) -> Result<AdjustmentOutcome, CurveError> {
    let market_id = market.id();
    let mut total = funding_payment.add(market.net_revenue_since_last_funding);

    // cash actually moving at settlement; spread fees in `total` were already
    // distributed when charged.
    let mut flow = funding_payment;

    let repeg_cost = match oracle_spot {
        Some(spot) if market.needs_repeg(spot) => {
            let target = Price::new_unchecked(spot.value() * market.params.repeg_price_factor);
            let cost = market.curve.set_reserves_to_price(
                target,
                market.net_open_interest.value(),
                now,
            )?;
            total = total.sub(cost);
            flow = flow.sub(cost);
            Some(cost)
        }
        _ => None,
    };

    let quote_reserve = market.curve.quote_reserve();
    let mut k_adjustment = None;
    let mut halted = false;

    if !total.is_negative() {
        let available = treasury.available_budget(market_id);
        if flow.is_negative() && available < flow.abs() {
            // the period nets revenue on paper, but the cash due at settlement
            // exceeds what the treasury holds. same rule as the cost branch:
            // nothing is collected partially.
            market.halt();
            halted = true;
        } else if market.params.is_adjustable {
            // revenue: deepen liquidity with a quarter of it, scaled by the
            // cover rate, unless that would breach the upper reserve bound.
            let budget = total.value() * market.params.k_cost_cover_rate / dec!(4);
            let cap = market.params.k_increase_max.value() * quote_reserve;
            // growth is paid from this settlement's flow plus the treasury;
            // never grow on credit.
            let affordable = (flow.value() + available.value()).max(Decimal::ZERO);
            let growth = budget.min(cap).min(affordable);

            if quote_reserve + growth > market.params.quote_reserve_upper_limit.value() {
                // breaching the bound is worse than forgoing growth: take the
                // fixed shrink step instead, whatever the revenue sign.
                let shrink = market.params.ptc_base_decrease.value() * quote_reserve;
                let multiplier = (quote_reserve - shrink) / quote_reserve;
                market.curve.scale_reserves(multiplier, now);
                flow = flow.add(Quote::new(shrink));
                k_adjustment = Some(KAdjustment {
                    quote_delta: Quote::new(-shrink),
                    multiplier,
                });
            } else if growth > Decimal::ZERO {
                let multiplier = (quote_reserve + growth) / quote_reserve;
                market.curve.scale_reserves(multiplier, now);
                flow = flow.sub(Quote::new(growth));
                k_adjustment = Some(KAdjustment {
                    quote_delta: Quote::new(growth),
                    multiplier,
                });
            }
        }
    } else {
        let need = total.abs();
        let max_shrink = if market.params.is_adjustable && market.params.can_lower_k {
            let bound = market.params.k_decrease_max.value() * quote_reserve;
            let to_floor =
                (quote_reserve - market.params.quote_reserve_lower_limit.value()).max(Decimal::ZERO);
            bound.min(to_floor)
        } else {
            Decimal::ZERO
        };

        let available = treasury.available_budget(market_id);
        if Quote::new(max_shrink).add(available) < need {
            // cannot finance the period in full. nothing is collected
            // partially; trading stops until governance reopens.
            market.halt();
            halted = true;
        } else {
            let target_shrink = market.params.k_revenue_take_rate * need.value();
            // shrink at least enough that the rest fits in the budget.
            let required = (need.value() - available.value()).max(Decimal::ZERO);
            let shrink = target_shrink.max(required).min(max_shrink);

            if shrink > Decimal::ZERO {
                let multiplier = (quote_reserve - shrink) / quote_reserve;
                market.curve.scale_reserves(multiplier, now);
                flow = flow.add(Quote::new(shrink));
                k_adjustment = Some(KAdjustment {
                    quote_delta: Quote::new(-shrink),
                    multiplier,
                });
            }
        }
    }

    let mut distributed = Quote::zero();
    let mut financed = Quote::zero();
    let mut distribution_detail = None;
    let mut finance_detail = None;

    if !halted {
        if flow.is_negative() {
            let outcome = treasury.finance(market_id, flow.abs());
            financed = outcome.financed;
            finance_detail = Some(outcome);
        } else if flow.is_positive() {
            distribution_detail = Some(treasury.distribute(market_id, flow));
            distributed = flow;
        }
    }

    Ok(AdjustmentOutcome {
        repeg_cost,
        k_adjustment,
        distributed,
        financed,
        distribution_detail,
        finance_detail,
        halted,
    })
}
