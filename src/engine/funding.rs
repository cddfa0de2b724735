//! Periodic funding settlement. Computes the period premium from curve vs
//! oracle TWAPs, appends it to the market's cumulative series, and runs the
//! reserve adjuster, which may re-peg, move K, settle against the treasury, or
//! halt the market.

use super::core::Engine;
use super::results::{EngineError, FundingSettlement};
use crate::adjuster;
use crate::events::{
    CostFinancedEvent, EventPayload, FundingSettledEvent, LiquidityAdjustedEvent,
    MarketHaltedEvent, RepeggedEvent, RevenueDistributedEvent,
};
use crate::funding;
use crate::oracle::Oracle;
use crate::types::{MarketId, Quote};

impl Engine {
    /// Settle funding for one market. Rejects before the due time; a second
    /// call in the same period fails with `FundingNotDue` and changes nothing.
    pub fn pay_funding(
        &mut self,
        market_id: MarketId,
        oracle: &dyn Oracle,
    ) -> Result<FundingSettlement, EngineError> {
        let now = self.current_time;
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        if !market.is_open() {
            return Err(EngineError::MarketHalted(market_id));
        }
        if !market.funding_due(now) {
            return Err(EngineError::FundingNotDue(market.next_funding_time));
        }

        let window_secs = market.params.margin_params.twap_window_secs;
        let mark_twap = market.curve.twap_price(window_secs, now);
        let oracle_twap = oracle
            .twap_price(market_id, window_secs, now)
            .ok_or(EngineError::NoOraclePrice(market_id))?;

        let premium = funding::premium_fraction(mark_twap, oracle_twap);
        let rate = funding::funding_rate(mark_twap, oracle_twap);
        let payment = funding::funding_payment(mark_twap, oracle_twap, market.net_open_interest);
        let net_open_interest = market.net_open_interest;
        let old_mark = market.mark_price();

        market.premium_series.append(premium);

        let outcome = adjuster::settle_adjustments(
            market,
            &mut self.treasury,
            oracle.spot_price(market_id),
            payment,
            now,
        )?;

        market.next_funding_time = market.next_funding_time.plus_secs(market.params.funding_period_secs);
        market.net_revenue_since_last_funding = Quote::zero();
        let new_mark = market.mark_price();
        let new_quote_reserve = market.curve.quote_reserve();
        let new_base_reserve = market.curve.base_reserve();
        let uncovered = payment.add(outcome.repeg_cost.unwrap_or(Quote::zero()).negate());

        self.emit_event(EventPayload::FundingSettled(FundingSettledEvent {
            market_id,
            premium_fraction: premium,
            funding_rate: rate,
            funding_payment: payment,
            net_open_interest,
            mark_twap,
            oracle_twap,
        }));
        if let Some(cost) = outcome.repeg_cost {
            self.emit_event(EventPayload::Repegged(RepeggedEvent {
                market_id,
                old_mark_price: old_mark,
                new_mark_price: new_mark,
                cost,
            }));
        }
        if let Some(k) = outcome.k_adjustment {
            self.emit_event(EventPayload::LiquidityAdjusted(LiquidityAdjustedEvent {
                market_id,
                quote_delta: k.quote_delta,
                multiplier: k.multiplier,
                new_quote_reserve,
                new_base_reserve,
            }));
        }
        if let Some(detail) = &outcome.distribution_detail {
            self.emit_event(EventPayload::RevenueDistributed(RevenueDistributedEvent {
                market_id,
                amount: detail.distributed,
                to_staking_reward: detail.to_staking_reward,
                to_insurance: detail.to_insurance,
            }));
        }
        if let Some(detail) = &outcome.finance_detail {
            self.emit_event(EventPayload::CostFinanced(CostFinancedEvent {
                market_id,
                requested: detail.requested,
                financed: detail.financed,
                shortfall: detail.shortfall,
                draws: detail.draws.clone(),
            }));
        }
        if outcome.halted {
            self.emit_event(EventPayload::MarketHalted(MarketHaltedEvent {
                market_id,
                uncovered_cost: uncovered.abs(),
            }));
        }

        Ok(FundingSettlement {
            market_id,
            premium_fraction: premium,
            funding_rate: rate,
            funding_payment: payment,
            repeg_cost: outcome.repeg_cost,
            k_adjustment_cost: outcome.k_adjustment.map(|k| k.quote_delta),
            distributed: outcome.distributed,
            financed: outcome.financed,
            halted: outcome.halted,
        })
    }
}
