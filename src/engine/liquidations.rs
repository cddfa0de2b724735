//! Liquidation entry points. Single liquidations are atomic like every other
//! call; the batch variant is the one place partial failure is surfaced
//! without aborting, so liquidator bots can sweep a market in one pass.

use super::core::Engine;
use super::positions::close_base_direction;
use super::results::{EngineError, LiquidationOutcome};
use crate::events::{BadDebtRealizedEvent, EventPayload, PositionLiquidatedEvent};
use crate::liquidation::{self, BadDebtDecision, LiquidationGate};
use crate::margin::{self, PnlMode};
use crate::position::{self, Position};
use crate::types::{MarketId, Quote, SignedSize, TraderId};
use rust_decimal::Decimal;

impl Engine {
    /// Liquidate one position. Solvent-but-undermargined positions may be
    /// liquidated by anyone; negative-ratio positions only by a registered
    /// backstop liquidity provider. Full close unless it would trip the
    /// market's fluctuation limit, in which case a bounded partial close runs
    /// on the unguarded swap path.
    pub fn liquidate(
        &mut self,
        market_id: MarketId,
        trader_id: TraderId,
        liquidator_id: TraderId,
    ) -> Result<LiquidationOutcome, EngineError> {
        let now = self.current_time;
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        let cumulative_premium = market.cumulative_premium();
        let window_secs = market.params.margin_params.twap_window_secs;
        let maintenance = market.params.margin_params.maintenance_margin_ratio;
        let liq_params = market.params.liquidation_params.clone();

        let mut staged: Position = self
            .positions
            .get(&(trader_id, market_id))
            .filter(|p| !p.is_empty())
            .cloned()
            .ok_or(EngineError::PositionNotFound {
                market_id,
                trader_id,
            })?;
        let old_size = staged.size;
        let side = staged.size.side().ok_or(EngineError::PositionNotFound {
            market_id,
            trader_id,
        })?;
        staged.settle_funding(cumulative_premium);
        let mut curve = market.curve.clone();

        let ratio = margin::margin_ratio(
            &staged,
            &curve,
            cumulative_premium,
            PnlMode::Spot,
            window_secs,
            now,
        );
        match liquidation::evaluate_gate(ratio, maintenance) {
            LiquidationGate::Healthy => {
                return Err(EngineError::MarginRatioNotMet {
                    ratio,
                    required: maintenance.value(),
                });
            }
            LiquidationGate::RequiresBackstop => {
                if !self.is_backstop_lp(market_id, liquidator_id) {
                    return Err(EngineError::NotBackstopLP(liquidator_id));
                }
            }
            LiquidationGate::Liquidatable => {}
        }

        let direction = close_base_direction(side);
        let partial = curve.base_swap_exceeds_fluctuation(direction, staged.size.abs());
        let fraction = if partial {
            liq_params.partial_liquidation_ratio.value()
        } else {
            Decimal::ONE
        };
        let close_size = staged.size.abs() * fraction;
        let quote_closed = curve.swap_base_unguarded(direction, close_size, now)?;

        let closed_open_notional = staged.open_notional.mul(fraction);
        let pnl = if staged.size.is_long() {
            Quote::new(quote_closed).sub(closed_open_notional)
        } else {
            closed_open_notional.sub(Quote::new(quote_closed))
        };
        let penalty = liquidation::calculate_penalty(Quote::new(quote_closed), &liq_params);
        let reduced = position::reduce(&mut staged, fraction, pnl.sub(penalty.total));

        let bad_debt = reduced.shortfall;
        if bad_debt.is_positive() {
            let decision = liquidation::bad_debt_decision(
                bad_debt,
                self.treasury.available_budget(market_id),
                liq_params.bad_debt_headroom,
            );
            match decision {
                BadDebtDecision::Finance => {}
                BadDebtDecision::WaitUntilRealize => {
                    return Err(EngineError::WaitUntilRealizeBadDebt(bad_debt));
                }
                BadDebtDecision::Unfinanceable => {
                    return Err(EngineError::BadDebt(bad_debt));
                }
            }
        }

        // commit
        let new_size = staged.size;
        let oi_delta = SignedSize::new(new_size.value() - old_size.value());
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        market.curve = curve;
        market.record_open_interest(oi_delta);
        let liquidation_price = market.mark_price();

        if bad_debt.is_positive() {
            let financed = self.treasury.finance(market_id, bad_debt);
            self.emit_event(EventPayload::BadDebtRealized(BadDebtRealizedEvent {
                market_id,
                trader_id,
                debt: bad_debt,
                financed: financed.financed,
            }));
        }
        if penalty.treasury_contribution.is_positive() {
            self.treasury
                .distribute(market_id, penalty.treasury_contribution);
        }

        self.positions.insert((trader_id, market_id), staged);
        let closed_size = SignedSize::from_side(side.opposite(), close_size);
        self.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            market_id,
            trader_id,
            liquidator_id,
            closed_size,
            closed_notional: Quote::new(quote_closed),
            liquidation_price,
            penalty: penalty.total,
            liquidator_reward: penalty.liquidator_reward,
            bad_debt,
            partial,
        }));

        Ok(LiquidationOutcome {
            market_id,
            trader_id,
            liquidator_id,
            closed_size,
            closed_notional: Quote::new(quote_closed),
            liquidation_price,
            realized_pnl: pnl,
            penalty: penalty.total,
            liquidator_reward: penalty.liquidator_reward,
            bad_debt,
            margin_released: reduced.margin_released,
            partial,
        })
    }

    /// Liquidate a batch of traders. Each entry succeeds or fails on its own;
    /// a failure never rolls back earlier entries.
    pub fn liquidate_batch(
        &mut self,
        market_id: MarketId,
        traders: &[TraderId],
        liquidator_id: TraderId,
    ) -> Vec<(TraderId, Result<LiquidationOutcome, EngineError>)> {
        traders
            .iter()
            .map(|&trader_id| (trader_id, self.liquidate(market_id, trader_id, liquidator_id)))
            .collect()
    }
}
