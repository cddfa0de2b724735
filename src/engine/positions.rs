//! Position entry points: open (increase / reduce / reverse), close, and
//! margin add/remove. Every call settles lazy funding first, stages its
//! mutations on clones, validates, and only then commits, so a failed call
//! leaves no trace.

use super::core::Engine;
use super::results::{EngineError, TradeResult};
use crate::curve::{ReserveCurve, SwapDirection};
use crate::events::{EventPayload, MarginChangedEvent, PositionChangedEvent};
use crate::margin::{self, PnlMode};
use crate::position::{self, Position};
use crate::types::{Leverage, MarketId, Quote, Side, SignedSize, TraderId};
use rust_decimal::Decimal;

/// Quote flow of a trade in `side` direction: longs pay quote in, shorts take
/// quote out.
fn quote_swap_direction(side: Side) -> SwapDirection {
    match side {
        Side::Long => SwapDirection::AddToCurve,
        Side::Short => SwapDirection::RemoveFromCurve,
    }
}

/// Base flow of closing a position on `side`: a long sells its base into the
/// curve, a short buys it back out.
pub(super) fn close_base_direction(side: Side) -> SwapDirection {
    match side {
        Side::Long => SwapDirection::AddToCurve,
        Side::Short => SwapDirection::RemoveFromCurve,
    }
}

impl Engine {
    /// Open, increase, reduce or reverse a position with `quote_amount` of
    /// margin at `leverage`. The traded notional is `quote_amount * leverage`;
    /// which transition runs depends on the existing position's direction and
    /// size. `base_limit` is the trader's slippage bound on the swap.
    pub fn open_position(
        &mut self,
        trader_id: TraderId,
        market_id: MarketId,
        side: Side,
        quote_amount: Quote,
        leverage: Leverage,
        base_limit: Option<Decimal>,
    ) -> Result<TradeResult, EngineError> {
        if !quote_amount.is_positive() {
            return Err(EngineError::InvalidAmount(quote_amount.value()));
        }
        let now = self.current_time;
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        if !market.is_open() {
            return Err(EngineError::MarketHalted(market_id));
        }

        let cumulative_premium = market.cumulative_premium();
        let spread_ratio = market.params.spread_ratio;
        let initial_margin_ratio = market.params.margin_params.initial_margin_ratio;
        let window_secs = market.params.margin_params.twap_window_secs;

        let notional = quote_amount.mul(leverage.value());
        let mut staged = self
            .positions
            .get(&(trader_id, market_id))
            .cloned()
            .unwrap_or_else(|| Position::empty(market_id));
        let old_size = staged.size;
        staged.settle_funding(cumulative_premium);
        let mut curve = market.curve.clone();

        let same_direction = staged.is_empty() || staged.side() == Some(side);
        let (exchanged_base, realized_pnl, margin_released);

        if same_direction {
            let outcome =
                curve.swap_quote(quote_swap_direction(side), notional.value(), base_limit, now)?;
            let base_delta = SignedSize::from_side(side, outcome.base_amount);
            staged.increase(base_delta, notional, quote_amount);
            exchanged_base = base_delta;
            realized_pnl = Quote::zero();
            margin_released = Quote::zero();
        } else {
            let current_notional = curve.close_value(staged.size.value()).abs();
            if notional.value() <= current_notional {
                // reduce: trade the fixed quote notional against the curve and
                // realize pnl pro-rata on the closed fraction.
                let outcome = curve.swap_quote(
                    quote_swap_direction(side),
                    notional.value(),
                    base_limit,
                    now,
                )?;
                let fraction = (outcome.base_amount / staged.size.abs()).min(Decimal::ONE);
                let closed_open_notional = staged.open_notional.mul(fraction);
                let pnl = if staged.size.is_long() {
                    notional.sub(closed_open_notional)
                } else {
                    closed_open_notional.sub(notional)
                };
                let reduced = position::reduce(&mut staged, fraction, pnl);
                if reduced.shortfall.is_positive() {
                    return Err(EngineError::BadDebt(reduced.shortfall));
                }
                exchanged_base = SignedSize::from_side(side, outcome.base_amount);
                realized_pnl = pnl;
                margin_released = reduced.margin_released;
            } else {
                // reverse: close the whole old position, then open the residual
                // notional in the new direction.
                let old_side = staged.size.side().ok_or(EngineError::PositionNotFound {
                    market_id,
                    trader_id,
                })?;
                let closed_base = staged.size.abs();
                let quote_closed =
                    curve.swap_base(close_base_direction(old_side), closed_base, now)?;
                let pnl = if old_side == Side::Long {
                    Quote::new(quote_closed).sub(staged.open_notional)
                } else {
                    staged.open_notional.sub(Quote::new(quote_closed))
                };
                let reduced = position::reduce(&mut staged, Decimal::ONE, pnl);
                if reduced.shortfall.is_positive() {
                    return Err(EngineError::BadDebt(reduced.shortfall));
                }

                let residual = notional.sub(Quote::new(quote_closed));
                // the trader's bound was quoted for the full notional; scale
                // it down to the residual leg.
                let residual_limit =
                    base_limit.map(|limit| limit * residual.value() / notional.value());
                let outcome = curve.swap_quote(
                    quote_swap_direction(side),
                    residual.value(),
                    residual_limit,
                    now,
                )?;
                let base_delta = SignedSize::from_side(side, outcome.base_amount);
                staged.increase(
                    base_delta,
                    residual,
                    residual.mul(leverage.initial_margin_fraction()),
                );

                exchanged_base = SignedSize::from_side(side, closed_base + outcome.base_amount);
                realized_pnl = pnl;
                margin_released = reduced.margin_released;
            }
        }

        if !staged.is_empty() {
            let ratio = margin::margin_ratio(
                &staged,
                &curve,
                cumulative_premium,
                PnlMode::Spot,
                window_secs,
                now,
            );
            if ratio < initial_margin_ratio.value() {
                return Err(EngineError::MarginRatioNotMet {
                    ratio,
                    required: initial_margin_ratio.value(),
                });
            }
            if staged.margin.is_negative() {
                return Err(EngineError::BadDebt(staged.margin.abs()));
            }
        }

        let fee = notional.mul(spread_ratio.value());
        self.commit_trade(
            trader_id, market_id, side, curve, staged, old_size, notional, exchanged_base,
            realized_pnl, margin_released, fee,
        )
    }

    /// Close the whole position against the curve at spot. A close that leaves
    /// unfinanced loss is rejected; only liquidation may realize bad debt.
    pub fn close_position(
        &mut self,
        trader_id: TraderId,
        market_id: MarketId,
    ) -> Result<TradeResult, EngineError> {
        let now = self.current_time;
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        if !market.is_open() {
            return Err(EngineError::MarketHalted(market_id));
        }
        let cumulative_premium = market.cumulative_premium();
        let spread_ratio = market.params.spread_ratio;

        let mut staged = self
            .positions
            .get(&(trader_id, market_id))
            .filter(|p| !p.is_empty())
            .cloned()
            .ok_or(EngineError::PositionNotFound {
                market_id,
                trader_id,
            })?;
        let old_size = staged.size;
        let old_side = match staged.size.side() {
            Some(s) => s,
            None => {
                return Err(EngineError::PositionNotFound {
                    market_id,
                    trader_id,
                })
            }
        };
        staged.settle_funding(cumulative_premium);
        let mut curve = market.curve.clone();

        let closed_base = staged.size.abs();
        let quote_closed = curve.swap_base(close_base_direction(old_side), closed_base, now)?;
        let pnl = if old_side == Side::Long {
            Quote::new(quote_closed).sub(staged.open_notional)
        } else {
            staged.open_notional.sub(Quote::new(quote_closed))
        };
        let reduced = position::reduce(&mut staged, Decimal::ONE, pnl);
        if reduced.shortfall.is_positive() {
            return Err(EngineError::BadDebt(reduced.shortfall));
        }

        let fee = Quote::new(quote_closed).mul(spread_ratio.value());
        self.commit_trade(
            trader_id,
            market_id,
            old_side.opposite(),
            curve,
            staged,
            old_size,
            Quote::new(quote_closed),
            SignedSize::from_side(old_side.opposite(), closed_base),
            pnl,
            reduced.margin_released,
            fee,
        )
    }

    /// Deposit additional margin. Allowed even on a halted market since it only
    /// reduces risk and touches no reserves.
    pub fn add_margin(
        &mut self,
        trader_id: TraderId,
        market_id: MarketId,
        amount: Quote,
    ) -> Result<(), EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount.value()));
        }
        let cumulative_premium = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?
            .cumulative_premium();

        let position = self
            .positions
            .get_mut(&(trader_id, market_id))
            .filter(|p| !p.is_empty())
            .ok_or(EngineError::PositionNotFound {
                market_id,
                trader_id,
            })?;
        let funding_applied = position.settle_funding(cumulative_premium);
        position.margin = position.margin.add(amount);
        let new_margin = position.margin;

        self.emit_event(EventPayload::MarginAdded(MarginChangedEvent {
            market_id,
            trader_id,
            amount,
            new_margin,
            funding_applied,
        }));
        Ok(())
    }

    /// Withdraw margin, gated on free collateral so a paper gain never unlocks
    /// more than deposited capital.
    pub fn remove_margin(
        &mut self,
        trader_id: TraderId,
        market_id: MarketId,
        amount: Quote,
    ) -> Result<(), EngineError> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(amount.value()));
        }
        let now = self.current_time;
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        if !market.is_open() {
            return Err(EngineError::MarketHalted(market_id));
        }
        let cumulative_premium = market.cumulative_premium();
        let margin_params = market.params.margin_params.clone();

        let mut staged = self
            .positions
            .get(&(trader_id, market_id))
            .filter(|p| !p.is_empty())
            .cloned()
            .ok_or(EngineError::PositionNotFound {
                market_id,
                trader_id,
            })?;
        let funding_applied = staged.settle_funding(cumulative_premium);

        let free = margin::free_collateral(
            &staged,
            &market.curve,
            cumulative_premium,
            &margin_params,
            now,
        );
        if free < amount {
            return Err(EngineError::FreeCollateralInsufficient {
                requested: amount,
                available: free,
            });
        }
        staged.margin = staged.margin.sub(amount);
        let new_margin = staged.margin;

        self.positions.insert((trader_id, market_id), staged);
        self.emit_event(EventPayload::MarginRemoved(MarginChangedEvent {
            market_id,
            trader_id,
            amount,
            new_margin,
            funding_applied,
        }));
        Ok(())
    }

    /// Write back a validated trade: curve, position, open interest, fee
    /// routing, and the ledger event.
    #[allow(clippy::too_many_arguments)]
    fn commit_trade(
        &mut self,
        trader_id: TraderId,
        market_id: MarketId,
        side: Side,
        curve: ReserveCurve,
        staged: Position,
        old_size: SignedSize,
        exchanged_quote: Quote,
        exchanged_base: SignedSize,
        realized_pnl: Quote,
        margin_released: Quote,
        fee: Quote,
    ) -> Result<TradeResult, EngineError> {
        let new_size = staged.size;
        let new_margin = staged.margin;
        let oi_delta = SignedSize::new(new_size.value() - old_size.value());

        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        market.curve = curve;
        market.record_open_interest(oi_delta);
        if fee.is_positive() {
            market.accrue_fee(fee);
            self.treasury.distribute(market_id, fee);
        }
        let mark_price = market.mark_price();

        self.positions.insert((trader_id, market_id), staged);
        self.emit_event(EventPayload::PositionChanged(PositionChangedEvent {
            market_id,
            trader_id,
            side,
            exchanged_quote,
            exchanged_base,
            new_size,
            new_margin,
            realized_pnl,
            fee,
            mark_price,
        }));

        Ok(TradeResult {
            market_id,
            trader_id,
            side,
            exchanged_quote,
            exchanged_base,
            new_size,
            new_margin,
            realized_pnl,
            margin_released,
            fee,
            mark_price,
        })
    }
}
