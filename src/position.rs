// 4.0: per-trader, per-market position state. created lazily with zeroed fields
// on the first margin-affecting call. 4.1 has the increase/reduce transitions.
// invariant held everywhere: size == 0 => margin == 0 => open_notional == 0.

use crate::funding::margin_adjustment;
use crate::types::{MarketId, Quote, Side, SignedSize};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    /// Signed base size; sign is the direction.
    pub size: SignedSize,
    /// Collateral backing the position. Non-negative outside the bad-debt path.
    pub margin: Quote,
    /// Unsigned quote value at last update.
    pub open_notional: Quote,
    /// Cumulative premium level at last touch; funding owed since then is
    /// (market cumulative - this) * size, applied lazily.
    pub last_premium_fraction: Decimal,
}

impl Position {
    pub fn empty(market_id: MarketId) -> Self {
        Self {
            market_id,
            size: SignedSize::zero(),
            margin: Quote::zero(),
            open_notional: Quote::zero(),
            last_premium_fraction: Decimal::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    pub fn side(&self) -> Option<Side> {
        self.size.side()
    }

    /// Fold funding owed since last touch into margin and mark the position
    /// caught up. Returns the signed margin adjustment.
    pub fn settle_funding(&mut self, cumulative_premium: Decimal) -> Quote {
        let adjustment = margin_adjustment(self.size, cumulative_premium, self.last_premium_fraction);
        self.margin = self.margin.add(adjustment);
        self.last_premium_fraction = cumulative_premium;
        adjustment
    }

    // 4.1: same-direction add. margin deposit comes in from the trader.
    pub fn increase(&mut self, base_delta: SignedSize, notional: Quote, margin_added: Quote) {
        debug_assert!(
            self.is_empty() || base_delta.is_long() == self.size.is_long(),
            "increase must match position direction"
        );
        self.size = self.size.add(base_delta.value());
        self.open_notional = self.open_notional.add(notional);
        self.margin = self.margin.add(margin_added);
    }
}

/// Result of closing part or all of a position.
#[derive(Debug, Clone, Copy)]
pub struct ReduceOutcome {
    pub realized_pnl: Quote,
    /// Margin handed back to the trader. Zero when the close left a shortfall.
    pub margin_released: Quote,
    /// Unfinanced loss; positive only in the bad-debt case.
    pub shortfall: Quote,
}

/// Close `close_fraction` of the position (1 = full close), realizing
/// `realized_pnl` against the released margin. size/margin/open_notional shrink
/// pro-rata. A negative settled amount becomes a shortfall for the caller to
/// finance or reject.
pub fn reduce(position: &mut Position, close_fraction: Decimal, realized_pnl: Quote) -> ReduceOutcome {
    debug_assert!(close_fraction > Decimal::ZERO && close_fraction <= Decimal::ONE);

    if close_fraction == Decimal::ONE {
        let settled = position.margin.add(realized_pnl);
        position.size = SignedSize::zero();
        position.margin = Quote::zero();
        position.open_notional = Quote::zero();
        return if settled.is_negative() {
            ReduceOutcome {
                realized_pnl,
                margin_released: Quote::zero(),
                shortfall: settled.abs(),
            }
        } else {
            ReduceOutcome {
                realized_pnl,
                margin_released: settled,
                shortfall: Quote::zero(),
            }
        };
    }

    let keep = Decimal::ONE - close_fraction;
    let mut released = position.margin.mul(close_fraction).add(realized_pnl);
    let mut remaining_margin = position.margin.mul(keep);

    // A losing partial close eats into the remaining margin before anything
    // is returned to the trader.
    if released.is_negative() {
        remaining_margin = remaining_margin.add(released);
        released = Quote::zero();
    }

    let shortfall = if remaining_margin.is_negative() {
        let s = remaining_margin.abs();
        remaining_margin = Quote::zero();
        s
    } else {
        Quote::zero()
    };

    position.size = position.size.scale(keep);
    position.margin = remaining_margin;
    position.open_notional = position.open_notional.mul(keep);

    ReduceOutcome {
        realized_pnl,
        margin_released: released,
        shortfall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
        let mut p = Position::empty(MarketId(1));
        p.increase(
            SignedSize::new(dec!(37.5)),
            Quote::new(dec!(600)),
            Quote::new(dec!(60)),
        );
        p
    }

    #[test]
    fn empty_position_is_zeroed() {
        let p = Position::empty(MarketId(1));
        assert!(p.is_empty());
        assert_eq!(p.margin.value(), Decimal::ZERO);
        assert_eq!(p.open_notional.value(), Decimal::ZERO);
        assert!(p.side().is_none());
    }

    #[test]
    fn increase_accumulates() {
        let mut p = long_position();
        p.increase(
            SignedSize::new(dec!(10)),
            Quote::new(dec!(200)),
            Quote::new(dec!(20)),
        );

        assert_eq!(p.size.value(), dec!(47.5));
        assert_eq!(p.open_notional.value(), dec!(800));
        assert_eq!(p.margin.value(), dec!(80));
    }

    #[test]
    fn settle_funding_long_pays_positive_premium() {
        let mut p = long_position();
        let adjustment = p.settle_funding(dec!(0.4));

        // long 37.5 owes 0.4 * 37.5 = 15
        assert_eq!(adjustment.value(), dec!(-15));
        assert_eq!(p.margin.value(), dec!(45));
        assert_eq!(p.last_premium_fraction, dec!(0.4));

        // caught up: settling again at the same level is a no-op
        let again = p.settle_funding(dec!(0.4));
        assert_eq!(again.value(), Decimal::ZERO);
    }

    #[test]
    fn full_close_zeroes_everything() {
        let mut p = long_position();
        let outcome = reduce(&mut p, Decimal::ONE, Quote::new(dec!(25)));

        assert!(p.is_empty());
        assert_eq!(p.margin.value(), Decimal::ZERO);
        assert_eq!(p.open_notional.value(), Decimal::ZERO);
        assert_eq!(outcome.margin_released.value(), dec!(85));
        assert_eq!(outcome.shortfall.value(), Decimal::ZERO);
    }

    #[test]
    fn full_close_with_loss_beyond_margin_reports_shortfall() {
        let mut p = long_position();
        let outcome = reduce(&mut p, Decimal::ONE, Quote::new(dec!(-75)));

        assert!(p.is_empty());
        assert_eq!(outcome.margin_released.value(), Decimal::ZERO);
        assert_eq!(outcome.shortfall.value(), dec!(15));
    }

    #[test]
    fn partial_close_is_pro_rata() {
        let mut p = long_position();
        let outcome = reduce(&mut p, dec!(0.4), Quote::new(dec!(10)));

        assert_eq!(p.size.value(), dec!(22.5));
        assert_eq!(p.open_notional.value(), dec!(360));
        assert_eq!(p.margin.value(), dec!(36));
        assert_eq!(outcome.margin_released.value(), dec!(34)); // 24 released + 10 pnl
    }

    #[test]
    fn losing_partial_close_eats_remaining_margin() {
        let mut p = long_position();
        let outcome = reduce(&mut p, dec!(0.5), Quote::new(dec!(-40)));

        // released would be 30 - 40 = -10: nothing returned, remainder absorbs it
        assert_eq!(outcome.margin_released.value(), Decimal::ZERO);
        assert_eq!(p.margin.value(), dec!(20));
        assert_eq!(outcome.shortfall.value(), Decimal::ZERO);
    }
}
