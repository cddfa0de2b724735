// 3.0: margin math against the curve. unrealized pnl has two valuation modes,
// instantaneous (spot reserves) and time-weighted (reserve snapshot history);
// margin ratio and free collateral build on it.

use crate::curve::ReserveCurve;
use crate::position::Position;
use crate::types::{Quote, Ratio, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How the position's current notional is valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PnlMode {
    /// Close value against instantaneous reserves.
    Spot,
    /// Interval-weighted close value over the TWAP window.
    Twap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginParams {
    /// Minimum margin ratio to open or increase a position.
    pub initial_margin_ratio: Ratio,
    /// Below this the position is liquidatable.
    pub maintenance_margin_ratio: Ratio,
    /// Ratio reserved against the position when computing free collateral.
    pub withdrawal_margin_ratio: Ratio,
    /// Window for the time-weighted valuation mode, seconds.
    pub twap_window_secs: i64,
}

impl Default for MarginParams {
    fn default() -> Self {
        Self {
            initial_margin_ratio: Ratio::new(dec!(0.1)).unwrap(),
            maintenance_margin_ratio: Ratio::new(dec!(0.0625)).unwrap(),
            withdrawal_margin_ratio: Ratio::new(dec!(0.0625)).unwrap(),
            twap_window_secs: 900,
        }
    }
}

/// Current quote value of the position: what closing it against the curve
/// would move, always positive for a non-empty position.
pub fn position_notional(
    position: &Position,
    curve: &ReserveCurve,
    mode: PnlMode,
    window_secs: i64,
    now: Timestamp,
) -> Quote {
    if position.is_empty() {
        return Quote::zero();
    }
    let close_value = match mode {
        PnlMode::Spot => curve.close_value(position.size.value()),
        PnlMode::Twap => curve.twap_close_value(position.size.value(), window_secs, now),
    };
    Quote::new(close_value.abs())
}

/// Paper pnl: longs gain when the close value rises above the open notional,
/// shorts gain when the buy-back cost falls below it.
pub fn unrealized_pnl(
    position: &Position,
    curve: &ReserveCurve,
    mode: PnlMode,
    window_secs: i64,
    now: Timestamp,
) -> Quote {
    if position.is_empty() {
        return Quote::zero();
    }
    let notional = position_notional(position, curve, mode, window_secs, now);
    if position.size.is_long() {
        notional.sub(position.open_notional)
    } else {
        position.open_notional.sub(notional)
    }
}

/// Margin plus lazily-owed funding plus unrealized pnl, over current notional.
/// The same valuation mode is used throughout.
pub fn margin_ratio(
    position: &Position,
    curve: &ReserveCurve,
    cumulative_premium: Decimal,
    mode: PnlMode,
    window_secs: i64,
    now: Timestamp,
) -> Decimal {
    let notional = position_notional(position, curve, mode, window_secs, now);
    if notional.is_zero() {
        return Decimal::MAX;
    }
    let funding = crate::funding::margin_adjustment(
        position.size,
        cumulative_premium,
        position.last_premium_fraction,
    );
    let pnl = unrealized_pnl(position, curve, mode, window_secs, now);
    position.margin.add(funding).add(pnl).value() / notional.value()
}

/// Withdrawable amount: the worse of margin-with-funding and
/// margin-with-funding-plus-pnl, less the withdrawal reserve on notional.
/// Spot valuation; a paper gain never unlocks collateral.
pub fn free_collateral(
    position: &Position,
    curve: &ReserveCurve,
    cumulative_premium: Decimal,
    params: &MarginParams,
    now: Timestamp,
) -> Quote {
    if position.is_empty() {
        return Quote::zero();
    }
    let funding = crate::funding::margin_adjustment(
        position.size,
        cumulative_premium,
        position.last_premium_fraction,
    );
    let with_funding = position.margin.add(funding);
    let with_pnl = with_funding.add(unrealized_pnl(
        position,
        curve,
        PnlMode::Spot,
        params.twap_window_secs,
        now,
    ));
    let notional = position_notional(position, curve, PnlMode::Spot, params.twap_window_secs, now);
    let reserved = notional.mul(params.withdrawal_margin_ratio.value());
    with_funding.min(with_pnl).sub(reserved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::SwapDirection;
    use crate::types::{MarketId, SignedSize};
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    /// Curve after a 600-quote long against 1000/100 reserves, and the
    /// matching position: 37.5 base, 600 notional, 60 margin.
    fn setup() -> (ReserveCurve, Position) {
        let mut curve = ReserveCurve::new(dec!(1000), dec!(100), Decimal::ZERO, t(0));
        curve
            .swap_quote(SwapDirection::AddToCurve, dec!(600), None, t(0))
            .unwrap();

        let mut position = Position::empty(MarketId(1));
        position.increase(
            SignedSize::new(dec!(37.5)),
            Quote::new(dec!(600)),
            Quote::new(dec!(60)),
        );
        (curve, position)
    }

    #[test]
    fn spot_notional_round_trips_the_swap() {
        let (curve, position) = setup();
        let notional = position_notional(&position, &curve, PnlMode::Spot, 900, t(0));
        // closing 37.5 base against 1600/62.5 returns exactly the 600 put in
        assert_eq!(notional.value(), dec!(600));
    }

    #[test]
    fn pnl_zero_right_after_open() {
        let (curve, position) = setup();
        let pnl = unrealized_pnl(&position, &curve, PnlMode::Spot, 900, t(0));
        assert_eq!(pnl.value(), Decimal::ZERO);
    }

    #[test]
    fn long_gains_when_price_rises() {
        let (mut curve, position) = setup();
        // someone else buys, pushing price up
        curve
            .swap_quote(SwapDirection::AddToCurve, dec!(400), None, t(10))
            .unwrap();

        let pnl = unrealized_pnl(&position, &curve, PnlMode::Spot, 900, t(10));
        assert!(pnl.value() > Decimal::ZERO);
    }

    #[test]
    fn short_gains_when_price_falls() {
        let mut curve = ReserveCurve::new(dec!(1000), dec!(100), Decimal::ZERO, t(0));
        curve
            .swap_quote(SwapDirection::RemoveFromCurve, dec!(200), None, t(0))
            .unwrap();
        let mut position = Position::empty(MarketId(1));
        position.increase(
            SignedSize::new(dec!(-25)),
            Quote::new(dec!(200)),
            Quote::new(dec!(20)),
        );

        // price keeps falling
        curve
            .swap_quote(SwapDirection::RemoveFromCurve, dec!(100), None, t(10))
            .unwrap();

        let pnl = unrealized_pnl(&position, &curve, PnlMode::Spot, 900, t(10));
        assert!(pnl.value() > Decimal::ZERO);
    }

    #[test]
    fn margin_ratio_at_open_equals_inverse_leverage() {
        let (curve, position) = setup();
        let ratio = margin_ratio(&position, &curve, Decimal::ZERO, PnlMode::Spot, 900, t(0));
        assert_eq!(ratio, dec!(0.1)); // 60 margin on 600 notional = 10x
    }

    #[test]
    fn margin_ratio_includes_pending_funding() {
        let (curve, mut position) = setup();
        position.last_premium_fraction = Decimal::ZERO;

        // cumulative premium 0.4: long 37.5 owes 15
        let ratio = margin_ratio(&position, &curve, dec!(0.4), PnlMode::Spot, 900, t(0));
        assert_eq!(ratio, dec!(45) / dec!(600));
    }

    #[test]
    fn twap_mode_lags_spot() {
        let (mut curve, position) = setup();
        curve
            .swap_quote(SwapDirection::AddToCurve, dec!(800), None, t(450))
            .unwrap();

        let spot = position_notional(&position, &curve, PnlMode::Spot, 900, t(900));
        let twap = position_notional(&position, &curve, PnlMode::Twap, 900, t(900));
        // the window still averages over the cheaper pre-pump reserves
        assert!(twap.value() < spot.value());
    }

    #[test]
    fn free_collateral_caps_at_worse_of_margin_and_equity() {
        let (curve, position) = setup();
        let params = MarginParams {
            withdrawal_margin_ratio: Ratio::new(dec!(0.05)).unwrap(),
            ..MarginParams::default()
        };

        let free = free_collateral(&position, &curve, Decimal::ZERO, &params, t(0));
        // 60 margin, zero pnl, reserve 600 * 0.05 = 30
        assert_eq!(free.value(), dec!(30));
    }

    #[test]
    fn paper_gains_do_not_unlock_collateral() {
        let (mut curve, position) = setup();
        curve
            .swap_quote(SwapDirection::AddToCurve, dec!(400), None, t(10))
            .unwrap();
        let params = MarginParams::default();

        let free = free_collateral(&position, &curve, Decimal::ZERO, &params, t(10));
        let notional = position_notional(&position, &curve, PnlMode::Spot, 900, t(10));
        // min(margin, margin + positive pnl) = margin
        assert_eq!(
            free.value(),
            dec!(60) - notional.value() * params.withdrawal_margin_ratio.value()
        );
    }
}
