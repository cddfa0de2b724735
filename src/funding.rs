// 5.0: periodic funding. each period the spread between the curve TWAP and the
// oracle TWAP becomes a premium owed between longs and shorts; the aggregate
// pool leg is settled against the treasury. per-position settlement is lazy:
// the market keeps a running premium sum and positions catch up on next touch.

use crate::types::{Price, Quote, SignedSize};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Premium per unit of base for one period: marketTwap - oracleTwap.
/// Positive means the curve trades rich, so longs pay shorts.
pub fn premium_fraction(market_twap: Price, oracle_twap: Price) -> Decimal {
    market_twap.value() - oracle_twap.value()
}

/// Relative funding rate for reporting: premium / oracleTwap.
pub fn funding_rate(market_twap: Price, oracle_twap: Price) -> Decimal {
    premium_fraction(market_twap, oracle_twap) / oracle_twap.value()
}

/// Signed amount the pool collects (positive) or owes (negative) for the
/// period: rate * oracleTwap * netOpenInterest, which reduces to
/// premium * netOpenInterest.
pub fn funding_payment(
    market_twap: Price,
    oracle_twap: Price,
    net_open_interest: SignedSize,
) -> Quote {
    Quote::new(premium_fraction(market_twap, oracle_twap) * net_open_interest.value())
}

/// Funding a position owes since it last touched the market, from the
/// cumulative premium series. O(1) regardless of elapsed periods.
pub fn owed_since_last_touch(
    size: SignedSize,
    cumulative_now: Decimal,
    cumulative_at_last_touch: Decimal,
) -> Quote {
    Quote::new((cumulative_now - cumulative_at_last_touch) * size.value())
}

/// Signed margin adjustment from lazy funding: what the position owes comes
/// out of margin, what it is owed goes in.
pub fn margin_adjustment(
    size: SignedSize,
    cumulative_now: Decimal,
    cumulative_at_last_touch: Decimal,
) -> Quote {
    owed_since_last_touch(size, cumulative_now, cumulative_at_last_touch).negate()
}

/// Running premium series. Append-only; one entry per settled period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PremiumSeries {
    cumulative: Vec<Decimal>,
}

impl PremiumSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Decimal {
        self.cumulative.last().copied().unwrap_or(Decimal::ZERO)
    }

    pub fn append(&mut self, premium: Decimal) -> Decimal {
        let next = self.latest() + premium;
        self.cumulative.push(next);
        next
    }

    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }
}
