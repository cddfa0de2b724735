// 9.0: oracle abstraction. the engine only ever consumes a spot price and a
// time-weighted price per market; aggregation, confidence intervals and feed
// plumbing live outside this crate.

use crate::types::{MarketId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;

pub trait Oracle {
    fn spot_price(&self, market_id: MarketId) -> Option<Price>;
    fn twap_price(&self, market_id: MarketId, window_secs: i64, now: Timestamp) -> Option<Price>;
}

/// Deterministic oracle for tests and simulation. Records a price history per
/// market and computes an interval-weighted TWAP over it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixedOracle {
    histories: HashMap<MarketId, VecDeque<(Timestamp, Price)>>,
}

impl FixedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, market_id: MarketId, price: Price, now: Timestamp) {
        let history = self.histories.entry(market_id).or_default();
        if let Some(last) = history.back_mut() {
            if last.0 == now {
                last.1 = price;
                return;
            }
        }
        history.push_back((now, price));
        if history.len() > 256 {
            history.pop_front();
        }
    }
}

impl Oracle for FixedOracle {
    fn spot_price(&self, market_id: MarketId) -> Option<Price> {
        self.histories.get(&market_id)?.back().map(|(_, p)| *p)
    }

    fn twap_price(&self, market_id: MarketId, window_secs: i64, now: Timestamp) -> Option<Price> {
        let history = self.histories.get(&market_id)?;
        let latest = history.back()?.1;

        let cutoff = now.as_secs() - window_secs.max(0);
        let mut weighted = Decimal::ZERO;
        let mut covered: i64 = 0;
        let mut upper = now.as_secs();

        for (ts, price) in history.iter().rev() {
            let lower = ts.as_secs().max(cutoff);
            let span = upper - lower;
            if span > 0 {
                weighted += price.value() * Decimal::from(span);
                covered += span;
            }
            upper = lower;
            if ts.as_secs() <= cutoff {
                break;
            }
        }

        if covered == 0 {
            return Some(latest);
        }
        Price::new(weighted / Decimal::from(covered))
    }
}
