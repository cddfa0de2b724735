// 2.0: the virtual constant-product curve. quote * base = K, no real assets behind it,
// it only prices trades. 2.1 swaps, 2.2 fluctuation guard, 2.3 controlled mutations
// (scale / re-peg) used by the reserve adjuster, 2.4 reserve snapshot history for TWAP.

use crate::types::{Price, Quote, Timestamp};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Which way quote currency flows through the curve from the trader's view.
/// AddToCurve = trader pays quote in (opening a long). RemoveFromCurve = trader
/// takes quote out (opening a short / closing a long).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    AddToCurve,
    RemoveFromCurve,
}

/// One reserve state observation. Snapshots are taken on every reserve mutation
/// so TWAPs can be reconstructed without sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub timestamp: Timestamp,
    pub quote_reserve: Decimal,
    pub base_reserve: Decimal,
}

impl ReserveSnapshot {
    pub fn spot_price(&self) -> Decimal {
        self.quote_reserve / self.base_reserve
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CurveError {
    #[error("swap amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("swap would drain the {side} reserve")]
    DrainsReserve { side: &'static str },

    #[error("output {actual} worse than limit {limit}")]
    SlippageLimitExceeded { actual: Decimal, limit: Decimal },

    #[error("price moved {deviation} beyond fluctuation limit {limit}")]
    FluctuationLimitExceeded { deviation: Decimal, limit: Decimal },

    #[error("target price must be positive, got {0}")]
    InvalidTargetPrice(Decimal),
}

/// 2.0.1: swap result. the fee is computed on notional by the caller and routed
/// to the treasury; it never touches the reserves.
#[derive(Debug, Clone, Copy)]
pub struct SwapOutcome {
    /// Base amount crossing the curve (always positive).
    pub base_amount: Decimal,
    pub new_quote_reserve: Decimal,
    pub new_base_reserve: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveCurve {
    quote_reserve: Decimal,
    base_reserve: Decimal,
    /// Max relative spot move a single swap may cause. Zero disables the guard.
    pub fluctuation_limit_ratio: Decimal,
    snapshots: VecDeque<ReserveSnapshot>,
    max_snapshots: usize,
}

impl ReserveCurve {
    pub fn new(
        quote_reserve: Decimal,
        base_reserve: Decimal,
        fluctuation_limit_ratio: Decimal,
        created_at: Timestamp,
    ) -> Self {
        debug_assert!(quote_reserve > Decimal::ZERO && base_reserve > Decimal::ZERO);
        let mut snapshots = VecDeque::new();
        snapshots.push_back(ReserveSnapshot {
            timestamp: created_at,
            quote_reserve,
            base_reserve,
        });
        Self {
            quote_reserve,
            base_reserve,
            fluctuation_limit_ratio,
            snapshots,
            max_snapshots: 256,
        }
    }

    /// Cap on retained snapshots. Shrinking the cap drops the oldest history
    /// immediately, which bounds how far back a TWAP window can reach.
    pub fn set_snapshot_capacity(&mut self, capacity: usize) {
        self.max_snapshots = capacity.max(1);
        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
        }
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn quote_reserve(&self) -> Decimal {
        self.quote_reserve
    }

    pub fn base_reserve(&self) -> Decimal {
        self.base_reserve
    }

    pub fn invariant_k(&self) -> Decimal {
        self.quote_reserve * self.base_reserve
    }

    pub fn spot_price(&self) -> Price {
        Price::new_unchecked(self.quote_reserve / self.base_reserve)
    }

    // 2.1: constant-product swap with a fixed quote input.
    // AddToCurve: base_out = base - K / (quote + in)
    // RemoveFromCurve: base_in = K / (quote - out) - base
    pub fn swap_quote(
        &mut self,
        direction: SwapDirection,
        quote_amount: Decimal,
        base_limit: Option<Decimal>,
        now: Timestamp,
    ) -> Result<SwapOutcome, CurveError> {
        self.swap_quote_inner(direction, quote_amount, base_limit, now, true)
    }

    /// Same as `swap_quote` but without the fluctuation guard. Only the bounded
    /// partial-liquidation path may call this.
    pub fn swap_quote_unguarded(
        &mut self,
        direction: SwapDirection,
        quote_amount: Decimal,
        base_limit: Option<Decimal>,
        now: Timestamp,
    ) -> Result<SwapOutcome, CurveError> {
        self.swap_quote_inner(direction, quote_amount, base_limit, now, false)
    }

    fn swap_quote_inner(
        &mut self,
        direction: SwapDirection,
        quote_amount: Decimal,
        base_limit: Option<Decimal>,
        now: Timestamp,
        check_fluctuation: bool,
    ) -> Result<SwapOutcome, CurveError> {
        if quote_amount <= Decimal::ZERO {
            return Err(CurveError::NonPositiveAmount(quote_amount));
        }
        let k = self.invariant_k();

        let (new_quote, new_base, base_amount) = match direction {
            SwapDirection::AddToCurve => {
                let new_quote = self.quote_reserve + quote_amount;
                let new_base = k / new_quote;
                (new_quote, new_base, self.base_reserve - new_base)
            }
            SwapDirection::RemoveFromCurve => {
                let new_quote = self.quote_reserve - quote_amount;
                if new_quote <= Decimal::ZERO {
                    return Err(CurveError::DrainsReserve { side: "quote" });
                }
                let new_base = k / new_quote;
                (new_quote, new_base, new_base - self.base_reserve)
            }
        };

        // base_limit is a minimum for AddToCurve (trader wants at least this much
        // base) and a maximum for RemoveFromCurve (trader sells at most this much).
        if let Some(limit) = base_limit {
            if limit > Decimal::ZERO {
                let violated = match direction {
                    SwapDirection::AddToCurve => base_amount < limit,
                    SwapDirection::RemoveFromCurve => base_amount > limit,
                };
                if violated {
                    return Err(CurveError::SlippageLimitExceeded {
                        actual: base_amount,
                        limit,
                    });
                }
            }
        }

        if check_fluctuation {
            self.check_fluctuation(new_quote, new_base)?;
        }

        self.commit(new_quote, new_base, now);
        Ok(SwapOutcome {
            base_amount,
            new_quote_reserve: new_quote,
            new_base_reserve: new_base,
        })
    }

    // 2.1.1: swap with a fixed base amount, returns the quote amount crossing.
    // AddToCurve: trader sells base into the curve, receives quote.
    // RemoveFromCurve: trader buys base out of the curve, pays quote.
    pub fn swap_base(
        &mut self,
        direction: SwapDirection,
        base_amount: Decimal,
        now: Timestamp,
    ) -> Result<Decimal, CurveError> {
        self.swap_base_inner(direction, base_amount, now, true)
    }

    pub fn swap_base_unguarded(
        &mut self,
        direction: SwapDirection,
        base_amount: Decimal,
        now: Timestamp,
    ) -> Result<Decimal, CurveError> {
        self.swap_base_inner(direction, base_amount, now, false)
    }

    fn swap_base_inner(
        &mut self,
        direction: SwapDirection,
        base_amount: Decimal,
        now: Timestamp,
        check_fluctuation: bool,
    ) -> Result<Decimal, CurveError> {
        if base_amount <= Decimal::ZERO {
            return Err(CurveError::NonPositiveAmount(base_amount));
        }
        let k = self.invariant_k();

        let (new_quote, new_base, quote_amount) = match direction {
            SwapDirection::AddToCurve => {
                let new_base = self.base_reserve + base_amount;
                let new_quote = k / new_base;
                (new_quote, new_base, self.quote_reserve - new_quote)
            }
            SwapDirection::RemoveFromCurve => {
                let new_base = self.base_reserve - base_amount;
                if new_base <= Decimal::ZERO {
                    return Err(CurveError::DrainsReserve { side: "base" });
                }
                let new_quote = k / new_base;
                (new_quote, new_base, new_quote - self.quote_reserve)
            }
        };

        if check_fluctuation {
            self.check_fluctuation(new_quote, new_base)?;
        }

        self.commit(new_quote, new_base, now);
        Ok(quote_amount)
    }

    /// Quote value of closing `base_size` against current reserves, without
    /// mutating them. Positive size (net long) sells into the curve, negative
    /// buys back; the sign of the result follows the trader's cash flow.
    pub fn close_value(&self, base_size: Decimal) -> Decimal {
        close_value_at(self.quote_reserve, self.base_reserve, base_size)
    }

    // 2.2: reject swaps that move spot price beyond the per-swap limit.
    fn check_fluctuation(&self, new_quote: Decimal, new_base: Decimal) -> Result<(), CurveError> {
        if self.fluctuation_limit_ratio.is_zero() {
            return Ok(());
        }
        let old_price = self.quote_reserve / self.base_reserve;
        let new_price = new_quote / new_base;
        let deviation = ((new_price - old_price) / old_price).abs();
        if deviation > self.fluctuation_limit_ratio {
            return Err(CurveError::FluctuationLimitExceeded {
                deviation,
                limit: self.fluctuation_limit_ratio,
            });
        }
        Ok(())
    }

    /// Whether a base-side swap would trip the fluctuation guard. Used by the
    /// liquidation engine to choose full vs partial close.
    pub fn base_swap_exceeds_fluctuation(
        &self,
        direction: SwapDirection,
        base_amount: Decimal,
    ) -> bool {
        if self.fluctuation_limit_ratio.is_zero() || base_amount <= Decimal::ZERO {
            return false;
        }
        let k = self.invariant_k();
        let new_base = match direction {
            SwapDirection::AddToCurve => self.base_reserve + base_amount,
            SwapDirection::RemoveFromCurve => self.base_reserve - base_amount,
        };
        if new_base <= Decimal::ZERO {
            return true;
        }
        let new_quote = k / new_base;
        self.check_fluctuation(new_quote, new_base).is_err()
    }

    // 2.3: controlled mutations. only the reserve adjuster calls these; they are
    // the only way K or the peg changes, and each emits a ledger event upstream.

    /// Multiply both reserves by the same factor. Price-preserving; K scales by
    /// the factor squared.
    pub fn scale_reserves(&mut self, multiplier: Decimal, now: Timestamp) {
        debug_assert!(multiplier > Decimal::ZERO);
        let new_quote = self.quote_reserve * multiplier;
        let new_base = self.base_reserve * multiplier;
        self.commit(new_quote, new_base, now);
    }

    /// Move the curve to `target_price` holding K constant. Returns the signed
    /// cost: the quote value handed to traders by the move, measured as the
    /// change in close value of `net_open_interest` base. Positive = the
    /// treasury pays.
    pub fn set_reserves_to_price(
        &mut self,
        target_price: Price,
        net_open_interest: Decimal,
        now: Timestamp,
    ) -> Result<Quote, CurveError> {
        let target = target_price.value();
        if target <= Decimal::ZERO {
            return Err(CurveError::InvalidTargetPrice(target));
        }
        let k = self.invariant_k();
        // quote/base = target and quote*base = K  =>  base = sqrt(K/target)
        let new_base = (k / target)
            .sqrt()
            .ok_or(CurveError::InvalidTargetPrice(target))?;
        let new_quote = k / new_base;

        let before = close_value_at(self.quote_reserve, self.base_reserve, net_open_interest);
        let after = close_value_at(new_quote, new_base, net_open_interest);

        self.commit(new_quote, new_base, now);
        Ok(Quote::new(after - before))
    }

    // 2.4: snapshot history and TWAP.

    fn commit(&mut self, new_quote: Decimal, new_base: Decimal, now: Timestamp) {
        self.quote_reserve = new_quote;
        self.base_reserve = new_base;
        // Same-timestamp mutations overwrite the last snapshot so the history
        // stays strictly increasing in time.
        if let Some(last) = self.snapshots.back_mut() {
            if last.timestamp == now {
                last.quote_reserve = new_quote;
                last.base_reserve = new_base;
                return;
            }
        }
        self.snapshots.push_back(ReserveSnapshot {
            timestamp: now,
            quote_reserve: new_quote,
            base_reserve: new_base,
        });
        if self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
        }
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &ReserveSnapshot> {
        self.snapshots.iter()
    }

    /// Interval-weighted average spot price over the trailing window.
    pub fn twap_price(&self, window_secs: i64, now: Timestamp) -> Price {
        Price::new_unchecked(self.twap_of(window_secs, now, |s| s.spot_price()))
    }

    /// Interval-weighted average close value of `base_size` over the window.
    /// This is the time-weighted notional used by the TWAP PnL mode.
    pub fn twap_close_value(&self, base_size: Decimal, window_secs: i64, now: Timestamp) -> Decimal {
        self.twap_of(window_secs, now, |s| {
            close_value_at(s.quote_reserve, s.base_reserve, base_size)
        })
    }

    fn twap_of<F: Fn(&ReserveSnapshot) -> Decimal>(
        &self,
        window_secs: i64,
        now: Timestamp,
        value: F,
    ) -> Decimal {
        let cutoff = now.as_secs() - window_secs.max(0);
        let mut weighted = Decimal::ZERO;
        let mut covered: i64 = 0;
        let mut upper = now.as_secs();

        for snap in self.snapshots.iter().rev() {
            let lower = snap.timestamp.as_secs().max(cutoff);
            let span = upper - lower;
            if span > 0 {
                weighted += value(snap) * Decimal::from(span);
                covered += span;
            }
            upper = lower;
            if snap.timestamp.as_secs() <= cutoff {
                break;
            }
        }

        if covered == 0 {
            // Window degenerate or history empty beyond the latest point.
            return value(self.snapshots.back().expect("history is never empty"));
        }
        weighted / Decimal::from(covered)
    }
}

/// Quote received (positive) or paid (negative) if `base_size` net open
/// interest were closed against reserves (q, b). A net long sells `base_size`
/// into the curve; a net short buys it back. One formula covers both signs:
/// value = q - K / (b + size).
pub fn close_value_at(quote_reserve: Decimal, base_reserve: Decimal, base_size: Decimal) -> Decimal {
    if base_size.is_zero() {
        return Decimal::ZERO;
    }
    let k = quote_reserve * base_reserve;
    let shifted = base_reserve + base_size;
    debug_assert!(shifted > Decimal::ZERO, "open interest exceeds base reserve");
    quote_reserve - k / shifted
}
