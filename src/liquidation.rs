//! Liquidation policy.
//!
//! A position is liquidatable once its spot margin ratio falls below the
//! maintenance ratio. Negative-ratio positions carry bad debt and are gated to
//! backstop liquidity providers. The engine decides full vs partial close from
//! the fluctuation limit; this module holds the pure policy pieces: the gate,
//! the penalty split, and the bad-debt financing decision.

use crate::types::{Quote, Ratio};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationParams {
    /// Fee on the closed notional, deducted from realized proceeds.
    pub liquidation_fee_ratio: Ratio,
    /// Share of the fee paid to the liquidator; the rest goes to the treasury.
    pub liquidator_share: Decimal,
    /// Fraction of the position closed when a full close would trip the
    /// fluctuation limit.
    pub partial_liquidation_ratio: Ratio,
    /// How far past the available budget a bad-debt charge may reach before it
    /// is unconditionally unfinanceable rather than queued.
    pub bad_debt_headroom: Quote,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            liquidation_fee_ratio: Ratio::new(dec!(0.0125)).unwrap(),
            liquidator_share: dec!(0.5),
            partial_liquidation_ratio: Ratio::new(dec!(0.25)).unwrap(),
            bad_debt_headroom: Quote::new(dec!(100)),
        }
    }
}

/// Outcome of the margin-ratio gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationGate {
    /// Ratio at or above maintenance: not liquidatable.
    Healthy,
    /// Below maintenance but non-negative: anyone may liquidate.
    Liquidatable,
    /// Negative ratio: bad debt, backstop liquidity providers only.
    RequiresBackstop,
}

pub fn evaluate_gate(margin_ratio: Decimal, maintenance_margin_ratio: Ratio) -> LiquidationGate {
    if margin_ratio >= maintenance_margin_ratio.value() {
        LiquidationGate::Healthy
    } else if margin_ratio >= Decimal::ZERO {
        LiquidationGate::Liquidatable
    } else {
        LiquidationGate::RequiresBackstop
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiquidationPenalty {
    pub total: Quote,
    pub liquidator_reward: Quote,
    pub treasury_contribution: Quote,
}

pub fn calculate_penalty(closed_notional: Quote, params: &LiquidationParams) -> LiquidationPenalty {
    let total = closed_notional.mul(params.liquidation_fee_ratio.value());
    let liquidator_reward = total.mul(params.liquidator_share);
    let treasury_contribution = total.sub(liquidator_reward);
    LiquidationPenalty {
        total,
        liquidator_reward,
        treasury_contribution,
    }
}

/// How a bad-debt charge against the treasury should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadDebtDecision {
    /// Budget covers it: charge the waterfall now.
    Finance,
    /// Over budget but within headroom: another liquidation must create
    /// financing room first. Recoverable.
    WaitUntilRealize,
    /// Beyond budget plus headroom: cannot be financed in any order.
    Unfinanceable,
}

pub fn bad_debt_decision(
    bad_debt: Quote,
    available_budget: Quote,
    headroom: Quote,
) -> BadDebtDecision {
    if bad_debt <= available_budget {
        BadDebtDecision::Finance
    } else if bad_debt <= available_budget.add(headroom) {
        BadDebtDecision::WaitUntilRealize
    } else {
        BadDebtDecision::Unfinanceable
    }
}
