// 6.5: multi-tier treasury. trading losses, funding shortfalls and liquidity
// adjustments are financed through an ordered waterfall: staking reward ->
// insurance allocation -> staking principal. revenue flows back in the reverse
// shape: staking reward first while the insurance vault is under target, then
// insurance. every draw is tracked per tier so auditors can reconcile exactly.

use crate::types::{MarketId, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The three financing tiers, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingTier {
    /// Tier 1: unclaimed staking-pool reward balance.
    StakingReward,
    /// Tier 2: insurance-fund budget allocated to the market.
    InsuranceBudget,
    /// Tier 3: staking-pool principal, drawn down to zero at most.
    StakingPrincipal,
}

/// Per-tier draw result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierDraw {
    pub tier: FundingTier,
    pub available: Quote,
    pub drawn: Quote,
}

/// Result of financing a cost through the waterfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceOutcome {
    pub requested: Quote,
    pub financed: Quote,
    pub shortfall: Quote,
    pub draws: Vec<TierDraw>,
}

impl FinanceOutcome {
    pub fn fully_financed(&self) -> bool {
        self.shortfall.is_zero()
    }
}

/// Result of distributing revenue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistributionOutcome {
    pub distributed: Quote,
    pub to_staking_reward: Quote,
    pub to_insurance: Quote,
}

/// Shared staking pool. Only the three operations the waterfall needs are
/// modeled: reward balance, reward/principal draws, and deactivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingPool {
    pub principal: Quote,
    pub accumulated_reward: Quote,
    /// Reward stops accruing once principal + reward reaches this.
    pub target_size: Quote,
    pub active: bool,
}

impl StakingPool {
    pub fn new(principal: Quote, target_size: Quote) -> Self {
        Self {
            principal,
            accumulated_reward: Quote::zero(),
            target_size,
            active: true,
        }
    }

    pub fn inactive() -> Self {
        Self {
            principal: Quote::zero(),
            accumulated_reward: Quote::zero(),
            target_size: Quote::zero(),
            active: false,
        }
    }

    pub fn reward_balance(&self) -> Quote {
        if self.active {
            self.accumulated_reward
        } else {
            Quote::zero()
        }
    }

    /// Room left before the pool is full relative to its target.
    pub fn reward_capacity(&self) -> Quote {
        if !self.active {
            return Quote::zero();
        }
        let held = self.principal.add(self.accumulated_reward);
        if held >= self.target_size {
            Quote::zero()
        } else {
            self.target_size.sub(held)
        }
    }

    pub fn add_reward(&mut self, amount: Quote) {
        debug_assert!(!amount.is_negative());
        self.accumulated_reward = self.accumulated_reward.add(amount);
    }

    fn draw_reward(&mut self, amount: Quote) -> Quote {
        let drawn = amount.min(self.reward_balance());
        self.accumulated_reward = self.accumulated_reward.sub(drawn);
        drawn
    }

    /// Principal withdrawal the insurance fund makes on the pool. Floors at
    /// zero, never negative.
    pub fn withdraw(&mut self, amount: Quote) -> Quote {
        if !self.active {
            return Quote::zero();
        }
        let drawn = amount.min(self.principal);
        self.principal = self.principal.sub(drawn);
        drawn
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

/// Treasury: one shared staking pool plus per-market insurance allocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treasury {
    pub staking_pool: StakingPool,
    allocations: HashMap<MarketId, Quote>,
    /// Insurance target per market; revenue prefers the staking pool while the
    /// allocation sits below this level.
    vault_targets: HashMap<MarketId, Quote>,
}

impl Treasury {
    pub fn new(staking_pool: StakingPool) -> Self {
        Self {
            staking_pool,
            allocations: HashMap::new(),
            vault_targets: HashMap::new(),
        }
    }

    pub fn allocated_budget(&self, market_id: MarketId) -> Quote {
        self.allocations.get(&market_id).copied().unwrap_or(Quote::zero())
    }

    pub fn vault_target(&self, market_id: MarketId) -> Quote {
        self.vault_targets.get(&market_id).copied().unwrap_or(Quote::zero())
    }

    pub fn set_vault_target(&mut self, market_id: MarketId, target: Quote) {
        self.vault_targets.insert(market_id, target);
    }

    pub fn allocate(&mut self, market_id: MarketId, amount: Quote) {
        debug_assert!(!amount.is_negative());
        let entry = self.allocations.entry(market_id).or_insert(Quote::zero());
        *entry = entry.add(amount);
    }

    /// Everything the waterfall could draw for this market right now.
    pub fn available_budget(&self, market_id: MarketId) -> Quote {
        self.staking_pool
            .reward_balance()
            .add(self.allocated_budget(market_id))
            .add(if self.staking_pool.active {
                self.staking_pool.principal
            } else {
                Quote::zero()
            })
    }

    /// Finance a cost through the tiers in order, drawing from each until the
    /// amount is covered or every tier is exhausted. Partial draws are allowed;
    /// the caller decides what a shortfall means.
    pub fn finance(&mut self, market_id: MarketId, amount: Quote) -> FinanceOutcome {
        debug_assert!(!amount.is_negative());
        let mut remaining = amount;
        let mut draws = Vec::with_capacity(3);

        let available = self.staking_pool.reward_balance();
        let drawn = self.staking_pool.draw_reward(remaining);
        remaining = remaining.sub(drawn);
        draws.push(TierDraw {
            tier: FundingTier::StakingReward,
            available,
            drawn,
        });

        let available = self.allocated_budget(market_id);
        let drawn = remaining.min(available);
        if let Some(entry) = self.allocations.get_mut(&market_id) {
            *entry = entry.sub(drawn);
        }
        remaining = remaining.sub(drawn);
        draws.push(TierDraw {
            tier: FundingTier::InsuranceBudget,
            available,
            drawn,
        });

        let available = if self.staking_pool.active {
            self.staking_pool.principal
        } else {
            Quote::zero()
        };
        let drawn = self.staking_pool.withdraw(remaining);
        remaining = remaining.sub(drawn);
        draws.push(TierDraw {
            tier: FundingTier::StakingPrincipal,
            available,
            drawn,
        });

        FinanceOutcome {
            requested: amount,
            financed: amount.sub(remaining),
            shortfall: remaining,
            draws,
        }
    }

    /// Distribute revenue: while the market's insurance allocation is below its
    /// vault target and the pool has reward capacity, route to the pool; the
    /// rest goes to the insurance allocation. An inactive pool receives nothing.
    pub fn distribute(&mut self, market_id: MarketId, amount: Quote) -> DistributionOutcome {
        debug_assert!(!amount.is_negative());

        let to_pool = if self.staking_pool.active
            && self.allocated_budget(market_id) < self.vault_target(market_id)
        {
            amount.min(self.staking_pool.reward_capacity())
        } else {
            Quote::zero()
        };
        let to_insurance = amount.sub(to_pool);

        self.staking_pool.add_reward(to_pool);
        self.allocate(market_id, to_insurance);

        DistributionOutcome {
            distributed: amount,
            to_staking_reward: to_pool,
            to_insurance,
        }
    }

    pub fn deactivate_staking_pool(&mut self) {
        self.staking_pool.deactivate();
    }
}

impl Default for Treasury {
    fn default() -> Self {
        Self::new(StakingPool::inactive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MARKET: MarketId = MarketId(1);

    fn treasury_with(reward: Decimal, insurance: Decimal, principal: Decimal) -> Treasury {
        let mut pool = StakingPool::new(Quote::new(principal), Quote::new(dec!(1_000_000)));
        pool.add_reward(Quote::new(reward));
        let mut treasury = Treasury::new(pool);
        treasury.allocate(MARKET, Quote::new(insurance));
        treasury
    }

    #[test]
    fn finance_follows_tier_order() {
        let mut treasury = treasury_with(dec!(10), dec!(20), dec!(30));

        let outcome = treasury.finance(MARKET, Quote::new(dec!(25)));

        assert!(outcome.fully_financed());
        assert_eq!(outcome.draws[0].drawn.value(), dec!(10)); // reward first
        assert_eq!(outcome.draws[1].drawn.value(), dec!(15)); // then insurance
        assert_eq!(outcome.draws[2].drawn.value(), dec!(0)); // principal untouched
        assert_eq!(treasury.staking_pool.principal.value(), dec!(30));
        assert_eq!(treasury.allocated_budget(MARKET).value(), dec!(5));
    }

    #[test]
    fn finance_reaches_principal_last() {
        let mut treasury = treasury_with(dec!(10), dec!(20), dec!(30));

        let outcome = treasury.finance(MARKET, Quote::new(dec!(50)));

        assert!(outcome.fully_financed());
        assert_eq!(outcome.draws[2].drawn.value(), dec!(20));
        assert_eq!(treasury.staking_pool.principal.value(), dec!(10));
        assert_eq!(treasury.allocated_budget(MARKET).value(), Decimal::ZERO);
    }

    #[test]
    fn finance_partial_draw_reports_shortfall() {
        let mut treasury = treasury_with(dec!(10), dec!(20), dec!(30));

        let outcome = treasury.finance(MARKET, Quote::new(dec!(100)));

        assert_eq!(outcome.financed.value(), dec!(60));
        assert_eq!(outcome.shortfall.value(), dec!(40));
        // principal floors at zero, never negative
        assert_eq!(treasury.staking_pool.principal.value(), Decimal::ZERO);
    }

    #[test]
    fn distribution_prefers_pool_while_vault_below_target() {
        let mut treasury = treasury_with(Decimal::ZERO, dec!(50), dec!(100));
        treasury.set_vault_target(MARKET, Quote::new(dec!(200)));

        let outcome = treasury.distribute(MARKET, Quote::new(dec!(40)));

        assert_eq!(outcome.to_staking_reward.value(), dec!(40));
        assert_eq!(outcome.to_insurance.value(), Decimal::ZERO);
    }

    #[test]
    fn distribution_overflows_to_insurance_when_pool_full() {
        let mut pool = StakingPool::new(Quote::new(dec!(90)), Quote::new(dec!(100)));
        pool.add_reward(Quote::new(dec!(5))); // capacity 5 left
        let mut treasury = Treasury::new(pool);
        treasury.set_vault_target(MARKET, Quote::new(dec!(1000)));

        let outcome = treasury.distribute(MARKET, Quote::new(dec!(40)));

        assert_eq!(outcome.to_staking_reward.value(), dec!(5));
        assert_eq!(outcome.to_insurance.value(), dec!(35));
    }

    #[test]
    fn distribution_all_to_insurance_when_pool_inactive() {
        let mut treasury = Treasury::default();
        treasury.set_vault_target(MARKET, Quote::new(dec!(1000)));

        let outcome = treasury.distribute(MARKET, Quote::new(dec!(40)));

        assert_eq!(outcome.to_staking_reward.value(), Decimal::ZERO);
        assert_eq!(outcome.to_insurance.value(), dec!(40));
        assert_eq!(treasury.allocated_budget(MARKET).value(), dec!(40));
    }

    #[test]
    fn distribution_conserves_exactly() {
        let mut treasury = treasury_with(Decimal::ZERO, dec!(10), dec!(500));
        treasury.set_vault_target(MARKET, Quote::new(dec!(100)));

        let pool_before = treasury.staking_pool.accumulated_reward;
        let insurance_before = treasury.allocated_budget(MARKET);

        let outcome = treasury.distribute(MARKET, Quote::new(dec!(123.456789)));

        let pool_delta = treasury.staking_pool.accumulated_reward.sub(pool_before);
        let insurance_delta = treasury.allocated_budget(MARKET).sub(insurance_before);
        assert_eq!(
            pool_delta.add(insurance_delta).value(),
            outcome.distributed.value()
        );
    }

    #[test]
    fn deactivated_pool_leaves_both_orders() {
        let mut treasury = treasury_with(dec!(10), dec!(20), dec!(30));
        treasury.deactivate_staking_pool();

        assert_eq!(treasury.available_budget(MARKET).value(), dec!(20));

        let outcome = treasury.finance(MARKET, Quote::new(dec!(25)));
        assert_eq!(outcome.financed.value(), dec!(20));
        assert_eq!(outcome.draws[0].drawn.value(), Decimal::ZERO);
        assert_eq!(outcome.draws[2].drawn.value(), Decimal::ZERO);
    }
}
