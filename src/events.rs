// 9.0: every state change produces an event. used for audit trails, state
// reconstruction, and notifying external systems. the EventPayload enum lists
// all event types.

use crate::treasury::TierDraw;
use crate::types::{MarketId, Price, Quote, Side, SignedSize, Timestamp, TraderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionChanged(PositionChangedEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    MarginAdded(MarginChangedEvent),
    MarginRemoved(MarginChangedEvent),

    // Settlement events
    FundingSettled(FundingSettledEvent),
    Repegged(RepeggedEvent),
    LiquidityAdjusted(LiquidityAdjustedEvent),

    // Treasury events
    RevenueDistributed(RevenueDistributedEvent),
    CostFinanced(CostFinancedEvent),
    BadDebtRealized(BadDebtRealizedEvent),

    // Market events
    MarketHalted(MarketHaltedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionChangedEvent {
    pub market_id: MarketId,
    pub trader_id: TraderId,
    pub side: Side,
    pub exchanged_quote: Quote,
    pub exchanged_base: SignedSize,
    pub new_size: SignedSize,
    pub new_margin: Quote,
    pub realized_pnl: Quote,
    pub fee: Quote,
    pub mark_price: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub market_id: MarketId,
    pub trader_id: TraderId,
    pub liquidator_id: TraderId,
    pub closed_size: SignedSize,
    pub closed_notional: Quote,
    pub liquidation_price: Price,
    pub penalty: Quote,
    pub liquidator_reward: Quote,
    pub bad_debt: Quote,
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginChangedEvent {
    pub market_id: MarketId,
    pub trader_id: TraderId,
    pub amount: Quote,
    pub new_margin: Quote,
    /// Funding folded into margin as part of the touch.
    pub funding_applied: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSettledEvent {
    pub market_id: MarketId,
    pub premium_fraction: Decimal,
    pub funding_rate: Decimal,
    /// Signed; positive = open interest pays the pool.
    pub funding_payment: Quote,
    pub net_open_interest: SignedSize,
    pub mark_twap: Price,
    pub oracle_twap: Price,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeggedEvent {
    pub market_id: MarketId,
    pub old_mark_price: Price,
    pub new_mark_price: Price,
    /// Signed; positive = cost to the treasury.
    pub cost: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityAdjustedEvent {
    pub market_id: MarketId,
    /// Signed change of the quote reserve.
    pub quote_delta: Quote,
    pub multiplier: Decimal,
    pub new_quote_reserve: Decimal,
    pub new_base_reserve: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueDistributedEvent {
    pub market_id: MarketId,
    pub amount: Quote,
    pub to_staking_reward: Quote,
    pub to_insurance: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostFinancedEvent {
    pub market_id: MarketId,
    pub requested: Quote,
    pub financed: Quote,
    pub shortfall: Quote,
    pub draws: Vec<TierDraw>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtRealizedEvent {
    pub market_id: MarketId,
    pub trader_id: TraderId,
    pub debt: Quote,
    pub financed: Quote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketHaltedEvent {
    pub market_id: MarketId,
    /// Amount the settlement needed but could not finance.
    pub uncovered_cost: Quote,
}

pub trait EventEmitter {
    fn emit(&mut self, event: Event);
}

#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<Event>,
    next_id: u64,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl EventEmitter for EventCollector {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
