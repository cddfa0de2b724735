// 10.1 engine/core.rs: main engine. holds all markets, positions, the treasury
// and backstop registry. every mutation flows through the methods in the
// sibling modules; this file is clock control, admin and read accessors.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::events::{Event, EventId, EventPayload};
use crate::margin::{self, PnlMode};
use crate::market::{Market, MarketParams, MarketStatus};
use crate::position::Position;
use crate::treasury::Treasury;
use crate::types::{MarketId, Quote, Timestamp, TraderId};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) markets: HashMap<MarketId, Market>,
    pub(super) positions: HashMap<(TraderId, MarketId), Position>,
    pub(super) treasury: Treasury,
    pub(super) backstop_lps: HashMap<MarketId, HashSet<TraderId>>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            markets: HashMap::new(),
            positions: HashMap::new(),
            treasury: Treasury::default(),
            backstop_lps: HashMap::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_secs(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn add_market(
        &mut self,
        params: MarketParams,
        quote_reserve: Decimal,
        base_reserve: Decimal,
    ) -> MarketId {
        let market_id = params.id;
        let mut market = Market::new(params, quote_reserve, base_reserve, self.current_time);
        market
            .curve
            .set_snapshot_capacity(self.config.twap_snapshot_depth);
        self.markets.insert(market_id, market);
        market_id
    }

    pub fn get_market(&self, market_id: MarketId) -> Option<&Market> {
        self.markets.get(&market_id)
    }

    pub fn get_market_mut(&mut self, market_id: MarketId) -> Option<&mut Market> {
        self.markets.get_mut(&market_id)
    }

    /// Governance reopen after a settlement halt.
    pub fn reopen_market(&mut self, market_id: MarketId) -> Result<(), EngineError> {
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        market.status = MarketStatus::Open;
        Ok(())
    }

    pub fn register_backstop_lp(&mut self, market_id: MarketId, trader_id: TraderId) {
        self.backstop_lps.entry(market_id).or_default().insert(trader_id);
    }

    pub fn is_backstop_lp(&self, market_id: MarketId, trader_id: TraderId) -> bool {
        self.backstop_lps
            .get(&market_id)
            .is_some_and(|lps| lps.contains(&trader_id))
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    pub fn treasury_mut(&mut self) -> &mut Treasury {
        &mut self.treasury
    }

    pub fn fund_insurance(&mut self, market_id: MarketId, amount: Quote) {
        self.treasury.allocate(market_id, amount);
    }

    pub fn available_budget_for(&self, market_id: MarketId) -> Quote {
        self.treasury.available_budget(market_id)
    }

    pub fn allocated_budget_for(&self, market_id: MarketId) -> Quote {
        self.treasury.allocated_budget(market_id)
    }

    pub fn position(&self, trader_id: TraderId, market_id: MarketId) -> Option<&Position> {
        self.positions.get(&(trader_id, market_id))
    }

    pub fn positions_in(
        &self,
        market_id: MarketId,
    ) -> impl Iterator<Item = (TraderId, &Position)> {
        self.positions
            .iter()
            .filter(move |((_, m), p)| *m == market_id && !p.is_empty())
            .map(|((t, _), p)| (*t, p))
    }

    pub fn margin_ratio(
        &self,
        trader_id: TraderId,
        market_id: MarketId,
        mode: PnlMode,
    ) -> Result<Decimal, EngineError> {
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        let position = self
            .positions
            .get(&(trader_id, market_id))
            .filter(|p| !p.is_empty())
            .ok_or(EngineError::PositionNotFound {
                market_id,
                trader_id,
            })?;
        Ok(margin::margin_ratio(
            position,
            &market.curve,
            market.cumulative_premium(),
            mode,
            market.params.margin_params.twap_window_secs,
            self.current_time,
        ))
    }

    pub fn free_collateral(
        &self,
        trader_id: TraderId,
        market_id: MarketId,
    ) -> Result<Quote, EngineError> {
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        let position = self
            .positions
            .get(&(trader_id, market_id))
            .filter(|p| !p.is_empty())
            .ok_or(EngineError::PositionNotFound {
                market_id,
                trader_id,
            })?;
        Ok(margin::free_collateral(
            position,
            &market.curve,
            market.cumulative_premium(),
            &market.params.margin_params,
            self.current_time,
        ))
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            println!("[Event {}] {:?}", event.id.0, event.payload);
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
