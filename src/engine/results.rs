// 10.0.2: result types and errors for engine operations.

use crate::curve::CurveError;
use crate::types::{MarketId, Price, Quote, Side, SignedSize, Timestamp, TraderId};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct TradeResult {
    pub market_id: MarketId,
    pub trader_id: TraderId,
    pub side: Side,
    /// Quote amount that crossed the curve.
    pub exchanged_quote: Quote,
    /// Signed base amount that crossed the curve.
    pub exchanged_base: SignedSize,
    pub new_size: SignedSize,
    pub new_margin: Quote,
    pub realized_pnl: Quote,
    /// Margin handed back on a reduce or close.
    pub margin_released: Quote,
    pub fee: Quote,
    pub mark_price: Price,
}

#[derive(Debug, Clone)]
pub struct FundingSettlement {
    pub market_id: MarketId,
    pub premium_fraction: Decimal,
    pub funding_rate: Decimal,
    /// Signed; positive = open interest pays the pool.
    pub funding_payment: Quote,
    pub repeg_cost: Option<Quote>,
    /// Signed quote-reserve change of the K step, if one ran.
    pub k_adjustment_cost: Option<Quote>,
    pub distributed: Quote,
    pub financed: Quote,
    pub halted: bool,
}

#[derive(Debug, Clone)]
pub struct LiquidationOutcome {
    pub market_id: MarketId,
    pub trader_id: TraderId,
    pub liquidator_id: TraderId,
    pub closed_size: SignedSize,
    pub closed_notional: Quote,
    pub liquidation_price: Price,
    pub realized_pnl: Quote,
    pub penalty: Quote,
    pub liquidator_reward: Quote,
    /// Shortfall charged to the treasury, zero for solvent closes.
    pub bad_debt: Quote,
    /// Margin returned to the trader after penalty and losses.
    pub margin_released: Quote,
    pub partial: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Trader {trader_id:?} has no position in market {market_id:?}")]
    PositionNotFound {
        market_id: MarketId,
        trader_id: TraderId,
    },

    #[error("margin ratio {ratio} below required {required}")]
    MarginRatioNotMet { ratio: Decimal, required: Decimal },

    #[error("free collateral {available} below requested {requested}")]
    FreeCollateralInsufficient { requested: Quote, available: Quote },

    #[error("bad debt of {0} cannot be financed")]
    BadDebt(Quote),

    #[error("bad debt of {0} needs financing headroom; liquidate another position first")]
    WaitUntilRealizeBadDebt(Quote),

    #[error("Trader {0:?} is not a backstop liquidity provider for this market")]
    NotBackstopLP(TraderId),

    #[error("Market {0:?} is halted")]
    MarketHalted(MarketId),

    #[error("funding not due until {0:?}")]
    FundingNotDue(Timestamp),

    #[error("no oracle price for market {0:?}")]
    NoOraclePrice(MarketId),

    #[error("Curve error: {0}")]
    Curve(#[from] CurveError),
}
