//! Virtual AMM Perpetuals Core Simulation.
//!
//! Walks the engine through representative scenarios: trading against the
//! curve, a funding settlement with a K adjustment, a crash with a backstop
//! liquidation and bad debt, and a settlement halt.

use rust_decimal_macros::dec;
use vamm_core::*;

fn main() {
    println!("Virtual AMM Perpetuals Core Simulation");
    println!("Single Curve, Isolated Margin, Funding Waterfall\n");

    scenario_1_trading();
    scenario_2_funding_and_k_growth();
    scenario_3_crash_and_liquidation();
    scenario_4_settlement_halt();

    println!("\nAll simulations completed successfully.");
}

fn eth_market() -> MarketParams {
    let mut params = MarketParams::eth_perp();
    params.spread_ratio = Ratio::new(dec!(0.0065)).unwrap();
    params
}

/// Open, inspect, and close a leveraged long against the curve.
fn scenario_1_trading() {
    println!("Scenario 1: Trading Against the Curve\n");

    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(MarketParams::eth_perp(), dec!(1000), dec!(100));
    let alice = TraderId(1);

    println!(
        "  Market opens at mark price {}",
        engine.get_market(market).unwrap().mark_price()
    );

    let result = engine
        .open_position(
            alice,
            market,
            Side::Long,
            Quote::new(dec!(60)),
            Leverage::new(dec!(10)).unwrap(),
            None,
        )
        .unwrap();
    println!(
        "  Alice opens long: {} base for {} quote, margin {}",
        result.exchanged_base, result.exchanged_quote, result.new_margin
    );
    println!(
        "  Margin ratio: {}",
        engine.margin_ratio(alice, market, PnlMode::Spot).unwrap()
    );
    println!(
        "  Mark price after: {}",
        engine.get_market(market).unwrap().mark_price()
    );

    let close = engine.close_position(alice, market).unwrap();
    println!(
        "  Alice closes: pnl {}, margin released {}\n",
        close.realized_pnl, close.margin_released
    );
}

/// A funding period nets revenue and part of it deepens the curve.
fn scenario_2_funding_and_k_growth() {
    println!("Scenario 2: Funding Settlement and K Growth\n");

    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(eth_market(), dec!(1000), dec!(100));
    engine.fund_insurance(market, Quote::new(dec!(500)));

    let mut oracle = FixedOracle::new();
    oracle.set_price(market, Price::new_unchecked(dec!(39.96)), engine.time());

    let bob = TraderId(2);
    engine
        .open_position(
            bob,
            market,
            Side::Long,
            Quote::new(dec!(100)),
            Leverage::new(dec!(10)).unwrap(),
            None,
        )
        .unwrap();
    println!(
        "  Bob opens a 1000-notional long; mark price {}",
        engine.get_market(market).unwrap().mark_price()
    );
    println!(
        "  Fees accrued this period: {}",
        engine.get_market(market).unwrap().net_revenue_since_last_funding
    );

    let insurance_before = engine.allocated_budget_for(market);
    engine.advance_time(3600);
    let settlement = engine.pay_funding(market, &oracle).unwrap();

    println!("  Funding rate: {}", settlement.funding_rate);
    println!("  Funding payment (pool collects): {}", settlement.funding_payment);
    if let Some(cost) = settlement.k_adjustment_cost {
        println!("  K adjustment spent: {}", cost);
    }
    println!(
        "  Insurance delta: {}\n",
        engine.allocated_budget_for(market).sub(insurance_before)
    );
}

/// Oracle crash leaves a long underwater; only a backstop LP may realize the
/// bad debt.
fn scenario_3_crash_and_liquidation() {
    println!("Scenario 3: Crash and Backstop Liquidation\n");

    let mut engine = Engine::new(EngineConfig::default());
    let market = engine.add_market(MarketParams::eth_perp(), dec!(1000), dec!(100));
    engine.fund_insurance(market, Quote::new(dec!(1000)));

    let carol = TraderId(3);
    let dave = TraderId(4);
    let backstop = TraderId(99);
    engine.register_backstop_lp(market, backstop);

    engine
        .open_position(
            carol,
            market,
            Side::Long,
            Quote::new(dec!(60)),
            Leverage::new(dec!(10)).unwrap(),
            None,
        )
        .unwrap();

    // dave dumps, crushing the mark price under carol's entry
    engine.advance_time(60);
    engine
        .open_position(
            dave,
            market,
            Side::Short,
            Quote::new(dec!(120)),
            Leverage::new(dec!(10)).unwrap(),
            None,
        )
        .unwrap();

    let ratio = engine.margin_ratio(carol, market, PnlMode::Spot).unwrap();
    println!("  Carol's margin ratio after the dump: {}", ratio);

    match engine.close_position(carol, market) {
        Err(EngineError::BadDebt(debt)) => {
            println!("  Carol cannot close her own bad debt of {}", debt)
        }
        other => println!("  Unexpected close outcome: {:?}", other),
    }
    match engine.liquidate(market, carol, dave) {
        Err(EngineError::NotBackstopLP(_)) => {
            println!("  Dave is not a backstop LP and is turned away")
        }
        other => println!("  Unexpected liquidation outcome: {:?}", other),
    }

    let outcome = engine.liquidate(market, carol, backstop).unwrap();
    println!(
        "  Backstop liquidates: closed {} base, penalty {}, bad debt {}",
        outcome.closed_size, outcome.penalty, outcome.bad_debt
    );
    println!(
        "  Insurance remaining: {}\n",
        engine.allocated_budget_for(market)
    );
}

/// A funding cost beyond everything the treasury and K-shrink can raise halts
/// the market.
fn scenario_4_settlement_halt() {
    println!("Scenario 4: Settlement Halt\n");

    let mut engine = Engine::new(EngineConfig::default());
    let mut params = MarketParams::eth_perp();
    params.can_lower_k = false;
    params.is_adjustable = false;
    let market = engine.add_market(params, dec!(1000), dec!(100));
    engine.fund_insurance(market, Quote::new(dec!(1)));

    let erin = TraderId(5);
    engine
        .open_position(
            erin,
            market,
            Side::Long,
            Quote::new(dec!(20)),
            Leverage::new(dec!(10)).unwrap(),
            None,
        )
        .unwrap();

    // oracle far above the mark: the pool owes longs more than it can finance
    let mut oracle = FixedOracle::new();
    oracle.set_price(market, Price::new_unchecked(dec!(30)), engine.time());
    engine.advance_time(3600);

    let settlement = engine.pay_funding(market, &oracle).unwrap();
    println!("  Funding payment: {}", settlement.funding_payment);
    println!("  Market halted: {}", settlement.halted);

    match engine.open_position(
        erin,
        market,
        Side::Long,
        Quote::new(dec!(10)),
        Leverage::new(dec!(10)).unwrap(),
        None,
    ) {
        Err(EngineError::MarketHalted(_)) => println!("  New trades are rejected while halted"),
        other => println!("  Unexpected open outcome: {:?}", other),
    }
}
