//! Order Execution Engine Simulation.
//!
//! Walks the full engine lifecycle: placement, reservation, fills,
//! cancels, risk denials, the approval gate, concurrent load and the
//! hash-chained audit trail.

use exec_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("Order Execution Engine Simulation");
    println!("Reserve-Then-Settle, Audited End to End\n");

    scenario_1_order_lifecycle();
    scenario_2_cancel_releases_funds();
    scenario_3_risk_limits();
    scenario_4_shorts_and_pnl();
    scenario_5_approval_gate();
    scenario_6_concurrent_load();
    scenario_7_audit_trail();

    println!("\nAll simulations completed successfully.");
}

fn new_engine(config: EngineConfig) -> (Arc<Engine>, Arc<StaticPrices>, Arc<StaticLimits>) {
    let prices = Arc::new(StaticPrices::new());
    let limits = Arc::new(StaticLimits::new());
    let engine = Engine::new(config, prices.clone(), limits.clone());
    (Arc::new(engine), prices, limits)
}

fn btc() -> Symbol {
    Symbol::new("BTC-USD")
}

/// Reserve on placement, settle on fill, surplus back to available.
fn scenario_1_order_lifecycle() {
    println!("Scenario 1: Order Lifecycle\n");

    let (engine, prices, _limits) = new_engine(EngineConfig::default());
    prices.set_price(btc(), Price::new_unchecked(dec!(9000)));

    let alice = engine.open_account();
    engine.deposit(alice, Cash::new(dec!(10000))).unwrap();
    println!("  Alice deposits $10,000");

    let outcome = engine
        .place_limit_order(alice, btc(), Side::Buy, dec!(1), Price::new_unchecked(dec!(9000)))
        .unwrap();
    let order_id = outcome.order_id();
    let funds = engine.funds(alice).unwrap();
    println!(
        "  Limit BUY 1 BTC @ $9,000 placed: available ${}, reserved ${}",
        funds.available, funds.reserved
    );

    let receipt = engine.fill_order(order_id, Price::new_unchecked(dec!(8500))).unwrap();
    let funds = engine.funds(alice).unwrap();
    println!(
        "  Filled @ $8,500: cost ${}, released ${}",
        receipt.cash_delta.negate(),
        receipt.released
    );
    println!(
        "  After fill: available ${}, reserved ${}",
        funds.available, funds.reserved
    );

    let position = engine.position(alice, &btc()).unwrap().unwrap();
    println!(
        "  Position: {} BTC @ ${} entry\n",
        position.qty, position.avg_price
    );
}

/// Cancelling a reserved order returns every earmarked cent.
fn scenario_2_cancel_releases_funds() {
    println!("Scenario 2: Cancel Releases Funds\n");

    let (engine, prices, _limits) = new_engine(EngineConfig::default());
    prices.set_price(btc(), Price::new_unchecked(dec!(50000)));

    let bob = engine.open_account();
    engine.deposit(bob, Cash::new(dec!(75000))).unwrap();

    let outcome = engine
        .place_limit_order(bob, btc(), Side::Buy, dec!(1), Price::new_unchecked(dec!(48000)))
        .unwrap();
    let funds = engine.funds(bob).unwrap();
    println!(
        "  Placed: available ${}, reserved ${}",
        funds.available, funds.reserved
    );

    let released = engine.cancel_order(outcome.order_id()).unwrap();
    let funds = engine.funds(bob).unwrap();
    println!("  Cancelled: ${} released", released);
    println!(
        "  After cancel: available ${}, reserved ${}\n",
        funds.available, funds.reserved
    );
}

/// Risk limits deny orders before any funds move.
fn scenario_3_risk_limits() {
    println!("Scenario 3: Risk Limits\n");

    let (engine, prices, limits) = new_engine(EngineConfig::default());
    prices.set_price(btc(), Price::new_unchecked(dec!(50000)));

    let carol = engine.open_account();
    engine.deposit(carol, Cash::new(dec!(500000))).unwrap();
    limits.set_limits(
        carol,
        vec![RiskLimit::MaxPositionSize {
            symbol: btc(),
            max_qty: dec!(2),
        }],
    );

    let outcome = engine
        .place_market_order(carol, btc(), Side::Buy, dec!(5))
        .unwrap();
    describe_outcome("5 BTC market buy", &outcome);

    let outcome = engine
        .place_market_order(carol, btc(), Side::Buy, dec!(1))
        .unwrap();
    describe_outcome("1 BTC market buy", &outcome);

    // Volume counts at fill time, so fill two orders before the rejection.
    let heidi = engine.open_account();
    engine.deposit(heidi, Cash::new(dec!(500000))).unwrap();
    limits.set_limits(
        heidi,
        vec![RiskLimit::MaxDailyVolume {
            max_notional: Cash::new(dec!(200000)),
        }],
    );
    for qty in [dec!(1), dec!(2)] {
        let outcome = engine
            .place_market_order(heidi, btc(), Side::Buy, qty)
            .unwrap();
        engine.fill_order_at_market(outcome.order_id()).unwrap();
    }
    println!("  Heidi filled $150,000 of her $200,000 daily ceiling");
    let outcome = engine
        .place_market_order(heidi, btc(), Side::Buy, dec!(2))
        .unwrap();
    describe_outcome("2 BTC market buy", &outcome);

    // A pauper account shows the funds rejection path.
    let dave = engine.open_account();
    engine.deposit(dave, Cash::new(dec!(100))).unwrap();
    let outcome = engine
        .place_market_order(dave, btc(), Side::Buy, dec!(1))
        .unwrap();
    describe_outcome("underfunded 1 BTC buy", &outcome);
    println!();
}

fn describe_outcome(label: &str, outcome: &PlaceOutcome) {
    match outcome {
        PlaceOutcome::Accepted { reserved, .. } => {
            println!("  {}: accepted, ${} reserved", label, reserved);
        }
        PlaceOutcome::HeldForApproval { notional, .. } => {
            println!("  {}: held for approval (${} notional)", label, notional);
        }
        PlaceOutcome::Rejected { reason, .. } => {
            println!("  {}: rejected ({})", label, reason);
        }
    }
}

/// Sells, shorts, realized PnL and the conservation identity.
fn scenario_4_shorts_and_pnl() {
    println!("Scenario 4: Shorts and Realized PnL\n");

    let (engine, prices, _limits) = new_engine(EngineConfig::default());
    prices.set_price(btc(), Price::new_unchecked(dec!(100)));

    let erin = engine.open_account();
    engine.deposit(erin, Cash::new(dec!(1000))).unwrap();

    let buy = engine
        .place_market_order(erin, btc(), Side::Buy, dec!(2))
        .unwrap();
    engine.fill_order(buy.order_id(), Price::new_unchecked(dec!(100))).unwrap();
    println!("  Bought 2 @ $100");

    prices.set_price(btc(), Price::new_unchecked(dec!(120)));
    let sell = engine
        .place_market_order(erin, btc(), Side::Sell, dec!(1))
        .unwrap();
    let receipt = engine.fill_order_at_market(sell.order_id()).unwrap();
    println!(
        "  Sold 1 @ $120: proceeds ${}, realized PnL ${}",
        receipt.cash_delta, receipt.realized_pnl
    );

    // Sell through the remaining long into a short.
    let flip = engine
        .place_market_order(erin, btc(), Side::Sell, dec!(2))
        .unwrap();
    let receipt = engine.fill_order(flip.order_id(), Price::new_unchecked(dec!(110))).unwrap();
    let position = receipt.position_after.unwrap();
    println!(
        "  Sold 2 @ $110: now {} BTC (short), realized PnL ${}",
        position.qty, receipt.realized_pnl
    );

    let stats = engine.stats(erin).unwrap();
    let funds = engine.funds(erin).unwrap();
    println!(
        "  Stats: {} fills, {} winners, total realized ${}",
        stats.fills, stats.winning_fills, stats.realized_pnl
    );
    println!(
        "  Funds: available ${}, reserved ${}\n",
        funds.available, funds.reserved
    );
}

/// Orders over the notional threshold park until someone signs off.
fn scenario_5_approval_gate() {
    println!("Scenario 5: Approval Gate\n");

    let config = EngineConfig {
        approval_threshold: Cash::new(dec!(1000000)),
        ..EngineConfig::default()
    };
    let (engine, prices, _limits) = new_engine(config);
    prices.set_price(btc(), Price::new_unchecked(dec!(40000)));

    let fund = engine.open_account();
    engine.deposit(fund, Cash::new(dec!(5000000))).unwrap();

    let big = engine
        .place_limit_order(fund, btc(), Side::Buy, dec!(30), Price::new_unchecked(dec!(40000)))
        .unwrap();
    describe_outcome("30 BTC @ $40k", &big);

    let approved = engine.approve_order(big.order_id()).unwrap();
    describe_outcome("after approval", &approved);

    let bigger = engine
        .place_limit_order(fund, btc(), Side::Buy, dec!(50), Price::new_unchecked(dec!(40000)))
        .unwrap();
    describe_outcome("50 BTC @ $40k", &bigger);

    engine.decline_order(bigger.order_id()).unwrap();
    println!(
        "  after decline: status {:?}\n",
        engine.order_status(bigger.order_id()).unwrap()
    );
}

/// Concurrent accounts hammering the engine; the audit chain stays intact.
fn scenario_6_concurrent_load() {
    println!("Scenario 6: Concurrent Load\n");

    let (engine, prices, _limits) = new_engine(EngineConfig::default());
    prices.set_price(btc(), Price::new_unchecked(dec!(1000)));

    let num_threads = 8;
    let orders_per_thread = 25;
    let mut handles = Vec::new();

    for _ in 0..num_threads {
        let engine = engine.clone();
        handles.push(std::thread::spawn(move || {
            let account = engine.open_account();
            engine.deposit(account, Cash::new(dec!(1000000))).unwrap();

            for i in 0..orders_per_thread {
                let outcome = engine
                    .place_market_order(account, btc(), Side::Buy, dec!(1))
                    .unwrap();
                if i % 3 == 0 {
                    engine.cancel_order(outcome.order_id()).unwrap();
                } else {
                    engine.fill_order_at_market(outcome.order_id()).unwrap();
                }
            }
            account
        }));
    }

    let accounts: Vec<AccountId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let mut total = Cash::zero();
    for account in &accounts {
        let funds = engine.funds(*account).unwrap();
        total = total.add(funds.total());
    }

    println!(
        "  {} threads x {} orders: {} audit records",
        num_threads,
        orders_per_thread,
        engine.audit_len()
    );
    println!("  Total funds across accounts: ${}", total);
    match engine.verify_audit_integrity() {
        Ok(()) => println!("  Audit chain verified intact\n"),
        Err(err) => println!("  AUDIT FAILURE: {}\n", err),
    }
}

/// Export a time slice of the trail and verify the whole chain.
fn scenario_7_audit_trail() {
    println!("Scenario 7: Audit Trail\n");

    let (engine, prices, _limits) = new_engine(EngineConfig::default());
    prices.set_price(btc(), Price::new_unchecked(dec!(200)));
    engine.set_time(Timestamp::from_millis(1_000));

    let grace = engine.open_account();
    engine.deposit(grace, Cash::new(dec!(10000))).unwrap();

    engine.advance_time(1_000);
    let first = engine
        .place_market_order(grace, btc(), Side::Buy, dec!(3))
        .unwrap();
    engine.fill_order_at_market(first.order_id()).unwrap();

    engine.advance_time(1_000);
    let second = engine
        .place_limit_order(grace, btc(), Side::Buy, dec!(5), Price::new_unchecked(dec!(190)))
        .unwrap();
    engine.cancel_order(second.order_id()).unwrap();

    println!("  {} records in the log:", engine.audit_len());
    for record in engine.audit_records() {
        println!(
            "    #{} t={} {} hash {}..",
            record.sequence,
            record.timestamp.as_millis(),
            record.payload.kind(),
            &record.hash[..12]
        );
    }

    let slice = engine.export_audit(Timestamp::from_millis(2_000), Timestamp::from_millis(2_999));
    println!("  Export [2000, 2999]: {} records", slice.len());

    match engine.verify_audit_integrity() {
        Ok(()) => println!("  Chain verification: OK"),
        Err(err) => println!("  Chain verification FAILED: {}", err),
    }

    let total_flow: Decimal = engine
        .audit_records()
        .iter()
        .filter_map(|record| match &record.payload {
            EventPayload::OrderFilled(fill) => Some(fill.cash_delta.value()),
            _ => None,
        })
        .sum();
    println!("  Net cash flow through fills: ${}", total_flow);
}
