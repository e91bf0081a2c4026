//! Property-based tests for core money math.
//!
//! These tests verify invariants hold under random inputs.

use exec_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $10,000
}

fn qty_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64).prop_map(|x| Decimal::new(x, 4)) // 0.0001 to 1.0
}

fn cash_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $100,000
}

fn sample_position(qty: Decimal, avg: Decimal) -> Position {
    Position::new(
        Symbol::new("BTC-USD"),
        SignedQty::new(qty),
        Price::new_unchecked(avg),
        Timestamp::from_millis(0),
    )
}

proptest! {
    /// Realized PnL is zero when exit = entry
    #[test]
    fn realized_pnl_zero_at_entry(
        qty in qty_strategy(),
        entry in price_strategy(),
    ) {
        let close_qty = SignedQty::new(qty);
        let entry_price = Price::new_unchecked(entry);

        let pnl = calculate_realized_pnl(close_qty, entry_price, entry_price);
        prop_assert_eq!(pnl.value(), Decimal::ZERO);
    }

    /// Closing a long profits exactly when exit > entry
    #[test]
    fn realized_pnl_sign_long(
        qty in qty_strategy(),
        entry in price_strategy(),
        delta in -500i64..=500i64,
    ) {
        let close_qty = SignedQty::new(qty); // closing a long
        let entry_price = Price::new_unchecked(entry);
        let exit_val = entry + Decimal::new(delta, 2);

        if exit_val > Decimal::ZERO {
            let exit_price = Price::new_unchecked(exit_val);
            let pnl = calculate_realized_pnl(close_qty, entry_price, exit_price);

            if exit_val > entry {
                prop_assert!(pnl.value() > Decimal::ZERO, "long should profit when exit > entry");
            } else if exit_val < entry {
                prop_assert!(pnl.value() < Decimal::ZERO, "long should lose when exit < entry");
            }
        }
    }

    /// Closing a short profits exactly when exit < entry
    #[test]
    fn realized_pnl_sign_short(
        qty in qty_strategy(),
        entry in price_strategy(),
        delta in -500i64..=500i64,
    ) {
        let close_qty = SignedQty::new(-qty); // closing a short
        let entry_price = Price::new_unchecked(entry);
        let exit_val = entry + Decimal::new(delta, 2);

        if exit_val > Decimal::ZERO {
            let exit_price = Price::new_unchecked(exit_val);
            let pnl = calculate_realized_pnl(close_qty, entry_price, exit_price);

            if exit_val < entry {
                prop_assert!(pnl.value() > Decimal::ZERO, "short should profit when exit < entry");
            } else if exit_val > entry {
                prop_assert!(pnl.value() < Decimal::ZERO, "short should lose when exit > entry");
            }
        }
    }

    /// Increasing a position averages the entry between the old and new price
    #[test]
    fn increase_averages_between_prices(
        old_qty in qty_strategy(),
        add_qty in qty_strategy(),
        old_price in price_strategy(),
        fill in price_strategy(),
    ) {
        let position = sample_position(old_qty, old_price);
        let grown = increase_position(&position, add_qty, Price::new_unchecked(fill), Timestamp::from_millis(1));

        let lo = old_price.min(fill);
        let hi = old_price.max(fill);
        prop_assert!(
            grown.avg_price.value() >= lo && grown.avg_price.value() <= hi,
            "avg {} outside [{}, {}]",
            grown.avg_price, lo, hi
        );
        prop_assert_eq!(grown.qty.value(), old_qty + add_qty);
    }

    /// Reducing never moves the entry price and never flips the sign
    #[test]
    fn reduce_preserves_entry(
        old_qty in qty_strategy(),
        cut in qty_strategy(),
        price in price_strategy(),
        fill in price_strategy(),
    ) {
        let position = sample_position(old_qty, price);
        let effect = reduce_position(&position, cut, Price::new_unchecked(fill), Timestamp::from_millis(1));

        match effect.new_position {
            Some(remaining) => {
                prop_assert_eq!(remaining.avg_price.value(), price);
                prop_assert!(remaining.qty.is_long());
            }
            None => prop_assert!(cut >= old_qty),
        }
    }

    /// Flipping rebases the entry at the fill price
    #[test]
    fn flip_rebases_entry(
        old_qty in qty_strategy(),
        residual in qty_strategy(),
        price in price_strategy(),
        fill in price_strategy(),
    ) {
        let position = sample_position(old_qty, price);
        let effect = flip_position(&position, -residual, Price::new_unchecked(fill), Timestamp::from_millis(1));

        let flipped = effect.new_position.unwrap();
        prop_assert_eq!(flipped.avg_price.value(), fill);
        prop_assert_eq!(flipped.qty.value(), -residual);
        // Realized PnL covers the whole old position
        let expected = old_qty * (fill - price);
        prop_assert_eq!(effect.realized_pnl.value(), expected);
    }

    /// Ledger funds always match an independently tracked model
    #[test]
    fn ledger_matches_shadow_model(
        ops in proptest::collection::vec((0u8..4u8, cash_strategy()), 1..40),
    ) {
        let ledger = Ledger::new();
        let account = ledger.open_account(Timestamp::from_millis(0));

        let mut model_available = Decimal::ZERO;
        let mut model_reserved = Decimal::ZERO;

        for (op, amount_raw) in ops {
            let amount = Cash::new(amount_raw);
            match op {
                0 => {
                    if ledger.deposit(account, amount).is_ok() {
                        model_available += amount_raw;
                    }
                }
                1 => {
                    if ledger.withdraw(account, amount).is_ok() {
                        model_available -= amount_raw;
                    }
                }
                2 => {
                    if ledger.reserve(account, amount).is_ok() {
                        model_available -= amount_raw;
                        model_reserved += amount_raw;
                    }
                }
                _ => {
                    // Only release what the model says is actually reserved,
                    // over-release intentionally halts the account.
                    if amount_raw <= model_reserved
                        && ledger.release(account, amount).is_ok()
                    {
                        model_reserved -= amount_raw;
                        model_available += amount_raw;
                    }
                }
            }

            let funds = ledger.funds(account).unwrap();
            prop_assert_eq!(funds.available.value(), model_available);
            prop_assert_eq!(funds.reserved.value(), model_reserved);
            prop_assert!(funds.available.value() >= Decimal::ZERO);
            prop_assert!(funds.reserved.value() >= Decimal::ZERO);
        }
    }

    /// A buy then a full sell leaves available = deposit - cost + proceeds
    #[test]
    fn buy_sell_roundtrip_cash(
        qty in qty_strategy(),
        buy_price in price_strategy(),
        sell_price in price_strategy(),
    ) {
        let ledger = Ledger::new();
        let account = ledger.open_account(Timestamp::from_millis(0));
        let symbol = Symbol::new("BTC-USD");
        let deposit = dec!(100_000);
        ledger.deposit(account, Cash::new(deposit)).unwrap();

        let cost = qty * buy_price;
        ledger.reserve(account, Cash::new(cost)).unwrap();
        ledger
            .settle_buy(account, &symbol, qty, Price::new_unchecked(buy_price), Cash::new(cost), Timestamp::from_millis(1))
            .unwrap();
        ledger
            .settle_sell(account, &symbol, qty, Price::new_unchecked(sell_price), Timestamp::from_millis(2))
            .unwrap();

        let funds = ledger.funds(account).unwrap();
        let proceeds = qty * sell_price;
        prop_assert_eq!(funds.available.value(), deposit - cost + proceeds);
        prop_assert_eq!(funds.reserved.value(), Decimal::ZERO);
        prop_assert!(ledger.position(account, &symbol).unwrap().is_none());
    }

    /// The audit chain stays verifiable for any number of appends
    #[test]
    fn audit_chain_always_verifies(
        amounts in proptest::collection::vec(cash_strategy(), 1..50),
    ) {
        let log = AuditLog::new();
        for (i, amount) in amounts.iter().enumerate() {
            log.append(
                Timestamp::from_millis(i as i64),
                EventPayload::Deposit(DepositEvent {
                    account_id: AccountId(1),
                    amount: Cash::new(*amount),
                    new_available: Cash::new(*amount),
                }),
            );
        }

        prop_assert_eq!(log.len(), amounts.len());
        prop_assert!(log.verify_integrity().is_ok());

        let records = log.records();
        for (i, record) in records.iter().enumerate() {
            prop_assert_eq!(record.sequence, i as u64);
        }
    }
}

/// Non-proptest edge cases.
#[cfg(test)]
mod edge_cases {
    use super::*;

    #[test]
    fn exact_cost_fill_releases_nothing() {
        let ledger = Ledger::new();
        let account = ledger.open_account(Timestamp::from_millis(0));
        let symbol = Symbol::new("ETH-USD");
        ledger.deposit(account, Cash::new(dec!(3000))).unwrap();
        ledger.reserve(account, Cash::new(dec!(3000))).unwrap();

        let settlement = ledger
            .settle_buy(
                account,
                &symbol,
                dec!(2),
                Price::new_unchecked(dec!(1500)),
                Cash::new(dec!(3000)),
                Timestamp::from_millis(1),
            )
            .unwrap();

        assert_eq!(settlement.released, Cash::zero());
        let funds = ledger.funds(account).unwrap();
        assert_eq!(funds.available, Cash::zero());
        assert_eq!(funds.reserved, Cash::zero());
    }

    #[test]
    fn decimal_quantities_stay_exact() {
        // 0.1 + 0.2 must equal 0.3, the whole reason for decimal math.
        let position = sample_position(dec!(0.1), dec!(100));
        let grown = increase_position(
            &position,
            dec!(0.2),
            Price::new_unchecked(dec!(100)),
            Timestamp::from_millis(1),
        );
        assert_eq!(grown.qty.value(), dec!(0.3));
        assert_eq!(grown.avg_price.value(), dec!(100));
    }

    #[test]
    fn flip_through_zero_realizes_old_side_only() {
        // Long 2 @ 100, sell 5 @ 110: realize 2 * 10, short 3 @ 110.
        let symbol = Symbol::new("BTC-USD");
        let position = sample_position(dec!(2), dec!(100));
        let effect = apply_fill(
            Some(&position),
            &symbol,
            Side::Sell,
            dec!(5),
            Price::new_unchecked(dec!(110)),
            Timestamp::from_millis(1),
        );

        assert_eq!(effect.realized_pnl, Cash::new(dec!(20)));
        let flipped = effect.new_position.unwrap();
        assert_eq!(flipped.qty.value(), dec!(-3));
        assert_eq!(flipped.avg_price.value(), dec!(110));
    }

    #[test]
    fn stats_track_largest_swings() {
        let ledger = Ledger::new();
        let account = ledger.open_account(Timestamp::from_millis(0));
        let symbol = Symbol::new("BTC-USD");
        ledger.deposit(account, Cash::new(dec!(100_000))).unwrap();

        // Buy 1 @ 100, sell at 150 (+50), buy 1 @ 100, sell at 80 (-20).
        for (buy, sell) in [(dec!(100), dec!(150)), (dec!(100), dec!(80))] {
            ledger.reserve(account, Cash::new(buy)).unwrap();
            ledger
                .settle_buy(account, &symbol, dec!(1), Price::new_unchecked(buy), Cash::new(buy), Timestamp::from_millis(1))
                .unwrap();
            ledger
                .settle_sell(account, &symbol, dec!(1), Price::new_unchecked(sell), Timestamp::from_millis(2))
                .unwrap();
        }

        let stats = ledger.stats(account).unwrap();
        assert_eq!(stats.fills, 4);
        assert_eq!(stats.winning_fills, 1);
        assert_eq!(stats.losing_fills, 1);
        assert_eq!(stats.realized_pnl, Cash::new(dec!(30)));
        assert_eq!(stats.largest_gain, Cash::new(dec!(50)));
        assert_eq!(stats.largest_loss, Cash::new(dec!(-20)));
    }
}
