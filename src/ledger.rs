//! Ledger: account funds and positions.
//!
//! Every account splits its cash into two buckets: available and reserved.
//! Placing an order earmarks funds by moving them available -> reserved;
//! settlement and release are the only ways back out. All mutation happens
//! under a per-account lock, and every mutation re-checks conservation:
//! available + reserved == deposits - withdrawals + net settled cash.
//! A failed check halts the account until a human investigates.

use crate::position::{apply_fill, Position};
use crate::types::{AccountId, Cash, Price, Side, SignedQty, Symbol, Timestamp};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Account {0} not found")]
    AccountNotFound(AccountId),

    #[error("Account {0} is closed")]
    AccountClosed(AccountId),

    #[error("Account {0} is halted pending investigation")]
    AccountHalted(AccountId),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Cash, available: Cash },

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Cash),

    #[error("Ledger invariant violated on account {account_id}: {detail}")]
    InvariantViolation { account_id: AccountId, detail: String },
}

/// Point-in-time view of one account's cash buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsSnapshot {
    pub available: Cash,
    pub reserved: Cash,
}

impl FundsSnapshot {
    pub fn total(&self) -> Cash {
        self.available.add(self.reserved)
    }
}

/// What the risk evaluator sees of an account at decision time.
#[derive(Debug, Clone)]
pub struct Exposure {
    pub position_qty: SignedQty,
    pub day_traded_notional: Cash,
    pub day_realized_pnl: Cash,
}

/// Lifetime fill statistics, updated on every settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingStats {
    pub fills: u64,
    pub winning_fills: u64,
    pub losing_fills: u64,
    pub realized_pnl: Cash,
    pub largest_gain: Cash,
    pub largest_loss: Cash,
}

impl Default for TradingStats {
    fn default() -> Self {
        Self {
            fills: 0,
            winning_fills: 0,
            losing_fills: 0,
            realized_pnl: Cash::zero(),
            largest_gain: Cash::zero(),
            largest_loss: Cash::zero(),
        }
    }
}

impl TradingStats {
    fn record_fill(&mut self, pnl: Cash) {
        self.fills += 1;
        self.realized_pnl = self.realized_pnl.add(pnl);
        if pnl.value() > Decimal::ZERO {
            self.winning_fills += 1;
            if pnl > self.largest_gain {
                self.largest_gain = pnl;
            }
        } else if pnl.value() < Decimal::ZERO {
            self.losing_fills += 1;
            if pnl < self.largest_loss {
                self.largest_loss = pnl;
            }
        }
    }
}

// Daily counters for the risk limits. Keyed by UTC day index, reset lazily
// when an operation observes a newer day.
#[derive(Debug, Clone)]
struct DailyActivity {
    day: i64,
    traded_notional: Cash,
    realized_pnl: Cash,
}

impl DailyActivity {
    fn new(day: i64) -> Self {
        Self {
            day,
            traded_notional: Cash::zero(),
            realized_pnl: Cash::zero(),
        }
    }

    fn roll(&mut self, day: i64) {
        if day != self.day {
            *self = Self::new(day);
        }
    }
}

/// Cash and position effect of settling one fill.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Negative for buys (cost paid), positive for sells (proceeds received).
    pub cash_delta: Cash,
    /// Reservation surplus returned to available. Zero for sells.
    pub released: Cash,
    /// Shortfall covered from available when the fill cost exceeded the
    /// reservation. Zero for sells.
    pub drawn_from_available: Cash,
    pub realized_pnl: Cash,
    pub position_after: Option<Position>,
}

#[derive(Debug)]
struct AccountState {
    id: AccountId,
    available: Cash,
    reserved: Cash,
    positions: HashMap<Symbol, Position>,
    total_deposited: Cash,
    total_withdrawn: Cash,
    net_settled: Cash,
    daily: DailyActivity,
    stats: TradingStats,
    closed: bool,
    halted: bool,
}

impl AccountState {
    fn new(id: AccountId, timestamp: Timestamp) -> Self {
        Self {
            id,
            available: Cash::zero(),
            reserved: Cash::zero(),
            positions: HashMap::new(),
            total_deposited: Cash::zero(),
            total_withdrawn: Cash::zero(),
            net_settled: Cash::zero(),
            daily: DailyActivity::new(timestamp.day_index()),
            stats: TradingStats::default(),
            closed: false,
            halted: false,
        }
    }

    // available + reserved must always equal deposits - withdrawals + net
    // settled cash. Any drift means the engine corrupted the books; the
    // account is frozen on the spot.
    fn check_conservation(&mut self) -> Result<(), LedgerError> {
        let expected = self
            .total_deposited
            .sub(self.total_withdrawn)
            .add(self.net_settled);
        let actual = self.available.add(self.reserved);

        let detail = if actual != expected {
            Some(format!(
                "conservation broken: available {} + reserved {} != net flows {}",
                self.available, self.reserved, expected
            ))
        } else if self.available.is_negative() {
            Some(format!("available balance went negative: {}", self.available))
        } else if self.reserved.is_negative() {
            Some(format!("reserved balance went negative: {}", self.reserved))
        } else {
            None
        };

        match detail {
            None => Ok(()),
            Some(detail) => Err(self.halt(detail)),
        }
    }

    fn halt(&mut self, detail: String) -> LedgerError {
        self.halted = true;
        error!(account = %self.id, %detail, "account halted");
        LedgerError::InvariantViolation {
            account_id: self.id,
            detail,
        }
    }
}

pub struct Ledger {
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<AccountState>>>>,
    next_account_id: AtomicU64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_account_id: AtomicU64::new(1),
        }
    }

    pub fn open_account(&self, timestamp: Timestamp) -> AccountId {
        let id = AccountId(self.next_account_id.fetch_add(1, Ordering::SeqCst));
        let state = Arc::new(Mutex::new(AccountState::new(id, timestamp)));
        self.accounts.write().insert(id, state);
        id
    }

    /// Soft close: the account refuses deposits and new orders but still
    /// allows withdrawals and lets in-flight orders terminate.
    pub fn close_account(&self, id: AccountId) -> Result<(), LedgerError> {
        self.with_account_mut(id, |state| {
            state.closed = true;
            Ok(())
        })
    }

    /// Gate used at order placement: not found, closed and halted accounts
    /// all refuse new orders.
    pub fn ensure_active(&self, id: AccountId) -> Result<(), LedgerError> {
        self.with_account_mut(id, |state| {
            if state.closed {
                return Err(LedgerError::AccountClosed(id));
            }
            Ok(())
        })
    }

    pub fn deposit(&self, id: AccountId, amount: Cash) -> Result<Cash, LedgerError> {
        ensure_positive(amount)?;
        self.with_account_mut(id, |state| {
            if state.closed {
                return Err(LedgerError::AccountClosed(id));
            }
            state.available = state.available.add(amount);
            state.total_deposited = state.total_deposited.add(amount);
            state.check_conservation()?;
            Ok(state.available)
        })
    }

    /// Withdraws from available only; reserved funds stay earmarked.
    pub fn withdraw(&self, id: AccountId, amount: Cash) -> Result<Cash, LedgerError> {
        ensure_positive(amount)?;
        self.with_account_mut(id, |state| {
            if amount > state.available {
                return Err(LedgerError::InsufficientFunds {
                    requested: amount,
                    available: state.available,
                });
            }
            state.available = state.available.sub(amount);
            state.total_withdrawn = state.total_withdrawn.add(amount);
            state.check_conservation()?;
            Ok(state.available)
        })
    }

    /// Moves `amount` from available to reserved. Refuses without mutating
    /// when available is short.
    pub fn reserve(&self, id: AccountId, amount: Cash) -> Result<(), LedgerError> {
        ensure_positive(amount)?;
        self.with_account_mut(id, |state| {
            if amount > state.available {
                return Err(LedgerError::InsufficientFunds {
                    requested: amount,
                    available: state.available,
                });
            }
            state.available = state.available.sub(amount);
            state.reserved = state.reserved.add(amount);
            state.check_conservation()?;
            Ok(())
        })
    }

    /// Moves `amount` from reserved back to available (cancel / reject path).
    /// Releasing more than is reserved means a prior engine bug, not user
    /// error: the account halts.
    pub fn release(&self, id: AccountId, amount: Cash) -> Result<Cash, LedgerError> {
        if amount.is_zero() {
            return self.with_account_mut(id, |state| Ok(state.available));
        }
        self.with_account_mut(id, |state| {
            if amount > state.reserved {
                return Err(state.halt(format!(
                    "release of {} exceeds reserved {}",
                    amount, state.reserved
                )));
            }
            state.reserved = state.reserved.sub(amount);
            state.available = state.available.add(amount);
            state.check_conservation()?;
            Ok(state.available)
        })
    }

    /// Settles a buy fill: consumes the order's reservation, pays the actual
    /// cost, returns any surplus to available. A fill dearer than the
    /// reservation draws the shortfall from available, failing without
    /// mutation if it cannot be covered.
    pub fn settle_buy(
        &self,
        id: AccountId,
        symbol: &Symbol,
        qty: Decimal,
        price: Price,
        reserved_amount: Cash,
        timestamp: Timestamp,
    ) -> Result<Settlement, LedgerError> {
        let cost = Cash::new(qty * price.value());
        self.with_account_mut(id, |state| {
            if reserved_amount > state.reserved {
                return Err(state.halt(format!(
                    "settlement consumes {} but only {} reserved",
                    reserved_amount, state.reserved
                )));
            }

            let (released, drawn) = if cost <= reserved_amount {
                (reserved_amount.sub(cost), Cash::zero())
            } else {
                let shortfall = cost.sub(reserved_amount);
                if shortfall > state.available {
                    return Err(LedgerError::InsufficientFunds {
                        requested: shortfall,
                        available: state.available,
                    });
                }
                (Cash::zero(), shortfall)
            };

            state.reserved = state.reserved.sub(reserved_amount);
            state.available = state.available.add(released).sub(drawn);
            state.net_settled = state.net_settled.sub(cost);

            let effect = apply_fill(
                state.positions.get(symbol),
                symbol,
                Side::Buy,
                qty,
                price,
                timestamp,
            );
            apply_effect(state, symbol, &effect, cost, timestamp);
            state.check_conservation()?;

            Ok(Settlement {
                cash_delta: cost.negate(),
                released,
                drawn_from_available: drawn,
                realized_pnl: effect.realized_pnl,
                position_after: effect.new_position,
            })
        })
    }

    /// Settles a sell fill: credits proceeds to available and walks the
    /// position down (through zero into a short when the quantity exceeds
    /// the holding).
    pub fn settle_sell(
        &self,
        id: AccountId,
        symbol: &Symbol,
        qty: Decimal,
        price: Price,
        timestamp: Timestamp,
    ) -> Result<Settlement, LedgerError> {
        let proceeds = Cash::new(qty * price.value());
        self.with_account_mut(id, |state| {
            state.available = state.available.add(proceeds);
            state.net_settled = state.net_settled.add(proceeds);

            let effect = apply_fill(
                state.positions.get(symbol),
                symbol,
                Side::Sell,
                qty,
                price,
                timestamp,
            );
            apply_effect(state, symbol, &effect, proceeds, timestamp);
            state.check_conservation()?;

            Ok(Settlement {
                cash_delta: proceeds,
                released: Cash::zero(),
                drawn_from_available: Cash::zero(),
                realized_pnl: effect.realized_pnl,
                position_after: effect.new_position,
            })
        })
    }

    /// Cross-account move of available funds. Locks are taken in ascending
    /// account id order so two opposing transfers cannot deadlock. A
    /// self-transfer passes the same checks and then moves nothing.
    pub fn transfer(&self, from: AccountId, to: AccountId, amount: Cash) -> Result<(), LedgerError> {
        ensure_positive(amount)?;
        if from == to {
            return self.with_account_mut(from, |state| {
                if state.closed {
                    return Err(LedgerError::AccountClosed(to));
                }
                if amount > state.available {
                    return Err(LedgerError::InsufficientFunds {
                        requested: amount,
                        available: state.available,
                    });
                }
                Ok(())
            });
        }

        let (from_arc, to_arc) = {
            let accounts = self.accounts.read();
            let from_arc = accounts
                .get(&from)
                .cloned()
                .ok_or(LedgerError::AccountNotFound(from))?;
            let to_arc = accounts
                .get(&to)
                .cloned()
                .ok_or(LedgerError::AccountNotFound(to))?;
            (from_arc, to_arc)
        };

        let (first, second) = if from < to {
            (&from_arc, &to_arc)
        } else {
            (&to_arc, &from_arc)
        };
        let mut first_guard = first.lock();
        let mut second_guard = second.lock();
        let (src, dst) = if from < to {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };

        if src.halted {
            return Err(LedgerError::AccountHalted(from));
        }
        if dst.halted {
            return Err(LedgerError::AccountHalted(to));
        }
        if dst.closed {
            return Err(LedgerError::AccountClosed(to));
        }
        if amount > src.available {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: src.available,
            });
        }

        src.available = src.available.sub(amount);
        src.total_withdrawn = src.total_withdrawn.add(amount);
        dst.available = dst.available.add(amount);
        dst.total_deposited = dst.total_deposited.add(amount);
        src.check_conservation()?;
        dst.check_conservation()?;
        Ok(())
    }

    pub fn funds(&self, id: AccountId) -> Result<FundsSnapshot, LedgerError> {
        self.with_account_read(id, |state| FundsSnapshot {
            available: state.available,
            reserved: state.reserved,
        })
    }

    pub fn position(&self, id: AccountId, symbol: &Symbol) -> Result<Option<Position>, LedgerError> {
        self.with_account_read(id, |state| state.positions.get(symbol).cloned())
    }

    pub fn stats(&self, id: AccountId) -> Result<TradingStats, LedgerError> {
        self.with_account_read(id, |state| state.stats.clone())
    }

    /// Risk-evaluation view: the order symbol's position plus the rolled
    /// daily counters.
    pub fn exposure(
        &self,
        id: AccountId,
        symbol: &Symbol,
        now: Timestamp,
    ) -> Result<Exposure, LedgerError> {
        self.with_account_mut(id, |state| {
            state.daily.roll(now.day_index());
            Ok(Exposure {
                position_qty: state
                    .positions
                    .get(symbol)
                    .map(|p| p.qty)
                    .unwrap_or_else(SignedQty::zero),
                day_traded_notional: state.daily.traded_notional,
                day_realized_pnl: state.daily.realized_pnl,
            })
        })
    }

    fn account(&self, id: AccountId) -> Result<Arc<Mutex<AccountState>>, LedgerError> {
        self.accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    // Reads work on halted accounts so an investigation can see the books.
    fn with_account_read<T>(
        &self,
        id: AccountId,
        f: impl FnOnce(&AccountState) -> T,
    ) -> Result<T, LedgerError> {
        let account = self.account(id)?;
        let state = account.lock();
        Ok(f(&state))
    }

    // Mutations refuse on halted accounts before the closure runs.
    fn with_account_mut<T>(
        &self,
        id: AccountId,
        f: impl FnOnce(&mut AccountState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let account = self.account(id)?;
        let mut state = account.lock();
        if state.halted {
            return Err(LedgerError::AccountHalted(id));
        }
        f(&mut state)
    }
}

fn ensure_positive(amount: Cash) -> Result<(), LedgerError> {
    if amount.value() <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

fn apply_effect(
    state: &mut AccountState,
    symbol: &Symbol,
    effect: &crate::position::FillEffect,
    notional: Cash,
    timestamp: Timestamp,
) {
    match &effect.new_position {
        Some(position) => {
            state.positions.insert(symbol.clone(), position.clone());
        }
        None => {
            state.positions.remove(symbol);
        }
    }
    state.daily.roll(timestamp.day_index());
    state.daily.traded_notional = state.daily.traded_notional.add(notional.abs());
    state.daily.realized_pnl = state.daily.realized_pnl.add(effect.realized_pnl);
    state.stats.record_fill(effect.realized_pnl);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn funded_ledger(amount: Decimal) -> (Ledger, AccountId) {
        let ledger = Ledger::new();
        let id = ledger.open_account(Timestamp::from_millis(0));
        ledger.deposit(id, Cash::new(amount)).unwrap();
        (ledger, id)
    }

    fn sym() -> Symbol {
        Symbol::new("BTC-USD")
    }

    #[test]
    fn deposit_withdraw_roundtrip() {
        let (ledger, id) = funded_ledger(dec!(10000));

        ledger.deposit(id, Cash::new(dec!(5000))).unwrap();
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(15000));

        ledger.withdraw(id, Cash::new(dec!(3000))).unwrap();
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(12000));
    }

    #[test]
    fn withdraw_insufficient_leaves_state_untouched() {
        let (ledger, id) = funded_ledger(dec!(1000));
        let result = ledger.withdraw(id, Cash::new(dec!(2000)));
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(1000));
    }

    #[test]
    fn reserve_moves_between_buckets() {
        let (ledger, id) = funded_ledger(dec!(10000));

        ledger.reserve(id, Cash::new(dec!(9000))).unwrap();
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(1000));
        assert_eq!(funds.reserved.value(), dec!(9000));

        ledger.release(id, Cash::new(dec!(9000))).unwrap();
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(10000));
        assert_eq!(funds.reserved.value(), dec!(0));
    }

    #[test]
    fn reserve_insufficient_mutates_nothing() {
        let (ledger, id) = funded_ledger(dec!(1000));
        let result = ledger.reserve(id, Cash::new(dec!(1500)));
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(1000));
        assert_eq!(funds.reserved.value(), dec!(0));
    }

    #[test]
    fn over_release_halts_account() {
        let (ledger, id) = funded_ledger(dec!(1000));
        ledger.reserve(id, Cash::new(dec!(500))).unwrap();

        let result = ledger.release(id, Cash::new(dec!(600)));
        assert!(matches!(result, Err(LedgerError::InvariantViolation { .. })));

        // all further mutation refused
        let follow_up = ledger.deposit(id, Cash::new(dec!(1)));
        assert!(matches!(follow_up, Err(LedgerError::AccountHalted(_))));
        // but reads still work for investigation
        assert!(ledger.funds(id).is_ok());
    }

    #[test]
    fn settle_buy_releases_surplus() {
        let (ledger, id) = funded_ledger(dec!(10000));
        ledger.reserve(id, Cash::new(dec!(9000))).unwrap();

        let settlement = ledger
            .settle_buy(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(8500)),
                Cash::new(dec!(9000)),
                Timestamp::from_millis(1),
            )
            .unwrap();

        assert_eq!(settlement.cash_delta.value(), dec!(-8500));
        assert_eq!(settlement.released.value(), dec!(500));
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(1500));
        assert_eq!(funds.reserved.value(), dec!(0));

        let position = ledger.position(id, &sym()).unwrap().unwrap();
        assert_eq!(position.qty.value(), dec!(1));
        assert_eq!(position.avg_price.value(), dec!(8500));
    }

    #[test]
    fn settle_buy_draws_shortfall_from_available() {
        let (ledger, id) = funded_ledger(dec!(10000));
        ledger.reserve(id, Cash::new(dec!(8000))).unwrap();

        let settlement = ledger
            .settle_buy(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(8300)),
                Cash::new(dec!(8000)),
                Timestamp::from_millis(1),
            )
            .unwrap();

        assert_eq!(settlement.drawn_from_available.value(), dec!(300));
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(1700));
        assert_eq!(funds.reserved.value(), dec!(0));
    }

    #[test]
    fn settle_buy_unaffordable_shortfall_fails_cleanly() {
        let (ledger, id) = funded_ledger(dec!(1000));
        ledger.reserve(id, Cash::new(dec!(900))).unwrap();

        let result = ledger.settle_buy(
            id,
            &sym(),
            dec!(1),
            Price::new_unchecked(dec!(2000)),
            Cash::new(dec!(900)),
            Timestamp::from_millis(1),
        );
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));

        // reservation still intact, nothing settled
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(100));
        assert_eq!(funds.reserved.value(), dec!(900));
        assert!(ledger.position(id, &sym()).unwrap().is_none());
    }

    #[test]
    fn settle_sell_credits_proceeds_and_allows_short() {
        let (ledger, id) = funded_ledger(dec!(1000));

        let settlement = ledger
            .settle_sell(
                id,
                &sym(),
                dec!(2),
                Price::new_unchecked(dec!(300)),
                Timestamp::from_millis(1),
            )
            .unwrap();

        assert_eq!(settlement.cash_delta.value(), dec!(600));
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(1600));

        let position = ledger.position(id, &sym()).unwrap().unwrap();
        assert!(position.qty.is_short());
        assert_eq!(position.qty.value(), dec!(-2));
    }

    #[test]
    fn buy_then_sell_realizes_pnl_and_updates_stats() {
        let (ledger, id) = funded_ledger(dec!(10000));
        ledger.reserve(id, Cash::new(dec!(5000))).unwrap();
        ledger
            .settle_buy(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(5000)),
                Cash::new(dec!(5000)),
                Timestamp::from_millis(1),
            )
            .unwrap();

        let settlement = ledger
            .settle_sell(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(5600)),
                Timestamp::from_millis(2),
            )
            .unwrap();

        assert_eq!(settlement.realized_pnl.value(), dec!(600));
        assert!(settlement.position_after.is_none());
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(10600));

        let stats = ledger.stats(id).unwrap();
        assert_eq!(stats.fills, 2);
        assert_eq!(stats.winning_fills, 1);
        assert_eq!(stats.realized_pnl.value(), dec!(600));
        assert_eq!(stats.largest_gain.value(), dec!(600));
    }

    #[test]
    fn transfer_moves_available_funds() {
        let ledger = Ledger::new();
        let a = ledger.open_account(Timestamp::from_millis(0));
        let b = ledger.open_account(Timestamp::from_millis(0));
        ledger.deposit(a, Cash::new(dec!(1000))).unwrap();

        ledger.transfer(a, b, Cash::new(dec!(400))).unwrap();
        assert_eq!(ledger.funds(a).unwrap().available.value(), dec!(600));
        assert_eq!(ledger.funds(b).unwrap().available.value(), dec!(400));

        let result = ledger.transfer(a, b, Cash::new(dec!(5000)));
        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
    }

    #[test]
    fn self_transfer_validates_like_any_other() {
        let (ledger, id) = funded_ledger(dec!(1000));

        ledger.transfer(id, id, Cash::new(dec!(400))).unwrap();
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(1000));

        let oversized = ledger.transfer(id, id, Cash::new(dec!(2000)));
        assert!(matches!(
            oversized,
            Err(LedgerError::InsufficientFunds { .. })
        ));

        let ghost = AccountId(999);
        assert!(matches!(
            ledger.transfer(ghost, ghost, Cash::new(dec!(1))),
            Err(LedgerError::AccountNotFound(_))
        ));

        ledger.close_account(id).unwrap();
        assert!(matches!(
            ledger.transfer(id, id, Cash::new(dec!(1))),
            Err(LedgerError::AccountClosed(_))
        ));
    }

    #[test]
    fn self_transfer_refused_on_halted_account() {
        let (ledger, id) = funded_ledger(dec!(1000));
        ledger.reserve(id, Cash::new(dec!(500))).unwrap();
        let _ = ledger.release(id, Cash::new(dec!(600)));

        assert!(matches!(
            ledger.transfer(id, id, Cash::new(dec!(1))),
            Err(LedgerError::AccountHalted(_))
        ));
    }

    #[test]
    fn closed_account_refuses_deposits_allows_withdrawals() {
        let (ledger, id) = funded_ledger(dec!(1000));
        ledger.close_account(id).unwrap();

        let deposit = ledger.deposit(id, Cash::new(dec!(100)));
        assert!(matches!(deposit, Err(LedgerError::AccountClosed(_))));
        assert!(matches!(
            ledger.ensure_active(id),
            Err(LedgerError::AccountClosed(_))
        ));

        ledger.withdraw(id, Cash::new(dec!(1000))).unwrap();
        assert_eq!(ledger.funds(id).unwrap().available.value(), dec!(0));
    }

    #[test]
    fn daily_counters_roll_over() {
        let (ledger, id) = funded_ledger(dec!(10000));
        ledger
            .settle_sell(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(100)),
                Timestamp::from_millis(0),
            )
            .unwrap();

        let same_day = ledger.exposure(id, &sym(), Timestamp::from_millis(1)).unwrap();
        assert_eq!(same_day.day_traded_notional.value(), dec!(100));

        let next_day = ledger
            .exposure(id, &sym(), Timestamp::from_millis(86_400_000))
            .unwrap();
        assert_eq!(next_day.day_traded_notional.value(), dec!(0));
        // position carries over even though counters reset
        assert_eq!(next_day.position_qty.value(), dec!(-1));
    }

    #[test]
    fn conservation_holds_across_mixed_operations() {
        let (ledger, id) = funded_ledger(dec!(10000));
        ledger.reserve(id, Cash::new(dec!(4000))).unwrap();
        ledger
            .settle_buy(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(3500)),
                Cash::new(dec!(4000)),
                Timestamp::from_millis(1),
            )
            .unwrap();
        ledger.withdraw(id, Cash::new(dec!(2000))).unwrap();
        ledger
            .settle_sell(
                id,
                &sym(),
                dec!(1),
                Price::new_unchecked(dec!(3700)),
                Timestamp::from_millis(2),
            )
            .unwrap();

        // 10000 - 3500 - 2000 + 3700 = 8200, all in available
        let funds = ledger.funds(id).unwrap();
        assert_eq!(funds.available.value(), dec!(8200));
        assert_eq!(funds.reserved.value(), dec!(0));
    }
}
