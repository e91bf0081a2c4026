// 5.0 engine/core.rs: main engine. holds the ledger, the audit log, every
// order ever placed, and one gate per account. account gates serialize the
// evaluate-reserve-record sequence; external lookups happen before a gate is
// taken so the critical section never waits on anything but its own locks.
//
// lock order, always: account gate, then ledger account, then audit log.

use super::config::EngineConfig;
use super::results::OrderError;
use crate::audit::{AuditLog, AuditRecord, IntegrityError};
use crate::events::{
    AccountClosedEvent, AccountHaltedEvent, AccountOpenedEvent, DepositEvent, EventPayload,
    TransferEvent, WithdrawalEvent,
};
use crate::ledger::{FundsSnapshot, Ledger, LedgerError, TradingStats};
use crate::order::Order;
use crate::position::Position;
use crate::traits::{EventSink, LimitsProvider, PriceSource};
use crate::types::{AccountId, Cash, OrderId, Symbol, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/** 5.1: main engine struct. all state lives here */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) ledger: Ledger,
    pub(super) audit: AuditLog,
    pub(super) orders: RwLock<HashMap<OrderId, Order>>,
    pub(super) gates: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
    pub(super) prices: Arc<dyn PriceSource>,
    pub(super) limits: Arc<dyn LimitsProvider>,
    pub(super) sink: Option<Arc<dyn EventSink>>,
    pub(super) next_order_id: AtomicU64,
    pub(super) clock_ms: AtomicI64,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        prices: Arc<dyn PriceSource>,
        limits: Arc<dyn LimitsProvider>,
    ) -> Self {
        Self {
            config,
            ledger: Ledger::new(),
            audit: AuditLog::new(),
            orders: RwLock::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            prices,
            limits,
            sink: None,
            next_order_id: AtomicU64::new(1),
            clock_ms: AtomicI64::new(Timestamp::now().as_millis()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn set_time(&self, timestamp: Timestamp) {
        self.clock_ms.store(timestamp.as_millis(), Ordering::SeqCst);
    }

    pub fn advance_time(&self, millis: i64) {
        self.clock_ms.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.clock_ms.load(Ordering::SeqCst))
    }

    pub fn open_account(&self) -> AccountId {
        let now = self.now();
        let account_id = self.ledger.open_account(now);
        let record = {
            let gate = self.account_gate(account_id);
            let _guard = gate.lock();
            self.audit
                .append(now, EventPayload::AccountOpened(AccountOpenedEvent { account_id }))
        };
        self.notify_all(&[record]);
        info!(account = %account_id, "account opened");
        account_id
    }

    // In-flight orders survive a close: cancels and fills on them still
    // settle, only deposits and new orders are refused from here on.
    pub fn close_account(&self, account_id: AccountId) -> Result<(), LedgerError> {
        let gate = self.account_gate(account_id);
        let record = {
            let _guard = gate.lock();
            let now = self.now();
            self.ledger.close_account(account_id)?;
            self.audit
                .append(now, EventPayload::AccountClosed(AccountClosedEvent { account_id }))
        };
        self.notify_all(&[record]);
        info!(account = %account_id, "account closed");
        Ok(())
    }

    pub fn deposit(&self, account_id: AccountId, amount: Cash) -> Result<Cash, LedgerError> {
        let gate = self.account_gate(account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.apply_deposit(account_id, amount, &mut records)
        };
        self.notify_all(&records);
        if result.is_ok() {
            info!(account = %account_id, %amount, "deposit");
        }
        result
    }

    fn apply_deposit(
        &self,
        account_id: AccountId,
        amount: Cash,
        records: &mut Vec<AuditRecord>,
    ) -> Result<Cash, LedgerError> {
        let now = self.now();
        let new_available =
            self.ledger_guard(self.ledger.deposit(account_id, amount), now, records)?;
        records.push(self.audit.append(
            now,
            EventPayload::Deposit(DepositEvent {
                account_id,
                amount,
                new_available,
            }),
        ));
        Ok(new_available)
    }

    pub fn withdraw(&self, account_id: AccountId, amount: Cash) -> Result<Cash, LedgerError> {
        let gate = self.account_gate(account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.apply_withdrawal(account_id, amount, &mut records)
        };
        self.notify_all(&records);
        if result.is_ok() {
            info!(account = %account_id, %amount, "withdrawal");
        }
        result
    }

    fn apply_withdrawal(
        &self,
        account_id: AccountId,
        amount: Cash,
        records: &mut Vec<AuditRecord>,
    ) -> Result<Cash, LedgerError> {
        let now = self.now();
        let new_available =
            self.ledger_guard(self.ledger.withdraw(account_id, amount), now, records)?;
        records.push(self.audit.append(
            now,
            EventPayload::Withdrawal(WithdrawalEvent {
                account_id,
                amount,
                new_available,
            }),
        ));
        Ok(new_available)
    }

    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Cash,
    ) -> Result<(), LedgerError> {
        if from == to {
            return self.ledger.transfer(from, to, amount);
        }

        // Both gates, ascending account id, same as the ledger locks below.
        let gate_a = self.account_gate(from.min(to));
        let gate_b = self.account_gate(from.max(to));
        let mut records = Vec::new();
        let result = {
            let _guard_a = gate_a.lock();
            let _guard_b = gate_b.lock();
            self.apply_transfer(from, to, amount, &mut records)
        };
        self.notify_all(&records);
        if result.is_ok() {
            info!(%from, %to, %amount, "transfer");
        }
        result
    }

    fn apply_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Cash,
        records: &mut Vec<AuditRecord>,
    ) -> Result<(), LedgerError> {
        let now = self.now();
        self.ledger_guard(self.ledger.transfer(from, to, amount), now, records)?;
        records.push(self.audit.append(
            now,
            EventPayload::Transfer(TransferEvent { from, to, amount }),
        ));
        Ok(())
    }

    pub fn funds(&self, account_id: AccountId) -> Result<FundsSnapshot, LedgerError> {
        self.ledger.funds(account_id)
    }

    pub fn position(
        &self,
        account_id: AccountId,
        symbol: &Symbol,
    ) -> Result<Option<Position>, LedgerError> {
        self.ledger.position(account_id, symbol)
    }

    pub fn stats(&self, account_id: AccountId) -> Result<TradingStats, LedgerError> {
        self.ledger.stats(account_id)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    pub fn verify_audit_integrity(&self) -> Result<(), IntegrityError> {
        self.audit.verify_integrity()
    }

    pub fn export_audit(&self, from: Timestamp, to: Timestamp) -> Vec<AuditRecord> {
        self.audit.export_range(from, to)
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.records()
    }

    pub fn audit_len(&self) -> usize {
        self.audit.len()
    }

    pub(super) fn account_gate(&self, account_id: AccountId) -> Arc<Mutex<()>> {
        self.gates
            .lock()
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Sinks run after the gate is released; a slow subscriber cannot stall
    // the account it is watching.
    pub(super) fn notify_all(&self, records: &[AuditRecord]) {
        if let Some(sink) = &self.sink {
            for record in records {
                sink.notify(record);
            }
        }
    }

    // Wraps a ledger call so that a conservation failure leaves an
    // AccountHalted record behind before the error surfaces.
    pub(super) fn ledger_guard<T>(
        &self,
        result: Result<T, LedgerError>,
        now: Timestamp,
        records: &mut Vec<AuditRecord>,
    ) -> Result<T, LedgerError> {
        if let Err(LedgerError::InvariantViolation { account_id, detail }) = &result {
            records.push(self.audit.append(
                now,
                EventPayload::AccountHalted(AccountHaltedEvent {
                    account_id: *account_id,
                    detail: detail.clone(),
                }),
            ));
        }
        result
    }
}
