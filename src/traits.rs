// External collaborator seams.
//
// The engine consumes reference prices and account limits through these
// traits and pushes committed audit records out through EventSink. The core
// stays agnostic to where any of them really live; the in-memory
// implementations below back the tests and the simulator.

use crate::audit::AuditRecord;
use crate::risk::RiskLimit;
use crate::types::{AccountId, Price, Symbol};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceError {
    #[error("No price available for {0}")]
    Unavailable(Symbol),
}

/// Market-data boundary. Consulted for market-buy reservations at place time
/// and for fills at market; the core never caches what it returns.
pub trait PriceSource: Send + Sync {
    fn current_price(&self, symbol: &Symbol) -> Result<Price, PriceError>;
}

/// Administrative store of per-account risk limits.
pub trait LimitsProvider: Send + Sync {
    fn account_limits(&self, account: AccountId) -> Vec<RiskLimit>;
}

/// Downstream notification pipe. Called after a record is committed, outside
/// every lock; implementations must not block for long and can never veto.
pub trait EventSink: Send + Sync {
    fn notify(&self, record: &AuditRecord);
}

/// In-memory price table. Prices can be moved or withdrawn at runtime to
/// exercise the unavailable-price paths.
#[derive(Debug, Default)]
pub struct StaticPrices {
    prices: RwLock<HashMap<Symbol, Price>>,
}

impl StaticPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: Symbol, price: Price) {
        self.prices.write().insert(symbol, price);
    }

    pub fn clear_price(&self, symbol: &Symbol) {
        self.prices.write().remove(symbol);
    }
}

impl PriceSource for StaticPrices {
    fn current_price(&self, symbol: &Symbol) -> Result<Price, PriceError> {
        self.prices
            .read()
            .get(symbol)
            .copied()
            .ok_or_else(|| PriceError::Unavailable(symbol.clone()))
    }
}

/// In-memory limits table. Accounts without an entry trade unrestricted.
#[derive(Debug, Default)]
pub struct StaticLimits {
    limits: RwLock<HashMap<AccountId, Vec<RiskLimit>>>,
}

impl StaticLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_limits(&self, account: AccountId, limits: Vec<RiskLimit>) {
        self.limits.write().insert(account, limits);
    }
}

impl LimitsProvider for StaticLimits {
    fn account_limits(&self, account: AccountId) -> Vec<RiskLimit> {
        self.limits
            .read()
            .get(&account)
            .cloned()
            .unwrap_or_default()
    }
}

/// Test sink that keeps every notified record.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn notify(&self, record: &AuditRecord) {
        self.records.lock().push(record.clone());
    }
}
