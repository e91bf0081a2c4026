//! Order records and the status state machine.
//!
//! Pending -> Reserved -> {Filled | Rejected}, plus Reserved -> Cancelled.
//! Validation, risk and funds failures take Pending -> Rejected. Filled,
//! Rejected and Cancelled are terminal: no transition leaves them, ever.

use crate::types::{AccountId, Cash, OrderId, Price, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Executes at whatever the market gives; reservation is estimated at
    /// the reference price fetched when the order is placed.
    Market,
    /// Executes at the given price or better.
    Limit(Price),
}

impl OrderKind {
    pub fn limit_price(&self) -> Option<Price> {
        match self {
            OrderKind::Market => None,
            OrderKind::Limit(price) => Some(*price),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Reserved,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Reserved)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Reserved, OrderStatus::Filled)
                | (OrderStatus::Reserved, OrderStatus::Cancelled)
        )
    }
}

/// Everything a caller supplies to place an order. Quantity is validated by
/// the engine, not here, so a bad request still produces an audited rejection.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub qty: Decimal,
}

impl OrderRequest {
    pub fn market(account_id: AccountId, symbol: Symbol, side: Side, qty: Decimal) -> Self {
        Self {
            account_id,
            symbol,
            side,
            kind: OrderKind::Market,
            qty,
        }
    }

    pub fn limit(
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        qty: Decimal,
        price: Price,
    ) -> Self {
        Self {
            account_id,
            symbol,
            side,
            kind: OrderKind::Limit(price),
            qty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub qty: Decimal,
    pub status: OrderStatus,
    /// Funds this order holds in the reserved bucket. Zero for sells and for
    /// anything not yet reserved.
    pub reserved: Cash,
    /// Set while the order waits for an explicit approval sign-off.
    pub held: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    pub fn new(
        id: OrderId,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        qty: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            side,
            kind,
            qty,
            status: OrderStatus::Pending,
            reserved: Cash::zero(),
            held: false,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn notional_at(&self, price: Price) -> Cash {
        Cash::new(self.qty * price.value())
    }

    // Internal transition point. An illegal transition here means the engine
    // itself broke the state machine, so it panics rather than returning an
    // error the caller could swallow.
    pub(crate) fn transition(&mut self, next: OrderStatus, timestamp: Timestamp) {
        assert!(
            self.status.can_transition_to(next),
            "illegal order transition {:?} -> {:?} on {}",
            self.status,
            next,
            self.id
        );
        self.status = next;
        self.held = false;
        self.updated_at = timestamp;
    }
}
