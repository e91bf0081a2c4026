// 3.0: every state change produces exactly one event. the audit log stores
// them hash-chained; external sinks get them after commit. the EventPayload
// enum is the complete vocabulary, one struct per variant.

use crate::risk::LimitKind;
use crate::types::{AccountId, Cash, OrderId, Price, Side, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Account events
    AccountOpened(AccountOpenedEvent),
    AccountClosed(AccountClosedEvent),
    AccountHalted(AccountHaltedEvent),
    Deposit(DepositEvent),
    Withdrawal(WithdrawalEvent),
    Transfer(TransferEvent),

    // Order lifecycle events
    OrderPlaced(OrderPlacedEvent),
    OrderReserved(OrderReservedEvent),
    OrderHeldForApproval(OrderHeldEvent),
    OrderFilled(OrderFilledEvent),
    OrderRejected(OrderRejectedEvent),
    OrderCancelled(OrderCancelledEvent),
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::AccountOpened(_) => "account_opened",
            EventPayload::AccountClosed(_) => "account_closed",
            EventPayload::AccountHalted(_) => "account_halted",
            EventPayload::Deposit(_) => "deposit",
            EventPayload::Withdrawal(_) => "withdrawal",
            EventPayload::Transfer(_) => "transfer",
            EventPayload::OrderPlaced(_) => "order_placed",
            EventPayload::OrderReserved(_) => "order_reserved",
            EventPayload::OrderHeldForApproval(_) => "order_held_for_approval",
            EventPayload::OrderFilled(_) => "order_filled",
            EventPayload::OrderRejected(_) => "order_rejected",
            EventPayload::OrderCancelled(_) => "order_cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOpenedEvent {
    pub account_id: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountClosedEvent {
    pub account_id: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHaltedEvent {
    pub account_id: AccountId,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositEvent {
    pub account_id: AccountId,
    pub amount: Cash,
    pub new_available: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub account_id: AccountId,
    pub amount: Cash,
    pub new_available: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub limit_price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReservedEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub reserved: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHeldEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub notional: Cash,
    pub threshold: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFilledEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub price: Price,
    /// Negative for buys, positive for sells.
    pub cash_delta: Cash,
    pub released: Cash,
    pub realized_pnl: Cash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejectedEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub released: Cash,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RejectReason {
    InvalidQuantity,
    EmptySymbol,
    AccountClosed,
    RiskDenied { limit: LimitKind, detail: String },
    InsufficientFunds { required: Cash, available: Cash },
    PriceUnavailable,
    ApprovalDeclined,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidQuantity => write!(f, "quantity must be positive"),
            RejectReason::EmptySymbol => write!(f, "symbol must not be empty"),
            RejectReason::AccountClosed => write!(f, "account is closed"),
            RejectReason::RiskDenied { limit, detail } => {
                write!(f, "risk limit {:?} denied: {}", limit, detail)
            }
            RejectReason::InsufficientFunds {
                required,
                available,
            } => write!(
                f,
                "insufficient funds: required {}, available {}",
                required, available
            ),
            RejectReason::PriceUnavailable => write!(f, "no reference price available"),
            RejectReason::ApprovalDeclined => write!(f, "approval declined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    UserRequested,
    PriceUnavailable,
}
