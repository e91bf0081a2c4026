// 5.0.2: result types and errors for engine operations.

use crate::events::RejectReason;
use crate::ledger::LedgerError;
use crate::order::OrderStatus;
use crate::position::Position;
use crate::types::{Cash, OrderId, Price, Symbol};
use rust_decimal::Decimal;

/// What became of a placement attempt. Every variant carries the order id;
/// the order object itself is queryable afterwards in all three cases.
#[derive(Debug, Clone)]
pub enum PlaceOutcome {
    /// Risk checks passed and funds are earmarked. The order sits in
    /// `Reserved` until a fill or a cancel resolves it.
    Accepted { order_id: OrderId, reserved: Cash },
    /// Passed every limit but the notional is large enough to need an
    /// explicit sign-off before any funds move.
    HeldForApproval { order_id: OrderId, notional: Cash },
    /// Terminal. The same reason is written to the audit log.
    Rejected { order_id: OrderId, reason: RejectReason },
}

impl PlaceOutcome {
    pub fn order_id(&self) -> OrderId {
        match self {
            Self::Accepted { order_id, .. }
            | Self::HeldForApproval { order_id, .. }
            | Self::Rejected { order_id, .. } => *order_id,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Self::HeldForApproval { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Everything a caller needs to know about a completed fill.
#[derive(Debug, Clone)]
pub struct FillReceipt {
    pub order_id: OrderId,
    pub price: Price,
    pub qty: Decimal,
    /// Cash movement for the account: negative for buys, positive for sells.
    pub cash_delta: Cash,
    /// Reservation surplus returned to available funds (zero for sells).
    pub released: Cash,
    pub realized_pnl: Cash,
    /// Position in the order's symbol after the fill, `None` if it closed flat.
    pub position_after: Option<Position>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrderError {
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Order {order_id} already settled as {status:?}")]
    TerminalState { order_id: OrderId, status: OrderStatus },

    #[error("Order {order_id} is {status:?}, expected Reserved")]
    NotReserved { order_id: OrderId, status: OrderStatus },

    #[error("Order {0} is not awaiting approval")]
    NotHeld(OrderId),

    #[error("Execution price {execution} breaches limit price {limit}")]
    LimitPriceViolated { limit: Price, execution: Price },

    #[error("No price available for {0}")]
    PriceUnavailable(Symbol),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
