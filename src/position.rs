// 2.0: position tracking. qty signed (positive = long, negative = short),
// entry averaged on increase, pnl realized on reduce.
// 2.1 has the increase/reduce/flip logic at the bottom, all pure functions.

use crate::types::{Cash, Price, Side, SignedQty, Symbol, Timestamp};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub qty: SignedQty,
    pub avg_price: Price,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
    pub realized_pnl: Cash,
}

impl Position {
    pub fn new(symbol: Symbol, qty: SignedQty, avg_price: Price, timestamp: Timestamp) -> Self {
        Self {
            symbol,
            qty,
            avg_price,
            opened_at: timestamp,
            updated_at: timestamp,
            realized_pnl: Cash::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.qty.is_zero()
    }

    // 2.1: paper gains/losses against a reference price
    pub fn unrealized_pnl(&self, reference: Price) -> Cash {
        Cash::new(self.qty.value() * (reference.value() - self.avg_price.value()))
    }

    pub fn notional(&self, reference: Price) -> Cash {
        Cash::new(self.qty.abs() * reference.value())
    }

    pub fn entry_value(&self) -> Cash {
        Cash::new(self.qty.abs() * self.avg_price.value())
    }
}

// 2.2: the realization formula. close_qty * (exit - entry).
// close_qty keeps the position's sign, so shorts profit when exit < entry.
pub fn calculate_realized_pnl(close_qty: SignedQty, entry: Price, exit: Price) -> Cash {
    Cash::new(close_qty.value() * (exit.value() - entry.value()))
}

// Result of pushing one fill through a position.
#[derive(Debug, Clone)]
pub struct FillEffect {
    pub new_position: Option<Position>,
    pub realized_pnl: Cash,
}

// 2.3: adds to an existing position in its own direction. averages the entry price.
pub fn increase_position(
    position: &Position,
    delta_qty: Decimal,
    fill_price: Price,
    timestamp: Timestamp,
) -> Position {
    debug_assert!(
        position.is_empty() || (delta_qty > Decimal::ZERO) == position.qty.is_long(),
        "increase must be same direction as existing position"
    );

    let old_qty = position.qty.value();
    let new_qty_value = old_qty + delta_qty;
    let new_qty = SignedQty::new(new_qty_value);

    // Weighted average entry price
    let new_avg = if new_qty_value.abs() > Decimal::ZERO {
        let weighted_sum =
            old_qty.abs() * position.avg_price.value() + delta_qty.abs() * fill_price.value();
        Price::new_unchecked(weighted_sum / new_qty_value.abs())
    } else {
        position.avg_price
    };

    Position {
        symbol: position.symbol.clone(),
        qty: new_qty,
        avg_price: new_avg,
        opened_at: position.opened_at,
        updated_at: timestamp,
        realized_pnl: position.realized_pnl,
    }
}

// 2.4: shrinks a position toward zero. entry price stays put, pnl is realized
// against it for the closed portion. fully closed -> None.
pub fn reduce_position(
    position: &Position,
    reduce_amount: Decimal,
    fill_price: Price,
    timestamp: Timestamp,
) -> FillEffect {
    debug_assert!(reduce_amount > Decimal::ZERO, "reduce amount must be positive");

    let position_abs = position.qty.abs();
    let reduce_amount = reduce_amount.min(position_abs);

    // PnL is based on the original direction of the closed portion
    let close_qty = SignedQty::new(position.qty.value().signum() * reduce_amount);
    let realized = calculate_realized_pnl(close_qty, position.avg_price, fill_price);

    let remaining_abs = position_abs - reduce_amount;
    if remaining_abs.is_zero() {
        return FillEffect {
            new_position: None,
            realized_pnl: realized,
        };
    }

    let new_position = Position {
        symbol: position.symbol.clone(),
        qty: SignedQty::new(position.qty.value().signum() * remaining_abs),
        avg_price: position.avg_price, // unchanged on reduction
        opened_at: position.opened_at,
        updated_at: timestamp,
        realized_pnl: position.realized_pnl.add(realized),
    };

    FillEffect {
        new_position: Some(new_position),
        realized_pnl: realized,
    }
}

// 2.5: crosses through zero. closes the whole old position, opens the residual
// on the other side with its entry at the fill price.
pub fn flip_position(
    position: &Position,
    residual_qty: Decimal,
    fill_price: Price,
    timestamp: Timestamp,
) -> FillEffect {
    debug_assert!(
        (residual_qty > Decimal::ZERO) != position.qty.is_long(),
        "flip residual must be opposite direction"
    );

    let close = reduce_position(position, position.qty.abs(), fill_price, timestamp);

    let new_position = Position::new(
        position.symbol.clone(),
        SignedQty::new(residual_qty),
        fill_price,
        timestamp,
    );

    FillEffect {
        new_position: Some(new_position),
        realized_pnl: close.realized_pnl,
    }
}

// 2.6: the single entry point the ledger uses. dispatches on the relationship
// between the fill direction and the existing position.
pub fn apply_fill(
    existing: Option<&Position>,
    symbol: &Symbol,
    side: Side,
    qty: Decimal,
    fill_price: Price,
    timestamp: Timestamp,
) -> FillEffect {
    debug_assert!(qty > Decimal::ZERO, "fill qty must be positive");
    let delta = side.sign() * qty;

    let position = match existing {
        None => {
            return FillEffect {
                new_position: Some(Position::new(
                    symbol.clone(),
                    SignedQty::new(delta),
                    fill_price,
                    timestamp,
                )),
                realized_pnl: Cash::zero(),
            }
        }
        Some(p) => p,
    };

    let same_direction = (delta > Decimal::ZERO) == position.qty.is_long();
    if same_direction {
        return FillEffect {
            new_position: Some(increase_position(position, delta, fill_price, timestamp)),
            realized_pnl: Cash::zero(),
        };
    }

    if qty <= position.qty.abs() {
        reduce_position(position, qty, fill_price, timestamp)
    } else {
        let residual = delta + position.qty.value();
        flip_position(position, residual, fill_price, timestamp)
    }
}
