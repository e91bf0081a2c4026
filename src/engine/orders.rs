//! Order placement, approval, fills and cancellation.
//!
//! Every operation here follows the same shape: resolve external lookups
//! first, take the account gate, mutate ledger and order state, append the
//! audit records, release the gate, then notify sinks. Rejections travel
//! through the audit log just like successes.

use super::core::Engine;
use super::results::{FillReceipt, OrderError, PlaceOutcome};
use crate::audit::AuditRecord;
use crate::events::{
    CancelReason, EventPayload, OrderCancelledEvent, OrderFilledEvent, OrderHeldEvent,
    OrderPlacedEvent, OrderRejectedEvent, OrderReservedEvent, RejectReason,
};
use crate::ledger::LedgerError;
use crate::order::{Order, OrderKind, OrderRequest, OrderStatus};
use crate::risk::{evaluate, Decision, OrderProposal, RiskLimit};
use crate::types::{AccountId, Cash, OrderId, Price, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

impl Engine {
    fn next_order_id(&self) -> OrderId {
        OrderId(self.next_order_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Place an order. The request is validated, risk-checked and, for buys,
    /// funded, all under the account gate. Whatever happens, the attempt
    /// leaves audit records behind.
    pub fn place_order(&self, request: OrderRequest) -> Result<PlaceOutcome, OrderError> {
        // Market orders need a reference price for risk sizing and, on the
        // buy side, for the reservation estimate. Limit orders carry their
        // own. Resolved before the gate, like every external lookup.
        let reference_price = match request.kind {
            OrderKind::Limit(price) => Some(price),
            OrderKind::Market => self.prices.current_price(&request.symbol).ok(),
        };
        let limits = self.limits.account_limits(request.account_id);

        let gate = self.account_gate(request.account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.admit_order(request, reference_price, &limits, &mut records)
        };
        self.notify_all(&records);
        result
    }

    pub fn place_market_order(
        &self,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        qty: Decimal,
    ) -> Result<PlaceOutcome, OrderError> {
        self.place_order(OrderRequest::market(account_id, symbol, side, qty))
    }

    pub fn place_limit_order(
        &self,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        qty: Decimal,
        price: Price,
    ) -> Result<PlaceOutcome, OrderError> {
        self.place_order(OrderRequest::limit(account_id, symbol, side, qty, price))
    }

    /// Approve an order parked by the notional threshold. Re-runs the
    /// reservation step; market orders are re-quoted first since the price
    /// that parked them may be stale by now.
    pub fn approve_order(&self, order_id: OrderId) -> Result<PlaceOutcome, OrderError> {
        let held = self.order(order_id)?;
        let reference_price = match held.kind {
            OrderKind::Limit(price) => Some(price),
            OrderKind::Market => self.prices.current_price(&held.symbol).ok(),
        };

        let gate = self.account_gate(held.account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.settle_approval(order_id, reference_price, &mut records)
        };
        self.notify_all(&records);
        result
    }

    /// Decline a held order. Terminal: the order is rejected with the
    /// decline recorded as the reason.
    pub fn decline_order(&self, order_id: OrderId) -> Result<(), OrderError> {
        let held = self.order(order_id)?;
        let gate = self.account_gate(held.account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.refuse_approval(order_id, &mut records)
        };
        self.notify_all(&records);
        result
    }

    /// Fill a reserved order at an explicit execution price. Limit orders
    /// refuse prices worse than their limit; the order stays Reserved when
    /// that or a funds shortfall stops the fill.
    pub fn fill_order(
        &self,
        order_id: OrderId,
        execution_price: Price,
    ) -> Result<FillReceipt, OrderError> {
        let account_id = self.order(order_id)?.account_id;
        let gate = self.account_gate(account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.execute_fill(order_id, execution_price, &mut records)
        };
        self.notify_all(&records);
        result
    }

    /// Fill a reserved order at the current market price. Lookups get a
    /// bounded retry budget; if none succeeds the order cancels itself so
    /// the reservation does not stay earmarked for a fill that cannot price.
    pub fn fill_order_at_market(&self, order_id: OrderId) -> Result<FillReceipt, OrderError> {
        let order = self.order(order_id)?;
        let mut price = None;
        for attempt in 1..=self.config.price_retry_budget {
            match self.prices.current_price(&order.symbol) {
                Ok(found) => {
                    price = Some(found);
                    break;
                }
                Err(err) => {
                    warn!(order = %order_id, attempt, %err, "price lookup failed");
                }
            }
        }

        match price {
            Some(price) => self.fill_order(order_id, price),
            None => {
                self.cancel_internal(order_id, CancelReason::PriceUnavailable)?;
                Err(OrderError::PriceUnavailable(order.symbol))
            }
        }
    }

    /// Cancel a reserved order and return its reservation to available
    /// funds. Returns the released amount.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Cash, OrderError> {
        self.cancel_internal(order_id, CancelReason::UserRequested)
    }

    pub fn order_status(&self, order_id: OrderId) -> Result<OrderStatus, OrderError> {
        self.orders
            .read()
            .get(&order_id)
            .map(|order| order.status)
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    // 5.2: the admission ladder. runs under the account gate. creation is
    // recorded first, then each check either passes or turns the order into
    // an audited rejection. hard errors (unknown or halted account) happen
    // before any order exists.
    fn admit_order(
        &self,
        request: OrderRequest,
        reference_price: Option<Price>,
        limits: &[RiskLimit],
        records: &mut Vec<AuditRecord>,
    ) -> Result<PlaceOutcome, OrderError> {
        let now = self.now();

        let account_closed = match self.ledger.ensure_active(request.account_id) {
            Ok(()) => false,
            Err(LedgerError::AccountClosed(_)) => true,
            Err(err) => return Err(err.into()),
        };

        let order = Order::new(
            self.next_order_id(),
            request.account_id,
            request.symbol,
            request.side,
            request.kind,
            request.qty,
            now,
        );
        records.push(self.audit.append(
            now,
            EventPayload::OrderPlaced(OrderPlacedEvent {
                order_id: order.id,
                account_id: order.account_id,
                symbol: order.symbol.clone(),
                side: order.side,
                qty: order.qty,
                limit_price: order.kind.limit_price(),
            }),
        ));

        if order.qty <= Decimal::ZERO {
            return Ok(self.reject_pending(order, RejectReason::InvalidQuantity, now, records));
        }
        if order.symbol.is_empty() {
            return Ok(self.reject_pending(order, RejectReason::EmptySymbol, now, records));
        }
        if account_closed {
            return Ok(self.reject_pending(order, RejectReason::AccountClosed, now, records));
        }
        let Some(reference) = reference_price else {
            return Ok(self.reject_pending(order, RejectReason::PriceUnavailable, now, records));
        };

        let notional = order.notional_at(reference);
        let exposure = self.ledger.exposure(order.account_id, &order.symbol, now)?;
        let proposal = OrderProposal {
            symbol: &order.symbol,
            side: order.side,
            qty: order.qty,
            notional,
        };

        match evaluate(limits, &exposure, &proposal, self.config.approval_threshold) {
            Decision::Allowed => self.reserve_and_accept(order, notional, now, records),
            Decision::Denied(breach) => Ok(self.reject_pending(
                order,
                RejectReason::RiskDenied {
                    limit: breach.kind(),
                    detail: breach.to_string(),
                },
                now,
                records,
            )),
            Decision::RequiresApproval { notional, threshold } => {
                let mut order = order;
                order.held = true;
                let order_id = order.id;
                let account_id = order.account_id;
                self.orders.write().insert(order_id, order);
                records.push(self.audit.append(
                    now,
                    EventPayload::OrderHeldForApproval(OrderHeldEvent {
                        order_id,
                        account_id,
                        notional,
                        threshold,
                    }),
                ));
                info!(order = %order_id, %notional, "order held for approval");
                Ok(PlaceOutcome::HeldForApproval { order_id, notional })
            }
        }
    }

    // Shared by admission and approval: earmark funds for buys, move the
    // order to Reserved. A funds shortfall becomes an audited rejection.
    fn reserve_and_accept(
        &self,
        mut order: Order,
        notional: Cash,
        now: Timestamp,
        records: &mut Vec<AuditRecord>,
    ) -> Result<PlaceOutcome, OrderError> {
        let reserve_amount = if order.is_buy() { notional } else { Cash::zero() };
        if !reserve_amount.is_zero() {
            match self.ledger_guard(
                self.ledger.reserve(order.account_id, reserve_amount),
                now,
                records,
            ) {
                Ok(()) => {}
                Err(LedgerError::InsufficientFunds {
                    requested,
                    available,
                }) => {
                    return Ok(self.reject_pending(
                        order,
                        RejectReason::InsufficientFunds {
                            required: requested,
                            available,
                        },
                        now,
                        records,
                    ));
                }
                Err(err) => return Err(err.into()),
            }
        }

        order.reserved = reserve_amount;
        order.transition(OrderStatus::Reserved, now);
        let order_id = order.id;
        let account_id = order.account_id;
        self.orders.write().insert(order_id, order);
        records.push(self.audit.append(
            now,
            EventPayload::OrderReserved(OrderReservedEvent {
                order_id,
                account_id,
                reserved: reserve_amount,
            }),
        ));
        info!(order = %order_id, reserved = %reserve_amount, "order reserved");
        Ok(PlaceOutcome::Accepted {
            order_id,
            reserved: reserve_amount,
        })
    }

    fn reject_pending(
        &self,
        mut order: Order,
        reason: RejectReason,
        now: Timestamp,
        records: &mut Vec<AuditRecord>,
    ) -> PlaceOutcome {
        order.transition(OrderStatus::Rejected, now);
        let order_id = order.id;
        let account_id = order.account_id;
        self.orders.write().insert(order_id, order);
        records.push(self.audit.append(
            now,
            EventPayload::OrderRejected(OrderRejectedEvent {
                order_id,
                account_id,
                reason: reason.clone(),
            }),
        ));
        warn!(order = %order_id, %reason, "order rejected");
        PlaceOutcome::Rejected { order_id, reason }
    }

    fn settle_approval(
        &self,
        order_id: OrderId,
        reference_price: Option<Price>,
        records: &mut Vec<AuditRecord>,
    ) -> Result<PlaceOutcome, OrderError> {
        let now = self.now();
        let order = self
            .orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if order.status.is_terminal() {
            return Err(OrderError::TerminalState {
                order_id,
                status: order.status,
            });
        }
        if order.status != OrderStatus::Pending || !order.held {
            return Err(OrderError::NotHeld(order_id));
        }

        let Some(reference) = reference_price else {
            return Ok(self.reject_pending(order, RejectReason::PriceUnavailable, now, records));
        };
        let notional = order.notional_at(reference);
        self.reserve_and_accept(order, notional, now, records)
    }

    fn refuse_approval(
        &self,
        order_id: OrderId,
        records: &mut Vec<AuditRecord>,
    ) -> Result<(), OrderError> {
        let now = self.now();
        let order = self
            .orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(order_id))?;
        if order.status.is_terminal() {
            return Err(OrderError::TerminalState {
                order_id,
                status: order.status,
            });
        }
        if order.status != OrderStatus::Pending || !order.held {
            return Err(OrderError::NotHeld(order_id));
        }

        self.reject_pending(order, RejectReason::ApprovalDeclined, now, records);
        Ok(())
    }

    fn execute_fill(
        &self,
        order_id: OrderId,
        execution_price: Price,
        records: &mut Vec<AuditRecord>,
    ) -> Result<FillReceipt, OrderError> {
        let now = self.now();
        let order = self
            .orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(order_id))?;
        match order.status {
            OrderStatus::Reserved => {}
            status if status.is_terminal() => {
                return Err(OrderError::TerminalState { order_id, status })
            }
            status => return Err(OrderError::NotReserved { order_id, status }),
        }

        if let OrderKind::Limit(limit) = order.kind {
            let breached = match order.side {
                Side::Buy => execution_price > limit,
                Side::Sell => execution_price < limit,
            };
            if breached {
                return Err(OrderError::LimitPriceViolated {
                    limit,
                    execution: execution_price,
                });
            }
        }

        let settlement = match order.side {
            Side::Buy => self.ledger_guard(
                self.ledger.settle_buy(
                    order.account_id,
                    &order.symbol,
                    order.qty,
                    execution_price,
                    order.reserved,
                    now,
                ),
                now,
                records,
            )?,
            Side::Sell => self.ledger_guard(
                self.ledger
                    .settle_sell(order.account_id, &order.symbol, order.qty, execution_price, now),
                now,
                records,
            )?,
        };

        {
            let mut orders = self.orders.write();
            let stored = orders.get_mut(&order_id).expect("order vanished mid-fill");
            stored.reserved = Cash::zero();
            stored.transition(OrderStatus::Filled, now);
        }
        records.push(self.audit.append(
            now,
            EventPayload::OrderFilled(OrderFilledEvent {
                order_id,
                account_id: order.account_id,
                symbol: order.symbol.clone(),
                side: order.side,
                qty: order.qty,
                price: execution_price,
                cash_delta: settlement.cash_delta,
                released: settlement.released,
                realized_pnl: settlement.realized_pnl,
            }),
        ));
        info!(order = %order_id, price = %execution_price, "order filled");
        Ok(FillReceipt {
            order_id,
            price: execution_price,
            qty: order.qty,
            cash_delta: settlement.cash_delta,
            released: settlement.released,
            realized_pnl: settlement.realized_pnl,
            position_after: settlement.position_after,
        })
    }

    fn cancel_internal(
        &self,
        order_id: OrderId,
        reason: CancelReason,
    ) -> Result<Cash, OrderError> {
        let account_id = self.order(order_id)?.account_id;
        let gate = self.account_gate(account_id);
        let mut records = Vec::new();
        let result = {
            let _guard = gate.lock();
            self.release_and_cancel(order_id, reason, &mut records)
        };
        self.notify_all(&records);
        result
    }

    fn release_and_cancel(
        &self,
        order_id: OrderId,
        reason: CancelReason,
        records: &mut Vec<AuditRecord>,
    ) -> Result<Cash, OrderError> {
        let now = self.now();
        let order = self
            .orders
            .read()
            .get(&order_id)
            .cloned()
            .ok_or(OrderError::OrderNotFound(order_id))?;
        match order.status {
            OrderStatus::Reserved => {}
            status if status.is_terminal() => {
                return Err(OrderError::TerminalState { order_id, status })
            }
            status => return Err(OrderError::NotReserved { order_id, status }),
        }

        let released = order.reserved;
        if !released.is_zero() {
            self.ledger_guard(self.ledger.release(order.account_id, released), now, records)?;
        }
        {
            let mut orders = self.orders.write();
            let stored = orders.get_mut(&order_id).expect("order vanished mid-cancel");
            stored.reserved = Cash::zero();
            stored.transition(OrderStatus::Cancelled, now);
        }
        records.push(self.audit.append(
            now,
            EventPayload::OrderCancelled(OrderCancelledEvent {
                order_id,
                account_id: order.account_id,
                released,
                reason,
            }),
        ));
        info!(order = %order_id, %released, "order cancelled");
        Ok(released)
    }
}
