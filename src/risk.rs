//! Pre-trade risk evaluation.
//!
//! The evaluator is a pure function of (account limits, current exposure,
//! proposed order). It holds no state of its own, so it can never disagree
//! with the ledger about what the account looks like. Limits are checked in
//! a fixed order and evaluation stops at the first violation: position size,
//! then daily volume, then daily loss, then the symbol allow-list.

use crate::ledger::Exposure;
use crate::types::{Cash, Side, SignedQty, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-account limit, served by the administrative limits provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RiskLimit {
    /// Cap on the absolute position quantity in one symbol, applied to the
    /// projected post-fill position.
    MaxPositionSize { symbol: Symbol, max_qty: Decimal },
    /// Cap on notional traded per UTC day, including the proposed order.
    MaxDailyVolume { max_notional: Cash },
    /// Once this much has been lost in a day, no further orders.
    MaxDailyLoss { max_loss: Cash },
    /// Only these symbols may be traded.
    AllowedSymbols { symbols: Vec<Symbol> },
}

/// Which limit a denial came from. Serialized into the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitKind {
    PositionSize,
    DailyVolume,
    DailyLoss,
    SymbolNotAllowed,
}

#[derive(Debug, Clone)]
pub enum LimitBreach {
    PositionTooLarge {
        projected: Decimal,
        maximum: Decimal,
    },
    DailyVolumeExceeded {
        traded: Cash,
        additional: Cash,
        maximum: Cash,
    },
    DailyLossBreached {
        lost: Cash,
        maximum: Cash,
    },
    SymbolNotAllowed {
        symbol: Symbol,
    },
}

impl LimitBreach {
    pub fn kind(&self) -> LimitKind {
        match self {
            LimitBreach::PositionTooLarge { .. } => LimitKind::PositionSize,
            LimitBreach::DailyVolumeExceeded { .. } => LimitKind::DailyVolume,
            LimitBreach::DailyLossBreached { .. } => LimitKind::DailyLoss,
            LimitBreach::SymbolNotAllowed { .. } => LimitKind::SymbolNotAllowed,
        }
    }
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBreach::PositionTooLarge { projected, maximum } => {
                write!(f, "projected position {} exceeds cap {}", projected, maximum)
            }
            LimitBreach::DailyVolumeExceeded {
                traded,
                additional,
                maximum,
            } => write!(
                f,
                "daily volume {} + order {} exceeds cap {}",
                traded, additional, maximum
            ),
            LimitBreach::DailyLossBreached { lost, maximum } => {
                write!(f, "daily loss {} has reached cap {}", lost, maximum)
            }
            LimitBreach::SymbolNotAllowed { symbol } => {
                write!(f, "symbol {} is not on the allow-list", symbol)
            }
        }
    }
}

/// Outcome of evaluating one proposed order.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Order may proceed to reservation.
    Allowed,
    /// Order must be rejected; the first violated limit.
    Denied(LimitBreach),
    /// All limits pass but the notional is large enough to need an explicit
    /// sign-off before funds are committed.
    RequiresApproval { notional: Cash, threshold: Cash },
}

/// The order as the evaluator sees it: direction, quantity and the notional
/// estimated at the limit or reference price.
#[derive(Debug, Clone)]
pub struct OrderProposal<'a> {
    pub symbol: &'a Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub notional: Cash,
}

pub fn evaluate(
    limits: &[RiskLimit],
    exposure: &Exposure,
    proposal: &OrderProposal<'_>,
    approval_threshold: Cash,
) -> Decision {
    if let Some(breach) = check_position_size(limits, exposure, proposal) {
        return Decision::Denied(breach);
    }
    if let Some(breach) = check_daily_volume(limits, exposure, proposal) {
        return Decision::Denied(breach);
    }
    if let Some(breach) = check_daily_loss(limits, exposure) {
        return Decision::Denied(breach);
    }
    if let Some(breach) = check_allowed_symbols(limits, proposal) {
        return Decision::Denied(breach);
    }

    if proposal.notional >= approval_threshold {
        return Decision::RequiresApproval {
            notional: proposal.notional,
            threshold: approval_threshold,
        };
    }

    Decision::Allowed
}

fn check_position_size(
    limits: &[RiskLimit],
    exposure: &Exposure,
    proposal: &OrderProposal<'_>,
) -> Option<LimitBreach> {
    for limit in limits {
        if let RiskLimit::MaxPositionSize { symbol, max_qty } = limit {
            if symbol != proposal.symbol {
                continue;
            }
            let projected =
                SignedQty::new(exposure.position_qty.value() + proposal.side.sign() * proposal.qty);
            if projected.abs() > *max_qty {
                return Some(LimitBreach::PositionTooLarge {
                    projected: projected.abs(),
                    maximum: *max_qty,
                });
            }
        }
    }
    None
}

fn check_daily_volume(
    limits: &[RiskLimit],
    exposure: &Exposure,
    proposal: &OrderProposal<'_>,
) -> Option<LimitBreach> {
    for limit in limits {
        if let RiskLimit::MaxDailyVolume { max_notional } = limit {
            let combined = exposure.day_traded_notional.add(proposal.notional);
            if combined > *max_notional {
                return Some(LimitBreach::DailyVolumeExceeded {
                    traded: exposure.day_traded_notional,
                    additional: proposal.notional,
                    maximum: *max_notional,
                });
            }
        }
    }
    None
}

fn check_daily_loss(limits: &[RiskLimit], exposure: &Exposure) -> Option<LimitBreach> {
    for limit in limits {
        if let RiskLimit::MaxDailyLoss { max_loss } = limit {
            let lost = exposure.day_realized_pnl.negate();
            if !lost.is_negative() && lost >= *max_loss {
                return Some(LimitBreach::DailyLossBreached {
                    lost,
                    maximum: *max_loss,
                });
            }
        }
    }
    None
}

fn check_allowed_symbols(
    limits: &[RiskLimit],
    proposal: &OrderProposal<'_>,
) -> Option<LimitBreach> {
    for limit in limits {
        if let RiskLimit::AllowedSymbols { symbols } = limit {
            if !symbols.contains(proposal.symbol) {
                return Some(LimitBreach::SymbolNotAllowed {
                    symbol: proposal.symbol.clone(),
                });
            }
        }
    }
    None
}
