//! Engine configuration options.

use crate::types::Cash;
use rust_decimal_macros::dec;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Orders whose estimated notional reaches this level are parked for
    /// manual approval instead of reserving funds straight away.
    pub approval_threshold: Cash,
    /// Price lookups attempted by `fill_order_at_market` before the order
    /// gives up and cancels itself.
    pub price_retry_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_threshold: Cash::new(dec!(1_000_000)),
            price_retry_budget: 3,
        }
    }
}
