// 5.0: the order engine. coordinates validation, risk evaluation, fund
// reservation, settlement and audit logging. per-account gates serialize
// everything that touches one account's money; the audit log gives all of
// it a single total order.

mod config;
mod core;
mod orders;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{FillReceipt, OrderError, PlaceOutcome};
