// exec-core: transactional order execution engine.
// funds-first architecture: conservation of money takes priority.
// every state change is risk-checked, serialized per account, and written
// to a hash-chained audit log before anyone outside hears about it.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, OrderId, Symbol, Price, Cash
//   2.x  position.rs: position struct, PnL, increase/reduce/flip
//   3.x  events.rs: state transition events for audit
//   4.x  audit.rs: hash-chained append-only audit log
//   5.x  engine/: core engine: placement, approval, fills, cancels
//   6.x  ledger.rs: available/reserved buckets, settlement, conservation
//   7.x  risk.rs: position/volume/loss limits, approval threshold
//   8.x  order.rs: order records and the status state machine
//   9.x  traits.rs: price source, limits provider, event sink seams

// core modules
pub mod audit;
pub mod engine;
pub mod events;
pub mod ledger;
pub mod order;
pub mod position;
pub mod types;

// risk and integration seams
pub mod risk;
pub mod traits;

// re exports for convenience
pub use audit::*;
pub use engine::*;
pub use events::*;
pub use ledger::*;
pub use order::*;
pub use position::*;
pub use risk::*;
pub use traits::*;
pub use types::*;
