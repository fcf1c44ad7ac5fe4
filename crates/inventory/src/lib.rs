//! Inventory stock ledger.
//!
//! Owns per-(product, location) stock levels and the append-only movement
//! history. Levels change only by appending movements; every movement records
//! the quantity it was applied against and the quantity it produced.

pub mod error;
pub mod event;
pub mod ledger;
pub mod movement;
pub mod query;

pub use error::LedgerError;
pub use event::{InventoryEvent, MinimumConfigured};
pub use ledger::{LedgerConfig, StockLedger};
pub use movement::{
    ExpectedQuantity, MovementKind, MovementRequest, StockKey, StockLevel, StockMovement,
};
pub use query::MovementFilter;
