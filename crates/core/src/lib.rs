//! Identifiers, caller identity and validation errors shared by every
//! tirestock crate. Pure domain primitives; no IO.

pub mod actor;
pub mod error;
pub mod id;

pub use actor::Actor;
pub use error::{DomainError, DomainResult};
pub use id::{ImportId, LocationId, MovementId, ProductId, UserId};
