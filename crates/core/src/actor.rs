//! Actor identity recorded on every mutation.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Opaque caller identity supplied with every mutating operation.
///
/// The core does not authenticate actors; it only records them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}
