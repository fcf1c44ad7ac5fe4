use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tirestock_core::{Actor, LocationId, MovementId, ProductId};

/// Ledger key: one product at one location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl StockKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

/// Kind of stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Goods received (invoice import, manual receipt). Positive delta.
    Entry,
    /// Goods leaving stock for reasons other than a sale. Negative delta.
    Exit,
    /// Count correction. Either sign; may leave the level below zero.
    Adjustment,
    /// Point-of-sale decrement. Negative delta.
    Sale,
}

impl MovementKind {
    /// Whether `quantity` has the sign this kind requires.
    pub fn accepts(self, quantity: i64) -> bool {
        match self {
            MovementKind::Entry => quantity > 0,
            MovementKind::Exit | MovementKind::Sale => quantity < 0,
            MovementKind::Adjustment => quantity != 0,
        }
    }

    pub fn may_go_negative(self) -> bool {
        matches!(self, MovementKind::Adjustment)
    }
}

/// Expectation about the quantity a movement is appended against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectedQuantity {
    /// Append against whatever the current quantity is.
    #[default]
    Any,
    /// Require the current quantity to be exactly this value.
    Exact(i64),
}

impl ExpectedQuantity {
    pub fn matches(self, actual: i64) -> bool {
        match self {
            ExpectedQuantity::Any => true,
            ExpectedQuantity::Exact(q) => q == actual,
        }
    }
}

/// Caller input for one movement. The ledger derives previous/new quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub kind: MovementKind,
    /// Signed delta.
    pub quantity: i64,
    pub reason: Option<String>,
    /// Invoice key, sale id, ...
    pub reference: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub expected_previous: ExpectedQuantity,
}

impl MovementRequest {
    pub fn new(
        product_id: ProductId,
        location_id: LocationId,
        kind: MovementKind,
        quantity: i64,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            location_id,
            kind,
            quantity,
            reason: None,
            reference: None,
            actor,
            occurred_at,
            expected_previous: ExpectedQuantity::Any,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Only append if the current quantity is still `previous`.
    pub fn expecting(mut self, previous: i64) -> Self {
        self.expected_previous = ExpectedQuantity::Exact(previous);
        self
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

/// Immutable ledger entry.
///
/// `new_quantity == previous_quantity + quantity` always holds; the ledger
/// computes both quantities itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    /// 1-based position in this key's chain.
    pub sequence: u64,
}

impl StockMovement {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }
}

/// On-hand quantity for one (product, location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: i64,
    /// Low-stock threshold.
    pub minimum: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StockLevel {
    pub fn empty(key: StockKey) -> Self {
        Self {
            product_id: key.product_id,
            location_id: key.location_id,
            quantity: 0,
            minimum: 0,
            updated_at: None,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.location_id)
    }

    pub fn is_below_minimum(&self) -> bool {
        self.quantity < self.minimum
    }
}
