//! Read-side filter over movement history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tirestock_core::{LocationId, ProductId};

use crate::movement::{MovementKind, StockMovement};

/// Movement history filter. Unset fields match everything.
///
/// The date range is half-open: `from <= occurred_at < to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub location_id: Option<LocationId>,
    pub kind: Option<MovementKind>,
    pub reference: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn kind(mut self, kind: MovementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn matches(&self, movement: &StockMovement) -> bool {
        self.product_id.is_none_or(|p| p == movement.product_id)
            && self.location_id.is_none_or(|l| l == movement.location_id)
            && self.kind.is_none_or(|k| k == movement.kind)
            && self
                .reference
                .as_deref()
                .is_none_or(|r| movement.reference.as_deref() == Some(r))
            && self.from.is_none_or(|from| movement.occurred_at >= from)
            && self.to.is_none_or(|to| movement.occurred_at < to)
    }
}
