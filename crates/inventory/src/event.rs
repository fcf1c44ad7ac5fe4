use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tirestock_core::{LocationId, ProductId};
use tirestock_events::Event;

use crate::movement::StockMovement;

/// Event: MinimumConfigured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumConfigured {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub minimum: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Facts published by the ledger after each commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    MovementAppended(StockMovement),
    MinimumConfigured(MinimumConfigured),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::MovementAppended(_) => "inventory.movement.appended",
            InventoryEvent::MinimumConfigured(_) => "inventory.level.minimum_configured",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::MovementAppended(m) => m.occurred_at,
            InventoryEvent::MinimumConfigured(e) => e.occurred_at,
        }
    }
}
