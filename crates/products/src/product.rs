use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tirestock_core::{DomainError, DomainResult, ProductId};

/// Catalog product, as seen by the import pipeline.
///
/// Products are owned by the catalog collaborator. The import pipeline only
/// reads them: it never creates or edits catalog entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Supplier/catalog code (matched against the invoice `cProd`).
    pub code: String,
    pub description: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Tire size descriptor, e.g. "175/70 R13".
    pub size: Option<String>,
    pub price: Decimal,
    pub cost: Decimal,
}

impl Product {
    /// Build a product record with empty descriptors and zero pricing.
    pub fn new(
        id: ProductId,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        let code = code.into();
        let description = description.into();

        if code.trim().is_empty() {
            return Err(DomainError::validation("product code cannot be empty"));
        }
        if description.trim().is_empty() {
            return Err(DomainError::validation("product description cannot be empty"));
        }

        Ok(Self {
            id,
            code,
            description,
            brand: None,
            model: None,
            size: None,
            price: Decimal::ZERO,
            cost: Decimal::ZERO,
        })
    }

    pub fn with_descriptors(
        mut self,
        brand: Option<String>,
        model: Option<String>,
        size: Option<String>,
    ) -> Self {
        self.brand = brand;
        self.model = model;
        self.size = size;
        self
    }

    pub fn with_pricing(mut self, price: Decimal, cost: Decimal) -> Self {
        self.price = price;
        self.cost = cost;
        self
    }
}
