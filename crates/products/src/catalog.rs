//! Read-only catalog boundary.

use std::sync::{Arc, PoisonError, RwLock};

use crate::product::Product;

/// Read interface supplied by the external catalog collaborator.
///
/// `lookup_all` returns products in the catalog's iteration order; matching
/// strategies rely on that order for first-match tie-breaking.
pub trait CatalogReader: Send + Sync {
    fn lookup_all(&self) -> Vec<Product>;
}

impl<C> CatalogReader for Arc<C>
where
    C: CatalogReader + ?Sized,
{
    fn lookup_all(&self) -> Vec<Product> {
        (**self).lookup_all()
    }
}

/// In-memory catalog for tests/dev.
///
/// Preserves insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<Vec<Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: RwLock::new(products.into_iter().collect()),
        }
    }

    /// Insert or replace (by id) a catalog entry.
    pub fn upsert(&self, product: Product) {
        let mut products = self.products.write().unwrap_or_else(PoisonError::into_inner);
        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => {
                tracing::debug!(product_id = %product.id, code = %product.code, "catalog entry added");
                products.push(product);
            }
        }
    }
}

impl CatalogReader for InMemoryCatalog {
    fn lookup_all(&self) -> Vec<Product> {
        self.products
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
