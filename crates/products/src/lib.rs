//! Product catalog boundary.
//!
//! The catalog is an external collaborator: this crate only defines the product
//! record the import pipeline reads and the read-only lookup interface.

pub mod catalog;
pub mod product;

pub use catalog::{CatalogReader, InMemoryCatalog};
pub use product::Product;
