//! Invoice document parsing.
//!
//! Turns raw NFe XML bytes into a strongly-typed [`ParsedInvoice`]. Pure logic
//! (no IO, no storage); the only side effect is `tracing` diagnostics.

pub mod document;
pub mod error;
pub mod key;
pub mod parser;

pub use document::{InvoiceHeader, InvoiceLine, LineField, ParsedInvoice, SupplierRef};
pub use error::ParseError;
pub use key::{INVOICE_KEY_LEN, InvoiceKey};
pub use parser::parse;
