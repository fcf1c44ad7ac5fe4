//! Supplier invoice import.
//!
//! Reconciles parsed invoice lines against the product catalog, holds the
//! result for review and, on confirmation, records the received quantities in
//! the stock ledger as one atomic batch keyed by the invoice access key.

pub mod config;
pub mod error;
pub mod import;
pub mod resolver;

pub use config::{ImportConfig, LINE_TOTAL_TOLERANCE_ENV, LOCK_TIMEOUT_MS_ENV};
pub use error::ImportError;
pub use import::{
    ImportCoordinator, ImportReport, ImportStatus, LineOutcome, LineReport, PendingImport,
};
pub use resolver::{
    CodeThenFirstToken, ExactCode, FirstToken, InvoiceWarning, LineMatch, MatchStrategy,
    ReconciledInvoice, ReconciledLine, Resolver, TotalMismatch,
};
