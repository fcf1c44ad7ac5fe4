use thiserror::Error;

use tirestock_inventory::LedgerError;
use tirestock_invoicing::{InvoiceKey, ParseError};

use crate::import::ImportStatus;

/// Import session failure.
///
/// Confirmation failures leave the ledger untouched and the pending import in
/// `pending`, so the caller can retry or cancel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The document could not be parsed at all.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Confirm/cancel called on an import that is not pending.
    #[error("import is {status:?}, expected pending")]
    InvalidState { status: ImportStatus },

    /// The invoice key was already applied to the ledger.
    #[error("invoice {0} was already imported")]
    DuplicateInvoice(InvoiceKey),

    /// Appending the movement for one line failed; nothing was applied.
    #[error("invoice line {line_no} could not be applied: {source}")]
    LineFailed {
        line_no: u32,
        #[source]
        source: LedgerError,
    },

    /// Ledger failure not attributable to a single line.
    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

impl ImportError {
    /// Whether retrying the same confirmation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ImportError::LineFailed { source, .. } | ImportError::Ledger(source) => {
                source.is_retryable()
            }
            _ => false,
        }
    }
}
