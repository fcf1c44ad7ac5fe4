use thiserror::Error;

use crate::movement::MovementKind;

/// Ledger append failure. Nothing is written when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A non-adjustment movement would drive the quantity below zero.
    #[error("insufficient stock: available {available}, requested {requested}")]
    NegativeStock { available: i64, requested: i64 },

    /// The caller's expected previous quantity is no longer current.
    #[error("stale chain: expected previous quantity {expected}, found {actual}")]
    StaleChain { expected: i64, actual: i64 },

    /// Zero delta, or a delta whose sign does not fit the movement kind.
    #[error("invalid quantity {quantity} for {kind:?} movement")]
    InvalidQuantity { kind: MovementKind, quantity: i64 },

    #[error("minimum threshold cannot be negative: {0}")]
    InvalidMinimum(i64),

    #[error("quantity overflow")]
    Overflow,

    /// A batch reference must be non-empty.
    #[error("batch reference cannot be empty")]
    EmptyReference,

    /// The batch reference was already consumed by an earlier batch.
    #[error("reference already recorded: {0}")]
    DuplicateReference(String),

    /// One request of a batch failed; nothing in the batch was applied.
    #[error("batch request #{index} rejected: {source}")]
    BatchRejected {
        index: usize,
        #[source]
        source: Box<LedgerError>,
    },

    /// The per-key lock was not acquired within the configured wait.
    #[error("timed out waiting for stock lock")]
    LockTimeout,

    #[error("ledger lock poisoned")]
    Poisoned,
}

impl LedgerError {
    /// Whether retrying with refreshed state may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::StaleChain { .. } | LedgerError::LockTimeout => true,
            LedgerError::BatchRejected { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The innermost error (unwraps batch attribution).
    pub fn root(&self) -> &LedgerError {
        match self {
            LedgerError::BatchRejected { source, .. } => source.root(),
            other => other,
        }
    }
}
