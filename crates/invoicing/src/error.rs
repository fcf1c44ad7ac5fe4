use thiserror::Error;

/// Document-level parse failure.
///
/// Only structural problems are errors; defects inside a single line are
/// recovered by the parser and recorded on the line instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The bytes are not a recognizable invoice document.
    #[error("malformed invoice document: {0}")]
    Malformed(String),
}

impl ParseError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
