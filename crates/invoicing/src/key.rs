//! Invoice access key.

use serde::{Deserialize, Serialize};

use tirestock_core::{DomainError, DomainResult};

/// Number of digits in an NFe access key.
pub const INVOICE_KEY_LEN: usize = 44;

/// Globally unique invoice access key: exactly 44 ASCII digits.
///
/// The check digit is not validated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceKey(String);

impl InvoiceKey {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != INVOICE_KEY_LEN {
            return Err(DomainError::validation(format!(
                "invoice key must have {INVOICE_KEY_LEN} digits, found {}",
                trimmed.len()
            )));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation("invoice key must be numeric"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for InvoiceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for InvoiceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InvoiceKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InvoiceKey> for String {
    fn from(value: InvoiceKey) -> Self {
        value.0
    }
}
