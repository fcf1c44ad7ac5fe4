use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::key::InvoiceKey;

/// Invoice identification block (`ide` + header attributes + grand total).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub key: InvoiceKey,
    /// Human invoice number (`nNF`).
    pub number: Option<String>,
    pub series: Option<String>,
    pub issued_at: Option<DateTime<FixedOffset>>,
    /// Declared grand total (`vNF`), including taxes and freight.
    pub declared_total: Option<Decimal>,
    /// Declared sum of product values (`ICMSTot/vProd`).
    pub declared_products_total: Option<Decimal>,
}

/// Issuer of the invoice.
///
/// Owned by the supplier directory, which merges these references on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupplierRef {
    /// CNPJ, or CPF for individual issuers.
    pub tax_id: Option<String>,
    pub legal_name: Option<String>,
    pub trade_name: Option<String>,
}

/// Line fields the parser can substitute when the document omits them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineField {
    Code,
    Description,
    Quantity,
    UnitValue,
    TotalValue,
}

/// One invoice line item (`det/prod`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub code: String,
    pub description: String,
    /// Tax classification (`NCM`).
    pub tax_code: Option<String>,
    /// Fiscal operation code (`CFOP`).
    pub operation_code: Option<String>,
    /// Commercial unit (`uCom`).
    pub unit: Option<String>,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub total_value: Decimal,
    /// Fields that were missing or unparseable and got a zero/empty value.
    pub defaulted: Vec<LineField>,
}

impl InvoiceLine {
    pub fn is_defaulted(&self, field: LineField) -> bool {
        self.defaulted.contains(&field)
    }

    /// `quantity * unit_value`, the value the declared total should match.
    /// `None` when the product does not fit in a `Decimal`.
    pub fn expected_total(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.unit_value)
    }

    /// First whitespace-delimited token of the description, if any.
    pub fn first_description_token(&self) -> Option<&str> {
        self.description.split_whitespace().next()
    }
}

/// Typed intermediate representation of one invoice document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    pub header: InvoiceHeader,
    pub supplier: SupplierRef,
    /// Line items in document order.
    pub lines: Vec<InvoiceLine>,
}

impl ParsedInvoice {
    /// Sum of the declared line totals; `None` on overflow.
    pub fn lines_total(&self) -> Option<Decimal> {
        self.lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.total_value))
    }
}
