//! Invoice line to catalog product reconciliation.
//!
//! Matching is delegated to a [`MatchStrategy`] so the orchestration here stays
//! the same when the matching rule changes. The default rule is an exact code
//! match followed by a first-token description heuristic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tirestock_core::ProductId;
use tirestock_invoicing::{InvoiceHeader, InvoiceLine, ParsedInvoice, SupplierRef};
use tirestock_products::Product;

/// Pluggable rule linking one invoice line to a catalog product.
///
/// Implementations must be deterministic and must not assume anything about
/// the catalog beyond its iteration order.
pub trait MatchStrategy: Send + Sync {
    fn find_match(&self, line: &InvoiceLine, catalog: &[Product]) -> Option<ProductId>;
}

impl<S> MatchStrategy for Box<S>
where
    S: MatchStrategy + ?Sized,
{
    fn find_match(&self, line: &InvoiceLine, catalog: &[Product]) -> Option<ProductId> {
        (**self).find_match(line, catalog)
    }
}

/// First catalog entry whose code equals the line code. Empty codes never match.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactCode;

impl MatchStrategy for ExactCode {
    fn find_match(&self, line: &InvoiceLine, catalog: &[Product]) -> Option<ProductId> {
        let code = line.code.trim();
        if code.is_empty() {
            return None;
        }
        catalog.iter().find(|p| p.code.trim() == code).map(|p| p.id)
    }
}

/// First catalog entry whose description contains, case-insensitively, the
/// first whitespace-delimited token of the line description.
///
/// This is a cheap heuristic, not a similarity search: a generic first word
/// ("PNEU", "CAMARA") matches whichever product comes first in the catalog.
/// Expect false positives and review "matched" lines accordingly.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstToken;

impl MatchStrategy for FirstToken {
    fn find_match(&self, line: &InvoiceLine, catalog: &[Product]) -> Option<ProductId> {
        let token = line.first_description_token()?.to_lowercase();
        catalog
            .iter()
            .find(|p| p.description.to_lowercase().contains(&token))
            .map(|p| p.id)
    }
}

/// Default strategy: [`ExactCode`], then [`FirstToken`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeThenFirstToken;

impl MatchStrategy for CodeThenFirstToken {
    fn find_match(&self, line: &InvoiceLine, catalog: &[Product]) -> Option<ProductId> {
        ExactCode
            .find_match(line, catalog)
            .or_else(|| FirstToken.find_match(line, catalog))
    }
}

/// Reconciliation decision for one line. Exactly one of matched/new holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LineMatch {
    Matched { product_id: ProductId },
    New,
}

/// Line total that disagrees with `quantity * unit_value` beyond tolerance.
///
/// `expected` and `difference` are `None` when they overflow a `Decimal`;
/// such a line is always flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalMismatch {
    pub expected: Option<Decimal>,
    pub declared: Decimal,
    pub difference: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledLine {
    pub line: InvoiceLine,
    pub matched: LineMatch,
    /// Flag only; never blocks the import.
    pub total_mismatch: Option<TotalMismatch>,
}

impl ReconciledLine {
    pub fn is_new(&self) -> bool {
        matches!(self.matched, LineMatch::New)
    }

    pub fn matched_product_id(&self) -> Option<ProductId> {
        match self.matched {
            LineMatch::Matched { product_id } => Some(product_id),
            LineMatch::New => None,
        }
    }
}

/// Invoice-level review warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvoiceWarning {
    /// Declared products total differs from the sum of line totals.
    ProductsTotalMismatch { declared: Decimal, lines_total: Decimal },
    /// The line totals do not fit in a `Decimal`, so no sum can be checked.
    LinesTotalOverflow,
    /// The document yielded no line items at all.
    NoLines,
}

/// Parsed invoice annotated with match decisions, awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledInvoice {
    pub header: InvoiceHeader,
    pub supplier: SupplierRef,
    /// Same order as the document.
    pub lines: Vec<ReconciledLine>,
    pub warnings: Vec<InvoiceWarning>,
}

impl ReconciledInvoice {
    /// Lines that need a catalog entry before their stock can be recorded.
    pub fn unresolved(&self) -> impl Iterator<Item = &ReconciledLine> {
        self.lines.iter().filter(|l| l.is_new())
    }

    pub fn matched(&self) -> impl Iterator<Item = &ReconciledLine> {
        self.lines.iter().filter(|l| !l.is_new())
    }
}

/// Applies a [`MatchStrategy`] and the line-total tolerance check.
#[derive(Debug, Clone)]
pub struct Resolver<S = CodeThenFirstToken> {
    strategy: S,
    tolerance: Decimal,
}

impl Resolver<CodeThenFirstToken> {
    pub fn new(tolerance: Decimal) -> Self {
        Self::with_strategy(CodeThenFirstToken, tolerance)
    }
}

impl<S: MatchStrategy> Resolver<S> {
    pub fn with_strategy(strategy: S, tolerance: Decimal) -> Self {
        Self {
            strategy,
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    /// Annotate each line with a match decision. Output order equals input
    /// order; the catalog is never modified.
    pub fn resolve(&self, lines: &[InvoiceLine], catalog: &[Product]) -> Vec<ReconciledLine> {
        lines
            .iter()
            .map(|line| {
                let matched = match self.strategy.find_match(line, catalog) {
                    Some(product_id) => LineMatch::Matched { product_id },
                    None => LineMatch::New,
                };
                tracing::debug!(line_no = line.line_no, code = %line.code, ?matched, "line reconciled");

                let total_mismatch = self.check_total(line);
                if let Some(m) = &total_mismatch {
                    tracing::warn!(
                        line_no = line.line_no,
                        expected = ?m.expected,
                        declared = %m.declared,
                        "line total outside tolerance"
                    );
                }

                ReconciledLine {
                    line: line.clone(),
                    matched,
                    total_mismatch,
                }
            })
            .collect()
    }

    /// Resolve every line of a parsed invoice and collect invoice-level warnings.
    pub fn reconcile(&self, invoice: ParsedInvoice, catalog: &[Product]) -> ReconciledInvoice {
        let lines = self.resolve(&invoice.lines, catalog);

        let mut warnings = Vec::new();
        if lines.is_empty() {
            warnings.push(InvoiceWarning::NoLines);
        }
        match (invoice.lines_total(), invoice.header.declared_products_total) {
            (None, _) => {
                tracing::warn!(invoice_key = %invoice.header.key, "line totals overflow");
                warnings.push(InvoiceWarning::LinesTotalOverflow);
            }
            (Some(lines_total), Some(declared)) if self.exceeds_tolerance(declared, lines_total) => {
                warnings.push(InvoiceWarning::ProductsTotalMismatch {
                    declared,
                    lines_total,
                });
            }
            _ => {}
        }

        ReconciledInvoice {
            header: invoice.header,
            supplier: invoice.supplier,
            lines,
            warnings,
        }
    }

    fn check_total(&self, line: &InvoiceLine) -> Option<TotalMismatch> {
        let expected = line.expected_total();
        let difference = expected.and_then(|e| e.checked_sub(line.total_value).map(|d| d.abs()));
        let within = difference.is_some_and(|d| d <= self.tolerance);
        (!within).then_some(TotalMismatch {
            expected,
            declared: line.total_value,
            difference,
        })
    }

    /// Overflowing differences count as outside tolerance.
    fn exceeds_tolerance(&self, a: Decimal, b: Decimal) -> bool {
        a.checked_sub(b).is_none_or(|d| d.abs() > self.tolerance)
    }
}
