//! Import session coordination: parse -> reconcile -> pending -> confirm/cancel.
//!
//! A [`PendingImport`] is per-session state owned by the caller. Nothing
//! reaches the ledger until [`ImportCoordinator::confirm`] is called, and a
//! confirmation either applies every applicable line or none of them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use tirestock_core::{Actor, ImportId, LocationId, ProductId};
use tirestock_inventory::{LedgerError, MovementKind, MovementRequest, StockLedger, StockMovement};
use tirestock_invoicing::{InvoiceKey, InvoiceLine, LineField};
use tirestock_products::CatalogReader;

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::resolver::{
    CodeThenFirstToken, InvoiceWarning, LineMatch, MatchStrategy, ReconciledInvoice,
    ReconciledLine, Resolver,
};

/// Import session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A reconciled invoice held for human review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImport {
    id: ImportId,
    invoice: ReconciledInvoice,
    status: ImportStatus,
    created_at: DateTime<Utc>,
}

impl PendingImport {
    pub fn id(&self) -> ImportId {
        self.id
    }

    pub fn invoice(&self) -> &ReconciledInvoice {
        &self.invoice
    }

    pub fn key(&self) -> &InvoiceKey {
        &self.invoice.header.key
    }

    pub fn status(&self) -> ImportStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ensure_pending(&self) -> Result<(), ImportError> {
        if self.status != ImportStatus::Pending {
            return Err(ImportError::InvalidState {
                status: self.status,
            });
        }
        Ok(())
    }
}

/// What confirmation did with one invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineOutcome {
    Applied { movement: StockMovement },
    /// No catalog product; needs catalog creation before stock can be recorded.
    SkippedNew,
    /// Matched, but no whole positive stock quantity could be derived.
    SkippedInvalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReport {
    pub line_no: u32,
    pub code: String,
    pub product_id: Option<ProductId>,
    pub outcome: LineOutcome,
}

/// Per-line result of a confirmed import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub import_id: ImportId,
    pub invoice_key: InvoiceKey,
    pub location_id: LocationId,
    /// Document order.
    pub lines: Vec<LineReport>,
    pub warnings: Vec<InvoiceWarning>,
}

impl ImportReport {
    /// Movements actually appended, in document order.
    pub fn movements(&self) -> impl Iterator<Item = &StockMovement> {
        self.lines.iter().filter_map(|l| match &l.outcome {
            LineOutcome::Applied { movement } => Some(movement),
            _ => None,
        })
    }

    /// Lines left for the external catalog-creation step.
    pub fn unresolved(&self) -> impl Iterator<Item = &LineReport> {
        self.lines
            .iter()
            .filter(|l| matches!(l.outcome, LineOutcome::SkippedNew))
    }

    pub fn applied_count(&self) -> usize {
        self.movements().count()
    }
}

enum Plan {
    Skip(LineOutcome),
    Append,
}

/// Orchestrates parser, resolver and ledger for invoice imports.
pub struct ImportCoordinator<S = CodeThenFirstToken> {
    catalog: Arc<dyn CatalogReader>,
    ledger: Arc<StockLedger>,
    resolver: Resolver<S>,
}

impl ImportCoordinator<CodeThenFirstToken> {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        ledger: Arc<StockLedger>,
        config: &ImportConfig,
    ) -> Self {
        Self::with_strategy(catalog, ledger, CodeThenFirstToken, config)
    }
}

impl<S: MatchStrategy> ImportCoordinator<S> {
    pub fn with_strategy(
        catalog: Arc<dyn CatalogReader>,
        ledger: Arc<StockLedger>,
        strategy: S,
        config: &ImportConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            resolver: Resolver::with_strategy(strategy, config.line_total_tolerance),
        }
    }

    pub fn ledger(&self) -> &Arc<StockLedger> {
        &self.ledger
    }

    /// Whether the invoice key was already applied to the ledger.
    pub fn is_imported(&self, key: &InvoiceKey) -> bool {
        self.ledger.has_reference(key.as_str())
    }

    /// Parse and reconcile a document. No ledger writes happen here.
    pub fn begin_import(
        &self,
        raw: &[u8],
        created_at: DateTime<Utc>,
    ) -> Result<PendingImport, ImportError> {
        let parsed = tirestock_invoicing::parse(raw)?;
        let catalog = self.catalog.lookup_all();
        let invoice = self.resolver.reconcile(parsed, &catalog);

        let pending = PendingImport {
            id: ImportId::new(),
            invoice,
            status: ImportStatus::Pending,
            created_at,
        };

        tracing::info!(
            import_id = %pending.id,
            invoice_key = %pending.key(),
            lines = pending.invoice.lines.len(),
            unresolved = pending.invoice.unresolved().count(),
            warnings = pending.invoice.warnings.len(),
            already_imported = self.is_imported(pending.key()),
            "invoice import pending review"
        );
        Ok(pending)
    }

    /// Apply every matched line as one `entry` movement per line, atomically.
    ///
    /// On success the import becomes `confirmed`. On any error nothing is
    /// appended and the import stays `pending`.
    pub fn confirm(
        &self,
        pending: &mut PendingImport,
        location_id: LocationId,
        actor: &Actor,
        occurred_at: DateTime<Utc>,
    ) -> Result<ImportReport, ImportError> {
        pending.ensure_pending()?;

        let key = pending.key().clone();
        if self.is_imported(&key) {
            return Err(ImportError::DuplicateInvoice(key));
        }

        let lines = &pending.invoice.lines;
        let mut plans = Vec::with_capacity(lines.len());
        let mut requests = Vec::new();
        let mut request_lines = Vec::new();
        for reconciled in lines {
            let plan = match reconciled.matched {
                LineMatch::New => Plan::Skip(LineOutcome::SkippedNew),
                LineMatch::Matched { product_id } => match stock_delta(&reconciled.line) {
                    Ok(delta) => {
                        requests.push(
                            MovementRequest::new(
                                product_id,
                                location_id,
                                MovementKind::Entry,
                                delta,
                                actor.clone(),
                                occurred_at,
                            )
                            .with_reason(entry_reason(&pending.invoice, reconciled)),
                        );
                        request_lines.push(reconciled.line.line_no);
                        Plan::Append
                    }
                    Err(reason) => {
                        tracing::warn!(
                            invoice_key = %key,
                            line_no = reconciled.line.line_no,
                            %reason,
                            "invoice line skipped"
                        );
                        Plan::Skip(LineOutcome::SkippedInvalid { reason })
                    }
                },
            };
            plans.push(plan);
        }

        let movements = self
            .ledger
            .append_batch(key.as_str(), requests)
            .map_err(|err| match err {
                LedgerError::DuplicateReference(_) => ImportError::DuplicateInvoice(key.clone()),
                LedgerError::BatchRejected { index, source } => ImportError::LineFailed {
                    line_no: request_lines.get(index).copied().unwrap_or_default(),
                    source: *source,
                },
                other => ImportError::Ledger(other),
            })?;

        let mut applied = movements.into_iter();
        let reports: Vec<LineReport> = plans
            .into_iter()
            .zip(lines)
            .map(|(plan, reconciled)| {
                let outcome = match plan {
                    Plan::Skip(outcome) => outcome,
                    Plan::Append => match applied.next() {
                        Some(movement) => LineOutcome::Applied { movement },
                        None => LineOutcome::SkippedInvalid {
                            reason: "ledger returned no movement".to_string(),
                        },
                    },
                };
                LineReport {
                    line_no: reconciled.line.line_no,
                    code: reconciled.line.code.clone(),
                    product_id: reconciled.matched_product_id(),
                    outcome,
                }
            })
            .collect();

        pending.status = ImportStatus::Confirmed;

        let report = ImportReport {
            import_id: pending.id,
            invoice_key: key,
            location_id,
            lines: reports,
            warnings: pending.invoice.warnings.clone(),
        };

        tracing::info!(
            import_id = %report.import_id,
            invoice_key = %report.invoice_key,
            location_id = %location_id,
            actor = %actor.id,
            applied = report.applied_count(),
            unresolved = report.unresolved().count(),
            "invoice import confirmed"
        );
        Ok(report)
    }

    /// Drop a pending import without touching the ledger.
    ///
    /// Cancelling twice is a no-op; a confirmed import cannot be cancelled.
    pub fn cancel(&self, pending: &mut PendingImport) -> Result<(), ImportError> {
        match pending.status {
            ImportStatus::Pending => {
                pending.status = ImportStatus::Cancelled;
                tracing::info!(import_id = %pending.id, invoice_key = %pending.key(), "invoice import cancelled");
                Ok(())
            }
            ImportStatus::Cancelled => Ok(()),
            ImportStatus::Confirmed => Err(ImportError::InvalidState {
                status: ImportStatus::Confirmed,
            }),
        }
    }
}

/// Whole, positive stock units for a line.
fn stock_delta(line: &InvoiceLine) -> Result<i64, String> {
    if line.is_defaulted(LineField::Quantity) {
        return Err("quantity missing or unreadable in document".to_string());
    }
    let quantity: Decimal = line.quantity;
    if quantity <= Decimal::ZERO {
        return Err(format!("quantity must be positive, found {quantity}"));
    }
    if !quantity.fract().is_zero() {
        return Err(format!("fractional quantity {quantity} cannot be stocked"));
    }
    quantity
        .to_i64()
        .ok_or_else(|| format!("quantity {quantity} out of range"))
}

fn entry_reason(invoice: &ReconciledInvoice, line: &ReconciledLine) -> String {
    match &invoice.header.number {
        Some(number) => format!("NF-e {number} item {}", line.line.line_no),
        None => format!("NF-e {} item {}", invoice.header.key, line.line.line_no),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tirestock_core::UserId;

    fn line(quantity: Decimal) -> InvoiceLine {
        InvoiceLine {
            line_no: 3,
            code: "PN001".to_string(),
            description: "PNEU".to_string(),
            tax_code: None,
            operation_code: None,
            unit: None,
            quantity,
            unit_value: Decimal::ONE,
            total_value: quantity,
            defaulted: vec![],
        }
    }

    #[test]
    fn stock_delta_accepts_whole_positive_quantities() {
        assert_eq!(stock_delta(&line(Decimal::new(200000, 4))), Ok(20));
    }

    #[test]
    fn stock_delta_rejects_zero_negative_and_fractional() {
        assert!(stock_delta(&line(Decimal::ZERO)).is_err());
        assert!(stock_delta(&line(Decimal::new(-1, 0))).is_err());
        let err = stock_delta(&line(Decimal::new(25, 1))).unwrap_err();
        assert!(err.contains("fractional"));
    }

    #[test]
    fn stock_delta_reports_defaulted_quantity() {
        let mut l = line(Decimal::ZERO);
        l.defaulted.push(LineField::Quantity);
        assert!(stock_delta(&l).unwrap_err().contains("missing"));
    }

    #[test]
    fn cancel_is_idempotent_but_not_after_confirm() {
        let coordinator = ImportCoordinator::new(
            Arc::new(tirestock_products::InMemoryCatalog::new()),
            Arc::new(StockLedger::default()),
            &ImportConfig::default(),
        );
        let key = InvoiceKey::parse("35240112345678000199550010000012341000012345").unwrap();
        let mut pending = PendingImport {
            id: ImportId::new(),
            invoice: ReconciledInvoice {
                header: tirestock_invoicing::InvoiceHeader {
                    key,
                    number: None,
                    series: None,
                    issued_at: None,
                    declared_total: None,
                    declared_products_total: None,
                },
                supplier: Default::default(),
                lines: vec![],
                warnings: vec![],
            },
            status: ImportStatus::Pending,
            created_at: Utc::now(),
        };

        coordinator.cancel(&mut pending).unwrap();
        coordinator.cancel(&mut pending).unwrap();
        assert_eq!(pending.status(), ImportStatus::Cancelled);

        let actor = Actor::new(UserId::new(), "Gerente");
        let err = coordinator
            .confirm(&mut pending, LocationId::new(), &actor, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            ImportError::InvalidState {
                status: ImportStatus::Cancelled
            }
        );

        pending.status = ImportStatus::Confirmed;
        assert!(matches!(
            coordinator.cancel(&mut pending),
            Err(ImportError::InvalidState { .. })
        ));
    }
}
