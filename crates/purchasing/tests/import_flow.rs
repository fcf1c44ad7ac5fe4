use std::sync::{Arc, Barrier};
use std::thread;

use chrono::Utc;
use rust_decimal::Decimal;

use tirestock_core::{Actor, LocationId, ProductId, UserId};
use tirestock_inventory::{
    LedgerError, MovementFilter, MovementKind, MovementRequest, StockLedger,
};
use tirestock_products::{InMemoryCatalog, Product};
use tirestock_purchasing::{
    ImportConfig, ImportCoordinator, ImportError, ImportStatus, InvoiceWarning, LineOutcome,
};

const KEY: &str = "35240112345678000199550010000012341000012345";
const OTHER_KEY: &str = "35240112345678000199550010000099991000099999";

struct Fixture {
    coordinator: ImportCoordinator,
    ledger: Arc<StockLedger>,
    location: LocationId,
    actor: Actor,
    pirelli: ProductId,
    goodyear: ProductId,
}

fn fixture() -> Fixture {
    tirestock_observability::init();

    let pirelli = ProductId::new();
    let goodyear = ProductId::new();
    let catalog = InMemoryCatalog::with_products([
        Product::new(pirelli, "PN001", "Pneu Pirelli Cinturato 175/70 R13").unwrap(),
        Product::new(goodyear, "GY-185", "Goodyear Direction 185/65 R14").unwrap(),
    ]);
    let config = ImportConfig::default();
    let ledger = Arc::new(StockLedger::new(config.ledger_config()));
    let coordinator = ImportCoordinator::new(Arc::new(catalog), ledger.clone(), &config);

    Fixture {
        coordinator,
        ledger,
        location: LocationId::new(),
        actor: Actor::new(UserId::new(), "Estoquista"),
        pirelli,
        goodyear,
    }
}

fn det(n: u32, code: &str, desc: &str, qty: &str, unit: &str, total: &str) -> String {
    format!(
        "<det nItem=\"{n}\"><prod><cProd>{code}</cProd><xProd>{desc}</xProd>\
         <NCM>40111000</NCM><CFOP>5102</CFOP><uCom>UN</uCom><qCom>{qty}</qCom>\
         <vUnCom>{unit}</vUnCom><vProd>{total}</vProd></prod></det>"
    )
}

fn invoice(key: &str, dets: &[String], products_total: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
  <NFe>
    <infNFe Id="NFe{key}" versao="4.00">
      <ide><serie>1</serie><nNF>1234</nNF><dhEmi>2024-01-15T10:30:00-03:00</dhEmi></ide>
      <emit><CNPJ>12345678000199</CNPJ><xNome>Distribuidora de Pneus LTDA</xNome></emit>
      {}
      <total><ICMSTot><vProd>{products_total}</vProd><vNF>{products_total}</vNF></ICMSTot></total>
    </infNFe>
  </NFe>
</nfeProc>"#,
        dets.join("\n")
    )
    .into_bytes()
}

fn stock(f: &Fixture, product: ProductId, quantity: i64) {
    f.ledger
        .append(MovementRequest::new(
            product,
            f.location,
            MovementKind::Entry,
            quantity,
            f.actor.clone(),
            Utc::now(),
        ))
        .unwrap();
}

#[test]
fn confirmed_invoice_adds_received_quantity_as_entry() {
    let f = fixture();
    stock(&f, f.pirelli, 4);

    let raw = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI 175/70 R13", "20.0000", "250.00", "5000.00")],
        "5000.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    assert_eq!(pending.status(), ImportStatus::Pending);
    assert_eq!(pending.invoice().unresolved().count(), 0);
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 4);

    let report = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();

    let movements: Vec<_> = report.movements().collect();
    assert_eq!(movements.len(), 1);
    let m = movements[0];
    assert_eq!(m.kind, MovementKind::Entry);
    assert_eq!(m.product_id, f.pirelli);
    assert_eq!(m.quantity, 20);
    assert_eq!(m.previous_quantity, 4);
    assert_eq!(m.new_quantity, 24);
    assert_eq!(m.reference.as_deref(), Some(KEY));
    assert_eq!(m.actor, f.actor);
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 24);
    assert_eq!(pending.status(), ImportStatus::Confirmed);
    assert!(f.coordinator.is_imported(pending.key()));
}

#[test]
fn movements_are_queryable_by_invoice_reference() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[
            det(1, "PN001", "PNEU PIRELLI 175/70 R13", "4", "250.00", "1000.00"),
            det(2, "GY-185", "PNEU GOODYEAR 185/65 R14", "2", "300.00", "600.00"),
        ],
        "1600.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    f.coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();

    let by_reference = f.ledger.movements(&MovementFilter::all().reference(KEY));
    assert_eq!(by_reference.len(), 2);
    assert_eq!(f.ledger.current_quantity(f.goodyear, f.location), 2);
}

#[test]
fn same_invoice_cannot_be_confirmed_twice_across_sessions() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI 175/70 R13", "20", "250.00", "5000.00")],
        "5000.00",
    );

    let mut first = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    let mut second = f.coordinator.begin_import(&raw, Utc::now()).unwrap();

    f.coordinator
        .confirm(&mut first, f.location, &f.actor, Utc::now())
        .unwrap();
    let err = f
        .coordinator
        .confirm(&mut second, f.location, &f.actor, Utc::now())
        .unwrap_err();

    match err {
        ImportError::DuplicateInvoice(key) => assert_eq!(key.as_str(), KEY),
        other => panic!("expected DuplicateInvoice, got {other:?}"),
    }
    assert_eq!(second.status(), ImportStatus::Pending);
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 20);
}

#[test]
fn second_confirm_of_same_import_is_invalid_state() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI", "1", "250.00", "250.00")],
        "250.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    f.coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();

    let err = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap_err();
    assert_eq!(
        err,
        ImportError::InvalidState {
            status: ImportStatus::Confirmed
        }
    );
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 1);
}

#[test]
fn cancelled_import_never_touches_the_ledger() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI", "8", "250.00", "2000.00")],
        "2000.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    f.coordinator.cancel(&mut pending).unwrap();

    assert_eq!(pending.status(), ImportStatus::Cancelled);
    assert!(f.ledger.movements(&MovementFilter::all()).is_empty());
    assert!(!f.coordinator.is_imported(pending.key()));

    // A fresh session for the same document can still be confirmed.
    let mut again = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    f.coordinator
        .confirm(&mut again, f.location, &f.actor, Utc::now())
        .unwrap();
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 8);
}

#[test]
fn rounding_within_tolerance_passes_and_larger_gap_is_only_flagged() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[
            det(1, "PN001", "PNEU PIRELLI", "10", "250.00", "2500.00"),
            det(2, "GY-185", "PNEU GOODYEAR", "10", "250.00", "2600.00"),
        ],
        "5100.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();

    let lines = &pending.invoice().lines;
    assert!(lines[0].total_mismatch.is_none());
    let mismatch = lines[1].total_mismatch.expect("line 2 flagged");
    assert_eq!(mismatch.expected, Some(Decimal::new(2500, 0)));
    assert_eq!(mismatch.declared, Decimal::new(260000, 2));

    let report = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();
    assert_eq!(report.applied_count(), 2);
}

#[test]
fn products_total_disagreement_is_reported_as_warning() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI", "2", "250.00", "500.00")],
        "900.00",
    );
    let pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    assert!(pending.invoice().warnings.iter().any(|w| matches!(
        w,
        InvoiceWarning::ProductsTotalMismatch { .. }
    )));
}

#[test]
fn unmatched_lines_are_reported_and_skipped() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[
            det(1, "PN001", "PNEU PIRELLI", "4", "250.00", "1000.00"),
            det(2, "CA-13", "CAMARA DE AR ARO 13", "6", "40.00", "240.00"),
        ],
        "1240.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    let unresolved: Vec<_> = pending.invoice().unresolved().collect();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0].line.code, "CA-13");

    let report = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();
    assert_eq!(report.applied_count(), 1);
    let skipped: Vec<_> = report.unresolved().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].line_no, 2);
    assert!(skipped[0].product_id.is_none());
}

#[test]
fn all_new_invoice_still_counts_as_imported() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[det(1, "CA-13", "CAMARA DE AR ARO 13", "6", "40.00", "240.00")],
        "240.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    let report = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();

    assert_eq!(report.applied_count(), 0);
    assert!(f.coordinator.is_imported(pending.key()));
}

#[test]
fn fractional_quantity_is_skipped_without_aborting() {
    let f = fixture();
    let raw = invoice(
        KEY,
        &[
            det(1, "PN001", "PNEU PIRELLI", "2.5000", "100.00", "250.00"),
            det(2, "GY-185", "PNEU GOODYEAR", "3", "100.00", "300.00"),
        ],
        "550.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    let report = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();

    assert!(matches!(
        report.lines[0].outcome,
        LineOutcome::SkippedInvalid { .. }
    ));
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 0);
    assert_eq!(f.ledger.current_quantity(f.goodyear, f.location), 3);
}

#[test]
fn malformed_details_are_tolerated_and_garbage_is_rejected() {
    let f = fixture();
    let raw = format!(
        r#"<NFe><infNFe Id="NFe{KEY}"><det nItem="1"><imposto/></det>{}</infNFe></NFe>"#,
        det(2, "PN001", "PNEU PIRELLI", "1", "250.00", "250.00")
    );
    let pending = f.coordinator.begin_import(raw.as_bytes(), Utc::now()).unwrap();
    assert_eq!(pending.invoice().lines.len(), 1);

    let err = f
        .coordinator
        .begin_import(b"not xml at all", Utc::now())
        .unwrap_err();
    assert!(matches!(err, ImportError::Parse(_)));
}

#[test]
fn concurrent_confirms_of_one_invoice_apply_exactly_once() {
    let f = Arc::new(fixture());
    let raw = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI", "5", "250.00", "1250.00")],
        "1250.00",
    );
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let f = f.clone();
            let raw = raw.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
                barrier.wait();
                f.coordinator
                    .confirm(&mut pending, f.location, &f.actor, Utc::now())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        match result {
            ImportError::DuplicateInvoice(_) => {}
            other if other.is_retryable() => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 5);
}

#[test]
fn different_invoices_for_same_product_both_apply() {
    let f = fixture();
    let first = invoice(
        KEY,
        &[det(1, "PN001", "PNEU PIRELLI", "3", "250.00", "750.00")],
        "750.00",
    );
    let second = invoice(
        OTHER_KEY,
        &[det(1, "PN001", "PNEU PIRELLI", "7", "250.00", "1750.00")],
        "1750.00",
    );
    for raw in [first, second] {
        let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
        f.coordinator
            .confirm(&mut pending, f.location, &f.actor, Utc::now())
            .unwrap();
    }
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 10);
}

#[test]
fn failing_line_rolls_back_the_whole_confirmation() {
    let f = fixture();
    stock(&f, f.pirelli, 1);
    f.ledger
        .adjust_to(f.goodyear, f.location, -10, f.actor.clone(), None, Utc::now())
        .unwrap();

    let raw = invoice(
        KEY,
        &[
            det(1, "PN001", "PNEU PIRELLI", "3", "250.00", "750.00"),
            det(2, "GY-185", "PNEU GOODYEAR", "5", "300.00", "1500.00"),
        ],
        "2250.00",
    );
    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();
    let err = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap_err();

    match err {
        ImportError::LineFailed {
            line_no: 2,
            source: LedgerError::NegativeStock {
                available: -10,
                requested: 5,
            },
        } => {}
        other => panic!("expected LineFailed on line 2, got {other:?}"),
    }
    assert_eq!(f.ledger.current_quantity(f.pirelli, f.location), 1);
    assert_eq!(f.ledger.current_quantity(f.goodyear, f.location), -10);
    assert_eq!(pending.status(), ImportStatus::Pending);
    assert!(!f.coordinator.is_imported(pending.key()));
    assert!(f.ledger.movements(&MovementFilter::all().reference(KEY)).is_empty());
}

#[test]
fn oversized_amounts_are_flagged_instead_of_failing() {
    let f = fixture();
    let max = Decimal::MAX.to_string();
    let raw = invoice(
        KEY,
        &[
            det(1, "PN001", "PNEU PIRELLI", &max, "2", "1"),
            det(2, "GY-185", "PNEU GOODYEAR", "1", "1", &max),
            det(3, "GY-185", "PNEU GOODYEAR", "1", "1", &max),
        ],
        &max,
    );

    let mut pending = f.coordinator.begin_import(&raw, Utc::now()).unwrap();

    let first = pending.invoice().lines[0].total_mismatch.expect("line 1 flagged");
    assert_eq!(first.expected, None);
    assert!(pending
        .invoice()
        .warnings
        .contains(&InvoiceWarning::LinesTotalOverflow));

    let report = f
        .coordinator
        .confirm(&mut pending, f.location, &f.actor, Utc::now())
        .unwrap();
    assert!(matches!(
        report.lines[0].outcome,
        LineOutcome::SkippedInvalid { .. }
    ));
    assert_eq!(f.ledger.current_quantity(f.goodyear, f.location), 2);
}
