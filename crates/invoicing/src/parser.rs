//! NFe document parser.
//!
//! Elements are matched by local name along structural paths, so documents
//! with a default namespace, a prefixed namespace or no namespace at all parse
//! the same way. The `nfeProc` wrapper is optional.

use core::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};
use roxmltree::{Document, Node};
use rust_decimal::Decimal;

use crate::document::{InvoiceHeader, InvoiceLine, LineField, ParsedInvoice, SupplierRef};
use crate::error::ParseError;
use crate::key::InvoiceKey;

/// Literal prefix of the `infNFe/@Id` attribute.
pub const KEY_PREFIX: &str = "NFe";

const HEADER_NODE: &str = "infNFe";

/// Parse raw invoice bytes into a [`ParsedInvoice`].
///
/// Pure function of its input. Fails only when the bytes are not a
/// recognizable invoice (not UTF-8, not XML, no `infNFe` node, or no valid
/// access key). Line-level defects degrade to zero/empty values.
pub fn parse(raw: &[u8]) -> Result<ParsedInvoice, ParseError> {
    let text = core::str::from_utf8(raw)
        .map_err(|e| ParseError::malformed(format!("document is not valid UTF-8: {e}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let doc = Document::parse(text)
        .map_err(|e| ParseError::malformed(format!("document is not well-formed XML: {e}")))?;

    let inf = doc
        .descendants()
        .find(|n| is_element(n, HEADER_NODE))
        .ok_or_else(|| ParseError::malformed(format!("no {HEADER_NODE} header node")))?;

    let header = parse_header(inf)?;
    let supplier = parse_supplier(inf);

    let mut lines = Vec::new();
    for (position, det) in children(inf, "det").enumerate() {
        let Some(prod) = child(det, "prod") else {
            tracing::warn!(position = position + 1, "skipping det without prod node");
            continue;
        };
        lines.push(parse_line(det, prod, position));
    }

    tracing::debug!(
        invoice_key = %header.key,
        line_count = lines.len(),
        "parsed invoice document"
    );

    Ok(ParsedInvoice {
        header,
        supplier,
        lines,
    })
}

fn parse_header(inf: Node<'_, '_>) -> Result<InvoiceHeader, ParseError> {
    let raw_id = inf
        .attribute("Id")
        .ok_or_else(|| ParseError::malformed(format!("{HEADER_NODE} has no Id attribute")))?;
    let digits = raw_id.trim().strip_prefix(KEY_PREFIX).unwrap_or(raw_id.trim());
    let key = InvoiceKey::parse(digits)
        .map_err(|e| ParseError::malformed(format!("invalid invoice key: {e}")))?;

    let ide = child(inf, "ide");
    let issued_at = ide.and_then(|ide| {
        text_of(ide, "dhEmi")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .or_else(|| text_of(ide, "dEmi").and_then(|s| parse_date_only(&s)))
    });

    Ok(InvoiceHeader {
        key,
        number: ide.and_then(|ide| text_of(ide, "nNF")),
        series: ide.and_then(|ide| text_of(ide, "serie")),
        issued_at,
        declared_total: text_at(inf, &["total", "ICMSTot", "vNF"]).and_then(|s| parse_decimal(&s)),
        declared_products_total: text_at(inf, &["total", "ICMSTot", "vProd"])
            .and_then(|s| parse_decimal(&s)),
    })
}

fn parse_supplier(inf: Node<'_, '_>) -> SupplierRef {
    let Some(emit) = child(inf, "emit") else {
        return SupplierRef::default();
    };

    SupplierRef {
        tax_id: text_of(emit, "CNPJ").or_else(|| text_of(emit, "CPF")),
        legal_name: text_of(emit, "xNome"),
        trade_name: text_of(emit, "xFant"),
    }
}

fn parse_line(det: Node<'_, '_>, prod: Node<'_, '_>, position: usize) -> InvoiceLine {
    let mut defaulted = Vec::new();

    let line_no = det
        .attribute("nItem")
        .and_then(|n| n.trim().parse::<u32>().ok())
        .unwrap_or_else(|| fallback_line_no(position));

    let mut text_field = |name: &str, field: LineField| {
        text_of(prod, name).unwrap_or_else(|| {
            defaulted.push(field);
            String::new()
        })
    };
    let code = text_field("cProd", LineField::Code);
    let description = text_field("xProd", LineField::Description);

    let mut decimal_field = |name: &str, field: LineField| {
        text_of(prod, name)
            .and_then(|s| parse_decimal(&s))
            .unwrap_or_else(|| {
                defaulted.push(field);
                Decimal::ZERO
            })
    };
    let quantity = decimal_field("qCom", LineField::Quantity);
    let unit_value = decimal_field("vUnCom", LineField::UnitValue);
    let total_value = decimal_field("vProd", LineField::TotalValue);

    if !defaulted.is_empty() {
        tracing::warn!(line_no, ?defaulted, "invoice line has missing or unparseable fields");
    }

    InvoiceLine {
        line_no,
        code,
        description,
        tax_code: text_of(prod, "NCM"),
        operation_code: text_of(prod, "CFOP"),
        unit: text_of(prod, "uCom"),
        quantity,
        unit_value,
        total_value,
        defaulted,
    }
}

/// One-based document position, saturating at `u32::MAX`.
fn fallback_line_no(position: usize) -> u32 {
    position
        .checked_add(1)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(u32::MAX)
}

fn is_element(node: &Node<'_, '_>, local_name: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_name
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    local_name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| is_element(n, local_name))
}

fn child<'a, 'input: 'a>(node: Node<'a, 'input>, local_name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_element(n, local_name))
}

/// Trimmed, non-empty text of a direct child element.
fn text_of(node: Node<'_, '_>, local_name: &str) -> Option<String> {
    child(node, local_name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Trimmed, non-empty text at a structural path below `node`.
fn text_at(node: Node<'_, '_>, path: &[&str]) -> Option<String> {
    let (last, parents) = path.split_last()?;
    let mut current = node;
    for name in parents {
        current = child(current, name)?;
    }
    text_of(current, last)
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .ok()
        .or_else(|| Decimal::from_str(&raw.replace(',', ".")).ok())
}

fn parse_date_only(raw: &str) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let utc = FixedOffset::east_opt(0)?;
    date.and_hms_opt(0, 0, 0)?.and_local_timezone(utc).single()
}
