//! Response normalisation: free-text model reply → [`InvoiceRecord`].
//!
//! Vision models are told to answer with bare JSON, and mostly do, but they
//! also wrap it in ```` ```json ```` fences, prepend a sentence of prose, send
//! numbers as strings, or leave `invoice_total` empty. This module absorbs
//! those quirks behind one function, [`normalize_response`], so the
//! heuristic can be hardened or replaced (e.g. by a structured-output mode)
//! without touching callers.
//!
//! ## Steps
//!
//! 1. Slice from the first `{` to the last `}` (whole text if there is no
//!    such pair).
//! 2. Parse the slice as JSON; failures are reported with the raw reply,
//!    never guessed around.
//! 3. Coerce `invoice_total`; when it is missing, falsy or not a number it
//!    is replaced by the sum of the line `TOTAL`s.
//! 4. Derive VAT at the fixed 15 % rate, rounded to 2 decimals.

use crate::error::ParseError;
use crate::output::{InvoiceRecord, LineItem, VAT_RATE_PERCENT};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const VAT_FRACTION: f64 = 0.15;

/// Keys this module computes itself; model-supplied values are discarded.
const DERIVED_KEYS: [&str; 3] = ["vat_rate", "vat_amount", "total_with_vat"];

/// Turn a raw model reply into a normalised invoice.
pub fn normalize_response(raw: &str) -> Result<InvoiceRecord, ParseError> {
    let slice = extract_json_slice(raw);

    let value: Value =
        serde_json::from_str(slice).map_err(|e| ParseError::new(e.to_string(), raw))?;

    let mut obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(ParseError::new(
                format!("expected a JSON object, got {}", json_kind(&other)),
                raw,
            ))
        }
    };

    let items = take_items(&mut obj);
    let items_sum: f64 = items.iter().filter_map(|item| item.total).sum();

    let declared = obj.remove("invoice_total");
    let invoice_total = match declared.as_ref().filter(|v| is_truthy(v)).and_then(coerce_number) {
        Some(total) => total,
        None => {
            debug!(
                "invoice_total {:?} unusable, using sum of {} line totals = {}",
                declared,
                items.len(),
                items_sum
            );
            items_sum
        }
    };

    let (vat_amount, total_with_vat) = vat_breakdown(invoice_total);
    if ![items_sum, invoice_total, vat_amount, total_with_vat]
        .iter()
        .all(|x| x.is_finite())
    {
        return Err(ParseError::new(
            format!("amounts out of range (invoice_total = {invoice_total})"),
            raw,
        ));
    }

    let invoice_date = take_text(&mut obj, "invoice_date");
    let invoice_number = take_text(&mut obj, "invoice_number");
    let seller_name = take_text(&mut obj, "seller_name");
    let seller_tax_number = take_text(&mut obj, "seller_tax_number");
    for key in DERIVED_KEYS {
        obj.remove(key);
    }

    Ok(InvoiceRecord {
        items,
        invoice_total,
        invoice_date,
        invoice_number,
        seller_name,
        seller_tax_number,
        vat_rate: VAT_RATE_PERCENT,
        vat_amount,
        total_with_vat,
        extra: obj,
    })
}

/// The text between the first `{` and the last `}` inclusive, or all of
/// `text` when no such ordered pair exists.
pub fn extract_json_slice(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// `(vat_amount, total_with_vat)` for a pre-VAT total, both rounded to cents.
pub fn vat_breakdown(invoice_total: f64) -> (f64, f64) {
    let vat_amount = round2(invoice_total * VAT_FRACTION);
    let total_with_vat = round2(invoice_total + vat_amount);
    (vat_amount, total_with_vat)
}

/// Round to 2 decimals from the exact binary value, as decimal formatting
/// does; scaling by 100 first would add its own rounding error.
fn round2(x: f64) -> f64 {
    format!("{x:.2}").parse().unwrap_or(x)
}

// ── Numeric coercion ─────────────────────────────────────────────────────────

static RE_GROUPED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").unwrap());

/// Best-effort conversion of a JSON value to a finite `f64`.
///
/// Numbers pass through. Strings are trimmed, Arabic-Indic digits and
/// separators are mapped to ASCII, and `1,234.50` style grouping is removed.
/// Everything else (null, bool, arrays, objects) is not a number.
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number_text(s),
        _ => None,
    }
}

fn parse_number_text(s: &str) -> Option<f64> {
    let ascii: String = s.trim().chars().map(ascii_digit).collect();
    let plain = if RE_GROUPED_NUMBER.is_match(&ascii) {
        ascii.replace(',', "")
    } else {
        ascii
    };
    plain.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn ascii_digit(c: char) -> char {
    match c {
        '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
        '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
        '\u{066B}' => '.',
        '\u{066C}' => ',',
        other => other,
    }
}

/// JSON truthiness: null, false, 0, "", [] and {} are all "missing".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Field extraction ─────────────────────────────────────────────────────────

fn take_items(obj: &mut Map<String, Value>) -> Vec<LineItem> {
    match obj.remove("items") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(fields) => Some(line_item(fields)),
                other => {
                    warn!("Skipping line item that is {}", json_kind(&other));
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring items field that is {}", json_kind(&other));
            Vec::new()
        }
    }
}

fn line_item(mut fields: Map<String, Value>) -> LineItem {
    LineItem {
        item_reference: take_text(&mut fields, "ITEM_REFERENCE"),
        unit_name: take_text(&mut fields, "UNIT_NAME"),
        quantity: take_number(&mut fields, "QUANTITY"),
        unit_price: take_number(&mut fields, "UNIT_PRICE"),
        discount: take_number(&mut fields, "DISCOUNT").unwrap_or(0.0),
        excise_tax_amount: take_number(&mut fields, "EXCISE_TAX_AMOUNT").unwrap_or(0.0),
        total: take_number(&mut fields, "TOTAL"),
        extra: fields,
    }
}

fn take_number(obj: &mut Map<String, Value>, key: &str) -> Option<f64> {
    obj.remove(key).as_ref().and_then(coerce_number)
}

/// Strings pass through; numbers are rendered (invoice numbers often come
/// back as JSON numbers). Anything else is dropped.
fn take_text(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    match obj.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
