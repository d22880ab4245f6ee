//! Output types: the normalised invoice and the per-request result.
//!
//! JSON field names follow the shape the extraction prompt asks the model
//! for (`ITEM_REFERENCE`, `TOTAL`, `invoice_total`, …) so a client sees the
//! same keys whether it reads the prompt or the response. Keys the model adds
//! on its own are carried through in `extra` rather than dropped.

use crate::error::{ExtractError, PARSE_FAILURE_MESSAGE};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Fixed VAT rate, in percent.
pub const VAT_RATE_PERCENT: u32 = 15;

/// One row of the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "ITEM_REFERENCE", default)]
    pub item_reference: Option<String>,

    #[serde(rename = "UNIT_NAME", default)]
    pub unit_name: Option<String>,

    #[serde(rename = "QUANTITY", default)]
    pub quantity: Option<f64>,

    #[serde(rename = "UNIT_PRICE", default)]
    pub unit_price: Option<f64>,

    #[serde(rename = "DISCOUNT", default)]
    pub discount: f64,

    #[serde(rename = "EXCISE_TAX_AMOUNT", default)]
    pub excise_tax_amount: f64,

    /// Line total. `None` when the model omitted it or sent something
    /// that is not a number; such lines count as 0 towards the invoice total.
    #[serde(rename = "TOTAL", default)]
    pub total: Option<f64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A normalised invoice with derived VAT fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    #[serde(default)]
    pub items: Vec<LineItem>,

    /// Total before VAT. Always numeric in a successful extraction.
    pub invoice_total: f64,

    #[serde(default)]
    pub invoice_date: Option<String>,

    #[serde(default)]
    pub invoice_number: Option<String>,

    #[serde(default)]
    pub seller_name: Option<String>,

    #[serde(default)]
    pub seller_tax_number: Option<String>,

    pub vat_rate: u32,

    pub vat_amount: f64,

    pub total_with_vat: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of one extraction request.
///
/// Serialises as `{"success": true, "data": {...}}` or
/// `{"success": false, "error": "...", "raw_text": "..."}` (`raw_text` only
/// when the model answered but the answer could not be parsed).
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Success(InvoiceRecord),
    Failure {
        error: String,
        raw_text: Option<String>,
    },
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    /// The record, if extraction succeeded.
    pub fn record(&self) -> Option<&InvoiceRecord> {
        match self {
            ExtractionResult::Success(record) => Some(record),
            ExtractionResult::Failure { .. } => None,
        }
    }
}

impl From<Result<InvoiceRecord, ExtractError>> for ExtractionResult {
    fn from(result: Result<InvoiceRecord, ExtractError>) -> Self {
        match result {
            Ok(record) => ExtractionResult::Success(record),
            Err(ExtractError::Parse(e)) => ExtractionResult::Failure {
                error: PARSE_FAILURE_MESSAGE.to_string(),
                raw_text: Some(e.raw_text),
            },
            Err(e) => ExtractionResult::Failure {
                error: e.to_string(),
                raw_text: None,
            },
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractionResult::Success(record) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", record)?;
                map.end()
            }
            ExtractionResult::Failure { error, raw_text } => {
                let len = if raw_text.is_some() { 3 } else { 2 };
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
                if let Some(raw) = raw_text {
                    map.serialize_entry("raw_text", raw)?;
                }
                map.end()
            }
        }
    }
}
