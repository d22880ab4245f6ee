//! The extraction prompt sent alongside every invoice image.
//!
//! Kept in one constant so prompt changes are reviewed in one place and unit
//! tests can pin the contract the normaliser depends on (key names, numeric
//! fields, the mandatory `invoice_total`).

/// Instruction sent with the invoice image.
///
/// The JSON keys here are the keys [`crate::pipeline::normalize`] reads and
/// [`crate::output::LineItem`] emits.
pub const EXTRACTION_PROMPT: &str = r#"استخرج المعلومات التالية من صورة الفاتورة وأرجعها بصيغة JSON
Extract the following information from the invoice image. Return the data as JSON. All numeric values must be numbers, not strings:
{
    "items": [
        {
            "ITEM_REFERENCE": "product number or description",
            "UNIT_NAME": "unit of measure (carton, box, kg)",
            "QUANTITY": "number of units (digits only, e.g. if the count is ٢ write 2)",
            "UNIT_PRICE": "unit price (number only)",
            "DISCOUNT": "discount amount (number only, write 0 if none)",
            "EXCISE_TAX_AMOUNT": "excise tax amount (number only, write 0 if none)",
            "TOTAL": "line total for the product (number only)"
        }
    ],
    "invoice_total": "invoice total before VAT (number only, a value is required)",
    "invoice_date": "invoice date",
    "invoice_number": "invoice number",
    "seller_name": "seller name",
    "seller_tax_number": "seller VAT registration number"
}

Important notes:
- The invoice is usually written in Arabic; keep names and descriptions in their original language
- Convert all Arabic-Indic digits (٠١٢٣٤٥٦٧٨٩) to English digits (0123456789)
- All numeric values must be numbers, not strings
- QUANTITY must always be an integer
- Include every product that appears on the invoice
- Make sure the JSON is well formed
- invoice_total must always contain a numeric value"#;
