//! Extraction entry points: document in, [`ExtractionResult`] out.
//!
//! These functions never return `Err`. Every failure inside the pipeline
//! (unreadable upload, model error, timeout, unparseable reply) is folded
//! into [`ExtractionResult::Failure`] so the HTTP layer can answer 200 with
//! a body the client can diagnose.

use crate::error::ExtractError;
use crate::output::{ExtractionResult, InvoiceRecord};
use crate::pipeline::model::{call_model, InvoiceModel};
use crate::pipeline::{encode, normalize};
use crate::prompts::EXTRACTION_PROMPT;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Extract invoice data from a file on disk.
///
/// # Example
///
/// ```rust,no_run
/// use invoice_vision::{extract_invoice, LlmInvoiceModel, ServiceConfig};
/// use std::path::Path;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServiceConfig::default();
/// let model = LlmInvoiceModel::from_config(&config)?;
/// let result = extract_invoice(&model, Path::new("scan.jpg"), config.model_timeout()).await;
/// println!("{}", serde_json::to_string_pretty(&result)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract_invoice(
    model: &dyn InvoiceModel,
    path: &Path,
    timeout: Duration,
) -> ExtractionResult {
    info!("Processing invoice: {}", path.display());
    let result = match tokio::fs::read(path).await {
        Ok(bytes) => run(model, &bytes, timeout).await,
        Err(e) => Err(ExtractError::Io(e)),
    };
    finish(result)
}

/// Extract invoice data from in-memory document bytes.
pub async fn extract_invoice_bytes(
    model: &dyn InvoiceModel,
    bytes: &[u8],
    timeout: Duration,
) -> ExtractionResult {
    finish(run(model, bytes, timeout).await)
}

async fn run(
    model: &dyn InvoiceModel,
    bytes: &[u8],
    timeout: Duration,
) -> Result<InvoiceRecord, ExtractError> {
    let start = Instant::now();
    let image = encode::encode_document(bytes)?;
    let reply = call_model(model, EXTRACTION_PROMPT, image, timeout).await?;
    let record = normalize::normalize_response(&reply)?;
    info!(
        "Extracted {} line item(s), total {:.2} (+VAT {:.2}) in {:?}",
        record.items.len(),
        record.invoice_total,
        record.vat_amount,
        start.elapsed()
    );
    Ok(record)
}

fn finish(result: Result<InvoiceRecord, ExtractError>) -> ExtractionResult {
    if let Err(ref e) = result {
        error!("Invoice extraction failed: {}", e);
    }
    result.into()
}
