//! # invoice-vision
//!
//! Extract structured data from photographed or scanned invoices using a
//! Vision Language Model, and serve it over HTTP.
//!
//! The model does the reading; this crate does everything around it: it
//! gatekeeps uploads, sends the image with a fixed extraction prompt, pulls
//! a JSON object out of the free-text reply, repairs a missing or garbled
//! invoice total from the line items, and adds VAT at the fixed 15 % rate.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /upload (multipart "file")
//!  │
//!  ├─ 1. Validate  extension ∈ {png, jpg, jpeg, pdf}, body ≤ 16 MiB
//!  ├─ 2. Save      uniquely named file in the upload directory
//!  ├─ 3. Encode    sniff PNG/JPEG/PDF → base64 ImageData
//!  ├─ 4. VLM       one bounded call to gemini / openai / anthropic / …
//!  ├─ 5. Normalize JSON slice → InvoiceRecord (+ vat_amount, total_with_vat)
//!  └─ 6. Cleanup   retrying delete of the upload; response unaffected
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_vision::{serve, AppState, LlmInvoiceModel, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ServiceConfig::builder().port(8080).build()?;
//!     let model = Arc::new(LlmInvoiceModel::from_config(&config)?);
//!     serve(AppState::new(config, model).await?).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-server` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::{ExtractError, ParseError};
pub use extract::{extract_invoice, extract_invoice_bytes};
pub use output::{ExtractionResult, InvoiceRecord, LineItem};
pub use pipeline::model::{InvoiceModel, LlmInvoiceModel};
pub use pipeline::normalize::normalize_response;
pub use pipeline::validate::allowed_file;
pub use server::{router, serve, ApiError, AppState};
