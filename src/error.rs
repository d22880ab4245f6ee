//! Error types for the invoice-vision library.
//!
//! Two layers of failure exist:
//!
//! * [`ExtractError`] — anything that stops a single extraction: the model
//!   call failed or timed out, the upload is not a readable image, or the
//!   reply could not be parsed. The extraction layer folds these into
//!   [`crate::output::ExtractionResult::Failure`] so the HTTP layer still
//!   answers 200 with a diagnosable body.
//!
//! * [`ParseError`] — the narrow failure of the response normaliser. It
//!   keeps the raw model text so a caller can inspect or retry by hand.
//!
//! Transport-level failures (bad multipart, I/O while saving) live in
//! [`crate::server::ApiError`] and map to 4xx/5xx status codes.

use thiserror::Error;

/// Message reported to clients when the model reply is not parseable JSON.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse extracted data";

/// All errors that can abort an invoice extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The model API returned an error. Not retried.
    #[error("{message}")]
    ModelApi { message: String },

    /// The model call did not answer within the configured bound.
    #[error("Model call timed out after {elapsed_ms}ms")]
    ModelTimeout { elapsed_ms: u64 },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The uploaded bytes are not a PNG, JPEG or PDF document.
    #[error("Cannot identify document content: {detail}")]
    UnsupportedContent { detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The model reply could not be turned into an invoice record.
    #[error(transparent)]
    Parse(#[from] ParseError),

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The model reply did not contain a decodable JSON object.
#[derive(Debug, Clone, Error)]
#[error("Failed to parse extracted data: {reason}")]
pub struct ParseError {
    /// Why decoding failed (serde_json message or shape complaint).
    pub reason: String,
    /// The full, unsliced model reply.
    pub raw_text: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raw_text: raw_text.into(),
        }
    }
}
