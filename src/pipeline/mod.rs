//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one step, so every step can be tested
//! on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ encode ──▶ model ──▶ normalize ──▶ cleanup
//! (filename)  (sniff+b64)  (VLM)    (JSON+VAT)   (delete upload)
//! ```
//!
//! 1. [`validate`]  — extension allow-list and the upload size ceiling
//! 2. [`encode`]    — detect PNG/JPEG/PDF from the bytes and base64-wrap
//! 3. [`model`]     — one bounded call to the vision model; the only stage
//!    with network I/O
//! 4. [`normalize`] — pull the JSON object out of the reply, repair the
//!    total, derive VAT
//! 5. [`cleanup`]   — retrying delete of the temporary upload

pub mod cleanup;
pub mod encode;
pub mod model;
pub mod normalize;
pub mod validate;
