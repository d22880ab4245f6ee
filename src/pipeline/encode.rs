//! Document encoding: uploaded bytes → base64 `ImageData` for the model.
//!
//! The MIME type comes from the bytes, not from the client's filename. A
//! phone that saves a PNG as `photo.jpg` still gets sent as `image/png`, and
//! content that is neither an image nor a PDF is refused here before any
//! tokens are spent on it.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Detect the MIME type of an uploaded invoice from its leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Result<&'static str, ExtractError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok("application/pdf");
    }

    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok("image/png"),
        Ok(ImageFormat::Jpeg) => Ok("image/jpeg"),
        Ok(other) => Err(ExtractError::UnsupportedContent {
            detail: format!("{other:?} images are not accepted"),
        }),
        Err(e) => Err(ExtractError::UnsupportedContent {
            detail: e.to_string(),
        }),
    }
}

/// Encode an uploaded invoice as base64 ready for the model API.
///
/// `detail: "high"` keeps small print (tax numbers, unit prices) legible for
/// providers that tile images.
pub fn encode_document(bytes: &[u8]) -> Result<ImageData, ExtractError> {
    let mime = sniff_mime(bytes)?;
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} → {} bytes base64", mime, b64.len());

    Ok(ImageData::new(b64, mime).with_detail("high"))
}
