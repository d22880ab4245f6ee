//! Upload gatekeeping: accept only the document types the model can read.
//!
//! This is a pure filename check. The body-size ceiling is enforced earlier
//! by the HTTP layer, and the actual content is sniffed later in
//! [`super::encode`], so a `.jpg` that is really a text file still fails,
//! just as an extraction failure rather than a 400.

/// Extensions accepted for upload (compared lower-case).
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "pdf"];

/// Default request body ceiling: 16 MiB.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Lower-cased text after the last `.`, or `None` when there is no dot.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Whether `filename` carries one of the [`ALLOWED_EXTENSIONS`].
pub fn allowed_file(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}
