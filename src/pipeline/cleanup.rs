//! Upload cleanup: delete temporary files, tolerating transient locks.
//!
//! On some platforms a file that was just closed stays locked for a moment
//! (antivirus scanners, indexers, a lingering handle). Deletion is therefore
//! retried a bounded number of times with a fixed pause. A file that still
//! cannot be removed is logged and left for [`sweep_stale_uploads`] on the
//! next start; cleanup never changes the HTTP response.

use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Name prefix of every upload written by the service.
pub const UPLOAD_PREFIX: &str = "invoice-";

/// Delete `path`, trying up to `attempts` times with `delay` between tries.
///
/// A path that no longer exists counts as deleted. Returns whether the file
/// is gone.
pub async fn remove_with_retry(path: &Path, attempts: u32, delay: Duration) -> bool {
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        match try_remove(path).await {
            Ok(()) => {
                debug!("Removed {} (attempt {})", path.display(), attempt);
                return true;
            }
            Err(e) if attempt == attempts => {
                error!(
                    "Failed to delete {} after {} attempts: {}",
                    path.display(),
                    attempts,
                    e
                );
            }
            Err(e) => {
                warn!(
                    "Delete of {} failed (attempt {}/{}): {}; retrying in {:?}",
                    path.display(),
                    attempt,
                    attempts,
                    e,
                    delay
                );
                sleep(delay).await;
            }
        }
    }

    false
}

/// One delete attempt: open read-only, close, remove.
///
/// The open/close probe surfaces a lingering lock as an error on this
/// attempt rather than a half-deleted file.
async fn try_remove(path: &Path) -> io::Result<()> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    drop(tokio::fs::File::open(path).await?);
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove upload files left in `dir` by an earlier process.
///
/// Only regular files whose name starts with [`UPLOAD_PREFIX`] are touched.
/// Returns the number of files removed; a missing `dir` removes nothing.
pub async fn sweep_stale_uploads(dir: &Path) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let is_upload = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(UPLOAD_PREFIX))
            .unwrap_or(false);
        if !is_upload || !entry.file_type().await?.is_file() {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                warn!("Removed stale upload {}", entry.path().display());
                removed += 1;
            }
            Err(e) => warn!("Could not remove stale upload {}: {}", entry.path().display(), e),
        }
    }

    if removed > 0 {
        info!("Swept {} stale upload(s) from {}", removed, dir.display());
    }
    Ok(removed)
}
