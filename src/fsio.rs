//! Crash-safe writes and bounded-retry reads.
//!
//! The game may rewrite or briefly lock its files at any moment, so every read retries and
//! no file is ever held open across calls.

use crate::error::{DcError, Result};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::Path,
    thread,
    time::Duration,
};
use tracing::{debug, warn};

/// Retry policy for a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Interactive operations and watcher start-up.
    pub const PATIENT: RetryPolicy = RetryPolicy {
        attempts: 5,
        delay: Duration::from_millis(200),
    };

    /// Watcher ticks; the next tick is only 300 ms away anyway.
    pub const QUICK: RetryPolicy = RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(100),
    };
}

/// Write `bytes` to `path` so that readers see either the old content or all of `bytes`.
///
/// Writes a uniquely named temp file next to `path`, flushes it, then renames it over the
/// target. The temp file is removed on every error path.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| DcError::persist(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| DcError::persist(dir, e))?;

    tmp.write_all(bytes).map_err(|e| DcError::persist(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| DcError::persist(tmp.path(), e))?;

    // On failure the returned NamedTempFile is dropped, which deletes the temp file.
    tmp.persist(path).map_err(|e| DcError::persist(path, e.error))?;

    debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Read a whole file, retrying transient failures.
///
/// A missing file is reported as [`DcError::NotFound`] straight away; anything else is
/// retried and becomes [`DcError::Locked`] once the budget is spent.
pub fn read_with_retry(path: &Path, policy: RetryPolicy) -> Result<Vec<u8>> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DcError::NotFound(path.display().to_string()));
            }
            Err(e) if attempt >= attempts => {
                warn!(
                    "giving up reading {} after {attempt} attempts: {e}",
                    path.display()
                );
                return Err(DcError::Locked {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                debug!("read of {} failed ({e}), retrying", path.display());
                thread::sleep(policy.delay);
            }
        }
    }
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DcError::persist(path, e)),
    }
}
