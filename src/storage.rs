//! Picking the storage folder the game writes its saves into.

use crate::error::{DcError, Result};
use crate::statics;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sub-folder name the game uses under its install or data directory.
pub const STORAGE_SUBDIR: &str = "storage";

/// `dir` is usable when it is a directory holding the main save.
pub fn validate_storage_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(DcError::NotFound(dir.display().to_string()));
    }
    let main = dir.join(statics::FILE_MAIN_SAVE);
    if !main.is_file() {
        return Err(DcError::NotFound(main.display().to_string()));
    }
    Ok(dir.to_path_buf())
}

/// First candidate, or its `storage` sub-folder, that validates.
pub fn auto_detect_storage<I>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates.into_iter().find_map(|candidate| {
        [candidate.clone(), candidate.join(STORAGE_SUBDIR)]
            .into_iter()
            .find_map(|dir| match validate_storage_dir(&dir) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    debug!("storage candidate rejected: {e}");
                    None
                }
            })
    })
}

/// `$DCSM_STORAGE_DIR` when set, then the working directory.
pub fn default_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::var_os(statics::ENV_STORAGE_DIR).filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(dir));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }
    candidates
}
