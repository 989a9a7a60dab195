//! Compressed snapshots of the storage folder, kept in a sibling `dcsm_backups` directory.

use crate::error::{DcError, Result};
use crate::{fsio, statics};
use chrono::{Local, NaiveDateTime};
use flate2::{Compression, write::DeflateEncoder};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

/// Compression ratio assumed when no sample could be measured.
pub const FALLBACK_RATIO: f64 = 0.7;
pub const DEFLATE_LEVEL: u32 = 7;
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// The archive carries a readable marker.
    pub has_info: bool,
    pub timestamp: Option<NaiveDateTime>,
    pub provenance: Option<String>,
    pub version: Option<String>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBackup {
    pub file_name: String,
    pub size: u64,
    pub absolute_path: PathBuf,
}

/// `<parent of save_dir>/dcsm_backups`.
pub fn backup_dir_for(save_dir: &Path) -> PathBuf {
    save_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(statics::BACKUP_DIR_NAME)
}

/// Files that go into a backup, sorted by path. The watcher's shadow copy is left out.
fn collect_files(save_dir: &Path) -> Result<Vec<PathBuf>> {
    if !save_dir.is_dir() {
        return Err(DcError::NotFound(save_dir.display().to_string()));
    }
    let files = WalkDir::new(save_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name() != statics::FILE_SHADOW)
        .map(|entry| entry.into_path())
        .collect();
    Ok(files)
}

/// Projected archive size: the raw total scaled by the deflate ratio of the first tenth of
/// the files.
pub fn estimate(save_dir: &Path) -> Result<u64> {
    Ok(estimate_files(&collect_files(save_dir)?))
}

fn estimate_files(files: &[PathBuf]) -> u64 {
    let sizes: Vec<u64> = files
        .iter()
        .map(|p| fs::metadata(p).map(|m| m.len()).unwrap_or(0))
        .collect();
    let total: u64 = sizes.iter().sum();
    if total == 0 {
        return 0;
    }

    let sample = (files.len() / 10).max(1);
    let ratio = sample_ratio(&files[..sample]).unwrap_or(FALLBACK_RATIO);
    debug!("backup estimate: {total} raw bytes, ratio {ratio:.3}");
    (total as f64 * ratio).round() as u64
}

fn sample_ratio(files: &[PathBuf]) -> Option<f64> {
    let mut raw = 0u64;
    let mut packed = 0u64;
    for path in files {
        let bytes = fs::read(path).ok()?;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(DEFLATE_LEVEL));
        encoder.write_all(&bytes).ok()?;
        packed += encoder.finish().ok()?.len() as u64;
        raw += bytes.len() as u64;
    }
    (raw > 0).then(|| packed as f64 / raw as f64)
}

fn marker_text(when: NaiveDateTime) -> String {
    format!(
        "{}\n{}\n{}{}\n",
        when.format(statics::FMT_BACKUP_MARKER),
        statics::PROJECT_URL,
        statics::BACKUP_MARKER_VERSION_PREFIX,
        statics::APP_VERSION
    )
}

/// Back up `save_dir` now.
pub fn create(save_dir: &Path, progress: impl FnMut(usize, usize)) -> Result<CreatedBackup> {
    create_at(save_dir, Local::now().naive_local(), progress)
}

/// Back up `save_dir`, stamping the archive name and marker with `when`.
///
/// `progress(done, total)` is called once per archive entry, the marker included. Files
/// that cannot be read are skipped. If writing the archive itself fails, the partial file is
/// left in place for inspection.
pub fn create_at(
    save_dir: &Path,
    when: NaiveDateTime,
    mut progress: impl FnMut(usize, usize),
) -> Result<CreatedBackup> {
    let files = collect_files(save_dir)?;
    let backup_dir = backup_dir_for(save_dir);
    fs::create_dir_all(&backup_dir).map_err(|e| DcError::persist(&backup_dir, e))?;

    let file_name = format!(
        "{}{}.{}",
        statics::BACKUP_FILE_PREFIX,
        when.format(statics::FMT_BACKUP_NAME),
        statics::BACKUP_EXT
    );
    let target = backup_dir.join(&file_name);
    let file = File::create_new(&target).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => {
            DcError::Conflict(format!("backup {file_name} already exists"))
        }
        _ => DcError::persist(&target, e),
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i64::from(DEFLATE_LEVEL)));
    let total = files.len() + 1;

    zip.start_file(statics::BACKUP_MARKER, options)
        .map_err(|e| DcError::archive(&target, e))?;
    zip.write_all(marker_text(when).as_bytes())
        .map_err(|e| DcError::archive(&target, e))?;
    progress(1, total);

    for (i, path) in files.iter().enumerate() {
        let Ok(relative) = path.strip_prefix(save_dir) else {
            continue;
        };
        let entry_name = relative.to_string_lossy().replace('\\', "/");
        match fs::read(path) {
            Ok(bytes) => {
                zip.start_file(entry_name, options)
                    .map_err(|e| DcError::archive(&target, e))?;
                zip.write_all(&bytes).map_err(|e| DcError::archive(&target, e))?;
            }
            Err(e) => warn!("skipping {} in backup: {e}", path.display()),
        }
        progress(i + 2, total);
    }

    zip.finish().map_err(|e| DcError::archive(&target, e))?;

    let size = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
    let absolute_path = fs::canonicalize(&target).unwrap_or_else(|_| target.clone());
    info!("created backup {} ({size} bytes)", absolute_path.display());
    Ok(CreatedBackup {
        file_name,
        size,
        absolute_path,
    })
}

/// Every `*.zip` in `backup_dir`: archives with a marker newest first, then the rest by name
/// descending. A missing directory lists as empty.
pub fn list(backup_dir: &Path) -> Result<Vec<BackupEntry>> {
    let read_dir = match fs::read_dir(backup_dir) {
        Ok(r) => r,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DcError::archive(backup_dir, e)),
    };

    let mut entries: Vec<BackupEntry> = read_dir
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_zip_extension(p))
        .map(|p| read_entry(&p))
        .collect();

    entries.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| b.file_name.cmp(&a.file_name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.file_name.cmp(&a.file_name),
    });
    Ok(entries)
}

fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(statics::BACKUP_EXT))
}

fn read_entry(path: &Path) -> BackupEntry {
    let mut entry = BackupEntry {
        path: path.to_path_buf(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        has_info: false,
        timestamp: None,
        provenance: None,
        version: None,
        size: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
    };

    let marker = match read_marker(path) {
        Ok(Some(text)) => text,
        Ok(None) => return entry,
        Err(e) => {
            debug!("{} unreadable as archive: {e}", path.display());
            return entry;
        }
    };

    let mut lines = marker.lines().map(str::trim);
    entry.timestamp = lines
        .next()
        .and_then(|l| NaiveDateTime::parse_from_str(l, statics::FMT_BACKUP_MARKER).ok());
    entry.has_info = entry.timestamp.is_some();
    entry.provenance = lines.next().filter(|l| !l.is_empty()).map(str::to_string);
    entry.version = lines
        .next()
        .and_then(|l| l.strip_prefix(statics::BACKUP_MARKER_VERSION_PREFIX))
        .map(str::to_string);
    entry
}

fn open_archive(zip_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(zip_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DcError::NotFound(zip_path.display().to_string()),
        _ => DcError::archive(zip_path, e),
    })?;
    ZipArchive::new(file).map_err(|e| DcError::archive(zip_path, e))
}

fn read_marker(zip_path: &Path) -> Result<Option<String>> {
    let mut archive = open_archive(zip_path)?;
    let mut marker = match archive.by_name(statics::BACKUP_MARKER) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(DcError::archive(zip_path, e)),
    };
    let mut text = String::new();
    marker
        .read_to_string(&mut text)
        .map_err(|e| DcError::archive(zip_path, e))?;
    Ok(Some(text))
}

/// Replace the contents of `save_dir` with the archive's files. Returns how many files were
/// extracted.
///
/// The archive is opened before anything is removed. Clearing is best effort; an extraction
/// failure leaves whatever was written so far.
pub fn restore(zip_path: &Path, save_dir: &Path) -> Result<usize> {
    let mut archive = open_archive(zip_path)?;

    clear_dir(save_dir);
    fs::create_dir_all(save_dir).map_err(|e| DcError::persist(save_dir, e))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| DcError::archive(zip_path, e))?;
        let Some(relative) = file.enclosed_name() else {
            warn!("skipping unsafe entry {:?} in {}", file.name(), zip_path.display());
            continue;
        };
        if relative == Path::new(statics::BACKUP_MARKER) {
            continue;
        }
        let dest = save_dir.join(&relative);
        if file.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| DcError::persist(&dest, e))?;
            continue;
        }

        let mut bytes = Vec::with_capacity(restore_capacity(file.size()));
        file.read_to_end(&mut bytes)
            .map_err(|e| DcError::archive(zip_path, e))?;
        fsio::write_atomic(&dest, &bytes)?;
        extracted += 1;
    }

    info!(
        "restored {extracted} file(s) from {} into {}",
        zip_path.display(),
        save_dir.display()
    );
    Ok(extracted)
}

/// Pre-allocation for an entry of `declared` bytes. The header is not trusted beyond
/// [`MAX_PREALLOC`]; `read_to_end` grows the buffer past that.
fn restore_capacity(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

fn clear_dir(dir: &Path) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = removed {
            warn!("could not clear {}: {e}", path.display());
        }
    }
}

/// The core save files the archive lacks. A non-empty answer warrants a second confirmation
/// before restoring.
pub fn required_files(zip_path: &Path) -> Result<Vec<&'static str>> {
    let archive = open_archive(zip_path)?;
    let present: Vec<&str> = archive.file_names().collect();
    Ok(statics::BACKUP_REQUIRED_FILES
        .iter()
        .copied()
        .filter(|name| !present.contains(name))
        .collect())
}

/// Remove an archive, and its directory if that leaves it empty.
pub fn delete(zip_path: &Path) -> Result<()> {
    fs::remove_file(zip_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DcError::NotFound(zip_path.display().to_string()),
        _ => DcError::persist(zip_path, e),
    })?;
    info!("deleted backup {}", zip_path.display());

    if let Some(dir) = zip_path.parent() {
        let empty = fs::read_dir(dir).is_ok_and(|mut r| r.next().is_none());
        if empty {
            if let Err(e) = fs::remove_dir(dir) {
                debug!("could not remove empty {}: {e}", dir.display());
            }
        }
    }
    Ok(())
}

/// Rename an archive within its directory. `.zip` is appended when missing.
pub fn rename(zip_path: &Path, new_name: &str) -> Result<PathBuf> {
    let trimmed = new_name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
        return Err(DcError::Conflict(format!("{new_name:?} is not a valid backup name")));
    }
    let suffix = format!(".{}", statics::BACKUP_EXT);
    let file_name = if trimmed.to_ascii_lowercase().ends_with(&suffix) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{suffix}")
    };

    if !zip_path.is_file() {
        return Err(DcError::NotFound(zip_path.display().to_string()));
    }
    let target = zip_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&file_name);
    if target == zip_path {
        return Ok(target);
    }
    if target.exists() {
        return Err(DcError::Conflict(format!("{file_name} already exists")));
    }
    fs::rename(zip_path, &target).map_err(|e| DcError::persist(zip_path, e))?;
    info!("renamed backup to {file_name}");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::{
        FALLBACK_RATIO, MAX_PREALLOC, backup_dir_for, estimate_files, marker_text,
        restore_capacity,
    };
    use chrono::NaiveDate;
    use std::path::Path;

    #[test]
    fn unreadable_sample_falls_back_to_default_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::write(&real, vec![b'x'; 1000]).unwrap();
        // The first file is the sample; it vanished after enumeration.
        let files = vec![dir.path().join("gone"), real];
        assert_eq!(estimate_files(&files), (1000.0 * FALLBACK_RATIO).round() as u64);
    }

    #[test]
    fn declared_entry_size_is_capped() {
        assert_eq!(restore_capacity(10), 10);
        assert_eq!(restore_capacity(u64::MAX), MAX_PREALLOC as usize);
    }

    #[test]
    fn backups_live_next_to_the_storage_folder() {
        assert_eq!(
            backup_dir_for(Path::new("/games/dc/storage")),
            Path::new("/games/dc/dcsm_backups")
        );
    }

    #[test]
    fn marker_has_timestamp_url_and_version() {
        let when = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        let text = marker_text(when);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "2024-03-09 07:05:01");
        assert_eq!(lines[1], crate::statics::PROJECT_URL);
        assert_eq!(lines[2], format!("ver:{}", env!("CARGO_PKG_VERSION")));
    }
}
