//! The main save, its sibling and the `NEO.sav` sidecar, plus the hand-editor workflow.
//!
//! Bulk fields are collapsed to a sentinel for editing and put back by path on save; an edit
//! that changes nothing canonically is never written.

use crate::error::{DcError, Result};
use crate::fsio::{self, RetryPolicy};
use crate::stats::SaveStats;
use crate::{DcValue, codec, statics};
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of pushing editor text back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The edited document is canonically identical to what is on disk; nothing was written.
    NoChanges,
}

/// A decoded main save and where it came from. Writes go through [`SaveStore`].
#[derive(Debug, Clone)]
pub struct LoadedSave {
    pub source_path: PathBuf,
    pub root: DcValue,
}

impl LoadedSave {
    pub fn load_path(path: &Path) -> Result<Self> {
        let bytes = fsio::read_with_retry(path, RetryPolicy::PATIENT)?;
        Ok(Self {
            source_path: path.to_path_buf(),
            root: codec::decode(&bytes)?,
        })
    }

    pub fn stats(&self) -> SaveStats {
        SaveStats::from_document(&self.root)
    }
}

/// The editor's data contract over the main save, its sibling and the sidecar.
#[derive(Debug, Clone)]
pub struct SaveStore {
    dir: PathBuf,
}

impl SaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn main_path(&self) -> PathBuf {
        self.dir.join(statics::FILE_MAIN_SAVE)
    }

    pub fn sibling_path(&self) -> PathBuf {
        self.dir.join(statics::FILE_SIBLING_SAVE)
    }

    pub fn sidecar_path(&self) -> PathBuf {
        self.dir.join(statics::FILE_SIDECAR)
    }

    pub fn load(&self) -> Result<LoadedSave> {
        LoadedSave::load_path(&self.main_path())
    }

    pub fn view_stats(&self) -> Result<SaveStats> {
        Ok(self.load()?.stats())
    }

    /// Persist `document` as the main save.
    pub fn save(&self, document: &DcValue) -> Result<()> {
        let bytes = codec::encode(document)?;
        let path = self.main_path();
        fsio::write_atomic(&path, &bytes)?;
        info!("saved {}", path.display());
        Ok(())
    }

    /// The document with every opaque bulk field replaced by the sentinel placeholder.
    pub fn collapsed_view(document: &DcValue) -> DcValue {
        let mut view = document.clone();
        if let Some(map) = view.as_object_mut() {
            for key in statics::DC_BULK_FIELDS {
                if let Some(v) = map.get_mut(key) {
                    *v = DcValue::from(statics::EDITOR_COLLAPSED_SENTINEL);
                }
            }
        }
        view
    }

    /// Pretty text of the collapsed view, for the hand editor.
    pub fn editor_text(document: &DcValue) -> String {
        codec::to_pretty_json(&Self::collapsed_view(document))
    }

    /// Put back every value the editor still shows as the sentinel, matching by path.
    pub fn restore_collapsed(original: &DcValue, edited: DcValue) -> DcValue {
        let mut edited = edited;
        restore_sentinels(&mut edited, Some(original));
        edited
    }

    /// Parse editor text, restore collapsed fields from `original`, and write if anything
    /// actually changed.
    pub fn apply_editor_text(&self, original: &DcValue, text: &str) -> Result<SaveOutcome> {
        let edited: DcValue = serde_json::from_str(text).map_err(|e| DcError::InvalidDocument {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        })?;
        if !edited.is_object() {
            return Err(DcError::NotADocument {
                found: edited.type_name(),
            });
        }
        let restored = Self::restore_collapsed(original, edited);

        let on_disk = match self.load() {
            Ok(save) => Some(save.root),
            Err(DcError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if let Some(on_disk) = on_disk {
            if canonical_crc32(&on_disk) == canonical_crc32(&restored) {
                return Ok(SaveOutcome::NoChanges);
            }
        }

        self.save(&restored)?;
        Ok(SaveOutcome::Saved)
    }

    /// Validate and copy a user-picked sibling save into the storage folder.
    pub fn import_sibling(&self, source: &Path) -> Result<DcValue> {
        let bytes = fsio::read_with_retry(source, RetryPolicy::PATIENT)?;
        let document = codec::decode(&bytes)?;
        let target = self.sibling_path();
        fsio::write_atomic(&target, &codec::encode(&document)?)?;
        info!("imported {} into {}", source.display(), target.display());
        Ok(document)
    }

    /// Re-encoded sibling save, ready to be written wherever the user picks.
    pub fn export_sibling(&self) -> Result<Vec<u8>> {
        codec::encode(&self.sibling_document()?)
    }

    /// Sibling save as indented JSON, for humans.
    pub fn export_sibling_pretty(&self) -> Result<String> {
        Ok(codec::to_pretty_json(&self.sibling_document()?))
    }

    pub fn sibling_document(&self) -> Result<DcValue> {
        let bytes = fsio::read_with_retry(&self.sibling_path(), RetryPolicy::PATIENT)?;
        codec::decode(&bytes)
    }

    /// String payload of `NEO.sav`, or `None` when the game has not written one.
    pub fn sidecar(&self) -> Result<Option<String>> {
        let bytes = match fsio::read_with_retry(&self.sidecar_path(), RetryPolicy::PATIENT) {
            Ok(bytes) => bytes,
            Err(DcError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        match codec::decode_value(&bytes)? {
            DcValue::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_json_compact())),
        }
    }
}

/// CRC32 of the sorted-key compact JSON.
pub fn canonical_crc32(document: &DcValue) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(document.to_json_canonical().as_bytes());
    crc.sum()
}

fn restore_sentinels(edited: &mut DcValue, original: Option<&DcValue>) {
    if edited.as_str() == Some(statics::EDITOR_COLLAPSED_SENTINEL) {
        if let Some(o) = original {
            *edited = o.clone();
        }
        return;
    }
    match edited {
        DcValue::Object(map) => {
            let mut orphaned = Vec::new();
            for (key, value) in map.iter_mut() {
                let orig = original.and_then(|o| o.get(key));
                restore_sentinels(value, orig);
                if orig.is_none() && value.as_str() == Some(statics::EDITOR_COLLAPSED_SENTINEL) {
                    orphaned.push(key.clone());
                }
            }
            for key in orphaned {
                map.shift_remove(&key);
            }
        }
        DcValue::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                let orig = original.and_then(|o| o.as_array()).and_then(|a| a.get(i));
                restore_sentinels(value, orig);
            }
        }
        _ => {}
    }
}
