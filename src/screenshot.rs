//! Screenshots embedded in save files, plus the two order indices that list them.
//!
//! Index A (`photo_ids`) is the primary: an ordered list of `{id, date}`. Index B
//! (`photo_all_ids`) is always regenerated from A on write. On read, any divergence between
//! them is reported in the listing rather than silently healed.
//!
//! Index A entries are edited as raw values: keys this crate does not know and entries it
//! cannot read are written back untouched.

use crate::error::{DcError, Result};
use crate::fsio::{self, RetryPolicy};
use crate::{DcValue, codec, statics};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Local, NaiveDateTime};
use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder, imageops::FilterType};
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Thumbnail size used when no existing thumbnail can be measured.
pub const DEFAULT_THUMB_SIZE: (u32, u32) = (1280, 960);
pub const THUMB_JPEG_QUALITY: u8 = 90;
const SCAN_TTL: Duration = Duration::from_secs(5);
const ID_LEN: usize = 8;
const ID_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_ATTEMPTS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub id: String,
    pub date: String,
}

/// Which of a screenshot's two files are on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhotoFiles {
    pub has_main: bool,
    pub has_thumb: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotEntry {
    /// Position in Index A.
    pub index: usize,
    pub id: String,
    pub date: String,
    pub has_main: bool,
    pub has_thumb: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotListing {
    pub entries: Vec<ScreenshotEntry>,
    /// Index B lists exactly Index A's ids in the same order.
    pub indices_consistent: bool,
    pub missing_main: usize,
    pub missing_thumb: usize,
    /// Index A entries without a usable id. They are kept in place, never listed.
    pub unreadable_entries: usize,
}

#[derive(Debug)]
struct ScanCache {
    taken_at: Instant,
    files: HashMap<String, PhotoFiles>,
}

#[derive(Debug)]
pub struct ScreenshotStore {
    dir: PathBuf,
    default_thumb_size: (u32, u32),
    cache: Option<ScanCache>,
}

impl ScreenshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            default_thumb_size: DEFAULT_THUMB_SIZE,
            cache: None,
        }
    }

    pub fn with_default_thumb_size(mut self, width: u32, height: u32) -> Self {
        self.default_thumb_size = (width.max(1), height.max(1));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn main_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}{id}{}",
            statics::FILE_PHOTO_PREFIX,
            statics::FILE_SAVE_EXT
        ))
    }

    pub fn thumb_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}{id}{}{}",
            statics::FILE_PHOTO_PREFIX,
            statics::FILE_PHOTO_THUMB_SUFFIX,
            statics::FILE_SAVE_EXT
        ))
    }

    fn index_a_path(&self) -> PathBuf {
        self.dir.join(statics::FILE_PHOTO_IDS)
    }

    fn index_b_path(&self) -> PathBuf {
        self.dir.join(statics::FILE_PHOTO_ALL_IDS)
    }

    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Map of id -> files present, rebuilt from a directory listing at most every 5 s.
    pub fn scan(&mut self) -> Result<&HashMap<String, PhotoFiles>> {
        let fresh = self
            .cache
            .as_ref()
            .is_some_and(|c| c.taken_at.elapsed() < SCAN_TTL);
        if !fresh {
            let files = scan_dir(&self.dir)?;
            self.cache = Some(ScanCache {
                taken_at: Instant::now(),
                files,
            });
        }
        match &self.cache {
            Some(cache) => Ok(&cache.files),
            None => Err(DcError::NotFound(self.dir.display().to_string())),
        }
    }

    /// Readable entries of Index A, in order. Numeric ids come back as their decimal text
    /// and a missing date as `""`.
    pub fn read_index_a(&self) -> Result<Vec<PhotoRecord>> {
        Ok(self
            .read_raw_index_a()?
            .iter()
            .filter_map(|entry| {
                Some(PhotoRecord {
                    id: entry_id(entry)?,
                    date: entry_date(entry).unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    /// Ids listed in Index B.
    pub fn read_index_b(&self) -> Result<Vec<String>> {
        Ok(self.read_raw_index(&self.index_b_path())?.iter().filter_map(id_text).collect())
    }

    fn read_raw_index_a(&self) -> Result<Vec<DcValue>> {
        self.read_raw_index(&self.index_a_path())
    }

    /// Elements of an index file. A missing file is an empty index; a root that is not an
    /// array is an error so it never gets overwritten.
    fn read_raw_index(&self, path: &Path) -> Result<Vec<DcValue>> {
        match read_optional(path)? {
            None => Ok(Vec::new()),
            Some(DcValue::Array(entries)) => Ok(entries),
            Some(other) => Err(DcError::NotADocument {
                found: other.type_name(),
            }),
        }
    }

    /// Write Index A as given, then Index B derived from it.
    fn write_indices(&self, entries: &[DcValue]) -> Result<()> {
        let index_a = DcValue::Array(entries.to_vec());
        let index_b = DcValue::Array(derive_index_b(entries));
        fsio::write_atomic(&self.index_a_path(), &codec::encode_value(&index_a))?;
        fsio::write_atomic(&self.index_b_path(), &codec::encode_value(&index_b))?;
        Ok(())
    }

    pub fn list(&mut self) -> Result<ScreenshotListing> {
        let raw_a = self.read_raw_index_a()?;
        let raw_b = self.read_raw_index(&self.index_b_path())?;
        let indices_consistent = raw_b == derive_index_b(&raw_a);
        if !indices_consistent {
            warn!("screenshot indices disagree; re-save to repair");
        }

        let files = self.scan()?;
        let mut unreadable_entries = 0;
        let mut entries = Vec::with_capacity(raw_a.len());
        for (index, entry) in raw_a.iter().enumerate() {
            let Some(id) = entry_id(entry) else {
                unreadable_entries += 1;
                continue;
            };
            let present = files.get(&id).copied().unwrap_or_default();
            entries.push(ScreenshotEntry {
                index,
                date: entry_date(entry).unwrap_or_default().to_string(),
                id,
                has_main: present.has_main,
                has_thumb: present.has_thumb,
            });
        }
        if unreadable_entries > 0 {
            warn!("{unreadable_entries} screenshot index entries have no usable id");
        }

        Ok(ScreenshotListing {
            missing_main: entries.iter().filter(|e| !e.has_main).count(),
            missing_thumb: entries.iter().filter(|e| !e.has_thumb).count(),
            indices_consistent,
            unreadable_entries,
            entries,
        })
    }

    /// Add a screenshot dated now.
    pub fn add(&mut self, image_bytes: &[u8], id: Option<&str>, date: Option<&str>) -> Result<PhotoRecord> {
        self.add_at(image_bytes, id, date, Local::now().naive_local())
    }

    /// Add a screenshot; `now` supplies the date when none is given.
    pub fn add_at(
        &mut self,
        image_bytes: &[u8],
        id: Option<&str>,
        date: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<PhotoRecord> {
        let image = image::load_from_memory(image_bytes)?;
        let mut entries = self.read_raw_index_a()?;
        let listed: Vec<String> = entries.iter().filter_map(entry_id).collect();
        let on_disk: Vec<String> = self.scan()?.keys().cloned().collect();
        let taken = |candidate: &str| {
            listed.iter().any(|k| k == candidate) || on_disk.iter().any(|k| k == candidate)
        };

        let id = match id {
            Some(id) => {
                validate_id(id)?;
                if taken(id) {
                    return Err(DcError::Conflict(format!("screenshot id {id} already exists")));
                }
                id.to_string()
            }
            None => (0..ID_ATTEMPTS)
                .map(|_| random_id())
                .find(|candidate| !taken(candidate))
                .ok_or_else(|| DcError::Conflict("could not draw an unused screenshot id".into()))?,
        };
        let date = match date {
            Some(d) => d.to_string(),
            None => now.format(statics::FMT_PHOTO_DATE).to_string(),
        };

        let thumb_size = listed
            .iter()
            .find_map(|existing| self.thumbnail_size(existing))
            .unwrap_or(self.default_thumb_size);

        self.write_main(&id, image_bytes, &image)?;
        self.write_thumb(&id, &image, thumb_size)?;

        entries.push(photo_entry(&id, &date));
        self.write_indices(&entries)?;
        let record = PhotoRecord { id, date };
        self.invalidate();
        info!("added screenshot {}", record.id);
        Ok(record)
    }

    /// Swap the image of an existing screenshot. The indices are untouched.
    pub fn replace(&mut self, id: &str, image_bytes: &[u8]) -> Result<()> {
        if !self.read_index_a()?.iter().any(|r| r.id == id) {
            return Err(DcError::NotFound(format!("screenshot {id}")));
        }
        let image = image::load_from_memory(image_bytes)?;
        let thumb_size = self.thumbnail_size(id).unwrap_or(self.default_thumb_size);

        self.write_main(id, image_bytes, &image)?;
        self.write_thumb(id, &image, thumb_size)?;
        self.invalidate();
        info!("replaced screenshot {id}");
        Ok(())
    }

    /// Remove screenshots and their index entries. Returns how many index entries went away.
    pub fn delete<S: AsRef<str>>(&mut self, ids: &[S]) -> Result<usize> {
        let mut entries = self.read_raw_index_a()?;
        let before = entries.len();
        for id in ids {
            let id = id.as_ref();
            fsio::remove_if_exists(&self.main_path(id))?;
            fsio::remove_if_exists(&self.thumb_path(id))?;
        }
        entries.retain(|entry| {
            !entry_id(entry).is_some_and(|id| ids.iter().any(|wanted| wanted.as_ref() == id))
        });
        self.write_indices(&entries)?;
        self.invalidate();
        let removed = before - entries.len();
        info!("deleted {removed} screenshot(s)");
        Ok(removed)
    }

    /// Move the entry at position `from` of Index A to position `to`. Positions count every
    /// entry, readable or not, matching [`ScreenshotEntry::index`].
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let mut entries = self.read_raw_index_a()?;
        if from >= entries.len() || to >= entries.len() {
            return Err(DcError::NotFound(format!(
                "screenshot position {} (have {})",
                from.max(to),
                entries.len()
            )));
        }
        let moved = entries.remove(from);
        entries.insert(to, moved);
        self.write_indices(&entries)
    }

    /// Order Index A by date. Entries whose date does not parse keep their relative order at
    /// the end.
    pub fn sort(&mut self, ascending: bool) -> Result<()> {
        let mut entries = self.read_raw_index_a()?;
        let parsed = |entry: &DcValue| {
            entry_date(entry)
                .and_then(|d| NaiveDateTime::parse_from_str(d, statics::FMT_PHOTO_DATE).ok())
        };
        entries.sort_by(|a, b| match (parsed(a), parsed(b)) {
            (Some(x), Some(y)) if ascending => x.cmp(&y),
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        self.write_indices(&entries)
    }

    /// Raw bytes of the full-size image, or `None` when its file is missing.
    pub fn get_image(&self, id: &str) -> Result<Option<Vec<u8>>> {
        read_embedded(&self.main_path(id))
    }

    pub fn get_thumbnail(&self, id: &str) -> Result<Option<Vec<u8>>> {
        read_embedded(&self.thumb_path(id))
    }

    /// Pixel size of a screenshot's thumbnail, if it exists and can be read.
    pub fn thumbnail_size(&self, id: &str) -> Option<(u32, u32)> {
        let bytes = match self.get_thumbnail(id) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                debug!("thumbnail of {id} unreadable: {e}");
                return None;
            }
        };
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    /// Write every screenshot as `<id>.png` into `dest`, in Index A order.
    pub fn export_images(&self, dest: &Path, mut progress: impl FnMut(usize, usize)) -> Result<usize> {
        let records = self.read_index_a()?;
        fs::create_dir_all(dest).map_err(|e| DcError::persist(dest, e))?;
        let mut written = 0;
        for (i, record) in records.iter().enumerate() {
            match self.get_image(&record.id) {
                Ok(Some(bytes)) => {
                    let path = dest.join(format!("{}.png", record.id));
                    fsio::write_atomic(&path, &bytes)?;
                    written += 1;
                }
                Ok(None) => debug!("screenshot {} has no main file; skipped", record.id),
                Err(e) => warn!("screenshot {} unreadable, skipped: {e}", record.id),
            }
            progress(i + 1, records.len());
        }
        Ok(written)
    }

    fn write_main(&self, id: &str, original: &[u8], image: &DynamicImage) -> Result<()> {
        let png = if image::guess_format(original).ok() == Some(ImageFormat::Png) {
            original.to_vec()
        } else {
            let mut buf = Vec::new();
            image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
            buf
        };
        write_embedded(&self.main_path(id), statics::DATA_URI_PNG, &png)
    }

    fn write_thumb(&self, id: &str, image: &DynamicImage, (width, height): (u32, u32)) -> Result<()> {
        let thumb = image.resize_exact(width, height, FilterType::Triangle);
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(thumb.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, THUMB_JPEG_QUALITY))?;
        write_embedded(&self.thumb_path(id), statics::DATA_URI_JPEG, &buf)
    }
}

fn photo_entry(id: &str, date: &str) -> DcValue {
    let mut map = IndexMap::new();
    map.insert(statics::PHOTO_FIELD_ID.to_string(), DcValue::from(id));
    map.insert(statics::PHOTO_FIELD_DATE.to_string(), DcValue::from(date));
    DcValue::Object(map)
}

/// Index B for the given Index A: each entry's `id` value as stored, in order.
fn derive_index_b(index_a: &[DcValue]) -> Vec<DcValue> {
    index_a
        .iter()
        .filter_map(|entry| entry.get(statics::PHOTO_FIELD_ID).cloned())
        .collect()
}

/// Id of an Index A entry. Strings are taken as is, numbers by their JSON text.
fn entry_id(entry: &DcValue) -> Option<String> {
    entry.get(statics::PHOTO_FIELD_ID).and_then(id_text)
}

fn id_text(value: &DcValue) -> Option<String> {
    match value {
        DcValue::String(s) if !s.is_empty() => Some(s.clone()),
        DcValue::Number(_) => Some(value.to_json_compact()),
        _ => None,
    }
}

fn entry_date(entry: &DcValue) -> Option<&str> {
    entry.get(statics::PHOTO_FIELD_DATE).and_then(DcValue::as_str)
}

fn read_optional(path: &Path) -> Result<Option<DcValue>> {
    match fsio::read_with_retry(path, RetryPolicy::PATIENT) {
        Ok(bytes) => Ok(Some(codec::decode_value(&bytes)?)),
        Err(DcError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_embedded(path: &Path, prefix: &str, bytes: &[u8]) -> Result<()> {
    let uri = format!("{prefix}{}", STANDARD.encode(bytes));
    fsio::write_atomic(path, &codec::encode_value(&DcValue::String(uri)))
}

fn read_embedded(path: &Path) -> Result<Option<Vec<u8>>> {
    let Some(value) = read_optional(path)? else {
        return Ok(None);
    };
    let Some(uri) = value.as_str() else {
        return Err(DcError::NotADocument {
            found: value.type_name(),
        });
    };
    let Some((_, payload)) = uri.split_once(";base64,") else {
        return Err(DcError::MalformedEncoding {
            offset: 0,
            reason: "not a base64 data URI",
        });
    };
    STANDARD
        .decode(payload.trim())
        .map(Some)
        .map_err(|_| DcError::MalformedEncoding {
            offset: 0,
            reason: "invalid base64 payload",
        })
}

fn scan_dir(dir: &Path) -> Result<HashMap<String, PhotoFiles>> {
    let mut files: HashMap<String, PhotoFiles> = HashMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(_) => return Err(DcError::NotFound(dir.display().to_string())),
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some((id, is_thumb)) = parse_photo_file_name(&name.to_string_lossy()) else {
            continue;
        };
        let slot = files.entry(id).or_default();
        if is_thumb {
            slot.has_thumb = true;
        } else {
            slot.has_main = true;
        }
    }
    Ok(files)
}

/// `DevilConnection_photo_<id>[_thumb].sav` -> `(id, is_thumb)`. The index files are not photos.
fn parse_photo_file_name(name: &str) -> Option<(String, bool)> {
    if name == statics::FILE_PHOTO_IDS || name == statics::FILE_PHOTO_ALL_IDS {
        return None;
    }
    let stem = name
        .strip_prefix(statics::FILE_PHOTO_PREFIX)?
        .strip_suffix(statics::FILE_SAVE_EXT)?;
    let (id, is_thumb) = match stem.strip_suffix(statics::FILE_PHOTO_THUMB_SUFFIX) {
        Some(id) => (id, true),
        None => (stem, false),
    };
    (!id.is_empty()).then(|| (id.to_string(), is_thumb))
}

fn validate_id(id: &str) -> Result<()> {
    let well_formed = !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && !id.ends_with(statics::FILE_PHOTO_THUMB_SUFFIX)
        && parse_photo_file_name(&format!(
            "{}{id}{}",
            statics::FILE_PHOTO_PREFIX,
            statics::FILE_SAVE_EXT
        ))
        .is_some();
    if well_formed {
        Ok(())
    } else {
        Err(DcError::Conflict(format!("{id:?} cannot be used as a screenshot id")))
    }
}

fn random_id() -> String {
    uuid::Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(ID_LEN)
        .map(|b| char::from(ID_ALPHABET[usize::from(*b) % ID_ALPHABET.len()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_photo_file_name, random_id, validate_id};

    #[test]
    fn photo_file_names_parse_and_index_files_do_not() {
        assert_eq!(
            parse_photo_file_name("DevilConnection_photo_abc123de.sav"),
            Some(("abc123de".to_string(), false))
        );
        assert_eq!(
            parse_photo_file_name("DevilConnection_photo_abc123de_thumb.sav"),
            Some(("abc123de".to_string(), true))
        );
        assert_eq!(parse_photo_file_name("DevilConnection_photo_ids.sav"), None);
        assert_eq!(parse_photo_file_name("DevilConnection_photo_all_ids.sav"), None);
        assert_eq!(parse_photo_file_name("DevilConnection_sf.sav"), None);
    }

    #[test]
    fn random_ids_are_eight_lowercase_alphanumerics() {
        for _ in 0..32 {
            let id = random_id();
            assert_eq!(id.len(), 8);
            assert!(id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn ids_that_collide_with_file_layout_are_rejected() {
        assert!(validate_id("abc123de").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("x_thumb").is_err());
        assert!(validate_id("ids").is_err());
        assert!(validate_id("all_ids").is_err());
        assert!(validate_id("../evil").is_err());
    }
}
