//! The command surface a front end drives.
//!
//! [`Companion`] lives on the foreground thread and owns every write to the storage folder.
//! The watcher and long-running jobs run on their own threads and only ever talk back
//! through channels; the host calls [`Companion::pump`] from its frame or timer loop.

use crate::backup::{self, BackupEntry, CreatedBackup};
use crate::coalesce::Coalescer;
use crate::config::Config;
use crate::error::{DcError, Result};
use crate::save::{LoadedSave, SaveOutcome, SaveStore};
use crate::screenshot::ScreenshotStore;
use crate::stats::SaveStats;
use crate::watcher::{WatchEvent, WatchOptions, Watcher};
use crate::{DcValue, fsio, storage};
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, TryRecvError},
    thread::{self, JoinHandle},
    time::Instant,
};
use tracing::{info, warn};

/// Progress of a background job: `done` of `total` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

/// A short-lived worker. Progress arrives on `progress`; [`BackgroundJob::wait`] yields the
/// result.
#[derive(Debug)]
pub struct BackgroundJob<T> {
    pub progress: Receiver<Progress>,
    handle: JoinHandle<Result<T>>,
}

pub type BackupJob = BackgroundJob<CreatedBackup>;

impl<T: Send + 'static> BackgroundJob<T> {
    fn spawn<F>(name: &str, work: F) -> Result<Self>
    where
        F: FnOnce(&mut dyn FnMut(usize, usize)) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut report = |done, total| {
                    // Receiver gone means nobody is listening; the job still finishes.
                    let _ = tx.send(Progress { done, total });
                };
                work(&mut report)
            })
            .map_err(|e| DcError::persist(name, e))?;
        Ok(Self {
            progress: rx,
            handle,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the job ends.
    pub fn wait(self) -> Result<T> {
        self.handle.join().unwrap_or_else(|_| {
            warn!("background job panicked");
            Err(DcError::Cancelled)
        })
    }
}

/// What one [`Companion::pump`] call observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpOutcome {
    /// Notifications opened or extended.
    pub touched: Vec<u64>,
    /// Notifications that timed out.
    pub expired: Vec<u64>,
    pub folder_gone: bool,
}

#[derive(Debug)]
struct ActiveWatch {
    watcher: Watcher,
    events: Receiver<WatchEvent>,
}

#[derive(Debug)]
pub struct Companion {
    config: Config,
    config_path: Option<PathBuf>,
    storage: Option<PathBuf>,
    screenshots: Option<ScreenshotStore>,
    watch: Option<ActiveWatch>,
    coalescer: Coalescer,
}

impl Default for Companion {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Companion {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            config_path: None,
            storage: None,
            screenshots: None,
            watch: None,
            coalescer: Coalescer::new(),
        }
    }

    /// Load settings from `path`; later [`Companion::set_config`] calls write back there.
    pub fn with_config_file(path: &Path) -> Result<Self> {
        let mut companion = Self::new(Config::load(path)?);
        companion.config_path = Some(path.to_path_buf());
        Ok(companion)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the settings, persisting them when a config file is attached. A running
    /// watcher is restarted so the new ignore list and interval apply.
    pub fn set_config(&mut self, config: Config) -> Result<()> {
        if let Some(path) = &self.config_path {
            config.save(path)?;
        }
        self.config = config;
        if self.is_watching() {
            self.start_watch()?;
        }
        Ok(())
    }

    // ---- storage folder ----

    pub fn select_storage(&mut self, dir: &Path) -> Result<()> {
        let dir = storage::validate_storage_dir(dir)?;
        self.stop_watch();
        self.coalescer.clear();
        info!("storage folder set to {}", dir.display());
        self.screenshots = Some(ScreenshotStore::new(&dir));
        self.storage = Some(dir);
        Ok(())
    }

    /// Try the default candidates and select the first that validates.
    pub fn auto_detect_storage(&mut self) -> Option<PathBuf> {
        let found = storage::auto_detect_storage(storage::default_candidates())?;
        match self.select_storage(&found) {
            Ok(()) => Some(found),
            Err(e) => {
                warn!("detected storage folder could not be selected: {e}");
                None
            }
        }
    }

    pub fn storage_dir(&self) -> Result<&Path> {
        self.storage
            .as_deref()
            .ok_or_else(|| DcError::NotFound("no storage folder selected".to_string()))
    }

    pub fn save_store(&self) -> Result<SaveStore> {
        Ok(SaveStore::new(self.storage_dir()?))
    }

    // ---- watching ----

    pub fn start_watch(&mut self) -> Result<()> {
        let target = self.save_store()?.main_path();
        self.stop_watch();
        let options = WatchOptions {
            interval: self.config.watch_interval(),
            ignore: self.config.ignore_set(),
        };
        let (watcher, events) =
            Watcher::start(&target, options).map_err(|e| DcError::persist(&target, e))?;
        self.watch = Some(ActiveWatch { watcher, events });
        Ok(())
    }

    pub fn stop_watch(&mut self) {
        if let Some(mut active) = self.watch.take() {
            active.watcher.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }

    pub fn coalescer_mut(&mut self) -> &mut Coalescer {
        &mut self.coalescer
    }

    /// Drain watcher events into the coalescer and expire idle notifications.
    pub fn pump(&mut self, now: Instant) -> PumpOutcome {
        let mut outcome = PumpOutcome::default();
        let mut disconnected = false;

        if let Some(active) = &self.watch {
            loop {
                match active.events.try_recv() {
                    Ok(WatchEvent::Changes(changes)) => {
                        if !self.config.toast_enabled {
                            continue;
                        }
                        for id in self.coalescer.ingest(&changes, now) {
                            if !outcome.touched.contains(&id) {
                                outcome.touched.push(id);
                            }
                        }
                    }
                    Ok(WatchEvent::FolderGone) => outcome.folder_gone = true,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
        if disconnected {
            warn!("watcher ended unexpectedly");
            self.stop_watch();
        }

        outcome.expired = self.coalescer.expire(now);
        outcome
    }

    // ---- saves ----

    pub fn load_save(&self) -> Result<LoadedSave> {
        self.save_store()?.load()
    }

    pub fn view_stats(&self) -> Result<SaveStats> {
        self.save_store()?.view_stats()
    }

    pub fn save_document(&self, document: &DcValue) -> Result<()> {
        if !document.is_object() {
            return Err(DcError::NotADocument {
                found: document.type_name(),
            });
        }
        self.save_store()?.save(document)
    }

    /// Collapsed, pretty-printed text of the main save for the hand editor.
    pub fn editor_text(&self) -> Result<String> {
        Ok(SaveStore::editor_text(&self.load_save()?.root))
    }

    /// Write edited text back, restoring collapsed fields from the current save.
    pub fn apply_editor_text(&self, text: &str) -> Result<SaveOutcome> {
        let store = self.save_store()?;
        let original = store.load()?.root;
        store.apply_editor_text(&original, text)
    }

    pub fn import_sibling(&self, source: &Path) -> Result<DcValue> {
        self.save_store()?.import_sibling(source)
    }

    /// Write the sibling save to `dest`; `pretty` produces indented JSON instead of the
    /// game's encoding.
    pub fn export_sibling(&self, dest: &Path, pretty: bool) -> Result<()> {
        let store = self.save_store()?;
        let bytes = if pretty {
            store.export_sibling_pretty()?.into_bytes()
        } else {
            store.export_sibling()?
        };
        fsio::write_atomic(dest, &bytes)
    }

    pub fn sidecar(&self) -> Result<Option<String>> {
        self.save_store()?.sidecar()
    }

    // ---- screenshots ----

    pub fn screenshots(&mut self) -> Result<&mut ScreenshotStore> {
        self.screenshots
            .as_mut()
            .ok_or_else(|| DcError::NotFound("no storage folder selected".to_string()))
    }

    /// Export every screenshot as PNG into `dest` on a worker thread.
    pub fn spawn_screenshot_export(&self, dest: &Path) -> Result<BackgroundJob<usize>> {
        let store = ScreenshotStore::new(self.storage_dir()?);
        let dest = dest.to_path_buf();
        BackgroundJob::spawn("dcsm-export", move |report| store.export_images(&dest, report))
    }

    // ---- backups ----

    pub fn backup_dir(&self) -> Result<PathBuf> {
        Ok(backup::backup_dir_for(self.storage_dir()?))
    }

    pub fn estimate_backup(&self) -> Result<u64> {
        backup::estimate(self.storage_dir()?)
    }

    pub fn create_backup(&self, progress: impl FnMut(usize, usize)) -> Result<CreatedBackup> {
        backup::create(self.storage_dir()?, progress)
    }

    /// Run [`backup::create`] on a worker thread.
    pub fn spawn_backup(&self) -> Result<BackupJob> {
        let dir = self.storage_dir()?.to_path_buf();
        BackgroundJob::spawn("dcsm-backup", move |report| backup::create(&dir, report))
    }

    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        backup::list(&self.backup_dir()?)
    }

    pub fn backup_required_files(&self, zip_path: &Path) -> Result<Vec<&'static str>> {
        backup::required_files(zip_path)
    }

    /// Restore an archive over the storage folder. The watcher is paused around it so the
    /// restored files are not reported as edits.
    pub fn restore_backup(&mut self, zip_path: &Path) -> Result<usize> {
        let dir = self.storage_dir()?.to_path_buf();
        let was_watching = self.is_watching();
        self.stop_watch();
        let restored = backup::restore(zip_path, &dir);
        if let Some(store) = self.screenshots.as_mut() {
            store.invalidate();
        }
        if was_watching {
            self.start_watch()?;
        }
        restored
    }

    pub fn delete_backup(&self, zip_path: &Path) -> Result<()> {
        backup::delete(zip_path)
    }

    pub fn rename_backup(&self, zip_path: &Path, new_name: &str) -> Result<PathBuf> {
        backup::rename(zip_path, new_name)
    }
}

impl Drop for Companion {
    fn drop(&mut self) {
        self.stop_watch();
    }
}

#[cfg(test)]
mod tests {
    use super::Companion;
    use crate::error::DcError;

    #[test]
    fn commands_need_a_storage_folder() {
        let companion = Companion::default();
        assert!(matches!(companion.load_save(), Err(DcError::NotFound(_))));
        assert!(matches!(companion.list_backups(), Err(DcError::NotFound(_))));
    }
}
