//! Background polling of the main save while the game runs.
//!
//! One worker thread owns the shadow copy (`.temp_sf.sav`), compares the save against it on
//! every tick and posts semantic diffs to the foreground through a channel. Errors inside a
//! tick are logged and the loop keeps going; nothing is ever propagated to the foreground.

use crate::diff::{Change, IgnoreSet, diff};
use crate::error::DcError;
use crate::fsio::{self, RetryPolicy};
use crate::{codec, statics};
use anyhow::Context;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Nominal polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
/// Pause after a tick that failed.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);
/// Sleeps are sliced so `stop()` is honoured quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);
/// Consecutive undecodable reads of the same content before the shadow absorbs them.
const DECODE_FAILURE_LIMIT: u32 = 3;

/// What the worker posts to the foreground, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Changes(Vec<Change>),
    /// The save, the shadow and the storage folder are all gone. Sent at most once.
    FolderGone,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    pub ignore: IgnoreSet,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            ignore: IgnoreSet::default(),
        }
    }
}

/// Where the watcher keeps its baseline for `target`.
pub fn shadow_path_for(target: &Path) -> PathBuf {
    target
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(statics::FILE_SHADOW)
}

/// Handle to a running watcher. Dropping it stops the worker.
#[derive(Debug)]
pub struct Watcher {
    target: PathBuf,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Spawn the worker for `target`. Events arrive on the returned receiver.
    pub fn start(target: &Path, options: WatchOptions) -> std::io::Result<(Watcher, Receiver<WatchEvent>)> {
        let (tx, rx) = mpsc::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let mut worker = WatchLoop::new(target, options.ignore, tx);
        let flag = Arc::clone(&stop_flag);
        let interval = options.interval;

        let handle = thread::Builder::new()
            .name("dcsm-watcher".to_string())
            .spawn(move || worker.run(&flag, interval))?;

        info!("watching {}", target.display());
        Ok((
            Watcher {
                target: target.to_path_buf(),
                stop_flag,
                handle: Some(handle),
            },
            rx,
        ))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the worker to exit and wait for it. The worker deletes the shadow on its way out.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("watcher thread panicked");
            }
            info!("stopped watching {}", self.target.display());
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) struct WatchLoop {
    target: PathBuf,
    shadow: PathBuf,
    save_dir: PathBuf,
    ignore: IgnoreSet,
    tx: Sender<WatchEvent>,
    folder_gone_sent: bool,
    disconnected: bool,
    /// Hash of content that failed to decode, and how many ticks in a row it did.
    failing: Option<(u64, u32)>,
}

impl WatchLoop {
    pub(crate) fn new(target: &Path, ignore: IgnoreSet, tx: Sender<WatchEvent>) -> Self {
        Self {
            target: target.to_path_buf(),
            shadow: shadow_path_for(target),
            save_dir: target.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
            ignore,
            tx,
            folder_gone_sent: false,
            disconnected: false,
            failing: None,
        }
    }

    fn run(&mut self, stop_flag: &AtomicBool, interval: Duration) {
        self.initialize();
        while !stop_flag.load(Ordering::SeqCst) && !self.disconnected {
            let pause = match self.tick() {
                Ok(()) => interval,
                Err(e) => {
                    warn!("watcher tick failed: {e:#}");
                    ERROR_BACKOFF
                }
            };
            sleep_unless_stopped(stop_flag, pause);
        }
        if let Err(e) = fsio::remove_if_exists(&self.shadow) {
            warn!("could not remove shadow copy: {e}");
        }
        debug!("watcher loop exited");
    }

    /// Seed the shadow from the current save. Failure is not fatal; the first tick retries.
    pub(crate) fn initialize(&mut self) {
        match fsio::read_with_retry(&self.target, RetryPolicy::PATIENT) {
            Ok(bytes) => {
                if let Err(e) = fsio::write_atomic(&self.shadow, &bytes) {
                    warn!("could not seed shadow copy: {e}");
                }
            }
            Err(e) => debug!("initial read of {} failed: {e}", self.target.display()),
        }
    }

    pub(crate) fn tick(&mut self) -> anyhow::Result<()> {
        if !self.target.exists() {
            if !self.shadow.exists() && !self.save_dir.exists() && !self.folder_gone_sent {
                info!("storage folder {} disappeared", self.save_dir.display());
                self.folder_gone_sent = true;
                self.post(WatchEvent::FolderGone);
            }
            return Ok(());
        }

        let bytes = match fsio::read_with_retry(&self.target, RetryPolicy::QUICK) {
            Ok(bytes) => bytes,
            Err(DcError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e).context("reading watched save"),
        };

        let shadow_bytes = match fs::read(&self.shadow) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.refresh_shadow(&bytes).context("creating shadow copy")?;
                return Ok(());
            }
            Err(e) => return Err(e).context("reading shadow copy"),
        };

        let hash = xxh3_64(&bytes);
        if hash == xxh3_64(&shadow_bytes) {
            return Ok(());
        }

        let new = match codec::decode(&bytes) {
            Ok(doc) => {
                self.failing = None;
                doc
            }
            Err(e) => {
                let count = match self.failing {
                    Some((h, n)) if h == hash => n + 1,
                    _ => 1,
                };
                self.failing = Some((hash, count));
                if count >= DECODE_FAILURE_LIMIT {
                    debug!("save keeps failing to decode ({e}); absorbing into shadow");
                    self.failing = None;
                    self.refresh_shadow(&bytes).context("updating shadow copy")?;
                }
                return Ok(());
            }
        };

        match codec::decode(&shadow_bytes) {
            Ok(old) => {
                let changes = diff(&old, &new, &self.ignore);
                if !changes.is_empty() {
                    debug!("observed {} change(s)", changes.len());
                    self.post(WatchEvent::Changes(changes));
                }
            }
            Err(e) => debug!("shadow copy undecodable ({e}); replacing without event"),
        }

        self.refresh_shadow(&bytes).context("updating shadow copy")?;
        Ok(())
    }

    /// Overwrite the shadow. No-op once the storage folder is gone.
    fn refresh_shadow(&self, bytes: &[u8]) -> crate::Result<()> {
        if !self.save_dir.is_dir() {
            return Ok(());
        }
        fsio::write_atomic(&self.shadow, bytes)
    }

    fn post(&mut self, event: WatchEvent) {
        if self.tx.send(event).is_err() {
            debug!("watch receiver dropped; stopping");
            self.disconnected = true;
        }
    }
}

fn sleep_unless_stopped(stop_flag: &AtomicBool, total: Duration) {
    let mut slept = Duration::ZERO;
    while slept < total && !stop_flag.load(Ordering::SeqCst) {
        let step = SLEEP_SLICE.min(total - slept);
        thread::sleep(step);
        slept += step;
    }
}
