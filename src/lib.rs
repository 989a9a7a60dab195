//! Core library for the Devil Connection Save Manager (DCSM).
//! Decodes, watches, diffs and safely rewrites the game's percent-encoded JSON saves, and
//! manages the screenshots embedded in them and zip backups of the storage folder.

pub mod app;
pub mod backup;
pub mod coalesce;
pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod fsio;
mod save;
pub mod screenshot;
pub mod statics;
mod stats;
pub mod storage;
mod value;
pub mod watcher;

pub use app::{BackgroundJob, BackupJob, Companion, Progress, PumpOutcome};
pub use error::{DcError, Result};
pub use save::{LoadedSave, SaveOutcome, SaveStore, canonical_crc32};
pub use stats::{Coverage, JudgeCounts, MemoryView, SaveStats, all_sticker_ids};
pub use value::{DcNumber, DcValue};
