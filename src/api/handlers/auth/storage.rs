//! Backing stores for login throttle entries.
//!
//! Flow Overview:
//! 1) `LoginThrottle` owns the counting and expiry rules.
//! 2) A store only guarantees that one `update` on a key is an atomic
//!    read-modify-write and that `retain` sweeps under the same exclusion.
//! 3) `MemoryThrottleStore` is process-local and resets on restart.
//!    `FileThrottleStore` keeps a JSON file behind an advisory lock so several
//!    processes (and restarts) share one view.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::error;

pub const DEFAULT_THROTTLE_FILE: &str = "storage/login_attempts.json";

/// Failed-login bookkeeping for one client address.
///
/// Serialized as `{"count":N,"blockedUntil":<epoch millis>|null}`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ThrottleEntry {
    #[serde(rename = "count", default)]
    pub failed_count: u32,
    #[serde(rename = "blockedUntil", default)]
    pub blocked_until_millis: Option<i64>,
}

impl ThrottleEntry {
    /// Block expiry if a block is still in force at `now_millis`.
    #[must_use]
    pub fn active_block(&self, now_millis: i64) -> Option<i64> {
        self.blocked_until_millis
            .filter(|&until| until > 0 && now_millis < until)
    }

    /// True once a block was set and its window has elapsed.
    #[must_use]
    pub fn block_elapsed(&self, now_millis: i64) -> bool {
        self.blocked_until_millis
            .is_some_and(|until| until > 0 && now_millis >= until)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThrottleStoreError {
    #[error("throttle file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode throttle entries: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Keyed storage for per-address failure counters.
///
/// Entries below the block threshold are only removed by a successful login,
/// and client addresses come from proxy headers, so the number of entries is
/// bounded by the proxy in front of the service, not by the store.
pub trait ThrottleStore: Send + Sync {
    /// Apply `apply` to the entry stored under `key` as one atomic step.
    ///
    /// `None` in the slot means "no entry"; leaving `None` behind deletes it.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut Option<ThrottleEntry>),
    ) -> Result<(), ThrottleStoreError>;

    /// Drop every entry for which `keep` returns false; returns how many went.
    ///
    /// # Errors
    /// Returns an error if the backing store cannot be written.
    fn retain(
        &self,
        keep: &mut dyn FnMut(&ThrottleEntry) -> bool,
    ) -> Result<usize, ThrottleStoreError>;
}

/// Apply an update to a loaded map; returns true when the map changed.
fn apply_update(
    entries: &mut HashMap<String, ThrottleEntry>,
    key: &str,
    apply: &mut dyn FnMut(&mut Option<ThrottleEntry>),
) -> bool {
    let before = entries.get(key).cloned();
    let mut slot = before.clone();
    apply(&mut slot);
    if slot == before {
        return false;
    }
    match slot {
        Some(entry) => {
            entries.insert(key.to_string(), entry);
        }
        None => {
            entries.remove(key);
        }
    }
    true
}

#[derive(Debug, Default)]
pub struct MemoryThrottleStore {
    entries: Mutex<HashMap<String, ThrottleEntry>>,
}

impl MemoryThrottleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave an entry half-written, so a
    // poisoned map is still consistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, ThrottleEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ThrottleStore for MemoryThrottleStore {
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut Option<ThrottleEntry>),
    ) -> Result<(), ThrottleStoreError> {
        apply_update(&mut self.entries(), key, apply);
        Ok(())
    }

    fn retain(
        &self,
        keep: &mut dyn FnMut(&ThrottleEntry) -> bool,
    ) -> Result<usize, ThrottleStoreError> {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| keep(entry));
        Ok(before - entries.len())
    }
}

#[derive(Clone, Debug)]
pub struct FileThrottleStore {
    path: PathBuf,
}

impl FileThrottleStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> ThrottleStoreError {
        ThrottleStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Open (creating if needed) and exclusively lock the throttle file.
    /// The lock is released when the returned handle is dropped.
    fn open_locked(&self) -> Result<File, ThrottleStoreError> {
        if let Some(parent) = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|err| self.io_error(err))?;
        file.lock().map_err(|err| self.io_error(err))?;
        Ok(file)
    }

    /// Read the current map. Unreadable or corrupt contents read as empty:
    /// a broken store must not lock the administrator out.
    fn load(&self, file: &mut File) -> HashMap<String, ThrottleEntry> {
        let mut raw = String::new();
        if let Err(err) = file.read_to_string(&mut raw) {
            error!(path = %self.path.display(), "Failed to read login throttle file: {err}");
            return HashMap::new();
        }
        let raw = raw.trim();
        // `[]` is how an empty map was written by older deployments.
        if raw.is_empty() || raw == "[]" {
            return HashMap::new();
        }
        match serde_json::from_str(raw) {
            Ok(entries) => entries,
            Err(err) => {
                error!(path = %self.path.display(), "Failed to parse login throttle file: {err}");
                HashMap::new()
            }
        }
    }

    fn save(
        &self,
        file: &mut File,
        entries: &HashMap<String, ThrottleEntry>,
    ) -> Result<(), ThrottleStoreError> {
        let json = serde_json::to_vec(entries)?;
        let rewrite = |file: &mut File| -> io::Result<()> {
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
            file.write_all(&json)?;
            file.flush()
        };
        rewrite(file).map_err(|err| self.io_error(err))
    }
}

impl ThrottleStore for FileThrottleStore {
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut Option<ThrottleEntry>),
    ) -> Result<(), ThrottleStoreError> {
        let mut file = self.open_locked()?;
        let mut entries = self.load(&mut file);
        if apply_update(&mut entries, key, apply) {
            self.save(&mut file, &entries)?;
        }
        Ok(())
    }

    fn retain(
        &self,
        keep: &mut dyn FnMut(&ThrottleEntry) -> bool,
    ) -> Result<usize, ThrottleStoreError> {
        let mut file = self.open_locked()?;
        let mut entries = self.load(&mut file);
        let before = entries.len();
        entries.retain(|_, entry| keep(entry));
        let removed = before - entries.len();
        if removed > 0 {
            self.save(&mut file, &entries)?;
        }
        Ok(removed)
    }
}
