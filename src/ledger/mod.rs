//! Persisted record of what has already been downloaded.
//!
//! The ledger maps each [`Platform`] to the set of attachment urls that were
//! fetched successfully (or recorded in dry-run mode). Re-running a download
//! consults it first, so a url is fetched at most once unless forced.
//!
//! Mutations only touch memory. [`DownloadLedger::save`] rewrites the whole
//! file through a temporary sibling and a rename, so a crash mid-write leaves
//! the previous file intact.
//!
//! # File format
//!
//! ```json
//! {
//!   "ariel": ["https://..."],
//!   "panopto": [],
//!   "msstream": []
//! }
//! ```
//!
//! Missing keys load as empty sets and unknown keys are ignored.
//!
//! # Example
//!
//! ```no_run
//! use unimi_dl::ledger::DownloadLedger;
//! use unimi_dl::platform::Platform;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = DownloadLedger::load("downloaded.json").await?;
//! if !ledger.is_downloaded(Platform::Ariel, "https://example.com/a.pdf").await {
//!     println!("not downloaded yet");
//! }
//! ledger.save().await?;
//! # Ok(())
//! # }
//! ```

mod error;

pub use error::LedgerError;

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};

use crate::fetch::{DownloadError, Fetchers};
use crate::platform::Platform;
use crate::tree::Attachment;

/// How the ledger file was found at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was read and parsed.
    Loaded,
    /// There was no file; the ledger starts empty.
    Missing,
    /// The file could not be parsed; the ledger starts empty.
    Corrupted {
        /// Parser error message.
        reason: String,
    },
}

/// Switches for [`DownloadLedger::record_attempt`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Record the url without fetching.
    pub dry_run: bool,
    /// Ignore an existing record.
    pub force: bool,
}

/// What [`DownloadLedger::record_attempt`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The url was already recorded; nothing was fetched.
    AlreadyDownloaded,
    /// The attachment was fetched to `path` and recorded.
    Recorded {
        /// Where the file was written.
        path: PathBuf,
    },
    /// The url was recorded without fetching.
    DryRun,
}

/// On-disk shape of the ledger.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    ariel: Vec<String>,
    #[serde(default)]
    panopto: Vec<String>,
    #[serde(default)]
    msstream: Vec<String>,
}

impl LedgerFile {
    fn slot(&mut self, platform: Platform) -> &mut Vec<String> {
        match platform {
            Platform::Ariel => &mut self.ariel,
            Platform::Panopto => &mut self.panopto,
            Platform::Msstream => &mut self.msstream,
        }
    }
}

type Entries = HashMap<Platform, HashSet<String>>;

/// Recorded urls plus the urls a caller is currently fetching.
#[derive(Debug)]
struct LedgerState {
    entries: Entries,
    in_flight: HashSet<(Platform, String)>,
}

impl LedgerState {
    fn with_entries(entries: Entries) -> Self {
        Self {
            entries,
            in_flight: HashSet::new(),
        }
    }

    fn contains(&self, platform: Platform, url: &str) -> bool {
        self.entries.get(&platform).is_some_and(|urls| urls.contains(url))
    }

    fn insert(&mut self, platform: Platform, url: &str) {
        self.entries.entry(platform).or_default().insert(url.to_string());
    }
}

/// Per-platform set of downloaded urls backed by a JSON file.
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    outcome: LoadOutcome,
    state: Mutex<LedgerState>,
    /// Signalled whenever an in-flight claim is released.
    released: Notify,
}

impl DownloadLedger {
    /// Creates an empty ledger that will be saved to `path`.
    #[must_use]
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self::with_state(path.into(), LoadOutcome::Missing, Entries::new())
    }

    fn with_state(path: PathBuf, outcome: LoadOutcome, entries: Entries) -> Self {
        Self {
            path,
            outcome,
            state: Mutex::new(LedgerState::with_entries(entries)),
            released: Notify::new(),
        }
    }

    /// Loads the ledger at `path`.
    ///
    /// A missing file yields an empty ledger (logged at info). A malformed
    /// file also yields an empty ledger (logged as a warning); see
    /// [`load_outcome`](Self::load_outcome).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Io`] if the file exists but cannot be read.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no ledger file yet, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(LedgerError::io(path, e)),
        };

        match serde_json::from_str::<LedgerFile>(&raw) {
            Ok(mut file) => {
                let entries: Entries = Platform::ALL
                    .into_iter()
                    .map(|platform| (platform, file.slot(platform).drain(..).collect()))
                    .collect();
                debug!(urls = entries.values().map(HashSet::len).sum::<usize>(), "ledger loaded");
                Ok(Self::with_state(path, LoadOutcome::Loaded, entries))
            }
            Err(e) => {
                warn!(error = %e, "ledger file is corrupted, starting from an empty ledger");
                Ok(Self::with_state(
                    path,
                    LoadOutcome::Corrupted { reason: e.to_string() },
                    Entries::new(),
                ))
            }
        }
    }

    /// Where the ledger is saved.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the file was found when the ledger was loaded.
    #[must_use]
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    /// Returns true if `url` is recorded for `platform`.
    pub async fn is_downloaded(&self, platform: Platform, url: &str) -> bool {
        self.state.lock().await.contains(platform, url)
    }

    /// Downloads `attachment` unless it is already recorded, then records it.
    ///
    /// - recorded and not `force`: returns [`RecordOutcome::AlreadyDownloaded`], fetches nothing
    /// - `dry_run`: records the url without fetching
    /// - otherwise: fetches with the fetcher for the attachment's file type and
    ///   records the url only if the fetch succeeds
    ///
    /// The fetch runs without holding the ledger lock. The url is claimed
    /// first, so a concurrent call for the same platform and url waits for
    /// this one and then behaves as if it ran afterwards. A failed fetch
    /// releases the claim without recording anything.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's [`DownloadError`]; the ledger is left unchanged.
    #[instrument(skip(self, attachment, fetchers, destination), fields(platform = %platform, url = %attachment.url()))]
    pub async fn record_attempt(
        &self,
        platform: Platform,
        attachment: &Attachment,
        fetchers: &Fetchers,
        destination: &Path,
        options: RecordOptions,
    ) -> Result<RecordOutcome, DownloadError> {
        let url = attachment.url();
        let claim = (platform, url.to_string());

        loop {
            // Registered before the check so a release in between is not missed.
            let released = self.released.notified();
            {
                let mut state = self.state.lock().await;
                if !state.in_flight.contains(&claim) {
                    if !options.force && state.contains(platform, url) {
                        debug!("already downloaded");
                        return Ok(RecordOutcome::AlreadyDownloaded);
                    }
                    if options.dry_run {
                        state.insert(platform, url);
                        info!(name = attachment.name(), "recorded without downloading");
                        return Ok(RecordOutcome::DryRun);
                    }
                    state.in_flight.insert(claim.clone());
                    break;
                }
            }
            debug!("waiting for a concurrent download of the same url");
            released.await;
        }

        let result = fetchers
            .for_file_type(attachment.file_type())
            .fetch(url, destination)
            .await;

        {
            let mut state = self.state.lock().await;
            state.in_flight.remove(&claim);
            if result.is_ok() {
                state.insert(platform, url);
            }
        }
        self.released.notify_waiters();

        let path = result?;
        info!(name = attachment.name(), path = %path.display(), "downloaded");
        Ok(RecordOutcome::Recorded { path })
    }

    /// Removes `url` from `platform`, returning true if it was recorded.
    pub async fn forget(&self, platform: Platform, url: &str) -> bool {
        let removed = self
            .state
            .lock()
            .await
            .entries
            .get_mut(&platform)
            .is_some_and(|urls| urls.remove(url));
        if removed {
            info!(platform = %platform, url, "removed from ledger");
        }
        removed
    }

    /// Recorded urls for `platform`, sorted.
    pub async fn urls(&self, platform: Platform) -> Vec<String> {
        let state = self.state.lock().await;
        let mut urls: Vec<String> = state
            .entries
            .get(&platform)
            .map(|urls| urls.iter().cloned().collect())
            .unwrap_or_default();
        urls.sort();
        urls
    }

    /// Total number of recorded urls across platforms.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.values().map(HashSet::len).sum()
    }

    /// Returns true if nothing is recorded.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Atomically rewrites the ledger file with the current contents.
    ///
    /// Writes a `.tmp` sibling, flushes it to disk, then renames it over the
    /// ledger. Parent directories are created as needed. The state lock is
    /// held throughout, so concurrent saves and mutations are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if serialization or any file operation fails.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn save(&self) -> Result<(), LedgerError> {
        let state = self.state.lock().await;
        let entries = &state.entries;

        let mut file = LedgerFile::default();
        for platform in Platform::ALL {
            let slot = file.slot(platform);
            if let Some(urls) = entries.get(&platform) {
                slot.extend(urls.iter().cloned());
            }
            slot.sort();
        }
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::io(parent, e))?;
        }

        let temp_path = self.temp_path();
        if let Err(e) = self.replace_with(&temp_path, &json).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        debug!(
            urls = entries.values().map(HashSet::len).sum::<usize>(),
            "ledger saved"
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes `json` to `temp_path`, flushes it, then renames it over the ledger.
    async fn replace_with(&self, temp_path: &Path, json: &[u8]) -> Result<(), LedgerError> {
        let mut out = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| LedgerError::io(temp_path, e))?;
        out.write_all(json)
            .await
            .map_err(|e| LedgerError::io(temp_path, e))?;
        out.sync_all()
            .await
            .map_err(|e| LedgerError::io(temp_path, e))?;
        drop(out);

        tokio::fs::rename(temp_path, &self.path)
            .await
            .map_err(|e| LedgerError::io(&self.path, e))
    }

    #[cfg(test)]
    async fn insert(&self, platform: Platform, url: &str) {
        self.state.lock().await.insert(platform, url);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = DownloadLedger::load(dir.path().join("downloaded.json")).await.unwrap();
        assert_eq!(ledger.load_outcome(), &LoadOutcome::Missing);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_ignores_unknown_keys_and_defaults_absent_ones() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");
        std::fs::write(&path, r#"{"ariel": ["u1"], "youtube": ["x"]}"#).unwrap();

        let ledger = DownloadLedger::load(&path).await.unwrap();
        assert_eq!(ledger.load_outcome(), &LoadOutcome::Loaded);
        assert!(ledger.is_downloaded(Platform::Ariel, "u1").await);
        assert!(ledger.urls(Platform::Panopto).await.is_empty());
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_forget_removes_only_that_platform() {
        let dir = TempDir::new().unwrap();
        let ledger = DownloadLedger::empty(dir.path().join("l.json"));
        ledger.insert(Platform::Ariel, "u").await;
        ledger.insert(Platform::Panopto, "u").await;

        assert!(ledger.forget(Platform::Ariel, "u").await);
        assert!(!ledger.forget(Platform::Ariel, "u").await);
        assert!(ledger.is_downloaded(Platform::Panopto, "u").await);
    }

    #[tokio::test]
    async fn test_save_writes_sorted_arrays_for_every_platform() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("downloaded.json");
        let ledger = DownloadLedger::empty(&path);
        ledger.insert(Platform::Ariel, "u2").await;
        ledger.insert(Platform::Ariel, "u1").await;
        ledger.save().await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["ariel"], serde_json::json!(["u1", "u2"]));
        assert_eq!(saved["panopto"], serde_json::json!([]));
        assert_eq!(saved["msstream"], serde_json::json!([]));
        assert!(!dir.path().join("nested").join("downloaded.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_failed_save_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloaded.json");
        // a non-empty directory where the ledger file should go makes the rename fail
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let ledger = DownloadLedger::empty(&path);
        ledger.insert(Platform::Ariel, "u").await;
        let err = ledger.save().await.unwrap_err();

        assert!(matches!(err, LedgerError::Io { .. }), "got {err:?}");
        assert!(!dir.path().join("downloaded.json.tmp").exists());
        assert!(ledger.is_downloaded(Platform::Ariel, "u").await);
    }
}
