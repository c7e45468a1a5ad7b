//! Byte transfer for attachments.
//!
//! Two [`Fetcher`]s cover the two [`FileType`]s: [`HlsFetcher`] for streamed
//! videos and [`GenericFetcher`] for plain files. [`Fetchers`] holds one of
//! each and picks by file type with an exhaustive match, so a new file type
//! does not compile until it has a fetcher.
//!
//! Both fetchers write to a `.part` sibling and rename it over the
//! destination once the transfer completes. There is no resume; a failed
//! transfer leaves nothing behind.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use unimi_dl::fetch::{Fetcher, Fetchers};
//! use unimi_dl::session::{Credentials, SessionConfig, SessionProvider};
//! use unimi_dl::tree::FileType;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = Arc::new(SessionProvider::new(
//!     SessionConfig::default(),
//!     Credentials::new("name.surname@studenti.unimi.it", "secret"),
//! ));
//! let fetchers = Fetchers::for_session(sessions);
//! let path = fetchers
//!     .for_file_type(FileType::Document)
//!     .fetch("https://corso.ariel.ctu.unimi.it/v5/frm3/Download.aspx?id=1", Path::new("./out/slides.pdf"))
//!     .await?;
//! println!("saved {}", path.display());
//! # Ok(())
//! # }
//! ```

mod error;
mod filename;
mod generic;
mod hls;

pub use error::{DownloadError, classify_error};
pub use generic::GenericFetcher;
pub use hls::HlsFetcher;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::retry::{RetryDecision, RetryPolicy};
use crate::session::SessionProvider;
use crate::tree::{Attachment, FileType};

/// Extension given to downloaded video streams.
pub const VIDEO_EXTENSION: &str = "ts";

/// Retrieves the bytes behind a url.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads `url` to `destination`, returning the path written.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] if the transfer fails; nothing is left at
    /// `destination` in that case.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, DownloadError>;
}

/// One fetcher per [`FileType`].
#[derive(Clone)]
pub struct Fetchers {
    /// Fetcher for [`FileType::Video`].
    pub media: Arc<dyn Fetcher>,
    /// Fetcher for [`FileType::Document`].
    pub generic: Arc<dyn Fetcher>,
}

impl std::fmt::Debug for Fetchers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetchers").finish_non_exhaustive()
    }
}

impl Fetchers {
    /// Groups the given fetchers.
    #[must_use]
    pub fn new(media: Arc<dyn Fetcher>, generic: Arc<dyn Fetcher>) -> Self {
        Self { media, generic }
    }

    /// The HLS and generic fetchers, both authenticated through `sessions`.
    #[must_use]
    pub fn for_session(sessions: Arc<SessionProvider>) -> Self {
        Self::for_session_with_retry(sessions, &RetryPolicy::default())
    }

    /// Like [`for_session`](Self::for_session) with a custom retry policy.
    #[must_use]
    pub fn for_session_with_retry(sessions: Arc<SessionProvider>, retry_policy: &RetryPolicy) -> Self {
        Self {
            media: Arc::new(HlsFetcher::new(Arc::clone(&sessions)).with_retry_policy(retry_policy.clone())),
            generic: Arc::new(GenericFetcher::new(sessions).with_retry_policy(retry_policy.clone())),
        }
    }

    /// The fetcher registered for `file_type`.
    #[must_use]
    pub fn for_file_type(&self, file_type: FileType) -> &dyn Fetcher {
        match file_type {
            FileType::Video => self.media.as_ref(),
            FileType::Document => self.generic.as_ref(),
        }
    }
}

/// Where `attachment` is saved below `output_dir`.
///
/// Files go into a directory named after the attachment's section. Videos get
/// a `.ts` extension. An existing file is never overwritten; a `_N` suffix is
/// added instead.
#[must_use]
pub fn destination_for(output_dir: &Path, attachment: &Attachment) -> PathBuf {
    let dir = output_dir.join(filename::sanitize_filename(attachment.section_name()));
    let name = filename::sanitize_filename(attachment.name());
    let file_name = match attachment.file_type() {
        FileType::Video => format!("{name}.{VIDEO_EXTENSION}"),
        FileType::Document => name,
    };
    filename::resolve_unique_path(&dir, &file_name)
}

/// Sanitizes a name for use as a single path component.
#[must_use]
pub fn sanitize_component(name: &str) -> String {
    filename::sanitize_filename(name)
}

async fn get_checked(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, DownloadError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DownloadError::network(url, e))?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(DownloadError::http_status(url, status.as_u16()))
    }
}

async fn prepare_parent(destination: &Path) -> Result<(), DownloadError> {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e)),
        _ => Ok(()),
    }
}

async fn promote(part: &Path, destination: &Path) -> Result<(), DownloadError> {
    tokio::fs::rename(part, destination)
        .await
        .map_err(|e| DownloadError::io(destination, e))
}

/// Runs `operation` until it succeeds or `policy` gives up.
async fn with_retries<T, F, Fut>(policy: &RetryPolicy, url: &str, mut operation: F) -> Result<T, DownloadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => match policy.should_retry(classify_error(&e), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying download"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying download");
                    return Err(e);
                }
            },
        }
    }
}
