//! Whole-file downloads over a single GET.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::filename::with_suffix;
use super::{DownloadError, Fetcher, get_checked, prepare_parent, promote, with_retries};
use crate::retry::RetryPolicy;
use crate::session::SessionProvider;

/// Streams a response body to disk through the shared session.
#[derive(Debug, Clone)]
pub struct GenericFetcher {
    sessions: Arc<SessionProvider>,
    retry_policy: RetryPolicy,
}

impl GenericFetcher {
    /// Creates a fetcher with the default retry policy.
    #[must_use]
    pub fn new(sessions: Arc<SessionProvider>) -> Self {
        Self {
            sessions,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn download_once(
        &self,
        client: &reqwest::Client,
        url: &str,
        destination: &Path,
    ) -> Result<u64, DownloadError> {
        let response = get_checked(client, url).await?;
        let part = with_suffix(destination, ".part");
        let mut file = File::create(&part)
            .await
            .map_err(|e| DownloadError::io(&part, e))?;

        match stream_to_file(&mut file, response, url, &part).await {
            Ok(bytes) => {
                drop(file);
                promote(&part, destination).await?;
                Ok(bytes)
            }
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Fetcher for GenericFetcher {
    #[instrument(skip(self), fields(url = %url, destination = %destination.display()))]
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, DownloadError> {
        let session = self.sessions.session().await?;
        prepare_parent(destination).await?;

        let client = session.client();
        let bytes = with_retries(&self.retry_policy, url, move || {
            self.download_once(client, url, destination)
        })
        .await?;

        debug!(bytes, "file downloaded");
        Ok(destination.to_path_buf())
    }
}

/// Streams the response body to `file`, returning bytes written.
pub(super) async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
