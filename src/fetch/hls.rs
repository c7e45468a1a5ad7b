//! HLS (`manifest.m3u8`) video downloads.
//!
//! Ariel streams lecture recordings as HLS. A manifest is either a master
//! playlist listing renditions or a media playlist listing MPEG-TS segments.
//! The fetcher follows the highest-bandwidth rendition and concatenates its
//! segments, in order, into a single `.ts` file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use super::filename::with_suffix;
use super::{DownloadError, Fetcher, get_checked, prepare_parent, promote, with_retries};
use crate::page::resolve_href;
use crate::retry::RetryPolicy;
use crate::session::SessionProvider;

const HEADER: &str = "#EXTM3U";
const STREAM_INF: &str = "#EXT-X-STREAM-INF:";
const KEY: &str = "#EXT-X-KEY:";

/// A rendition listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Variant {
    pub bandwidth: u64,
    pub uri: String,
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Playlist {
    /// Renditions to choose from.
    Master(Vec<Variant>),
    /// Segment uris in playback order.
    Media(Vec<String>),
}

impl Playlist {
    /// Parses an m3u8 body. Uris are returned as written.
    pub(crate) fn parse(body: &str) -> Result<Self, String> {
        let mut lines = body
            .trim_start_matches('\u{feff}')
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        if lines.next() != Some(HEADER) {
            return Err(format!("missing {HEADER} header"));
        }

        let mut variants = Vec::new();
        let mut segments = Vec::new();
        let mut pending_bandwidth: Option<u64> = None;

        for line in lines {
            if let Some(attributes) = line.strip_prefix(STREAM_INF) {
                let bandwidth = attribute(attributes, "BANDWIDTH").and_then(|v| v.parse().ok());
                pending_bandwidth = Some(bandwidth.unwrap_or(0));
            } else if let Some(attributes) = line.strip_prefix(KEY) {
                let method = attribute(attributes, "METHOD").unwrap_or("NONE");
                if !method.eq_ignore_ascii_case("NONE") {
                    return Err(format!("encrypted stream ({method}) is not supported"));
                }
            } else if line.starts_with('#') {
                // other tags carry nothing we need
            } else if let Some(bandwidth) = pending_bandwidth.take() {
                variants.push(Variant {
                    bandwidth,
                    uri: line.to_string(),
                });
            } else {
                segments.push(line.to_string());
            }
        }

        if variants.is_empty() {
            Ok(Self::Media(segments))
        } else {
            Ok(Self::Master(variants))
        }
    }
}

/// Picks the highest-bandwidth rendition; the first one wins ties.
pub(crate) fn best_variant(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .reduce(|best, candidate| if candidate.bandwidth > best.bandwidth { candidate } else { best })
}

fn attribute<'a>(attributes: &'a str, name: &str) -> Option<&'a str> {
    attributes.split(',').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"'))
    })
}

/// Downloads HLS streams through the shared session.
#[derive(Debug, Clone)]
pub struct HlsFetcher {
    sessions: Arc<SessionProvider>,
    retry_policy: RetryPolicy,
}

impl HlsFetcher {
    /// Creates a fetcher with the default retry policy.
    #[must_use]
    pub fn new(sessions: Arc<SessionProvider>) -> Self {
        Self {
            sessions,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy used for manifests and segments.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn get_text(&self, client: &reqwest::Client, url: &str) -> Result<String, DownloadError> {
        with_retries(&self.retry_policy, url, move || async move {
            get_checked(client, url)
                .await?
                .text()
                .await
                .map_err(|e| DownloadError::network(url, e))
        })
        .await
    }

    /// Follows at most one master playlist and returns absolute segment urls.
    async fn segment_urls(&self, client: &reqwest::Client, url: &str) -> Result<Vec<String>, DownloadError> {
        let mut playlist_url = url.to_string();
        for _ in 0..2 {
            let body = self.get_text(client, &playlist_url).await?;
            match Playlist::parse(&body).map_err(|reason| DownloadError::playlist(&playlist_url, reason))? {
                Playlist::Master(variants) => {
                    let variant = best_variant(&variants)
                        .ok_or_else(|| DownloadError::playlist(&playlist_url, "no renditions"))?;
                    debug!(bandwidth = variant.bandwidth, "selected rendition");
                    playlist_url = resolve_href(&variant.uri, &playlist_url)
                        .ok_or_else(|| DownloadError::invalid_url(&variant.uri))?;
                }
                Playlist::Media(segments) => {
                    if segments.is_empty() {
                        return Err(DownloadError::playlist(&playlist_url, "no segments"));
                    }
                    return segments
                        .iter()
                        .map(|segment| {
                            resolve_href(segment, &playlist_url)
                                .ok_or_else(|| DownloadError::invalid_url(segment))
                        })
                        .collect();
                }
            }
        }
        Err(DownloadError::playlist(url, "nested master playlists"))
    }

    async fn write_segments(
        &self,
        client: &reqwest::Client,
        segments: &[String],
        part: &Path,
    ) -> Result<u64, DownloadError> {
        let file = File::create(part)
            .await
            .map_err(|e| DownloadError::io(part, e))?;
        let mut writer = BufWriter::new(file);
        let mut bytes_written: u64 = 0;

        for segment in segments {
            let bytes = with_retries(&self.retry_policy, segment, move || async move {
                get_checked(client, segment)
                    .await?
                    .bytes()
                    .await
                    .map_err(|e| DownloadError::network(segment, e))
            })
            .await?;
            writer
                .write_all(&bytes)
                .await
                .map_err(|e| DownloadError::io(part, e))?;
            bytes_written += bytes.len() as u64;
        }

        writer.flush().await.map_err(|e| DownloadError::io(part, e))?;
        Ok(bytes_written)
    }
}

#[async_trait]
impl Fetcher for HlsFetcher {
    #[instrument(skip(self), fields(url = %url, destination = %destination.display()))]
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf, DownloadError> {
        let session = self.sessions.session().await?;
        prepare_parent(destination).await?;

        let segments = self.segment_urls(session.client(), url).await?;
        info!(segments = segments.len(), "downloading stream");

        let part = with_suffix(destination, ".part");
        match self.write_segments(session.client(), &segments, &part).await {
            Ok(bytes) => {
                promote(&part, destination).await?;
                debug!(bytes, "stream downloaded");
                Ok(destination.to_path_buf())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}
