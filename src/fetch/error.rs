//! Error types for byte transfers.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::{FailureType, classify_http_status, classify_transport_error};
use crate::session::AuthError;

/// Errors that can occur while downloading an attachment.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A streaming manifest could not be turned into a segment list.
    #[error("unusable playlist at {url}: {reason}")]
    Playlist {
        /// The playlist URL.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The session could not be established.
    #[error(transparent)]
    Session(#[from] AuthError),
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a playlist error.
    pub fn playlist(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Playlist {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Classifies a download error to decide whether it is worth retrying.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Network { source, .. } => classify_transport_error(source),
        DownloadError::Session(_) => FailureType::NeedsAuth,
        DownloadError::Io { .. } | DownloadError::InvalidUrl { .. } | DownloadError::Playlist { .. } => {
            FailureType::Permanent
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.pdf", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/file.pdf"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_classify_error_by_status() {
        assert_eq!(
            classify_error(&DownloadError::http_status("u", 503)),
            FailureType::Transient
        );
        assert_eq!(
            classify_error(&DownloadError::http_status("u", 404)),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::http_status("u", 403)),
            FailureType::NeedsAuth
        );
    }

    #[test]
    fn test_classify_error_local_failures_are_permanent() {
        let io = DownloadError::io("/tmp/x", std::io::Error::other("disk full"));
        assert_eq!(classify_error(&io), FailureType::Permanent);
        assert_eq!(
            classify_error(&DownloadError::playlist("u", "no segments")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::from(AuthError::client_build("x"))),
            FailureType::NeedsAuth
        );
    }
}
