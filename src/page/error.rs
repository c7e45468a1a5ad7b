//! Error types for page fetching and parsing.

use thiserror::Error;

use crate::retry::{FailureType, classify_http_status};
use crate::session::AuthError;

/// The markup of a page no longer matches what the parser expects.
///
/// Raised instead of returning an empty result so that upstream layout changes
/// are noticed rather than showing up as "no content".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected} not found: {reason}")]
pub struct StructuralParseError {
    /// What the parser was looking for (e.g. "contents table").
    pub expected: String,
    /// What went wrong.
    pub reason: String,
}

impl StructuralParseError {
    /// Creates a structural parse error.
    pub fn new(expected: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while fetching and parsing a page.
#[derive(Debug, Error)]
pub enum PageError {
    /// Network-level or server-side failure that persisted across all attempts.
    #[error("transient failure fetching {url} after {attempts} attempt(s): {reason}")]
    Transient {
        /// The page URL.
        url: String,
        /// HTTP status when the failure was a response (408, 429, 5xx).
        status: Option<u16>,
        /// Description of the last failure.
        reason: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The server answered with a non-retryable error status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The page URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The session is not allowed to see the page.
    #[error(
        "[AUTH] HTTP {status} fetching {url}\n  Suggestion: Check that your account is enrolled in this course"
    )]
    AuthRequired {
        /// The page URL.
        url: String,
        /// The HTTP status code (401 or 403).
        status: u16,
    },

    /// The page layout no longer matches the parser.
    #[error("unexpected page structure at {url}: {source}")]
    Structural {
        /// The page URL.
        url: String,
        /// What the parser could not find.
        #[source]
        source: StructuralParseError,
    },

    /// The session could not be established.
    #[error(transparent)]
    Session(#[from] AuthError),
}

impl PageError {
    /// Creates a single-attempt transient error.
    pub fn transient(url: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.into(),
            status,
            reason: reason.into(),
            attempts: 1,
        }
    }

    /// Maps a response status to the matching error variant.
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        match classify_http_status(status) {
            FailureType::NeedsAuth => Self::AuthRequired { url, status },
            FailureType::Transient | FailureType::RateLimited => {
                Self::transient(url, Some(status), format!("HTTP {status}"))
            }
            FailureType::Permanent => Self::HttpStatus { url, status },
        }
    }

    /// Attaches the page URL to a parser error.
    pub fn structural(url: impl Into<String>, source: StructuralParseError) -> Self {
        Self::Structural {
            url: url.into(),
            source,
        }
    }

    /// Classifies this error for retry decisions.
    #[must_use]
    pub fn failure_type(&self) -> FailureType {
        match self {
            Self::Transient { status: Some(status), .. } => classify_http_status(*status),
            Self::Transient { status: None, .. } => FailureType::Transient,
            Self::HttpStatus { .. } | Self::Structural { .. } => FailureType::Permanent,
            Self::AuthRequired { .. } | Self::Session(_) => FailureType::NeedsAuth,
        }
    }

    /// Returns true if a caller-level retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.failure_type().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_to_variants() {
        assert!(matches!(
            PageError::from_status("u", 403),
            PageError::AuthRequired { status: 403, .. }
        ));
        assert!(matches!(
            PageError::from_status("u", 404),
            PageError::HttpStatus { status: 404, .. }
        ));
        assert!(matches!(
            PageError::from_status("u", 503),
            PageError::Transient { status: Some(503), attempts: 1, .. }
        ));
        assert!(matches!(
            PageError::from_status("u", 429),
            PageError::Transient { status: Some(429), .. }
        ));
    }

    #[test]
    fn test_failure_type_distinguishes_retryable_from_fatal() {
        assert_eq!(
            PageError::transient("u", None, "reset").failure_type(),
            FailureType::Transient
        );
        assert_eq!(
            PageError::from_status("u", 429).failure_type(),
            FailureType::RateLimited
        );
        let structural =
            PageError::structural("u", StructuralParseError::new("contents table", "no <tbody>"));
        assert_eq!(structural.failure_type(), FailureType::Permanent);
        assert!(!structural.is_transient());
        assert!(
            !PageError::from(AuthError::client_build("x")).is_transient(),
            "session failures are fatal"
        );
    }

    #[test]
    fn test_structural_message_names_url_and_expectation() {
        let err = PageError::structural(
            "https://ariel.example/v5/frm3/ThreadList.aspx",
            StructuralParseError::new("thread list", "no arielThreadList table"),
        );
        let msg = err.to_string();
        assert!(msg.contains("ThreadList.aspx"));
        let source = std::error::Error::source(&err).map(ToString::to_string).unwrap_or_default();
        assert!(source.contains("thread list"));
    }
}
