//! Error types for session establishment.

use thiserror::Error;

/// Errors raised while establishing the authenticated session.
///
/// None of these are retried: wrong or stale credentials do not fix themselves,
/// so the whole run stops and the user is told why.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The login endpoint answered but refused the credentials.
    #[error("login rejected by {url}: {reason}\n  Suggestion: Check the email and password")]
    Rejected {
        /// The login URL that was contacted.
        url: String,
        /// HTTP status of the login response.
        status: u16,
        /// What signalled the rejection.
        reason: String,
    },

    /// The login endpoint could not be reached.
    #[error("network error during login to {url}: {source}")]
    Network {
        /// The login URL that was contacted.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client itself could not be built.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild {
        /// Why construction failed.
        reason: String,
    },
}

impl AuthError {
    /// Creates a `Rejected` error.
    pub fn rejected(url: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        Self::Rejected {
            url: url.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Creates a `Network` error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a `ClientBuild` error.
    pub fn client_build(reason: impl Into<String>) -> Self {
        Self::ClientBuild {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message_names_url_and_reason() {
        let err = AuthError::rejected("https://login.example/", 200, "login form shown again");
        let msg = err.to_string();
        assert!(msg.contains("https://login.example/"));
        assert!(msg.contains("login form shown again"));
        assert!(msg.contains("Suggestion"));
    }

    #[test]
    fn test_client_build_message() {
        let err = AuthError::client_build("proxy lookup panicked");
        assert!(err.to_string().contains("proxy lookup panicked"));
    }
}
