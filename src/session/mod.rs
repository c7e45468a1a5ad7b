//! Authenticated session lifecycle.
//!
//! The [`SessionProvider`] logs in lazily, exactly once, and then hands the
//! same cookie-carrying [`Session`] to every page and file request. It is
//! constructed by the orchestrator and passed around explicitly; there is no
//! process-global session.
//!
//! # Example
//!
//! ```no_run
//! use unimi_dl::session::{Credentials, SessionConfig, SessionProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = SessionProvider::new(
//!     SessionConfig::default(),
//!     Credentials::new("name.surname@studenti.unimi.it", "secret"),
//! );
//! let session = provider.session().await?;
//! let body = session.client().get("https://ariel.unimi.it/").send().await?.text().await?;
//! println!("{} bytes", body.len());
//! # Ok(())
//! # }
//! ```

mod credentials;
mod error;
mod http_client;

pub use credentials::Credentials;
pub use error::AuthError;
pub use http_client::HttpTimeouts;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::Client;
use reqwest::cookie::Jar;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Ariel single sign-on endpoint.
pub const DEFAULT_LOGIN_URL: &str =
    "https://elearning.unimi.it/authentication/skin/portaleariel/login.aspx?url=https://ariel.unimi.it/";

/// Marker of the login form's password field. Its presence in the login
/// response means the portal rendered the form again, i.e. refused the login.
const LOGIN_FORM_MARKER: &str = "tbPassword";

/// Settings for establishing the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Login form endpoint.
    pub login_url: String,
    /// Client timeouts (unbounded by default).
    pub timeouts: HttpTimeouts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

/// An HTTP client plus the cookie jar holding the authentication state.
///
/// Cloning is cheap; clones share the connection pool and cookies.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    jar: Arc<Jar>,
}

impl Session {
    /// Builds a session that has not logged in. Useful for public pages and tests.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClientBuild`] if the client cannot be built.
    pub fn unauthenticated(timeouts: HttpTimeouts) -> Result<Self, AuthError> {
        let jar = Arc::new(Jar::default());
        let client = http_client::build_session_client(Arc::clone(&jar), timeouts)?;
        Ok(Self { client, jar })
    }

    /// The shared HTTP client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The cookie jar backing the client.
    #[must_use]
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }
}

/// Lazily authenticates once and reuses the resulting [`Session`].
#[derive(Debug)]
pub struct SessionProvider {
    config: SessionConfig,
    credentials: Credentials,
    session: OnceCell<Session>,
    handshakes: AtomicUsize,
}

impl SessionProvider {
    /// Creates a provider; no network activity happens until the first request.
    #[must_use]
    pub fn new(config: SessionConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
            session: OnceCell::new(),
            handshakes: AtomicUsize::new(0),
        }
    }

    /// Creates a provider that already holds `session` and will never log in.
    #[must_use]
    pub fn preauthenticated(session: Session) -> Self {
        Self {
            config: SessionConfig::default(),
            credentials: Credentials::new("", ""),
            session: OnceCell::new_with(Some(session)),
            handshakes: AtomicUsize::new(0),
        }
    }

    /// Returns the session, logging in with the provider's credentials on first use.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the login handshake fails.
    pub async fn session(&self) -> Result<Session, AuthError> {
        self.session_with(&self.credentials).await
    }

    /// Returns the session, logging in with `credentials` if none exists yet.
    ///
    /// Once a session exists the supplied credentials are ignored. Concurrent
    /// first callers wait on the same handshake; a failed handshake leaves the
    /// provider unauthenticated so a later call may try again.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the login handshake fails.
    pub async fn session_with(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        self.session
            .get_or_try_init(|| self.login(credentials))
            .await
            .cloned()
    }

    /// Returns true once a session has been established.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.initialized()
    }

    /// Number of login handshakes issued so far.
    #[must_use]
    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, credentials), fields(login_url = %self.config.login_url, email = %credentials.email))]
    async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let session = Session::unauthenticated(self.config.timeouts)?;
        let login_url = self.config.login_url.as_str();

        self.handshakes.fetch_add(1, Ordering::SeqCst);
        info!("logging in");

        let response = session
            .client
            .post(login_url)
            .form(&[
                ("hdnSilent", "true"),
                ("tbLogin", credentials.email.as_str()),
                ("tbPassword", credentials.password()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::network(login_url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "login endpoint returned an error status");
            return Err(AuthError::rejected(
                login_url,
                status.as_u16(),
                format!("HTTP {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(login_url, e))?;
        if body.contains(LOGIN_FORM_MARKER) {
            warn!("login form returned again; credentials refused");
            return Err(AuthError::rejected(
                login_url,
                status.as_u16(),
                "the login form was shown again",
            ));
        }

        debug!("login succeeded");
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default_points_at_ariel_login() {
        let config = SessionConfig::default();
        assert_eq!(config.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(config.timeouts, HttpTimeouts::default());
    }

    #[tokio::test]
    async fn test_preauthenticated_provider_never_logs_in() {
        let session = Session::unauthenticated(HttpTimeouts::default()).unwrap();
        let provider = SessionProvider::preauthenticated(session);

        assert!(provider.is_authenticated());
        provider.session().await.unwrap();
        provider
            .session_with(&Credentials::new("other", "creds"))
            .await
            .unwrap();
        assert_eq!(provider.handshake_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_login_is_network_error_and_stays_unauthenticated() {
        let config = SessionConfig {
            // Port 9 (discard) on localhost is closed in test environments.
            login_url: "http://127.0.0.1:9/login.aspx".to_string(),
            timeouts: HttpTimeouts::default(),
        };
        let provider = SessionProvider::new(config, Credentials::new("a", "b"));

        let err = provider.session().await.unwrap_err();
        assert!(matches!(err, AuthError::Network { .. }), "got {err:?}");
        assert!(!provider.is_authenticated());
        assert_eq!(provider.handshake_count(), 1);
    }
}
