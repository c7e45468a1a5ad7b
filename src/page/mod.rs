//! Page fetching and structural extraction.
//!
//! [`PageResolver`] turns a page url into typed [`RawRow`]s: it fetches the
//! body through the shared [`SessionProvider`], retries transient failures,
//! and hands the markup to a [`PageParser`]. It never performs tree logic
//! itself, and the parser can be swapped without touching the tree.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use unimi_dl::page::{ArielPageParser, PageResolver, TableKind};
//! use unimi_dl::session::{Credentials, SessionConfig, SessionProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = Arc::new(SessionProvider::new(
//!     SessionConfig::default(),
//!     Credentials::new("name.surname@studenti.unimi.it", "secret"),
//! ));
//! let resolver = PageResolver::new(sessions, Arc::new(ArielPageParser::new()));
//! let rows = resolver
//!     .fetch_rows("https://corso.ariel.ctu.unimi.it/v5/frm3/ThreadList.aspx?fc=1", TableKind::Threads)
//!     .await?;
//! println!("{} rows", rows.len());
//! # Ok(())
//! # }
//! ```

mod ariel;
mod error;
mod markup;

pub use ariel::ArielPageParser;
pub use error::{PageError, StructuralParseError};
pub use markup::resolve_href;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::retry::{RetryDecision, RetryPolicy};
use crate::session::SessionProvider;

/// Default cap on page fetches in flight at once.
pub const DEFAULT_MAX_CONCURRENT_PAGES: usize = 4;

/// Which table a page is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// A course's top-level section list.
    Contents,
    /// A section page: links to sub-rooms and posts with attachments.
    Threads,
}

/// One row extracted from a page, discriminated by what it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRow {
    /// A link to a nested section.
    SubsectionLink {
        /// Display name.
        name: String,
        /// Href as written in the page, possibly relative.
        href: String,
    },
    /// A downloadable item.
    Attachment {
        /// Display name.
        name: String,
        /// Href as written in the page, possibly relative.
        href: String,
        /// Media kind as reported by the parser (see [`crate::tree::FileType::from_hint`]).
        kind_hint: String,
        /// Free text from the post the item was attached to.
        description: String,
    },
}

/// A course listed in the catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseEntry {
    /// Course title.
    pub name: String,
    /// Teacher names in page order.
    pub teachers: Vec<String>,
    /// Absolute url of the course site.
    pub url: String,
    /// Edition label (e.g. academic year), empty when the page has none.
    pub edition: String,
}

/// Extracts rows from page markup.
///
/// Implementations must return [`StructuralParseError`] when the expected
/// table is absent; an empty `Vec` means the table exists and has no rows.
pub trait PageParser: Send + Sync {
    /// Parses the rows of the table selected by `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralParseError`] if the page does not contain that table.
    fn parse_rows(&self, body: &str, kind: TableKind) -> Result<Vec<RawRow>, StructuralParseError>;

    /// Parses the course catalog page.
    ///
    /// # Errors
    ///
    /// Returns [`StructuralParseError`] if the page does not contain the course list.
    fn parse_courses(&self, body: &str) -> Result<Vec<CourseEntry>, StructuralParseError>;
}

/// Fetches pages through the shared session and parses them.
pub struct PageResolver {
    sessions: Arc<SessionProvider>,
    parser: Arc<dyn PageParser>,
    retry_policy: RetryPolicy,
    permits: Semaphore,
    requests: AtomicUsize,
}

impl std::fmt::Debug for PageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageResolver")
            .field("retry_policy", &self.retry_policy)
            .field("available_permits", &self.permits.available_permits())
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

impl PageResolver {
    /// Creates a resolver with the default retry policy and page concurrency.
    #[must_use]
    pub fn new(sessions: Arc<SessionProvider>, parser: Arc<dyn PageParser>) -> Self {
        Self {
            sessions,
            parser,
            retry_policy: RetryPolicy::default(),
            permits: Semaphore::new(DEFAULT_MAX_CONCURRENT_PAGES),
            requests: AtomicUsize::new(0),
        }
    }

    /// Replaces the retry policy for transient failures.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Caps page fetches in flight at once (at least 1).
    #[must_use]
    pub fn with_max_concurrent_pages(mut self, max: usize) -> Self {
        self.permits = Semaphore::new(max.max(1));
        self
    }

    /// The session provider this resolver authenticates through.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionProvider> {
        &self.sessions
    }

    /// Number of HTTP requests issued for pages, retries included.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Fetches `url` and parses the table selected by `kind`.
    ///
    /// # Errors
    ///
    /// - [`PageError::Session`] if logging in fails
    /// - [`PageError::Transient`] once retries are exhausted
    /// - [`PageError::AuthRequired`] / [`PageError::HttpStatus`] on error statuses
    /// - [`PageError::Structural`] if the expected table is missing
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_rows(&self, url: &str, kind: TableKind) -> Result<Vec<RawRow>, PageError> {
        let body = self.fetch_body(url).await?;
        let rows = self
            .parser
            .parse_rows(&body, kind)
            .map_err(|e| PageError::structural(url, e))?;
        debug!(rows = rows.len(), ?kind, "page parsed");
        Ok(rows)
    }

    /// Fetches the catalog page at `url` and parses the listed courses.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_rows`](Self::fetch_rows).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_courses(&self, url: &str) -> Result<Vec<CourseEntry>, PageError> {
        let body = self.fetch_body(url).await?;
        let courses = self
            .parser
            .parse_courses(&body)
            .map_err(|e| PageError::structural(url, e))?;
        debug!(courses = courses.len(), "catalog parsed");
        Ok(courses)
    }

    async fn fetch_body(&self, url: &str) -> Result<String, PageError> {
        let session = self.sessions.session().await?;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| PageError::transient(url, None, "page limiter closed"))?;
                self.get_once(session.client(), url).await
            };

            let error = match result {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match self.retry_policy.should_retry(error.failure_type(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url,
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying page fetch"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying page fetch");
                    return Err(match error {
                        PageError::Transient {
                            url, status, reason, ..
                        } => PageError::Transient {
                            url,
                            status,
                            reason,
                            attempts: attempt,
                        },
                        other => other,
                    });
                }
            }
        }
    }

    async fn get_once(&self, client: &reqwest::Client, url: &str) -> Result<String, PageError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| PageError::transient(url, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PageError::from_status(url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| PageError::transient(url, None, format!("reading body: {e}")))
    }
}
