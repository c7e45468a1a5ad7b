//! Discovery of the courses the logged-in user can access.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, instrument};

use super::{Course, TreeError};
use crate::page::PageResolver;

/// The "my courses" page of the Ariel portal.
pub const DEFAULT_CATALOG_URL: &str = "https://ariel.unimi.it/Offerta/myof";

/// The user's course list, fetched once.
#[derive(Debug)]
pub struct Catalog {
    url: String,
    resolver: Arc<PageResolver>,
    courses: OnceCell<Vec<Arc<Course>>>,
}

impl Catalog {
    /// Creates a catalog reading [`DEFAULT_CATALOG_URL`].
    #[must_use]
    pub fn new(resolver: Arc<PageResolver>) -> Self {
        Self::with_url(resolver, DEFAULT_CATALOG_URL)
    }

    /// Creates a catalog reading the given page.
    #[must_use]
    pub fn with_url(resolver: Arc<PageResolver>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolver,
            courses: OnceCell::new(),
        }
    }

    /// The catalog page url.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Courses listed on the catalog page, fetched on the first call and cached.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] if the page cannot be fetched or parsed.
    pub async fn courses(&self) -> Result<Vec<Arc<Course>>, TreeError> {
        let courses = self.courses.get_or_try_init(|| self.discover()).await?;
        Ok(courses.clone())
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn discover(&self) -> Result<Vec<Arc<Course>>, TreeError> {
        let entries = self.resolver.fetch_courses(&self.url).await?;
        info!(courses = entries.len(), "course catalog loaded");
        Ok(entries
            .into_iter()
            .map(|entry| Arc::new(Course::new(entry, Arc::clone(&self.resolver))))
            .collect())
    }
}
