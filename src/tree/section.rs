//! Lazily resolved section nodes.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, try_join_all};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use super::{Attachment, TreeError};
use crate::page::{PageResolver, RawRow, TableKind, resolve_href};

/// Where a section is in its one-time resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Nothing fetched yet, or the last attempt failed.
    Unresolved,
    /// A resolution is in flight.
    Resolving,
    /// Children and attachments are cached; no further requests will be made.
    Resolved,
}

#[derive(Debug)]
struct Resolved {
    attachments: Arc<[Attachment]>,
    subsections: Vec<Arc<Section>>,
}

/// A node in a course's content hierarchy.
///
/// The first call to [`attachments`](Self::attachments) or
/// [`subsections`](Self::subsections) fetches the section page, builds the
/// child nodes and resolves them concurrently. The result is cached for the
/// life of the node. Attachments come back descendants first (in the order
/// the subsections were discovered), followed by the section's own.
pub struct Section {
    name: String,
    url: String,
    base_url: String,
    parent: Weak<Section>,
    /// Urls from the root down to the parent, used to skip links that loop back.
    ancestors: Vec<String>,
    resolver: Arc<PageResolver>,
    resolved: OnceCell<Resolved>,
    resolving: AtomicBool,
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Clears the resolving flag when resolution ends, successfully or not.
struct ResolvingGuard<'a>(&'a AtomicBool);

impl<'a> ResolvingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Section {
    /// Creates an unresolved top-level section.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        base_url: impl Into<String>,
        resolver: Arc<PageResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            url: url.into(),
            base_url: base_url.into(),
            parent: Weak::new(),
            ancestors: Vec::new(),
            resolver,
            resolved: OnceCell::new(),
            resolving: AtomicBool::new(false),
        })
    }

    fn child(self: &Arc<Self>, name: String, url: String) -> Arc<Self> {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(self.url.clone());
        Arc::new(Self {
            name,
            url,
            base_url: self.base_url.clone(),
            parent: Arc::downgrade(self),
            ancestors,
            resolver: Arc::clone(&self.resolver),
            resolved: OnceCell::new(),
            resolving: AtomicBool::new(false),
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute url of the section page.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Base url of the course the section belongs to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The enclosing section, if it is still alive. Top-level sections have none.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Section>> {
        self.parent.upgrade()
    }

    /// Current resolution state.
    #[must_use]
    pub fn state(&self) -> ResolutionState {
        if self.resolved.initialized() {
            ResolutionState::Resolved
        } else if self.resolving.load(Ordering::SeqCst) {
            ResolutionState::Resolving
        } else {
            ResolutionState::Unresolved
        }
    }

    /// All attachments of this section and its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] if this or any descendant page cannot be fetched
    /// or parsed. The node stays unresolved so the call can be repeated.
    pub async fn attachments(self: &Arc<Self>) -> Result<Arc<[Attachment]>, TreeError> {
        self.resolve_boxed().await
    }

    /// Direct child sections, in page order.
    ///
    /// # Errors
    ///
    /// Same as [`attachments`](Self::attachments).
    pub async fn subsections(self: &Arc<Self>) -> Result<Vec<Arc<Section>>, TreeError> {
        let resolved = self.resolved.get_or_try_init(|| self.resolve_uncached()).await?;
        Ok(resolved.subsections.clone())
    }

    /// Boxed so resolution can recurse through children.
    fn resolve_boxed(self: &Arc<Self>) -> BoxFuture<'_, Result<Arc<[Attachment]>, TreeError>> {
        Box::pin(async move {
            let resolved = self.resolved.get_or_try_init(|| self.resolve_uncached()).await?;
            Ok(Arc::clone(&resolved.attachments))
        })
    }

    #[instrument(skip(self), fields(section = %self.name, url = %self.url))]
    async fn resolve_uncached(self: &Arc<Self>) -> Result<Resolved, TreeError> {
        let _guard = ResolvingGuard::enter(&self.resolving);
        let rows = self.resolver.fetch_rows(&self.url, TableKind::Threads).await?;

        let mut seen: HashSet<String> = self.ancestors.iter().cloned().collect();
        seen.insert(self.url.clone());

        let mut subsections = Vec::new();
        let mut own = Vec::new();
        for row in rows {
            match row {
                RawRow::SubsectionLink { name, href } => {
                    let url = resolve_href(&href, &self.url)
                        .ok_or_else(|| TreeError::invalid_href(&href, &self.url))?;
                    if self.ancestors.contains(&url) || url == self.url {
                        warn!(child = %name, child_url = %url, "skipping link back to an enclosing section");
                        continue;
                    }
                    if !seen.insert(url.clone()) {
                        debug!(child = %name, child_url = %url, "skipping duplicate subsection link");
                        continue;
                    }
                    subsections.push(self.child(name, url));
                }
                RawRow::Attachment {
                    name,
                    href,
                    kind_hint,
                    description,
                } => {
                    let url = resolve_href(&href, &self.url)
                        .ok_or_else(|| TreeError::invalid_href(&href, &self.url))?;
                    let attachment = Attachment::new(name, url, &kind_hint, &self.name, description)
                        .map_err(|e| TreeError::unsupported(&self.url, e))?;
                    own.push(attachment);
                }
            }
        }

        let nested = try_join_all(subsections.iter().map(Section::resolve_boxed)).await?;
        let attachments: Arc<[Attachment]> = nested
            .iter()
            .flat_map(|list| list.iter().cloned())
            .chain(own)
            .collect();

        debug!(
            subsections = subsections.len(),
            attachments = attachments.len(),
            "section resolved"
        );
        Ok(Resolved {
            attachments,
            subsections,
        })
    }
}
