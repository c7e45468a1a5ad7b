//! Course root aggregate.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::{Attachment, Section, TreeError};
use crate::page::{CourseEntry, PageResolver, RawRow, TableKind, resolve_href};

/// Path of the contents page below a course's base url.
const CONTENTS_PATH: &str = "v5/frm3/ThreadList.aspx?name=contenuti";

/// One offering of a course and its lazily discovered sections.
#[derive(Debug)]
pub struct Course {
    name: String,
    teachers: Vec<String>,
    base_url: String,
    edition: String,
    resolver: Arc<PageResolver>,
    sections: OnceCell<Vec<Arc<Section>>>,
}

impl Course {
    /// Builds a course from a catalog entry. Nothing is fetched yet.
    #[must_use]
    pub fn new(entry: CourseEntry, resolver: Arc<PageResolver>) -> Self {
        Self {
            name: entry.name,
            teachers: entry.teachers,
            base_url: entry.url.trim_end_matches('/').to_string(),
            edition: entry.edition,
            resolver,
            sections: OnceCell::new(),
        }
    }

    /// Course title.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Teacher names.
    #[must_use]
    pub fn teachers(&self) -> &[String] {
        &self.teachers
    }

    /// Course site url without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Edition label.
    #[must_use]
    pub fn edition(&self) -> &str {
        &self.edition
    }

    /// Url of the page listing the top-level sections.
    #[must_use]
    pub fn contents_url(&self) -> String {
        format!("{}/{CONTENTS_PATH}", self.base_url)
    }

    /// Top-level sections, fetched on the first call and cached.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] if the contents page cannot be fetched or parsed.
    pub async fn sections(&self) -> Result<Vec<Arc<Section>>, TreeError> {
        let sections = self.sections.get_or_try_init(|| self.discover_sections()).await?;
        Ok(sections.clone())
    }

    /// Attachments of every section whose name contains `section_filter`
    /// (case-insensitive), or of all sections when no filter is given.
    ///
    /// Sections are resolved concurrently; the result keeps section order.
    ///
    /// # Errors
    ///
    /// Returns the first [`TreeError`] raised while resolving a selected section.
    pub async fn attachments(&self, section_filter: Option<&str>) -> Result<Vec<Attachment>, TreeError> {
        let sections = self.sections().await?;
        let needle = section_filter.map(str::to_lowercase);
        let selected: Vec<_> = sections
            .iter()
            .filter(|section| {
                needle
                    .as_deref()
                    .is_none_or(|needle| section.name().to_lowercase().contains(needle))
            })
            .collect();

        let lists = try_join_all(selected.iter().map(|section| section.attachments())).await?;
        Ok(lists.iter().flat_map(|list| list.iter().cloned()).collect())
    }

    #[instrument(skip(self), fields(course = %self.name))]
    async fn discover_sections(&self) -> Result<Vec<Arc<Section>>, TreeError> {
        let contents_url = self.contents_url();
        let rows = self.resolver.fetch_rows(&contents_url, TableKind::Contents).await?;

        let mut seen = HashSet::new();
        let mut sections = Vec::with_capacity(rows.len());
        for row in rows {
            let RawRow::SubsectionLink { name, href } = row else {
                debug!("ignoring non-link row on contents page");
                continue;
            };
            let url = resolve_href(&href, &contents_url)
                .ok_or_else(|| TreeError::invalid_href(&href, &contents_url))?;
            if seen.insert(url.clone()) {
                sections.push(Section::new(name, url, &self.base_url, Arc::clone(&self.resolver)));
            }
        }

        debug!(sections = sections.len(), "course sections discovered");
        Ok(sections)
    }
}
