//! Errors raised while resolving the course tree.

use thiserror::Error;

use super::UnsupportedFileTypeError;
use crate::page::PageError;

/// Errors from tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Fetching or parsing a page failed.
    #[error(transparent)]
    Page(#[from] PageError),

    /// A row described an attachment of an unknown media kind.
    #[error("in section {section_url}: {source}")]
    UnsupportedFileType {
        /// Url of the section page the row came from.
        section_url: String,
        /// The rejected hint.
        #[source]
        source: UnsupportedFileTypeError,
    },

    /// A row's href could not be resolved into an absolute url.
    #[error("cannot resolve link '{href}' found on {page_url}")]
    InvalidHref {
        /// The href as written in the page.
        href: String,
        /// The page it appeared on.
        page_url: String,
    },
}

impl TreeError {
    /// Wraps an unsupported file type with the section it was found in.
    pub fn unsupported(section_url: impl Into<String>, source: UnsupportedFileTypeError) -> Self {
        Self::UnsupportedFileType {
            section_url: section_url.into(),
            source,
        }
    }

    /// Creates an unresolvable-href error.
    pub fn invalid_href(href: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self::InvalidHref {
            href: href.into(),
            page_url: page_url.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Page(page) => page.is_transient(),
            Self::UnsupportedFileType { .. } | Self::InvalidHref { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message_names_section_and_source() {
        let err = TreeError::unsupported(
            "https://c.example/v5/frm3/ThreadList.aspx?fc=3",
            UnsupportedFileTypeError {
                hint: "quiz".to_string(),
                name: "Quiz 1".to_string(),
            },
        );
        assert!(err.to_string().contains("fc=3"));
        assert!(err.to_string().contains("'quiz'"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_page_transient_is_transient() {
        let err = TreeError::from(PageError::transient("u", Some(503), "HTTP 503"));
        assert!(err.is_transient());
    }
}
