//! Leaf content items and their media kinds.

use std::fmt;

use thiserror::Error;

/// Kind hint the page parser reports for streamed videos.
pub const KIND_HINT_VIDEO: &str = "video";

/// Kind hint the page parser reports for downloadable files.
pub const KIND_HINT_DOCUMENT: &str = "document";

/// The parser reported a media kind with no matching [`FileType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported file type '{hint}' for attachment '{name}'")]
pub struct UnsupportedFileTypeError {
    /// The hint as reported by the parser.
    pub hint: String,
    /// Name of the attachment that carried it.
    pub name: String,
}

/// Media kind of an attachment, selecting the fetcher that retrieves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// HLS-streamed video.
    Video,
    /// Plain file served by a single GET.
    Document,
}

impl FileType {
    /// Maps a parser kind hint to a file type. Matching ignores case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedFileTypeError`] for any other hint; there is no default.
    pub fn from_hint(hint: &str, name: &str) -> Result<Self, UnsupportedFileTypeError> {
        let normalized = hint.trim();
        if normalized.eq_ignore_ascii_case(KIND_HINT_VIDEO) {
            Ok(Self::Video)
        } else if normalized.eq_ignore_ascii_case(KIND_HINT_DOCUMENT) {
            Ok(Self::Document)
        } else {
            Err(UnsupportedFileTypeError {
                hint: hint.to_string(),
                name: name.to_string(),
            })
        }
    }

    /// Lowercase label used in listings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => KIND_HINT_VIDEO,
            Self::Document => KIND_HINT_DOCUMENT,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable leaf of the course tree.
///
/// Immutable once built. Two attachments are the same download when their
/// [`url`](Self::url) is equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    name: String,
    url: String,
    file_type: FileType,
    section_name: String,
    description: String,
}

impl Attachment {
    /// Builds an attachment from an absolute `url` and the parser's `kind_hint`.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedFileTypeError`] if `kind_hint` is not a known media kind.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        kind_hint: &str,
        section_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, UnsupportedFileTypeError> {
        let name = name.into();
        let file_type = FileType::from_hint(kind_hint, &name)?;
        Ok(Self {
            name,
            url: url.into(),
            file_type,
            section_name: section_name.into(),
            description: description.into(),
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute url; the de-duplication key.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Media kind.
    #[must_use]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Name of the section the attachment was found in.
    #[must_use]
    pub fn section_name(&self) -> &str {
        &self.section_name
    }

    /// Text of the post the attachment belongs to.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.file_type, self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hint_accepts_known_kinds_case_insensitively() {
        assert_eq!(FileType::from_hint("video", "x").unwrap(), FileType::Video);
        assert_eq!(FileType::from_hint(" Document ", "x").unwrap(), FileType::Document);
    }

    #[test]
    fn test_new_rejects_unknown_hint() {
        let err = Attachment::new("quiz", "https://a.example/q", "quiz", "Lab", "").unwrap_err();
        assert_eq!(err.hint, "quiz");
        assert_eq!(err.name, "quiz");
        assert!(err.to_string().contains("unsupported file type 'quiz'"));
    }

    #[test]
    fn test_new_keeps_metadata() {
        let att = Attachment::new(
            "Lezione 1",
            "https://vod.example/mp4:Lezione%201.mp4/manifest.m3u8",
            KIND_HINT_VIDEO,
            "Videoregistrazioni",
            "Prima lezione",
        )
        .unwrap();
        assert_eq!(att.file_type(), FileType::Video);
        assert_eq!(att.section_name(), "Videoregistrazioni");
        assert_eq!(att.description(), "Prima lezione");
        assert_eq!(att.to_string(), "[video] Lezione 1");
    }
}
