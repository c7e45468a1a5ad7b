//! Markup parser for Ariel pages.
//!
//! Ariel serves three page shapes this crate cares about:
//! - the "my courses" catalog: a `table.table` with one `div.ariel-project` per course
//! - a course's contents page: a `<tbody>` whose rows link to the top-level sections
//! - a section (thread list) page: `arielRoomList` tables linking to sub-rooms and
//!   `arielThreadList` tables whose posts carry videos and attached files

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::markup::{self, compile_static_regex};
use super::{CourseEntry, PageParser, RawRow, StructuralParseError, TableKind};
use crate::tree::{KIND_HINT_DOCUMENT, KIND_HINT_VIDEO};

static VIDEO_SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<video\b[^>]*>.*?<source\b[^>]*\bsrc\s*=\s*["']([^"']+)["'][^>]*>.*?</video>"#,
    )
});

/// `https://host/.../mp4:<dir>/<name>.mp4/manifest.m3u8`
static MANIFEST_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)mp4:(?:.*/)?([^/]*?)\.mp4/manifest\.m3u8"));

static PROJECT_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<div\b[^>]*\bclass\s*=\s*["'][^"']*\bariel-project\b[^"']*["'][^>]*>"#)
});

static EDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<span\b[^>]*\bclass\s*=\s*["'][^"']*\btag bg-F[^"']*["'][^>]*>(.*?)</span>([^<]*)"#,
    )
});

const ROOM_LIST_CLASS: &str = "arielRoomList";
const THREAD_LIST_CLASS: &str = "arielThreadList";
const MESSAGE_BODY_CLASS: &str = "arielMessageBody";
const DOCUMENT_LINK_CLASS: &str = "filename";
const TEACHER_HREF_MARKER: &str = "/offerta/teacher/";

/// Regex-based [`PageParser`] for the Ariel v5 forum layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArielPageParser;

impl ArielPageParser {
    /// Creates the parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn parse_contents(body: &str) -> Result<Vec<RawRow>, StructuralParseError> {
        let tbody = markup::elements(body, "tbody")?
            .into_iter()
            .next()
            .ok_or_else(|| StructuralParseError::new("contents table", "page has no <tbody>"))?;

        let mut rows = Vec::new();
        for (index, row) in markup::rows(tbody)?.into_iter().enumerate() {
            let Some(anchor) = markup::anchors(row).into_iter().next() else {
                continue;
            };
            let href = anchor.href().ok_or_else(|| {
                StructuralParseError::new("section link", format!("row {} has a link without href", index + 1))
            })?;
            rows.push(RawRow::SubsectionLink {
                name: anchor.text(),
                href,
            });
        }
        Ok(rows)
    }

    fn parse_threads(body: &str) -> Result<Vec<RawRow>, StructuralParseError> {
        let rooms = markup::elements_with_class(body, "table", ROOM_LIST_CLASS)?;
        let threads = markup::elements_with_class(body, "table", THREAD_LIST_CLASS)?;
        if rooms.is_empty() && threads.is_empty() {
            return Err(StructuralParseError::new(
                "room or thread list",
                format!("page has neither a {ROOM_LIST_CLASS} nor a {THREAD_LIST_CLASS} table"),
            ));
        }

        let mut rows = Vec::new();
        for room in rooms {
            for row in markup::rows(room)? {
                for anchor in markup::anchors(row) {
                    if let Some(href) = anchor.href().filter(|href| is_navigable(href)) {
                        rows.push(RawRow::SubsectionLink {
                            name: anchor.text(),
                            href,
                        });
                    }
                }
            }
        }

        for thread in threads {
            for row in markup::rows(thread)? {
                rows.extend(post_attachments(row)?);
            }
        }

        debug!(rows = rows.len(), "parsed thread page");
        Ok(rows)
    }
}

impl PageParser for ArielPageParser {
    fn parse_rows(&self, body: &str, kind: TableKind) -> Result<Vec<RawRow>, StructuralParseError> {
        match kind {
            TableKind::Contents => Self::parse_contents(body),
            TableKind::Threads => Self::parse_threads(body),
        }
    }

    fn parse_courses(&self, body: &str) -> Result<Vec<CourseEntry>, StructuralParseError> {
        let table = markup::elements_with_class(body, "table", "table")?
            .into_iter()
            .next()
            .ok_or_else(|| StructuralParseError::new("courses table", "page has no table.table"))?;

        let starts: Vec<usize> = PROJECT_START_RE.find_iter(table).map(|m| m.start()).collect();
        let mut courses = Vec::with_capacity(starts.len());
        for (index, start) in starts.iter().enumerate() {
            let end = starts.get(index + 1).copied().unwrap_or(table.len());
            courses.push(parse_project(&table[*start..end])?);
        }
        Ok(courses)
    }
}

/// Video and document descriptors of one forum post.
fn post_attachments(row: &str) -> Result<Vec<RawRow>, StructuralParseError> {
    let description = markup::elements_with_class(row, "div", MESSAGE_BODY_CLASS)?
        .into_iter()
        .next()
        .map(markup::text_content)
        .unwrap_or_default();

    let mut found = Vec::new();
    for (index, caps) in VIDEO_SOURCE_RE.captures_iter(row).enumerate() {
        let src = markup::decode_entities(caps[1].trim());
        found.push(RawRow::Attachment {
            name: video_name(&src).unwrap_or_else(|| format!("video_{}", index + 1)),
            href: src,
            kind_hint: KIND_HINT_VIDEO.to_string(),
            description: description.clone(),
        });
    }

    for anchor in markup::anchors(row) {
        if !anchor.has_class(DOCUMENT_LINK_CLASS) {
            continue;
        }
        if let Some(href) = anchor.href() {
            found.push(RawRow::Attachment {
                name: anchor.text(),
                href,
                kind_hint: KIND_HINT_DOCUMENT.to_string(),
                description: description.clone(),
            });
        }
    }
    Ok(found)
}

/// Derives a readable name from a streaming manifest url.
pub(crate) fn video_name(manifest_url: &str) -> Option<String> {
    let raw = MANIFEST_NAME_RE.captures(manifest_url)?.get(1)?.as_str();
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
    let trimmed = decoded.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_project(block: &str) -> Result<CourseEntry, StructuralParseError> {
    let anchors = markup::anchors(block);

    let teachers = anchors
        .iter()
        .filter(|anchor| {
            anchor
                .href()
                .is_some_and(|href| href.to_ascii_lowercase().contains(TEACHER_HREF_MARKER))
        })
        .map(markup::Anchor::text)
        .collect();

    let (name, url) = anchors
        .iter()
        .find_map(|anchor| {
            let href = anchor.href()?;
            href.starts_with("https://").then(|| (anchor.text(), href))
        })
        .ok_or_else(|| StructuralParseError::new("course link", "ariel-project without an https link"))?;

    let edition = EDITION_RE
        .captures(block)
        .map(|caps| markup::text_content(&format!("{} {}", &caps[1], &caps[2])))
        .unwrap_or_default();

    Ok(CourseEntry {
        name,
        teachers,
        url,
        edition,
    })
}

fn is_navigable(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    !(lower.starts_with('#') || lower.starts_with("javascript:") || lower.starts_with("mailto:"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const THREAD_PAGE: &str = r#"
        <table class="table arielRoomList"><tbody>
            <tr><td><a href="ThreadList.aspx?fc=1&amp;name=lezioni">Lezioni</a></td>
                <td><a href="javascript:void(0)">menu</a></td></tr>
        </tbody></table>
        <table class="table arielThreadList"><tbody>
            <tr>
                <td><h2 class="arielTitle"><span>Post</span><span>Lezione 1</span></h2>
                <div class="arielMessageBody">Registrazione della <b>prima</b> lezione</div>
                <video controls><source src="https://videolectures.unimi.it/vod/mp4:corso/Lezione%201.mp4/manifest.m3u8" type="application/x-mpegURL"></video>
                <a class="filename" href="../frm3/Download.aspx?id=42">slides.pdf</a></td>
            </tr>
        </tbody></table>"#;

    #[test]
    fn test_parse_threads_partitions_rooms_and_attachments() {
        let rows = ArielPageParser::new()
            .parse_rows(THREAD_PAGE, TableKind::Threads)
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0],
            RawRow::SubsectionLink {
                name: "Lezioni".to_string(),
                href: "ThreadList.aspx?fc=1&name=lezioni".to_string(),
            }
        );
        let RawRow::Attachment { name, kind_hint, description, href } = &rows[1] else {
            panic!("expected video attachment, got {:?}", rows[1]);
        };
        assert_eq!(name, "Lezione 1");
        assert_eq!(kind_hint, KIND_HINT_VIDEO);
        assert_eq!(description, "Registrazione della prima lezione");
        assert!(href.ends_with("manifest.m3u8"));

        let RawRow::Attachment { name, kind_hint, href, .. } = &rows[2] else {
            panic!("expected document attachment, got {:?}", rows[2]);
        };
        assert_eq!(name, "slides.pdf");
        assert_eq!(kind_hint, KIND_HINT_DOCUMENT);
        assert_eq!(href, "../frm3/Download.aspx?id=42");
    }

    #[test]
    fn test_parse_threads_without_lists_is_structural_error() {
        let err = ArielPageParser::new()
            .parse_rows("<html><body><p>Nuovo layout</p></body></html>", TableKind::Threads)
            .unwrap_err();
        assert_eq!(err.expected, "room or thread list");
    }

    #[test]
    fn test_parse_threads_keeps_posts_after_nested_table_in_message_body() {
        let body = r#"<table class="arielThreadList"><tbody>
            <tr><td>
                <div class="arielMessageBody">Orario:
                    <table><tr><td>lun</td></tr></table>
                    <div>aula <b>Sigma</b></div>
                </div>
                <a class="filename" href="Download.aspx?id=1">first.pdf</a>
            </td></tr>
            <tr><td>
                <div class="arielMessageBody">seconda</div>
                <a class="filename" href="Download.aspx?id=2">second.pdf</a>
            </td></tr>
        </tbody></table>"#;

        let rows = ArielPageParser::new().parse_rows(body, TableKind::Threads).unwrap();

        let found: Vec<_> = rows
            .iter()
            .map(|row| match row {
                RawRow::Attachment { name, description, .. } => (name.as_str(), description.as_str()),
                RawRow::SubsectionLink { name, .. } => (name.as_str(), "link"),
            })
            .collect();
        assert_eq!(found, [("first.pdf", "Orario: lun aula Sigma"), ("second.pdf", "seconda")]);
    }

    #[test]
    fn test_parse_threads_unclosed_thread_list_is_structural_error() {
        let body = r#"<table class="arielThreadList"><tbody>
            <tr><td><a class="filename" href="Download.aspx?id=1">first.pdf</a></td></tr>
        </tbody>"#;
        let err = ArielPageParser::new()
            .parse_rows(body, TableKind::Threads)
            .unwrap_err();
        assert_eq!(err.expected, "closing </table>");
    }

    #[test]
    fn test_parse_threads_with_empty_table_is_empty() {
        let rows = ArielPageParser::new()
            .parse_rows(r#"<table class="arielThreadList"><tbody></tbody></table>"#, TableKind::Threads)
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_contents_reads_first_link_per_row() {
        let body = r#"<table><tbody>
            <tr><td><a href="ThreadList.aspx?fc=10">Materiali</a> <a href="other">x</a></td></tr>
            <tr><td>no link</td></tr>
            <tr><td><a href="ThreadList.aspx?fc=11">Videoregistrazioni</a></td></tr>
        </tbody></table>"#;
        let rows = ArielPageParser::new().parse_rows(body, TableKind::Contents).unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|row| match row {
                RawRow::SubsectionLink { name, .. } => name.as_str(),
                RawRow::Attachment { .. } => "attachment",
            })
            .collect();
        assert_eq!(names, ["Materiali", "Videoregistrazioni"]);
    }

    #[test]
    fn test_parse_contents_missing_tbody_is_structural_error() {
        let err = ArielPageParser::new()
            .parse_rows("<table></table>", TableKind::Contents)
            .unwrap_err();
        assert_eq!(err.expected, "contents table");
    }

    #[test]
    fn test_parse_contents_link_without_href_is_structural_error() {
        let err = ArielPageParser::new()
            .parse_rows("<tbody><tr><td><a>x</a></td></tr></tbody>", TableKind::Contents)
            .unwrap_err();
        assert_eq!(err.expected, "section link");
    }

    #[test]
    fn test_parse_courses_reads_projects() {
        let body = r#"<table class="table"><tbody><tr><td>
            <div class="ariel-project">
                <a href="https://mrossi-sistemi.ariel.ctu.unimi.it">Sistemi Operativi</a>
                <a href="/offerta/teacher/mrossi">Mario Rossi</a>
                <a href="/offerta/teacher/lbianchi">Luisa Bianchi</a>
                <div><span class="tag bg-F1">Edizione</span> 2023/2024</div>
            </div>
            <div class="ariel-project">
                <a href="https://reti.ariel.ctu.unimi.it">Reti</a>
            </div>
        </td></tr></tbody></table>"#;

        let courses = ArielPageParser::new().parse_courses(body).unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].name, "Sistemi Operativi");
        assert_eq!(courses[0].url, "https://mrossi-sistemi.ariel.ctu.unimi.it");
        assert_eq!(courses[0].teachers, ["Mario Rossi", "Luisa Bianchi"]);
        assert_eq!(courses[0].edition, "Edizione 2023/2024");
        assert!(courses[1].teachers.is_empty());
        assert_eq!(courses[1].edition, "");
    }

    #[test]
    fn test_parse_courses_reads_projects_after_nested_table() {
        let body = r#"<table class="table"><tbody><tr><td>
            <div class="ariel-project">
                <a href="https://algebra.ariel.ctu.unimi.it">Algebra</a>
                <table class="orari"><tr><td>mar 10:30</td></tr></table>
            </div>
            <div class="ariel-project">
                <a href="https://analisi.ariel.ctu.unimi.it">Analisi</a>
            </div>
        </td></tr></tbody></table>"#;

        let courses = ArielPageParser::new().parse_courses(body).unwrap();
        let names: Vec<_> = courses.iter().map(|course| course.name.as_str()).collect();
        assert_eq!(names, ["Algebra", "Analisi"]);
    }

    #[test]
    fn test_parse_courses_without_table_is_structural_error() {
        let err = ArielPageParser::new().parse_courses("<div></div>").unwrap_err();
        assert_eq!(err.expected, "courses table");
    }

    #[test]
    fn test_video_name_from_manifest_url() {
        assert_eq!(
            video_name("https://vod.example/vod/mp4:dir/Lezione%2003.mp4/manifest.m3u8").as_deref(),
            Some("Lezione 03")
        );
        assert_eq!(
            video_name("https://vod.example/vod/mp4:plain.mp4/manifest.m3u8").as_deref(),
            Some("plain")
        );
        assert!(video_name("https://vod.example/video.mp4").is_none());
    }
}
