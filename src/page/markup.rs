//! Small regex-based helpers for pulling elements and text out of HTML.
//!
//! Elements are located by scanning tag tokens and counting nesting depth, so a
//! `<table>` inside a forum post does not end the table that contains the post.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::StructuralParseError;

/// Compiles a regex at static init; panics on invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Any opening or closing tag: slash, name, raw attributes.
static TAG_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<(/?)([a-z][a-z0-9]*)\b([^>]*)>"));

/// One quoted `name="value"` or `name='value'` pair inside an attribute string.
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)(?:^|\s)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
});

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<a\b([^>]*)>(.*?)</a>"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"&#(x[0-9a-fA-F]+|[0-9]+);"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

/// An `<a>` element: its raw attribute string and inner HTML.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Anchor<'a> {
    pub attrs: &'a str,
    pub inner: &'a str,
}

impl Anchor<'_> {
    /// The `href` attribute, entity-decoded and trimmed, if present and non-empty.
    pub(crate) fn href(&self) -> Option<String> {
        attribute(self.attrs, "href")
            .map(|href| decode_entities(href.trim()))
            .filter(|href| !href.is_empty())
    }

    /// Returns true if the `class` attribute lists `class_name`.
    pub(crate) fn has_class(&self, class_name: &str) -> bool {
        attribute(self.attrs, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class_name))
    }

    /// Visible text of the link.
    pub(crate) fn text(&self) -> String {
        text_content(self.inner)
    }
}

/// Returns the inner HTML of every outermost `<tr>` in `html`, in document order.
pub(crate) fn rows(html: &str) -> Result<Vec<&str>, StructuralParseError> {
    elements(html, "tr")
}

/// Returns every `<a>` element in `html`, in document order.
pub(crate) fn anchors(html: &str) -> Vec<Anchor<'_>> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            Some(Anchor {
                attrs: caps.get(1)?.as_str(),
                inner: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Extracts the value of attribute `name` from a raw attribute string.
pub(crate) fn attribute<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    ATTRIBUTE_RE
        .captures_iter(attrs)
        .find(|caps| caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case(name)))
        .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
        .map(|m| m.as_str())
}

/// Returns the inner HTML of every outermost `<tag>` element in `html`.
pub(crate) fn elements<'a>(html: &'a str, tag: &str) -> Result<Vec<&'a str>, StructuralParseError> {
    balanced_elements(html, tag, |_| true)
}

/// Returns the inner HTML of each outermost `<tag>` element whose class list
/// (or id) contains `class_name`.
pub(crate) fn elements_with_class<'a>(
    html: &'a str,
    tag: &str,
    class_name: &str,
) -> Result<Vec<&'a str>, StructuralParseError> {
    balanced_elements(html, tag, |attrs| {
        ["class", "id"].iter().any(|name| {
            attribute(attrs, name).is_some_and(|value| value.split_whitespace().any(|c| c == class_name))
        })
    })
}

/// Walks the tag tokens of `html`, capturing the body of every `<tag>` whose
/// opening attributes satisfy `matches` up to its balanced closing tag.
///
/// Same-name elements nested inside a capture only move the depth counter.
/// Stray closing tags outside any capture are ignored; a capture that is
/// never closed is an error.
fn balanced_elements<'a>(
    html: &'a str,
    tag: &str,
    matches: impl Fn(&str) -> bool,
) -> Result<Vec<&'a str>, StructuralParseError> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for caps in TAG_TOKEN_RE.captures_iter(html) {
        let (Some(token), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if !name.as_str().eq_ignore_ascii_case(tag) {
            continue;
        }
        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());

        if closing {
            match depth {
                0 => {}
                1 => {
                    found.push(&html[start..token.start()]);
                    depth = 0;
                }
                _ => depth -= 1,
            }
        } else if attrs.trim_end().ends_with('/') {
            continue;
        } else if depth > 0 {
            depth += 1;
        } else if matches(attrs) {
            depth = 1;
            start = token.end();
        }
    }

    if depth > 0 {
        return Err(StructuralParseError::new(
            format!("closing </{tag}>"),
            format!("<{tag}> opened at byte {start} is never closed ({depth} level(s) open)"),
        ));
    }
    Ok(found)
}

/// Strips tags, decodes entities and collapses whitespace.
pub(crate) fn text_content(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Decodes the named entities Ariel emits plus numeric character references.
pub(crate) fn decode_entities(value: &str) -> String {
    let named = value
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");
    let numeric = NUMERIC_ENTITY_RE.replace_all(&named, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), String::from)
    });
    // &amp; last so "&amp;lt;" stays "&lt;"
    numeric.replace("&amp;", "&")
}

/// Resolves a possibly relative `href` against the page it appeared on.
///
/// Absolute hrefs are normalized; `//host/...` is treated as https.
#[must_use]
pub fn resolve_href(href: &str, page_url: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with("//") {
        return Url::parse(&format!("https:{href}")).ok().map(String::from);
    }
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.into());
    }
    Url::parse(page_url)
        .ok()?
        .join(href)
        .ok()
        .map(String::from)
}
