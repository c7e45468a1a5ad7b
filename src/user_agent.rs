//! Shared User-Agent string for every request issued by the session client.

/// Default User-Agent for login, page and file requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    format!("{name}/{version} (course-material-downloader)")
}
