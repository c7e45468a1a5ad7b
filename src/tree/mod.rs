//! The course content tree.
//!
//! [`Catalog`] lists courses, a [`Course`] owns its top-level [`Section`]s,
//! and each section resolves its subsections and [`Attachment`]s on first
//! access. Every level fetches at most once; later calls are served from
//! the cache.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use unimi_dl::page::{ArielPageParser, PageResolver};
//! use unimi_dl::session::{Credentials, SessionConfig, SessionProvider};
//! use unimi_dl::tree::Catalog;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = Arc::new(SessionProvider::new(
//!     SessionConfig::default(),
//!     Credentials::new("name.surname@studenti.unimi.it", "secret"),
//! ));
//! let resolver = Arc::new(PageResolver::new(sessions, Arc::new(ArielPageParser::new())));
//! let catalog = Catalog::new(resolver);
//! for course in catalog.courses().await? {
//!     for attachment in course.attachments(None).await? {
//!         println!("{} / {}", course.name(), attachment);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod attachment;
mod catalog;
mod course;
mod error;
mod section;

pub use attachment::{
    Attachment, FileType, KIND_HINT_DOCUMENT, KIND_HINT_VIDEO, UnsupportedFileTypeError,
};
pub use catalog::{Catalog, DEFAULT_CATALOG_URL};
pub use course::Course;
pub use error::TreeError;
pub use section::{ResolutionState, Section};
