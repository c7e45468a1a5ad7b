//! unimi-dl core library
//!
//! Models an Ariel course as a lazily resolved tree, collects its downloadable
//! attachments, and keeps a ledger of what was already fetched so repeated
//! runs only download new material.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`session`] - One-time login and the shared authenticated HTTP client
//! - [`page`] - Page fetching with retry plus the swappable markup parser
//! - [`tree`] - Catalog, courses, sections and attachments
//! - [`fetch`] - Byte transfer for documents (plain GET) and videos (HLS)
//! - [`ledger`] - Persisted per-platform record of downloaded urls
//! - [`config`] - File configuration and resolved runtime settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fetch;
pub mod ledger;
pub mod page;
pub mod platform;
pub mod retry;
pub mod session;
pub mod tree;
mod user_agent;

// Re-export commonly used types
pub use config::{FileConfig, Settings};
pub use fetch::{DownloadError, Fetcher, Fetchers, GenericFetcher, HlsFetcher};
pub use ledger::{DownloadLedger, LedgerError, LoadOutcome, RecordOptions, RecordOutcome};
pub use page::{
    ArielPageParser, CourseEntry, PageError, PageParser, PageResolver, RawRow,
    StructuralParseError, TableKind,
};
pub use platform::{Platform, UnknownPlatformError};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy};
pub use session::{AuthError, Credentials, Session, SessionConfig, SessionProvider};
pub use tree::{
    Attachment, Catalog, Course, FileType, ResolutionState, Section, TreeError,
    UnsupportedFileTypeError,
};
