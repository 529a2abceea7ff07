//! File Library Core
//!
//! A library of downloadable files: each file entry owns one stored upload,
//! may be gated by required roles or a required user meta key, and every
//! download is counted and (optionally) logged for reporting.
//!
//! # Architecture
//!
//! - [`db`] - Database connection and schema management
//! - [`settings`] - Persisted option values
//! - [`users`] / [`taxonomy`] - User directory and file classification
//! - [`files`] - File entries, uploads, list queries and the access gate
//! - [`downloads`] - Download log table with cached aggregate queries
//! - [`tracker`] / [`ajax`] - Recording downloads and the request endpoints
//! - [`listing`] - Filtered, paginated download log view
//! - [`shortcodes`] - Public rendering of files and file lists
//! - [`report`] - Download reports and CSV export
//! - [`library`] - Wiring of all of the above over one database

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ajax;
pub mod cache;
pub mod config;
pub mod db;
pub mod downloads;
pub mod error;
pub mod files;
pub mod helpers;
pub mod hooks;
pub mod library;
pub mod listing;
pub mod report;
pub mod settings;
pub mod shortcodes;
pub mod taxonomy;
pub mod tracker;
pub mod users;

/// Display name of the library.
pub const PLUGIN_NAME: &str = "ERI File Library";

// Re-export commonly used types
pub use ajax::{Ajax, AjaxError, AjaxResponse, Nonces, client_ip};
pub use cache::CacheStore;
pub use config::{ConfigError, LibraryConfig, LoadedConfig, load_config};
pub use db::{Database, DbError};
pub use downloads::{DownloadLog, DownloadLogRepository, DownloadOrder, DownloadQuery, DownloadRecord};
pub use error::{DbErrorKind, StoreError};
pub use files::{FileListQuery, FileRecord, FileStatus, FileUpdate, Files, NewFile, UploadError};
pub use hooks::{Hooks, LibraryHook};
pub use library::{FileLibrary, LibraryError};
pub use listing::{DownloadLogFilters, DownloadLogPage, DownloadLogView, Pagination};
pub use report::{Report, ReportError, export_filename};
pub use settings::{LibrarySettings, Settings};
pub use shortcodes::{RenderContext, Shortcodes};
pub use taxonomy::{Taxonomies, Term};
pub use tracker::{DownloadError, DownloadOutcome, DownloadTracker};
pub use users::{NewUser, Requester, User, Users};
