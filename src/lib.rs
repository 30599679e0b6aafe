//! galfetch core library
//!
//! Downloads whole photo galleries from hosting sites into one directory per
//! gallery, with positional file names renumbered by capture time.
//!
//! # Architecture
//!
//! - [`site`] - Handler registry and per-site listing extractors
//! - [`fetch`] - Single-attempt HTTP client shared by every stage
//! - [`cookies`] - Browser binary cookie store reader and cookie jars
//! - [`download`] - Gallery layout, default downloader, metadata hook
//! - [`rename`] - Renumbering downloaded files by timestamp
//! - [`gallery`] - One URL end to end
//! - [`urls`] - Relative URL resolution and path helpers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cookies;
pub mod download;
pub mod fetch;
pub mod gallery;
pub mod rename;
pub mod site;
pub mod urls;
mod user_agent;

// Re-export commonly used types
pub use download::{DownloadPipeline, DownloadedFile, PipelineError};
pub use fetch::{FetchError, FetchSettings, Fetcher};
pub use gallery::{GalleryError, GalleryOutcome, GalleryReport, process_gallery};
pub use rename::{RenameError, rename_sequentially};
pub use site::{
    ExtractError, Gallery, HandlerRegistry, ImageRef, RegistryOptions, SiteHandler,
    build_default_registry,
};
