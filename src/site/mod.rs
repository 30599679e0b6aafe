//! Site handlers: one per supported photo-hosting service.
//!
//! A [`SiteHandler`] pairs a [`Matcher`] (URL pattern, or page-body pattern
//! when the owning site cannot be told from the URL) with a listing routine
//! that turns a gallery page into a [`Gallery`]. Handlers may override
//! [`SiteHandler::download`] to supply an explicit per-image timestamp.
//!
//! [`HandlerRegistry`] holds the handlers in priority order and picks the
//! first whose predicate matches.

mod error;
mod facebook;
mod flickr;
mod flickr_secret;
mod imgur;
mod index;
mod pbase;
mod registry;
mod smugmug;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::cookies::AuthContext;
use crate::download::{DownloadError, default_download};
use crate::fetch::{FetchError, FetchSettings, Fetcher};

pub use error::ExtractError;
pub use facebook::FacebookHandler;
pub use flickr::FlickrHandler;
pub use flickr_secret::{FlickrApiResolver, FlickrEndpoints, OriginalUrlResolver, ResolvedOriginal};
pub use imgur::ImgurHandler;
pub use index::IndexHandler;
pub use pbase::PbaseHandler;
pub use registry::{HandlerRegistry, Selection};
pub use smugmug::SmugmugHandler;

/// An image found in a gallery listing, before download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Absolute source URL.
    pub url: String,
    /// Display name from the site, used as a filename suffix.
    pub name: Option<String>,
    /// Capture time reported by the site, when it publishes one.
    pub taken: Option<SystemTime>,
}

impl ImageRef {
    /// Creates an unnamed image reference.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            taken: None,
        }
    }

    /// Sets the display name; blank names are dropped.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    /// Sets the site-reported capture time.
    #[must_use]
    pub fn with_taken(mut self, taken: Option<SystemTime>) -> Self {
        self.taken = taken;
        self
    }
}

/// Result of listing one gallery.
#[derive(Debug, Clone)]
pub struct Gallery {
    /// Human-readable title; never empty.
    pub title: String,
    /// Images in listing order.
    pub images: Vec<ImageRef>,
    /// Image count the site claims, when its markup exposes one.
    pub expected_count: Option<usize>,
}

impl Gallery {
    /// Creates a gallery without an expected count.
    #[must_use]
    pub fn new(title: impl Into<String>, images: Vec<ImageRef>) -> Self {
        Self {
            title: title.into(),
            images,
            expected_count: None,
        }
    }

    /// Records the image count the site advertises.
    #[must_use]
    pub fn with_expected_count(mut self, expected: Option<usize>) -> Self {
        self.expected_count = expected;
        self
    }
}

/// Handler selection predicate. Patterns are matched case-insensitively.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Tested against the gallery URL.
    Url(Regex),
    /// Tested against the fetched page body.
    Body(Regex),
}

impl Matcher {
    /// Builds a URL predicate.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex; patterns are static literals.
    #[must_use]
    pub fn url(pattern: &str) -> Self {
        Self::Url(utils::compile_static_regex(&format!("(?i){pattern}")))
    }

    /// Builds a body predicate.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex; patterns are static literals.
    #[must_use]
    pub fn body(pattern: &str) -> Self {
        Self::Body(utils::compile_static_regex(&format!("(?i){pattern}")))
    }

    /// Returns true when the predicate needs the page body.
    #[must_use]
    pub fn needs_body(&self) -> bool {
        matches!(self, Self::Body(_))
    }
}

/// A site-specific gallery extractor.
#[async_trait]
pub trait SiteHandler: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Selection predicate.
    fn matcher(&self) -> &Matcher;

    /// Fetcher used for listing and for the default downloader.
    fn fetcher(&self) -> &Fetcher;

    /// Lists the gallery at `url`. `body` is the page already fetched during
    /// selection, if any.
    async fn list(&self, url: &str, body: Option<&str>) -> Result<Gallery, ExtractError>;

    /// Downloads one image to `dest` and returns the timestamp applied to it.
    async fn download(
        &self,
        image: &ImageRef,
        dest: &Path,
    ) -> Result<Option<SystemTime>, DownloadError> {
        default_download(self.fetcher(), &image.url, dest, None).await
    }
}

/// Settings shared by the default handler set.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Fetch settings applied to every handler.
    pub fetch: FetchSettings,
    /// Browser cookie store read for sites that need a session.
    pub cookie_store: Option<PathBuf>,
}

/// Builds the registry with every supported site, in priority order.
///
/// Handlers whose client cannot be built are skipped with a warning.
///
/// # Errors
///
/// Returns [`FetchError`] when the selection fetcher itself cannot be built.
pub fn build_default_registry(options: &RegistryOptions) -> Result<HandlerRegistry, FetchError> {
    let mut registry = HandlerRegistry::new(Fetcher::with_settings(&options.fetch)?);

    register_or_warn(&mut registry, "flickr", FlickrHandler::new(&options.fetch));
    register_or_warn(&mut registry, "imgur", ImgurHandler::new(&options.fetch));

    let auth = options.cookie_store.as_deref().map_or_else(AuthContext::empty, |path| {
        AuthContext::load_for_domain(path, facebook::COOKIE_DOMAIN)
    });
    register_or_warn(
        &mut registry,
        "facebook",
        FacebookHandler::new(&options.fetch, auth),
    );

    register_or_warn(&mut registry, "pbase", PbaseHandler::new(&options.fetch));
    register_or_warn(&mut registry, "smugmug", SmugmugHandler::new(&options.fetch));
    register_or_warn(&mut registry, "index", IndexHandler::new(&options.fetch));
    register_or_warn(
        &mut registry,
        "smugmug-custom-domain",
        SmugmugHandler::custom_domain(&options.fetch),
    );

    Ok(registry)
}

fn register_or_warn<H: SiteHandler + 'static>(
    registry: &mut HandlerRegistry,
    name: &str,
    handler: Result<H, FetchError>,
) {
    match handler {
        Ok(handler) => registry.register(Box::new(handler)),
        Err(error) => warn!(
            site = name,
            error = %error,
            "site handler unavailable; continuing with remaining handlers"
        ),
    }
}
