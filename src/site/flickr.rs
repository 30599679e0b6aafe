//! Flickr albums and photostreams.

use std::path::Path;
use std::sync::LazyLock;
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument};

use super::flickr_secret::{FlickrApiResolver, FlickrEndpoints, OriginalUrlResolver, photo_id_from_url};
use super::utils::{
    ListingPage, compile_static_regex, extract_meta_value, find_next_link, first_page, html_title,
    infer_title, og_title, paginate, require_title,
};
use super::{ExtractError, Gallery, ImageRef, Matcher, SiteHandler};
use crate::download::{DownloadError, default_download};
use crate::fetch::{FetchError, FetchSettings, Fetcher};

const NAME: &str = "flickr";

static THUMB_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?i)(?:live|farm\d+)\.staticflickr\.com\\?/(\d+)\\?/(\d+)_([0-9a-f]+)(?:_[0-9a-z]{1,2})?\.(jpe?g|png|gif)",
    )
});

static OWNER_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)class\s*=\s*["'][^"']*\bowner-name\b[^"']*["'][^>]*>\s*([^<]+?)\s*<"#)
});

/// Photo count in the album header stats, not sidebar or related-album text.
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)class\s*=\s*["'][^"']*\b(?:photo-counts?|stat-item)\b[^"']*["'][^>]*>(?:\s|<[^>]*>)*([0-9][0-9,]*)\s+photos?\b"#,
    )
});

/// Flickr handler: paginated HTML listing plus per-photo original lookup.
#[derive(Debug)]
pub struct FlickrHandler {
    matcher: Matcher,
    fetcher: Fetcher,
    endpoints: FlickrEndpoints,
}

impl FlickrHandler {
    /// Creates the handler against the live API endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        Self::with_endpoints(settings, FlickrEndpoints::default())
    }

    /// Creates the handler with custom API endpoints (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn with_endpoints(
        settings: &FetchSettings,
        endpoints: FlickrEndpoints,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            matcher: Matcher::url(r"^https?://(?:www\.)?flickr\.com/photos/"),
            fetcher: Fetcher::with_settings(settings)?,
            endpoints,
        })
    }
}

fn parse_listing(page: &crate::fetch::Page) -> ListingPage {
    let images = THUMB_RE
        .captures_iter(&page.body)
        .map(|caps| {
            let (server, id, secret, ext) = (&caps[1], &caps[2], &caps[3], &caps[4]);
            ImageRef::new(format!(
                "https://live.staticflickr.com/{server}/{id}_{secret}.{}",
                ext.to_ascii_lowercase()
            ))
        })
        .collect();
    ListingPage {
        images,
        next: find_next_link(&page.body, &page.url),
    }
}

fn expected_count(html: &str) -> Option<usize> {
    extract_meta_value(html, &COUNT_RE).and_then(|value| value.replace(',', "").parse().ok())
}

fn page_title(html: &str) -> Option<String> {
    og_title(html).or_else(|| {
        html_title(html).map(|title| {
            title
                .trim_end_matches("| Flickr")
                .trim_end()
                .trim_end_matches('|')
                .trim()
                .to_string()
        })
    })
}

#[async_trait]
impl SiteHandler for FlickrHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    #[instrument(skip(self, body), fields(site = NAME))]
    async fn list(&self, url: &str, body: Option<&str>) -> Result<Gallery, ExtractError> {
        let first = first_page(&self.fetcher, url, body).await?;
        let byline = extract_meta_value(&first.body, &OWNER_RE);
        let title = require_title(
            NAME,
            url,
            infer_title(page_title(&first.body).as_deref(), byline.as_deref(), url),
        )?;
        let expected = expected_count(&first.body);

        let thumbnails = paginate(
            &self.fetcher,
            first,
            |page| Ok(parse_listing(page)),
            |image| photo_id_from_url(&image.url).unwrap_or_else(|| image.url.clone()),
        )
        .await?;
        debug!(count = thumbnails.len(), "collected thumbnails");

        let mut images = Vec::with_capacity(thumbnails.len());
        if !thumbnails.is_empty() {
            let resolver =
                FlickrApiResolver::connect(self.fetcher.clone(), self.endpoints.clone()).await?;
            for thumbnail in &thumbnails {
                let original = resolver.resolve_original(&thumbnail.url).await?;
                images.push(ImageRef::new(original.url).with_taken(original.taken));
            }
        }

        info!(title = %title, images = images.len(), "listed gallery");
        Ok(Gallery::new(title, images).with_expected_count(expected))
    }

    async fn download(
        &self,
        image: &ImageRef,
        dest: &Path,
    ) -> Result<Option<SystemTime>, DownloadError> {
        default_download(&self.fetcher, &image.url, dest, image.taken).await
    }
}
