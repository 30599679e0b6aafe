//! Web-server directory listings (`Index of /...`).

use async_trait::async_trait;
use tracing::{info, instrument};

use super::utils::{first_page, infer_title, require_title, scan_tags};
use super::{ExtractError, Gallery, ImageRef, Matcher, SiteHandler};
use crate::fetch::{FetchError, FetchSettings, Fetcher, Page};
use crate::urls::{extension_from_url, resolve_url};

const NAME: &str = "index";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "heic", "bmp",
];

/// Directory-listing handler.
#[derive(Debug)]
pub struct IndexHandler {
    matcher: Matcher,
    fetcher: Fetcher,
}

impl IndexHandler {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        Ok(Self {
            matcher: Matcher::body(r"<title>\s*Index of /"),
            fetcher: Fetcher::with_settings(settings)?,
        })
    }
}

fn image_links(page: &Page) -> Vec<ImageRef> {
    let mut images: Vec<ImageRef> = Vec::new();
    for tag in scan_tags(&page.body) {
        if tag.name != "a" {
            continue;
        }
        let Some(href) = tag.attr("href") else { continue };
        let is_image = extension_from_url(&href)
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if !is_image {
            continue;
        }
        if let Some(url) = resolve_url(&page.url, &href)
            && !images.iter().any(|image| image.url == url)
        {
            images.push(ImageRef::new(url));
        }
    }
    images
}

#[async_trait]
impl SiteHandler for IndexHandler {
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
        let page = first_page(&self.fetcher, url, body).await?;
        let title = require_title(NAME, url, infer_title(None, None, url))?;
        let images = image_links(&page);
        info!(title = %title, images = images.len(), "listed gallery");
        Ok(Gallery::new(title, images))
    }
}
