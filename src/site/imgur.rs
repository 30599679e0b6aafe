//! Imgur albums via the album JSON endpoint.

use std::path::Path;
use std::sync::LazyLock;
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, instrument};

use super::utils::{
    compile_static_regex, first_page, infer_title, og_title, parse_site_datetime, require_title,
    unix_time,
};
use super::{ExtractError, Gallery, ImageRef, Matcher, SiteHandler};
use crate::download::{DownloadError, default_download};
use crate::fetch::{FetchError, FetchSettings, Fetcher};

const NAME: &str = "imgur";

static ALBUM_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r"(?i)imgur\.com/(?:a|gallery)/([A-Za-z0-9-]+)")
});

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    data: AlbumData,
}

// Empty albums come back as `"data": []`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AlbumData {
    Empty(Vec<serde_json::Value>),
    Album {
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        images: Vec<AlbumImage>,
    },
}

#[derive(Debug, Deserialize)]
struct AlbumImage {
    hash: String,
    #[serde(default)]
    ext: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    datetime: Option<serde_json::Value>,
}

impl AlbumImage {
    fn taken(&self) -> Option<SystemTime> {
        match self.datetime.as_ref()? {
            serde_json::Value::String(text) => parse_site_datetime(text),
            serde_json::Value::Number(number) => number.as_i64().and_then(unix_time),
            _ => None,
        }
    }
}

/// Imgur handler.
#[derive(Debug)]
pub struct ImgurHandler {
    matcher: Matcher,
    fetcher: Fetcher,
    api_base: String,
    image_base: String,
}

impl ImgurHandler {
    /// Creates the handler against the live site.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        Self::with_base_urls(settings, "https://imgur.com", "https://i.imgur.com")
    }

    /// Creates the handler with custom API and image hosts (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn with_base_urls(
        settings: &FetchSettings,
        api_base: &str,
        image_base: &str,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            matcher: Matcher::url(r"^https?://(?:www\.|m\.)?imgur\.com/(?:a|gallery)/"),
            fetcher: Fetcher::with_settings(settings)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            image_base: image_base.trim_end_matches('/').to_string(),
        })
    }

    fn album_json_url(&self, album_id: &str) -> String {
        format!(
            "{}/ajaxalbums/getimages/{album_id}/hit.json?all=true",
            self.api_base
        )
    }

    fn image_url(&self, image: &AlbumImage) -> String {
        let ext = image.ext.split('?').next().unwrap_or_default();
        format!("{}/{}{ext}", self.image_base, image.hash)
    }
}

/// Extracts the album id; slugged ids (`my-trip-AbC12`) keep the last part.
fn album_id(url: &str) -> Option<String> {
    let raw = ALBUM_ID_RE.captures(url)?.get(1)?.as_str();
    raw.rsplit('-')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl SiteHandler for ImgurHandler {
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
        let id = album_id(url).ok_or_else(|| ExtractError::failed(NAME, url, "no album id in URL"))?;
        let page = first_page(&self.fetcher, url, body).await?;
        let title = require_title(NAME, url, infer_title(og_title(&page.body).as_deref(), None, url))?;

        let json = self.fetcher.fetch_page(&self.album_json_url(&id)).await?;
        let response: AlbumResponse = serde_json::from_str(&json.body).map_err(|error| {
            ExtractError::failed(NAME, &json.url, format!("unparsable album JSON: {error}"))
        })?;

        let (expected, album_images) = match response.data {
            AlbumData::Empty(_) => (Some(0), Vec::new()),
            AlbumData::Album { count, images } => (count, images),
        };
        let images: Vec<ImageRef> = album_images
            .iter()
            .map(|image| {
                ImageRef::new(self.image_url(image))
                    .with_name(image.title.clone())
                    .with_taken(image.taken())
            })
            .collect();

        info!(title = %title, album = %id, images = images.len(), "listed gallery");
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
