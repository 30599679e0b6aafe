//! Thumbnail to original-image resolution through Flickr's REST API.
//!
//! The public API key is scraped from the API explorer page once per gallery,
//! then `flickr.photos.getInfo` supplies the server shard, original secret,
//! and original format needed to build the full-resolution URL.

use std::sync::LazyLock;
use std::time::SystemTime;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, instrument};

use super::ExtractError;
use super::utils::{compile_static_regex, extract_meta_value, parse_site_datetime, scan_tags};
use crate::fetch::Fetcher;
use crate::urls::last_path_segment;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?i)(?:site_key|api_key)["']?\s*[:=]\s*["']([0-9a-f]{32})["']"#)
});

static PHOTO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"^(\d+)_[0-9a-fA-F]+(?:_[0-9a-zA-Z]+)?\.[0-9a-zA-Z]+$"));

/// A resolved full-resolution image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOriginal {
    /// Original-size image URL.
    pub url: String,
    /// Capture time reported by the API.
    pub taken: Option<SystemTime>,
}

/// Turns a thumbnail URL into the URL of the original upload.
#[async_trait]
pub trait OriginalUrlResolver: Send + Sync {
    /// Resolves one thumbnail.
    async fn resolve_original(&self, thumbnail_url: &str)
    -> Result<ResolvedOriginal, ExtractError>;
}

/// Endpoints used by [`FlickrApiResolver`].
#[derive(Debug, Clone)]
pub struct FlickrEndpoints {
    /// Page the API key is scraped from.
    pub key_page: String,
    /// REST endpoint.
    pub api: String,
    /// Static image host, without trailing slash.
    pub static_base: String,
}

impl Default for FlickrEndpoints {
    fn default() -> Self {
        Self {
            key_page: "https://www.flickr.com/services/api/explore/flickr.photos.getInfo"
                .to_string(),
            api: "https://api.flickr.com/services/rest/".to_string(),
            static_base: "https://live.staticflickr.com".to_string(),
        }
    }
}

/// API-backed resolver holding the key fetched at connect time.
#[derive(Debug, Clone)]
pub struct FlickrApiResolver {
    fetcher: Fetcher,
    endpoints: FlickrEndpoints,
    api_key: String,
}

impl FlickrApiResolver {
    /// Fetches the key page and extracts the public API key.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::SecretResolutionFailed`] when the page cannot be
    /// fetched or carries no key.
    #[instrument(level = "debug", skip(fetcher, endpoints), fields(key_page = %endpoints.key_page))]
    pub async fn connect(fetcher: Fetcher, endpoints: FlickrEndpoints) -> Result<Self, ExtractError> {
        let page = fetcher
            .fetch_page(&endpoints.key_page)
            .await
            .map_err(|error| ExtractError::secret(format!("API key page unavailable: {error}")))?;
        let api_key = extract_meta_value(&page.body, &API_KEY_RE)
            .ok_or_else(|| ExtractError::secret("no API key found on key page"))?;
        debug!("obtained API key");
        Ok(Self {
            fetcher,
            endpoints,
            api_key,
        })
    }

    fn info_url(&self, photo_id: &str) -> String {
        format!(
            "{}?method=flickr.photos.getInfo&api_key={}&photo_id={}",
            self.endpoints.api,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(photo_id)
        )
    }
}

#[async_trait]
impl OriginalUrlResolver for FlickrApiResolver {
    #[instrument(level = "debug", skip(self))]
    async fn resolve_original(
        &self,
        thumbnail_url: &str,
    ) -> Result<ResolvedOriginal, ExtractError> {
        let photo_id = photo_id_from_url(thumbnail_url).ok_or_else(|| {
            ExtractError::secret(format!("no photo id in thumbnail URL {thumbnail_url}"))
        })?;
        let response = self
            .fetcher
            .fetch_page(&self.info_url(&photo_id))
            .await
            .map_err(|error| ExtractError::secret(format!("getInfo for {photo_id}: {error}")))?;
        parse_photo_info(&response.body, &photo_id, &self.endpoints.static_base)
    }
}

/// Extracts the numeric photo id from a static image URL
/// (`…/<server>/<id>_<secret>[_<size>].<ext>`).
#[must_use]
pub fn photo_id_from_url(url: &str) -> Option<String> {
    PHOTO_ID_RE
        .captures(last_path_segment(url))
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

fn parse_photo_info(
    xml: &str,
    photo_id: &str,
    static_base: &str,
) -> Result<ResolvedOriginal, ExtractError> {
    let tags = scan_tags(xml);
    let find = |name: &str| tags.iter().find(|tag| tag.name == name);

    let status = find("rsp").and_then(|rsp| rsp.attr("stat"));
    if status.as_deref() != Some("ok") {
        let message = find("err")
            .and_then(|err| err.attr("msg"))
            .unwrap_or_else(|| "missing or failed response status".to_string());
        return Err(ExtractError::secret(format!("getInfo for {photo_id}: {message}")));
    }

    let photo = find("photo")
        .ok_or_else(|| ExtractError::secret(format!("getInfo for {photo_id}: no photo element")))?;
    let required = |name: &str| {
        photo
            .attr(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                ExtractError::secret(format!("getInfo for {photo_id}: missing {name}"))
            })
    };
    let server = required("server")?;
    let secret = required("originalsecret")?;
    let format = required("originalformat")?;

    let taken = find("dates")
        .and_then(|dates| dates.attr("taken"))
        .and_then(|value| parse_site_datetime(&value));

    Ok(ResolvedOriginal {
        url: format!("{static_base}/{server}/{photo_id}_{secret}_o.{format}"),
        taken,
    })
}
