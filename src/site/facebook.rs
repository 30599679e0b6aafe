//! Facebook photo albums, read through the basic-HTML host with browser
//! session cookies.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::utils::{
    ListingPage, compile_static_regex, decode_entities, extract_meta_value, html_title, infer_title,
    is_auth_required_status, paginate, require_title, scan_tags,
};
use super::{ExtractError, Gallery, ImageRef, Matcher, SiteHandler};
use crate::cookies::AuthContext;
use crate::fetch::{FetchError, FetchSettings, Fetcher, Page};
use crate::urls::resolve_url;

const NAME: &str = "facebook";

/// Cookie domain read from the browser store.
pub(super) const COOKIE_DOMAIN: &str = "facebook.com";

static FBID_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)photo(?:\.php)?/?\?(?:[^#]*&)?fbid=(\d+)"));

static SEE_MORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(?:\s|</?(?:span|div|strong|b)\b[^>]*>)*See more photos"#,
    )
});

static LOGIN_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?is)<form\b[^>]*(?:id\s*=\s*["']login_form["']|action\s*=\s*["'][^"']*/login)"#)
});

/// Facebook handler.
#[derive(Debug)]
pub struct FacebookHandler {
    matcher: Matcher,
    fetcher: Fetcher,
    auth: AuthContext,
    base_url: String,
}

impl FacebookHandler {
    /// Creates the handler against the basic-HTML host, sending `auth`'s cookies.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings, auth: AuthContext) -> Result<Self, FetchError> {
        Self::with_base_url(settings, auth, "https://mbasic.facebook.com")
    }

    /// Creates the handler with a custom listing host (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn with_base_url(
        settings: &FetchSettings,
        auth: AuthContext,
        base_url: &str,
    ) -> Result<Self, FetchError> {
        let settings = settings.with_cookie_jar(auth.jar.clone());
        Ok(Self {
            matcher: Matcher::url(r"^https?://(?:[a-z0-9-]+\.)*facebook\.com/"),
            fetcher: Fetcher::with_settings(&settings)?,
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Moves the path and query of `url` onto the listing host.
    fn listing_url(&self, url: &str) -> Result<String, ExtractError> {
        let parsed =
            Url::parse(url).map_err(|_| ExtractError::failed(NAME, url, "unparsable URL"))?;
        let query = parsed.query().map(|q| format!("?{q}")).unwrap_or_default();
        Ok(format!("{}{}{query}", self.base_url, parsed.path()))
    }

    fn auth_error(&self, url: &str) -> ExtractError {
        ExtractError::auth_required(NAME, url, self.auth.auth_hint())
    }

    /// Maps auth statuses from the generic fetch path to `AuthRequired`.
    fn classify(&self, error: ExtractError) -> ExtractError {
        match error {
            ExtractError::Fetch(FetchError::HttpStatus { url, status })
                if is_auth_required_status(status) =>
            {
                self.auth_error(&url)
            }
            other => other,
        }
    }

    /// Fetches a page, treating auth statuses and login pages as `AuthRequired`.
    async fn fetch_authenticated(&self, url: &str) -> Result<Page, ExtractError> {
        let response = self.fetcher.fetch(url).await?;
        if is_auth_required_status(response.status) {
            return Err(self.auth_error(url));
        }
        if !response.is_success() {
            return Err(FetchError::http_status(url, response.status).into());
        }
        let page = Page {
            body: response.text(),
            url: response.final_url,
        };
        if is_login_page(&page) {
            return Err(self.auth_error(url));
        }
        Ok(page)
    }

    fn parse_album_page(&self, page: &Page) -> Result<ListingPage, ExtractError> {
        if is_login_page(page) {
            return Err(self.auth_error(&page.url));
        }
        let images = scan_tags(&page.body)
            .into_iter()
            .filter(|tag| tag.name == "a")
            .filter_map(|tag| tag.attr("href"))
            .filter(|href| FBID_RE.is_match(href))
            .filter_map(|href| resolve_url(&page.url, &href))
            .map(ImageRef::new)
            .collect();
        let next = extract_meta_value(&page.body, &SEE_MORE_RE)
            .and_then(|href| resolve_url(&page.url, &decode_entities(&href)));
        Ok(ListingPage { images, next })
    }
}

fn is_login_page(page: &Page) -> bool {
    page.url.contains("/login") || LOGIN_FORM_RE.is_match(&page.body)
}

fn fbid(url: &str) -> Option<String> {
    FBID_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Picks the full-size image on a photo page: the "view full size" link when
/// present, otherwise the first CDN image.
fn full_size_image(page: &Page) -> Option<String> {
    let tags = scan_tags(&page.body);
    let on_cdn = |value: &String| value.contains("fbcdn.net");
    tags.iter()
        .filter(|tag| tag.name == "a")
        .filter_map(|tag| tag.attr("href"))
        .find(on_cdn)
        .or_else(|| {
            tags.iter()
                .filter(|tag| tag.name == "img")
                .filter_map(|tag| tag.attr("src"))
                .find(on_cdn)
        })
        .and_then(|src| resolve_url(&page.url, &src))
}

#[async_trait]
impl SiteHandler for FacebookHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Lists an album. Any pre-fetched body is ignored because it came from
    /// the full site rather than the basic-HTML host.
    #[instrument(skip(self, _body), fields(site = NAME, cookies = self.auth.cookies_loaded))]
    async fn list(&self, url: &str, _body: Option<&str>) -> Result<Gallery, ExtractError> {
        if self.auth.cookies_loaded == 0 {
            warn!("no session cookies loaded; private albums will be refused");
        }
        let listing_url = self.listing_url(url)?;
        let first = self.fetch_authenticated(&listing_url).await?;
        let title = require_title(NAME, url, infer_title(html_title(&first.body).as_deref(), None, url))?;

        let photo_pages = paginate(
            &self.fetcher,
            first,
            |page| self.parse_album_page(page),
            |image| fbid(&image.url).unwrap_or_else(|| image.url.clone()),
        )
        .await
        .map_err(|error| self.classify(error))?;
        debug!(count = photo_pages.len(), "collected photo pages");

        let mut images = Vec::with_capacity(photo_pages.len());
        for photo_page in &photo_pages {
            let page = self.fetch_authenticated(&photo_page.url).await?;
            match full_size_image(&page) {
                Some(src) => images.push(ImageRef::new(src)),
                None => warn!(url = %photo_page.url, "no image found on photo page; skipping"),
            }
        }

        info!(title = %title, images = images.len(), "listed gallery");
        Ok(Gallery::new(title, images).with_expected_count(Some(photo_pages.len())))
    }
}
