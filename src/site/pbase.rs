//! PBase galleries.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{info, instrument};

use super::utils::{
    ListingPage, compile_static_regex, decode_entities, extract_meta_value, find_next_link,
    first_page, html_title, infer_title, og_title, paginate, require_title, scan_tags,
};
use super::{ExtractError, Gallery, ImageRef, Matcher, SiteHandler};
use crate::fetch::{FetchError, FetchSettings, Fetcher, Page};
use crate::urls::resolve_url;

const NAME: &str = "pbase";

static NEXT_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>\s*next\s*(?:&gt;|>|&raquo;|»)?\s*</a>"#,
    )
});

/// PBase handler.
#[derive(Debug)]
pub struct PbaseHandler {
    matcher: Matcher,
    fetcher: Fetcher,
}

impl PbaseHandler {
    /// Creates the handler.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        Ok(Self {
            matcher: Matcher::url(r"^https?://(?:www\.)?pbase\.com/"),
            fetcher: Fetcher::with_settings(settings)?,
        })
    }
}

fn parse_gallery_page(page: &Page) -> ListingPage {
    let images = scan_tags(&page.body)
        .into_iter()
        .filter(|tag| tag.name == "img")
        .filter_map(|tag| {
            let src = tag.attr("src")?;
            if !src.contains("/small/") {
                return None;
            }
            let large = resolve_url(&page.url, &src.replacen("/small/", "/large/", 1))?;
            Some(ImageRef::new(large).with_name(tag.attr("alt")))
        })
        .collect();
    let next = find_next_link(&page.body, &page.url).or_else(|| {
        extract_meta_value(&page.body, &NEXT_TEXT_RE)
            .and_then(|href| resolve_url(&page.url, &decode_entities(&href)))
    });
    ListingPage { images, next }
}

#[async_trait]
impl SiteHandler for PbaseHandler {
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
        let explicit = og_title(&first.body).or_else(|| html_title(&first.body));
        let title = require_title(NAME, url, infer_title(explicit.as_deref(), None, url))?;

        let images = paginate(
            &self.fetcher,
            first,
            |page| Ok(parse_gallery_page(page)),
            |image| image.url.clone(),
        )
        .await?;

        info!(title = %title, images = images.len(), "listed gallery");
        Ok(Gallery::new(title, images))
    }
}
