//! SmugMug galleries, read through the gallery's RSS feed.
//!
//! The same handler serves `*.smugmug.com` URLs and custom domains recognised
//! from their page markup.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument};

use super::utils::{
    compile_static_regex, decode_entities, first_page, infer_title, require_title, scan_tags,
};
use super::{ExtractError, Gallery, ImageRef, Matcher, SiteHandler};
use crate::fetch::{FetchError, FetchSettings, Fetcher};
use crate::urls::resolve_url;

static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<item\b[^>]*>(.*?)</item>"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<title\b[^>]*>(.*?)</title>"));

static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?s)^\s*<!\[CDATA\[(.*?)\]\]>\s*$"));

/// SmugMug handler.
#[derive(Debug)]
pub struct SmugmugHandler {
    name: &'static str,
    matcher: Matcher,
    fetcher: Fetcher,
}

impl SmugmugHandler {
    /// Handler for `*.smugmug.com` URLs.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        Ok(Self {
            name: "smugmug",
            matcher: Matcher::url(r"^https?://(?:[a-z0-9-]+\.)*smugmug\.com/"),
            fetcher: Fetcher::with_settings(settings)?,
        })
    }

    /// Handler for SmugMug-hosted galleries on custom domains, recognised by
    /// CDN references in the page body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the HTTP client cannot be built.
    pub fn custom_domain(settings: &FetchSettings) -> Result<Self, FetchError> {
        Ok(Self {
            name: "smugmug-custom-domain",
            matcher: Matcher::body(r"(?:photos\.smugmug\.com|cdn\.smugmug\.com|smugmug\.com/)"),
            fetcher: Fetcher::with_settings(settings)?,
        })
    }
}

fn feed_link(html: &str, page_url: &str) -> Option<String> {
    scan_tags(html)
        .into_iter()
        .filter(|tag| tag.name == "link" && tag.has_rel("alternate"))
        .find(|tag| {
            tag.attr("type")
                .is_some_and(|kind| kind.to_ascii_lowercase().contains("rss"))
        })
        .and_then(|tag| tag.attr("href"))
        .and_then(|href| resolve_url(page_url, &href))
}

fn text_content(raw: &str) -> String {
    let inner = CDATA_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str());
    decode_entities(inner.trim())
}

fn channel_title(feed: &str) -> Option<String> {
    let head = feed.find("<item").map_or(feed, |idx| &feed[..idx]);
    TITLE_RE
        .captures(head)
        .and_then(|caps| caps.get(1))
        .map(|m| text_content(m.as_str()))
        .filter(|title| !title.is_empty())
}

/// Widest `media:content`, falling back to the `enclosure`.
fn item_image(item: &str) -> Option<String> {
    let tags = scan_tags(item);
    tags.iter()
        .filter(|tag| tag.name == "media:content")
        .filter_map(|tag| {
            let url = tag.attr("url")?;
            let width = tag
                .attr("width")
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(0);
            Some((width, url))
        })
        // Earliest wins among equal widths.
        .fold(None, |best: Option<(u32, String)>, (width, url)| match best {
            Some((best_width, _)) if best_width >= width => best,
            _ => Some((width, url)),
        })
        .map(|(_, url)| url)
        .or_else(|| {
            tags.iter()
                .find(|tag| tag.name == "enclosure")
                .and_then(|tag| tag.attr("url"))
        })
}

fn parse_feed(feed: &str, feed_url: &str) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    ITEM_RE
        .captures_iter(feed)
        .filter_map(|caps| {
            let item = caps.get(1)?.as_str();
            let url = resolve_url(feed_url, &item_image(item)?)?;
            let name = TITLE_RE
                .captures(item)
                .and_then(|title| title.get(1))
                .map(|m| text_content(m.as_str()));
            Some(ImageRef::new(url).with_name(name))
        })
        .filter(|image| seen.insert(image.url.clone()))
        .collect()
}

#[async_trait]
impl SiteHandler for SmugmugHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    #[instrument(skip(self, body), fields(site = self.name))]
    async fn list(&self, url: &str, body: Option<&str>) -> Result<Gallery, ExtractError> {
        let page = first_page(&self.fetcher, url, body).await?;
        let feed_url = feed_link(&page.body, &page.url)
            .ok_or_else(|| ExtractError::failed(self.name, url, "no RSS feed link on page"))?;
        debug!(feed = %feed_url, "fetching gallery feed");

        let feed = self.fetcher.fetch_page(&feed_url).await?;
        let title = require_title(
            self.name,
            url,
            infer_title(channel_title(&feed.body).as_deref(), None, url),
        )?;
        let images = parse_feed(&feed.body, &feed.url);

        info!(title = %title, images = images.len(), "listed gallery");
        Ok(Gallery::new(title, images))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
<channel>
  <title><![CDATA[Wedding &amp; Party]]></title>
  <item>
    <title>First dance</title>
    <media:group>
      <media:content url="https://photos.smugmug.com/a/S/1-S.jpg" width="400" />
      <media:content url="https://photos.smugmug.com/a/X3/1-X3.jpg" width="2048" />
      <media:content url="https://photos.smugmug.com/a/M/1-M.jpg" width="800" />
    </media:group>
  </item>
  <item>
    <title>Cake</title>
    <enclosure url="https://photos.smugmug.com/a/O/2-O.jpg" type="image/jpeg" length="1"/>
  </item>
  <item><title>No image</title></item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_feed_picks_widest_and_enclosure() {
        let images = parse_feed(FEED, "https://x.smugmug.com/hack/feed.mg");
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].url, "https://photos.smugmug.com/a/X3/1-X3.jpg");
        assert_eq!(images[0].name.as_deref(), Some("First dance"));
        assert_eq!(images[1].url, "https://photos.smugmug.com/a/O/2-O.jpg");
    }

    #[test]
    fn test_channel_title_cdata() {
        assert_eq!(channel_title(FEED).as_deref(), Some("Wedding & Party"));
    }

    #[test]
    fn test_feed_link_resolved() {
        let html = r#"<link rel="alternate" type="application/rss+xml" title="RSS" href="/hack/feed.mg?Type=gallery&amp;Data=1">"#;
        assert_eq!(
            feed_link(html, "https://ann.smugmug.com/Trips/Rome/").as_deref(),
            Some("https://ann.smugmug.com/hack/feed.mg?Type=gallery&Data=1")
        );
    }
}
