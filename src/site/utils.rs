//! Shared helpers for site handlers: static regexes, tag attribute scanning,
//! title inference, site date parsing, and the pagination loop.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use regex::Regex;
use time::PrimitiveDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use super::{ExtractError, ImageRef};
use crate::fetch::{Fetcher, Page};
use crate::urls::{last_non_empty_segment, resolve_url};

/// Upper bound on listing pages fetched for one gallery.
pub const MAX_LISTING_PAGES: usize = 500;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<([a-z][a-z0-9:_-]*)\b[^>]*>"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
});

static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<meta\s+[^>]*(?:name|property)\s*=\s*["']og:title["'][^>]*content\s*=\s*["']([^"']*)["']"#,
    )
});

static HTML_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?is)<title[^>]*>(.*?)</title>"));

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)&(#x[0-9a-f]+|#[0-9]+|[a-z]+);"));

/// Returns the first capture of `regex` in `html`, trimmed.
#[must_use]
pub fn extract_meta_value(html: &str, regex: &Regex) -> Option<String> {
    regex
        .captures(html)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
}

/// Returns the `og:title` meta content, entity-decoded.
#[must_use]
pub fn og_title(html: &str) -> Option<String> {
    extract_meta_value(html, &OG_TITLE_RE)
        .map(|value| decode_entities(&value))
        .filter(|value| !value.is_empty())
}

/// Returns the document `<title>`, entity-decoded and whitespace-collapsed.
#[must_use]
pub fn html_title(html: &str) -> Option<String> {
    extract_meta_value(html, &HTML_TITLE_RE)
        .map(|value| collapse_whitespace(&decode_entities(&value)))
        .filter(|value| !value.is_empty())
}

/// One opening (or self-closing) tag with its attributes.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Lowercase element name.
    pub name: String,
    /// Byte offset of the tag in the document.
    pub start: usize,
    attrs: Vec<(String, String)>,
}

impl Tag {
    /// Returns the entity-decoded value of attribute `name` (case-insensitive).
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| decode_entities(value))
    }

    /// Returns true when the space-separated `rel` attribute contains `value`.
    #[must_use]
    pub fn has_rel(&self, value: &str) -> bool {
        self.attr("rel").is_some_and(|rel| {
            rel.split_whitespace()
                .any(|token| token.eq_ignore_ascii_case(value))
        })
    }
}

/// Scans `html` (or XML) for opening tags in document order.
#[must_use]
pub fn scan_tags(html: &str) -> Vec<Tag> {
    TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let attrs = ATTR_RE
                .captures_iter(whole.as_str())
                .filter_map(|attr| {
                    let key = attr.get(1)?.as_str().to_string();
                    let value = attr
                        .get(2)
                        .or_else(|| attr.get(3))
                        .or_else(|| attr.get(4))
                        .map_or("", |m| m.as_str());
                    Some((key, value.to_string()))
                })
                .collect();
            Some(Tag {
                name,
                start: whole.start(),
                attrs,
            })
        })
        .collect()
}

/// Finds the `rel="next"` link (either `<a>` or `<link>`, attributes in any
/// order) and resolves it against `page_url`.
#[must_use]
pub fn find_next_link(html: &str, page_url: &str) -> Option<String> {
    scan_tags(html)
        .into_iter()
        .filter(|tag| tag.name == "a" || tag.name == "link")
        .find(|tag| tag.has_rel("next"))
        .and_then(|tag| tag.attr("href"))
        .filter(|href| !href.trim().is_empty())
        .and_then(|href| resolve_url(page_url, &href))
}

/// Decodes the handful of HTML entities that appear in titles and URLs.
#[must_use]
pub fn decode_entities(value: &str) -> String {
    ENTITY_RE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity.to_ascii_lowercase().as_str() {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                other => other
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| other.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Picks a gallery title: the explicit title when present, otherwise the
/// last non-empty path segment of `url`; a byline is prepended as
/// `"<author>: <title>"`.
#[must_use]
pub fn infer_title(explicit: Option<&str>, byline: Option<&str>, url: &str) -> Option<String> {
    let title = explicit
        .map(|value| collapse_whitespace(&decode_entities(value)))
        .filter(|value| !value.is_empty())
        .or_else(|| last_non_empty_segment(url))?;
    match byline
        .map(|value| collapse_whitespace(&decode_entities(value)))
        .filter(|value| !value.is_empty())
    {
        Some(author) => Some(format!("{author}: {title}")),
        None => Some(title),
    }
}

/// Fails extraction when no usable title was found.
///
/// # Errors
///
/// Returns [`ExtractError::ExtractionFailed`] when `title` is missing or blank.
pub fn require_title(
    site: &'static str,
    url: &str,
    title: Option<String>,
) -> Result<String, ExtractError> {
    title
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ExtractError::failed(site, url, "no gallery title found"))
}

/// Returns true if the HTTP status code indicates authentication is required.
#[must_use]
pub fn is_auth_required_status(status: u16) -> bool {
    matches!(status, 401 | 403 | 407)
}

/// Parses a site-supplied `YYYY-MM-DD HH:MM:SS` timestamp, taken as UTC.
#[must_use]
pub fn parse_site_datetime(value: &str) -> Option<SystemTime> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(value.trim(), format)
        .ok()
        .map(|datetime| SystemTime::from(datetime.assume_utc()))
}

/// Converts Unix seconds to a `SystemTime`; negative values are rejected.
#[must_use]
pub fn unix_time(seconds: i64) -> Option<SystemTime> {
    let seconds = u64::try_from(seconds).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(seconds))
}

/// Returns the pre-fetched page when a body was supplied, otherwise fetches it.
///
/// # Errors
///
/// Returns [`ExtractError::Fetch`] when the fetch fails or is not 2xx.
pub async fn first_page(
    fetcher: &Fetcher,
    url: &str,
    body: Option<&str>,
) -> Result<Page, ExtractError> {
    match body {
        Some(body) => Ok(Page {
            url: url.to_string(),
            body: body.to_string(),
        }),
        None => Ok(fetcher.fetch_page(url).await?),
    }
}

/// What one listing page contributed.
#[derive(Debug, Default)]
pub struct ListingPage {
    /// Images in page order.
    pub images: Vec<ImageRef>,
    /// Next page, already resolved against the page URL.
    pub next: Option<String>,
}

/// Walks a paginated listing starting from an already fetched page.
///
/// `parse` turns each page into images plus an optional next link; `key`
/// gives the identity used for deduplication. The walk stops when there is no
/// next link, a next page was already visited, a page body is empty, a page
/// adds no unseen images, or [`MAX_LISTING_PAGES`] is reached.
///
/// # Errors
///
/// Propagates errors from `parse` and from fetching the next pages.
pub async fn paginate<P, K>(
    fetcher: &Fetcher,
    first: Page,
    mut parse: P,
    key: K,
) -> Result<Vec<ImageRef>, ExtractError>
where
    P: FnMut(&Page) -> Result<ListingPage, ExtractError> + Send,
    K: Fn(&ImageRef) -> String + Send + Sync,
{
    let mut images = Vec::new();
    let mut seen_images = HashSet::new();
    let mut seen_pages = HashSet::new();
    let mut page = first;

    for page_number in 1..=MAX_LISTING_PAGES {
        seen_pages.insert(page.url.clone());
        if page.body.trim().is_empty() {
            debug!(url = %page.url, "empty listing page; stopping");
            break;
        }

        let listing = parse(&page)?;
        let before = images.len();
        for image in listing.images {
            if seen_images.insert(key(&image)) {
                images.push(image);
            }
        }
        let added = images.len() - before;
        debug!(url = %page.url, page = page_number, added, "parsed listing page");

        let Some(next) = listing.next else { break };
        if added == 0 {
            debug!(next = %next, "listing page added no new images; stopping");
            break;
        }
        if seen_pages.contains(&next) {
            debug!(next = %next, "next link loops back; stopping");
            break;
        }
        if page_number == MAX_LISTING_PAGES {
            warn!(limit = MAX_LISTING_PAGES, "listing page limit reached; stopping");
            break;
        }
        page = fetcher.fetch_page(&next).await?;
    }

    Ok(images)
}
