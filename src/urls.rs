//! Relative URL resolution and path helpers shared by site handlers and the
//! download pipeline.

use url::Url;

/// Resolves a possibly relative `reference` against `base`.
///
/// - surrounding whitespace is trimmed
/// - a reference that already carries a scheme is returned unchanged
/// - `//host/path` inherits the scheme of `base`
/// - anything else is joined per RFC 3986, collapsing `.` and `..` segments and
///   keeping the reference's own query and fragment
///
/// Returns `None` when `base` is not an absolute URL or the join fails.
#[must_use]
pub fn resolve_url(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if has_scheme(reference) {
        return Some(reference.to_string());
    }
    let base = Url::parse(base.trim()).ok()?;
    if let Some(rest) = reference.strip_prefix("//") {
        return Some(format!("{}://{rest}", base.scheme()));
    }
    base.join(reference).ok().map(String::from)
}

fn has_scheme(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Removes a trailing `#fragment`.
#[must_use]
pub fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(head, _)| head)
}

/// Returns the last path segment of `url` with any query and fragment removed.
///
/// Works on raw strings so that URLs the `url` crate would reject still yield
/// a segment.
#[must_use]
pub fn last_path_segment(url: &str) -> &str {
    let without_fragment = strip_fragment(url);
    let without_query = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(head, _)| head);
    let path = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| {
            rest.find('/').map_or("", |idx| &rest[idx..])
        });
    path.rsplit('/').next().unwrap_or("")
}

/// Returns the lowercase file extension (without the dot) of the last path
/// segment, if it has one.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let segment = last_path_segment(url);
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 8 {
        return None;
    }
    ext.chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then(|| ext.to_ascii_lowercase())
}

/// Returns the last non-empty path segment, percent-decoded.
#[must_use]
pub fn last_non_empty_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()?;
    let decoded = urlencoding::decode(segment)
        .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned);
    Some(decoded)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url_parent_segment() {
        assert_eq!(
            resolve_url("http://h/x/y/", "../b").as_deref(),
            Some("http://h/x/b")
        );
    }

    #[test]
    fn test_resolve_url_dot_segments_collapse() {
        assert_eq!(
            resolve_url("http://h/a/b/c", "./d/../e").as_deref(),
            Some("http://h/a/b/e")
        );
        assert_eq!(
            resolve_url("http://h/a/b/c", "../../../../x").as_deref(),
            Some("http://h/x")
        );
    }

    #[test]
    fn test_resolve_url_absolute_returned_unchanged() {
        assert_eq!(
            resolve_url("http://h/x/", "  https://other.example/P?a=1#f  ").as_deref(),
            Some("https://other.example/P?a=1#f")
        );
        assert_eq!(
            resolve_url("not a base", "http://h").as_deref(),
            Some("http://h")
        );
    }

    #[test]
    fn test_resolve_url_protocol_relative_takes_base_scheme() {
        assert_eq!(
            resolve_url("http://h/x/", "//cdn.example/i.jpg").as_deref(),
            Some("http://cdn.example/i.jpg")
        );
    }

    #[test]
    fn test_resolve_url_keeps_query_and_fragment() {
        assert_eq!(
            resolve_url("http://h/x/y?old=1", "z?page=2#top").as_deref(),
            Some("http://h/x/z?page=2#top")
        );
        assert_eq!(
            resolve_url("http://h/x/y", "?page=3").as_deref(),
            Some("http://h/x/y?page=3")
        );
    }

    #[test]
    fn test_resolve_url_is_idempotent() {
        let once = resolve_url("http://h/x/y/", "../b/./c").unwrap();
        assert_eq!(resolve_url("http://h/q/", &once).unwrap(), once);
    }

    #[test]
    fn test_resolve_url_invalid_base_for_relative() {
        assert_eq!(resolve_url("relative/base", "x"), None);
    }

    #[test]
    fn test_last_path_segment_strips_query() {
        assert_eq!(last_path_segment("http://h/a/b.jpg?x=1#y"), "b.jpg");
        assert_eq!(last_path_segment("http://h/a/"), "");
        assert_eq!(last_path_segment("http://h"), "");
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            extension_from_url("https://i.example/p/IMG_01.JPG?size=o").as_deref(),
            Some("jpg")
        );
        assert_eq!(extension_from_url("https://h/photo"), None);
        assert_eq!(extension_from_url("https://h/dir.v2/photo"), None);
        assert_eq!(extension_from_url("https://h/.hidden"), None);
    }

    #[test]
    fn test_last_non_empty_segment_decodes() {
        assert_eq!(
            last_non_empty_segment("https://h/albums/Summer%20Trip/").as_deref(),
            Some("Summer Trip")
        );
        assert_eq!(last_non_empty_segment("https://h/"), None);
    }
}
