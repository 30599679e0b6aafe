//! Turning cookie-store records into a `reqwest` cookie jar for one site.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, info, instrument, warn};

use super::binary::{CookieRecord, read_cookie_store};

/// Loads cookie records into a `reqwest::cookie::Jar`.
///
/// Each record becomes a `Set-Cookie` string added against an origin URL
/// derived from its domain and path, so the jar's own domain matching applies.
/// Records whose origin cannot be parsed are skipped with a warning.
#[instrument(level = "debug", skip(cookies), fields(count = cookies.len()))]
pub fn load_cookies_into_jar(cookies: &[CookieRecord]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for cookie in cookies {
        let set_cookie = build_set_cookie_string(cookie);
        let origin_url = build_origin_url(cookie);

        if let Ok(url) = origin_url.parse::<url::Url>() {
            jar.add_cookie_str(&set_cookie, &url);
            debug!(domain = %cookie.domain, name = %cookie.name, "loaded cookie into jar");
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            );
        }
    }

    jar
}

fn build_set_cookie_string(cookie: &CookieRecord) -> String {
    let mut parts = vec![
        format!("{}={}", cookie.name, cookie.value()),
        format!("Domain={}", cookie.domain),
    ];
    let path = if cookie.path.is_empty() { "/" } else { &cookie.path };
    parts.push(format!("Path={path}"));
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if cookie.http_only {
        parts.push("HttpOnly".to_string());
    }
    parts.join("; ")
}

fn build_origin_url(cookie: &CookieRecord) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    let domain = cookie.domain.strip_prefix('.').unwrap_or(&cookie.domain);
    let path = if cookie.path.starts_with('/') {
        cookie.path.as_str()
    } else {
        "/"
    };
    format!("{scheme}://{domain}{path}")
}

/// Cookies for one authenticated site, plus what is needed to explain an
/// authentication failure later.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Jar attached to the site's fetcher.
    pub jar: Arc<Jar>,
    /// Number of cookies that matched the site's domain.
    pub cookies_loaded: usize,
    /// Store the cookies were read from, if any.
    pub source: Option<PathBuf>,
}

impl AuthContext {
    /// An empty context (no cookie store configured).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            jar: Arc::new(Jar::default()),
            cookies_loaded: 0,
            source: None,
        }
    }

    /// Builds a context from records already in memory, keeping those that
    /// match `domain`.
    #[must_use]
    pub fn from_records(records: &[CookieRecord], domain: &str, source: Option<PathBuf>) -> Self {
        let matching: Vec<CookieRecord> = records
            .iter()
            .filter(|record| record.matches_domain(domain))
            .cloned()
            .collect();
        Self {
            jar: load_cookies_into_jar(&matching),
            cookies_loaded: matching.len(),
            source,
        }
    }

    /// Reads the store at `path` and keeps the cookies for `domain`.
    ///
    /// Never fails: an unreadable or malformed store is logged and yields an
    /// empty context, so listing can still be attempted anonymously.
    #[must_use]
    pub fn load_for_domain(path: &Path, domain: &str) -> Self {
        match read_cookie_store(path) {
            Ok(records) => {
                let context = Self::from_records(&records, domain, Some(path.to_path_buf()));
                info!(
                    domain,
                    loaded = context.cookies_loaded,
                    total = records.len(),
                    path = %path.display(),
                    "loaded cookies"
                );
                context
            }
            Err(error) => {
                warn!(
                    domain,
                    path = %path.display(),
                    error = %error,
                    "cookie store unreadable; continuing without cookies"
                );
                Self {
                    source: Some(path.to_path_buf()),
                    ..Self::empty()
                }
            }
        }
    }

    /// Hint attached to authentication failures.
    #[must_use]
    pub fn auth_hint(&self) -> String {
        match (&self.source, self.cookies_loaded) {
            (Some(path), 0) => format!(
                "no cookies loaded from {}. Suggestion: log in with the browser that owns this cookie store, or pass --cookies",
                path.display()
            ),
            (None, _) => "no cookie store configured. Suggestion: pass --cookies PATH".to_string(),
            (Some(path), count) => format!(
                "{count} cookies loaded from {} were rejected. Suggestion: log in again to refresh the session",
                path.display()
            ),
        }
    }
}
