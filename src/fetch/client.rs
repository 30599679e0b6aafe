//! `reqwest` wrapper providing the single-attempt fetch capability used by
//! handler selection, site extraction, and image downloads.

use std::panic::{AssertUnwindSafe, catch_unwind, set_hook, take_hook};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reqwest::cookie::Jar;
use reqwest::header::LAST_MODIFIED;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::FetchError;
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large originals).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Connection settings for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Cookies attached to matching requests.
    pub cookie_jar: Option<Arc<Jar>>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            cookie_jar: None,
        }
    }
}

impl FetchSettings {
    /// Returns a copy of these settings with `jar` attached.
    #[must_use]
    pub fn with_cookie_jar(&self, jar: Arc<Jar>) -> Self {
        Self {
            cookie_jar: Some(jar),
            ..self.clone()
        }
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    /// Parsed `Last-Modified` header.
    pub last_modified: Option<SystemTime>,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A successfully fetched text page.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL after redirects; relative links resolve against this.
    pub url: String,
    /// Decoded body.
    pub body: String,
}

/// HTTP fetcher shared by everything that talks to the network.
///
/// Create once per site handler and reuse for connection pooling. Each call
/// is a single attempt; there is no retry.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a fetcher with default timeouts and no cookies.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_settings(&FetchSettings::default())
    }

    /// Creates a fetcher from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] when the client cannot be built.
    #[instrument(level = "debug", skip(settings), fields(cookies = settings.cookie_jar.is_some()))]
    pub fn with_settings(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = build_client(settings)?;
        Ok(Self { client })
    }

    /// Fetches `url` and buffers the whole body, whatever the status.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on invalid URL, transport failure, or an
    /// unreadable body.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self.send(url).await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let last_modified = last_modified(&response);
        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            })?
            .to_vec();
        debug!(status, bytes = body.len(), "fetched");
        Ok(FetchResponse {
            status,
            final_url,
            last_modified,
            body,
        })
    }

    /// Fetches `url` as text, requiring a 2xx status.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::HttpStatus`] for non-success statuses, plus the
    /// errors of [`fetch`](Self::fetch).
    pub async fn fetch_page(&self, url: &str) -> Result<Page, FetchError> {
        let response = self.fetch(url).await?;
        if !response.is_success() {
            return Err(FetchError::http_status(url, response.status));
        }
        Ok(Page {
            body: response.text(),
            url: response.final_url,
        })
    }

    /// Sends a GET and returns the live response for streaming.
    ///
    /// Non-success statuses are returned as [`FetchError::HttpStatus`].
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on invalid URL, transport failure, or a
    /// non-success status.
    pub async fn fetch_stream(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self.send(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        self.client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::from_send(url, source))
    }
}

/// Parses the `Last-Modified` header of a response.
#[must_use]
pub fn last_modified(response: &reqwest::Response) -> Option<SystemTime> {
    response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| httpdate::parse_http_date(value).ok())
}

fn build_client(settings: &FetchSettings) -> Result<Client, FetchError> {
    match try_build_client(settings, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Restricted sandboxes can panic while reading system proxy
            // settings; retry with environment proxies only.
            warn!(
                "HTTP client builder panicked while loading system proxy settings; retrying with env-proxy fallback"
            );
            match try_build_client(settings, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(FetchError::ClientBuild {
                    reason: "client builder panicked during env-proxy fallback".to_string(),
                }),
                Err(BuildClientFailure::Build(error)) => Err(FetchError::ClientBuild {
                    reason: error.to_string(),
                }),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(FetchError::ClientBuild {
            reason: error.to_string(),
        }),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

// `catch_unwind` does not silence the panic hook, so the hook is swapped out
// while the guarded build runs.
static CLIENT_BUILD_PANIC_HOOK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn try_build_client(
    settings: &FetchSettings,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let settings = settings.clone();
    catch_unwind_silent(AssertUnwindSafe(move || {
        let mut builder = base_client_builder(&settings);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn catch_unwind_silent<F, T>(operation: F) -> Result<T, Box<dyn std::any::Any + Send + 'static>>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    let _panic_hook_guard = CLIENT_BUILD_PANIC_HOOK_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let previous_hook = take_hook();
    set_hook(Box::new(|_| {}));
    let outcome = catch_unwind(operation);
    set_hook(previous_hook);
    outcome
}

fn base_client_builder(settings: &FetchSettings) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .timeout(Duration::from_secs(settings.read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(jar) = settings.cookie_jar.clone() {
        builder = builder.cookie_provider(jar);
    }
    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = env_proxy_for_scheme("https")
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = env_proxy_for_scheme("http")
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn env_proxy_for_scheme(scheme: &str) -> Option<String> {
    match scheme {
        "https" => find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]),
        "http" => find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]),
        _ => None,
    }
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
