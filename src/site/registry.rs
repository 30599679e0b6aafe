//! Priority-ordered handler registry with first-match selection.

use std::fmt;

use tracing::{debug, info, warn};

use super::{ExtractError, Matcher, SiteHandler};
use crate::fetch::Fetcher;

/// The handler chosen for a URL, plus the page body if one was fetched to
/// decide.
pub struct Selection<'a> {
    /// Matching handler.
    pub handler: &'a dyn SiteHandler,
    /// Body fetched during selection, reused by the handler's listing.
    pub body: Option<String>,
}

impl fmt::Debug for Selection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("handler", &self.handler.name())
            .field("body_bytes", &self.body.as_ref().map(String::len))
            .finish()
    }
}

/// Ordered handler list. Registration order is priority order.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn SiteHandler>>,
    fetcher: Fetcher,
}

impl HandlerRegistry {
    /// Creates an empty registry; `fetcher` serves body-pattern predicates.
    #[must_use]
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            handlers: Vec::new(),
            fetcher,
        }
    }

    /// Appends a handler at the lowest priority so far.
    #[tracing::instrument(skip(self, handler), fields(site = handler.name()))]
    pub fn register(&mut self, handler: Box<dyn SiteHandler>) {
        debug!(body = handler.matcher().needs_body(), "registering site handler");
        self.handlers.push(handler);
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in priority order.
    #[must_use]
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }

    /// Selects the first handler whose predicate matches `url`.
    ///
    /// The page body is fetched at most once, and only when a body predicate
    /// is reached. A failed or non-2xx body fetch counts as "no body": body
    /// predicates then simply do not match.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::NoHandlerMatched`] when nothing matches.
    #[tracing::instrument(skip(self))]
    pub async fn select(&self, url: &str) -> Result<Selection<'_>, ExtractError> {
        let mut body: Option<Option<String>> = None;

        for handler in &self.handlers {
            let matched = match handler.matcher() {
                Matcher::Url(pattern) => pattern.is_match(url),
                Matcher::Body(pattern) => {
                    if body.is_none() {
                        body = Some(self.fetch_body(url).await);
                    }
                    body.as_ref()
                        .and_then(Option::as_deref)
                        .is_some_and(|text| pattern.is_match(text))
                }
            };
            if matched {
                info!(site = handler.name(), "selected site handler");
                return Ok(Selection {
                    handler: handler.as_ref(),
                    body: body.flatten(),
                });
            }
        }

        Err(ExtractError::no_handler(url))
    }

    async fn fetch_body(&self, url: &str) -> Option<String> {
        match self.fetcher.fetch(url).await {
            Ok(response) if response.is_success() => Some(response.text()),
            Ok(response) => {
                warn!(status = response.status, "page fetch for handler selection was not successful");
                None
            }
            Err(error) => {
                warn!(error = %error, "page fetch for handler selection failed");
                None
            }
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handler_names())
            .finish_non_exhaustive()
    }
}
