//! Error types for handler selection and gallery extraction.
//!
//! Every variant here is terminal for the gallery being processed; the caller
//! reports it and moves on to the next URL.

use thiserror::Error;

use crate::fetch::FetchError;

/// Errors raised while selecting a handler or listing a gallery.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No registered handler accepts the URL or its page body.
    #[error(
        "no site handler matched '{url}'\n  Suggestion: Check the URL points at a gallery page on a supported site"
    )]
    NoHandlerMatched {
        /// The URL no handler accepted.
        url: String,
    },

    /// The listing could not be parsed into a gallery.
    #[error("{site}: extraction failed for '{url}': {reason}")]
    ExtractionFailed {
        /// Handler name.
        site: &'static str,
        /// Page being parsed.
        url: String,
        /// What was missing or malformed.
        reason: String,
    },

    /// The original-image lookup failed; no image in the gallery can be resolved.
    #[error(
        "secret resolution failed: {reason}\n  Suggestion: The site's internal API may have changed; retry later"
    )]
    SecretResolutionFailed {
        /// Which step failed.
        reason: String,
    },

    /// The site answered with a login page or an auth status.
    #[error("{site}: authentication required for '{url}': {hint}")]
    AuthRequired {
        /// Handler name.
        site: &'static str,
        /// URL that was refused.
        url: String,
        /// Likely cause and fix.
        hint: String,
    },

    /// A listing fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ExtractError {
    /// Creates a `NoHandlerMatched` error.
    #[must_use]
    pub fn no_handler(url: &str) -> Self {
        Self::NoHandlerMatched {
            url: url.to_string(),
        }
    }

    /// Creates an `ExtractionFailed` error.
    #[must_use]
    pub fn failed(site: &'static str, url: &str, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            site,
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `SecretResolutionFailed` error.
    #[must_use]
    pub fn secret(reason: impl Into<String>) -> Self {
        Self::SecretResolutionFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `AuthRequired` error.
    #[must_use]
    pub fn auth_required(site: &'static str, url: &str, hint: impl Into<String>) -> Self {
        Self::AuthRequired {
            site,
            url: url.to_string(),
            hint: hint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_handler_display_has_suggestion() {
        let msg = ExtractError::no_handler("https://unknown.example/a").to_string();
        assert!(msg.contains("https://unknown.example/a"));
        assert!(msg.contains("Suggestion:"));
    }

    #[test]
    fn test_failed_display_names_site() {
        let msg = ExtractError::failed("pbase", "https://pbase.com/x", "no title").to_string();
        assert!(msg.starts_with("pbase:"));
        assert!(msg.contains("no title"));
    }

    #[test]
    fn test_fetch_error_converts() {
        let err: ExtractError = FetchError::http_status("https://h/x", 500).into();
        assert!(matches!(err, ExtractError::Fetch(_)));
        assert!(err.to_string().contains("500"));
    }
}
