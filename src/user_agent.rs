//! Shared User-Agent strings for listing and image requests.
//!
//! Gallery hosts serve reduced or error pages to unknown clients, so listing
//! requests present a browser-like agent while still naming the tool.

/// Project URL appended to the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/fierce/galfetch";

/// Browser engine prefix used so hosts render their regular gallery markup.
const BROWSER_PREFIX: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko)";

/// Default User-Agent for every request issued by a [`crate::fetch::Fetcher`].
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_PREFIX} galfetch/{version} (+{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_tool_and_version() {
        let ua = default_user_agent();
        assert!(ua.starts_with("Mozilla/5.0"), "UA must look like a browser: {ua}");
        assert!(
            ua.contains(&format!("galfetch/{}", env!("CARGO_PKG_VERSION"))),
            "UA must contain crate version: {ua}"
        );
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL: {ua}");
    }
}
