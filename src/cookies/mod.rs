//! Browser cookie-store support for sites that need a logged-in session.

mod binary;
mod jar;

pub use binary::{CookieRecord, CookieStoreError, parse_binary_cookies, read_cookie_store};
pub use jar::{AuthContext, load_cookies_into_jar};
