//! Single-attempt HTTP fetching.
//!
//! Everything in the crate that touches the network goes through a
//! [`Fetcher`]: handler selection (body-pattern predicates), site listing and
//! API calls, and image downloads. Redirects, TLS, and compression are left to
//! `reqwest`; this layer adds timeouts, the shared User-Agent, optional
//! cookies, and structured errors.

mod client;
mod error;

pub use client::{
    CONNECT_TIMEOUT_SECS, FetchResponse, FetchSettings, Fetcher, Page, READ_TIMEOUT_SECS,
    last_modified,
};
pub use error::FetchError;
