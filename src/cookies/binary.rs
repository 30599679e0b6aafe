//! Reader for the binary cookie-store container (`Cookies.binarycookies`).
//!
//! Layout:
//! - file header: magic `cook`, big-endian page count, one big-endian size per page,
//!   then the pages back to back
//! - page: big-endian tag `0x00000100`, little-endian cookie count, then one
//!   little-endian offset per cookie (relative to the page start)
//! - cookie record: eight little-endian `u32` header fields
//!   `{size, _, flags, _, domain, name, path, value}` where the four string
//!   offsets are relative to the record start; each string runs until the next
//!   string's offset (the value until the end of the record) and is cut at its
//!   first NUL byte
//!
//! Anything after the last page (checksum, trailer plist) is ignored.

use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument};

/// Magic bytes at the start of the file.
const MAGIC: &[u8; 4] = b"cook";

/// Tag every page starts with.
const PAGE_TAG: u32 = 0x0000_0100;

/// Size of the fixed record header (eight `u32` fields).
const RECORD_HEADER_LEN: usize = 32;

const FLAG_SECURE: u32 = 0x1;
const FLAG_HTTP_ONLY: u32 = 0x4;

/// One cookie read from the store.
///
/// The value is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieRecord {
    /// Cookie domain (`.example.com` for domain cookies).
    pub domain: String,
    /// Cookie name.
    pub name: String,
    /// Path scope.
    pub path: String,
    /// Secure flag from the record flags.
    pub secure: bool,
    /// `HttpOnly` flag from the record flags.
    pub http_only: bool,
    value: String,
}

impl CookieRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            path: path.into(),
            secure: false,
            http_only: false,
            value: value.into(),
        }
    }

    /// Returns the cookie value. Never log it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the cookie applies to `host_suffix` or one of its
    /// subdomains (`facebook.com` matches `.facebook.com` and `m.facebook.com`).
    #[must_use]
    pub fn matches_domain(&self, host_suffix: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let suffix = host_suffix.trim_start_matches('.').to_ascii_lowercase();
        domain == suffix || domain.ends_with(&format!(".{suffix}"))
    }
}

impl fmt::Debug for CookieRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieRecord")
            .field("domain", &self.domain)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors reading a cookie store.
#[derive(Debug, Error)]
pub enum CookieStoreError {
    /// The file could not be read.
    #[error("failed to read cookie store {path}: {source}")]
    Io {
        /// Path of the store.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the `cook` magic.
    #[error("not a binary cookie store (bad magic)")]
    BadMagic,

    /// The data ended before a structure was complete.
    #[error("cookie store truncated while reading {what}")]
    Truncated {
        /// Structure being read.
        what: &'static str,
    },

    /// A page does not start with the expected tag.
    #[error("cookie page {page} has tag {found:#010x}, expected {PAGE_TAG:#010x}")]
    BadPageTag {
        /// Zero-based page index.
        page: usize,
        /// Tag found.
        found: u32,
    },

    /// A record or string offset points outside its container.
    #[error("cookie {what} offset {offset} out of bounds (limit {limit})")]
    OffsetOutOfBounds {
        /// Structure being addressed.
        what: &'static str,
        /// Offending offset.
        offset: usize,
        /// Container length.
        limit: usize,
    },
}

/// Reads and parses the cookie store at `path`.
///
/// # Errors
///
/// Returns [`CookieStoreError::Io`] when the file cannot be read, or any
/// parse error from [`parse_binary_cookies`].
#[instrument(level = "debug", fields(path = %path.display()))]
pub fn read_cookie_store(path: &Path) -> Result<Vec<CookieRecord>, CookieStoreError> {
    let data = std::fs::read(path).map_err(|source| CookieStoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_binary_cookies(&data)
}

/// Parses a binary cookie store held in memory.
///
/// # Errors
///
/// Returns a [`CookieStoreError`] describing the first structural problem.
pub fn parse_binary_cookies(data: &[u8]) -> Result<Vec<CookieRecord>, CookieStoreError> {
    if data.len() < 8 {
        return Err(CookieStoreError::Truncated {
            what: "file header",
        });
    }
    if &data[0..4] != MAGIC {
        return Err(CookieStoreError::BadMagic);
    }

    let page_count = read_u32_be(data, 4, "page count")? as usize;
    let mut page_sizes = Vec::with_capacity(page_count.min(1024));
    for index in 0..page_count {
        page_sizes.push(read_u32_be(data, 8 + index * 4, "page size table")? as usize);
    }

    let mut cursor = 8 + page_count * 4;
    let mut cookies = Vec::new();
    for (index, size) in page_sizes.into_iter().enumerate() {
        let end = cursor
            .checked_add(size)
            .filter(|end| *end <= data.len())
            .ok_or(CookieStoreError::Truncated { what: "page" })?;
        let page_cookies = parse_page(&data[cursor..end], index)?;
        debug!(page = index, cookies = page_cookies.len(), "parsed cookie page");
        cookies.extend(page_cookies);
        cursor = end;
    }

    Ok(cookies)
}

fn parse_page(page: &[u8], index: usize) -> Result<Vec<CookieRecord>, CookieStoreError> {
    let tag = read_u32_be(page, 0, "page tag")?;
    if tag != PAGE_TAG {
        return Err(CookieStoreError::BadPageTag {
            page: index,
            found: tag,
        });
    }

    let count = read_u32_le(page, 4, "cookie count")? as usize;
    let mut cookies = Vec::with_capacity(count.min(1024));
    for slot in 0..count {
        let offset = read_u32_le(page, 8 + slot * 4, "cookie offset table")? as usize;
        if offset >= page.len() {
            return Err(CookieStoreError::OffsetOutOfBounds {
                what: "record",
                offset,
                limit: page.len(),
            });
        }
        cookies.push(parse_record(&page[offset..])?);
    }
    Ok(cookies)
}

fn parse_record(data: &[u8]) -> Result<CookieRecord, CookieStoreError> {
    if data.len() < RECORD_HEADER_LEN {
        return Err(CookieStoreError::Truncated {
            what: "record header",
        });
    }

    let mut header = [0usize; 8];
    for (slot, field) in header.iter_mut().enumerate() {
        *field = read_u32_le(data, slot * 4, "record header")? as usize;
    }
    let [size, _, flags, _, domain_at, name_at, path_at, value_at] = header;

    if size > data.len() {
        return Err(CookieStoreError::OffsetOutOfBounds {
            what: "record size",
            offset: size,
            limit: data.len(),
        });
    }
    let record = &data[..size];

    let domain = read_field(record, domain_at, name_at)?;
    let name = read_field(record, name_at, path_at)?;
    let path = read_field(record, path_at, value_at)?;
    let value = read_field(record, value_at, record.len())?;

    let flags = u32::try_from(flags).unwrap_or_default();
    Ok(CookieRecord {
        domain,
        name,
        path,
        secure: flags & FLAG_SECURE != 0,
        http_only: flags & FLAG_HTTP_ONLY != 0,
        value,
    })
}

/// Reads the string at `start`, bounded by `next` (the following field's
/// offset) when that lies after `start`, otherwise by the end of the record.
fn read_field(record: &[u8], start: usize, next: usize) -> Result<String, CookieStoreError> {
    if start >= record.len() {
        return Err(CookieStoreError::OffsetOutOfBounds {
            what: "string",
            offset: start,
            limit: record.len(),
        });
    }
    let end = if next > start {
        next.min(record.len())
    } else {
        record.len()
    };
    let raw = &record[start..end];
    let raw = raw
        .iter()
        .position(|&b| b == 0)
        .map_or(raw, |nul| &raw[..nul]);
    Ok(String::from_utf8_lossy(raw).into_owned())
}

fn read_u32_be(data: &[u8], at: usize, what: &'static str) -> Result<u32, CookieStoreError> {
    read_word(data, at, what).map(u32::from_be_bytes)
}

fn read_u32_le(data: &[u8], at: usize, what: &'static str) -> Result<u32, CookieStoreError> {
    read_word(data, at, what).map(u32::from_le_bytes)
}

fn read_word(data: &[u8], at: usize, what: &'static str) -> Result<[u8; 4], CookieStoreError> {
    at.checked_add(4)
        .and_then(|end| data.get(at..end))
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .ok_or(CookieStoreError::Truncated { what })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// Builds one record: 32-byte header, 16 bytes of dates, then the strings.
    pub(crate) fn record_bytes(domain: &str, name: &str, path: &str, value: &str, flags: u32) -> Vec<u8> {
        let strings_at = RECORD_HEADER_LEN + 16;
        let domain_at = strings_at;
        let name_at = domain_at + domain.len() + 1;
        let path_at = name_at + name.len() + 1;
        let value_at = path_at + path.len() + 1;
        let size = value_at + value.len() + 1;

        let mut out = Vec::with_capacity(size);
        for word in [size, 0, flags as usize, 0, domain_at, name_at, path_at, value_at] {
            out.extend_from_slice(&u32::try_from(word).unwrap().to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 16]);
        for text in [domain, name, path, value] {
            out.extend_from_slice(text.as_bytes());
            out.push(0);
        }
        out
    }

    /// Builds one page: tag, cookie count, offset table, footer, records.
    pub(crate) fn page_bytes(records: &[Vec<u8>]) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(&PAGE_TAG.to_be_bytes());
        page.extend_from_slice(&u32::try_from(records.len()).unwrap().to_le_bytes());
        let mut offset = 8 + records.len() * 4 + 4;
        for record in records {
            page.extend_from_slice(&u32::try_from(offset).unwrap().to_le_bytes());
            offset += record.len();
        }
        page.extend_from_slice(&[0u8; 4]);
        for record in records {
            page.extend_from_slice(record);
        }
        page
    }

    /// Wraps pages into a store with its page size table and trailer.
    pub(crate) fn pages_store_bytes(pages: &[Vec<u8>]) -> Vec<u8> {
        let mut file = Vec::new();
        file.extend_from_slice(MAGIC);
        file.extend_from_slice(&u32::try_from(pages.len()).unwrap().to_be_bytes());
        for page in pages {
            file.extend_from_slice(&u32::try_from(page.len()).unwrap().to_be_bytes());
        }
        for page in pages {
            file.extend_from_slice(page);
        }
        file.extend_from_slice(&[0u8; 8]);
        file
    }

    /// Wraps records into a single-page store.
    pub(crate) fn store_bytes(records: &[Vec<u8>]) -> Vec<u8> {
        pages_store_bytes(&[page_bytes(records)])
    }

    #[test]
    fn test_parse_single_cookie() {
        let data = store_bytes(&[record_bytes(".facebook.com", "c_user", "/", "1234", 0x5)]);
        let cookies = parse_binary_cookies(&data).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].domain, ".facebook.com");
        assert_eq!(cookies[0].name, "c_user");
        assert_eq!(cookies[0].path, "/");
        assert_eq!(cookies[0].value(), "1234");
        assert!(cookies[0].secure);
        assert!(cookies[0].http_only);
    }

    #[test]
    fn test_parse_multiple_cookies_in_one_page() {
        let data = store_bytes(&[
            record_bytes("a.example", "one", "/", "1", 0),
            record_bytes("b.example", "two", "/p", "2", 1),
        ]);
        let cookies = parse_binary_cookies(&data).unwrap();
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["one", "two"]);
        assert_eq!(cookies[1].path, "/p");
        assert!(!cookies[0].secure);
        assert!(cookies[1].secure);
    }

    #[test]
    fn test_parse_cookies_across_pages_in_order() {
        let first = page_bytes(&[
            record_bytes(".facebook.com", "c_user", "/", "5", 0x1),
            record_bytes(".facebook.com", "xs", "/", "secret-token", 0x5),
        ]);
        let second = page_bytes(&[record_bytes("www.flickr.com", "cookie_session", "/photos", "abc", 0)]);
        assert_ne!(first.len(), second.len());
        let data = pages_store_bytes(&[first, second]);

        let cookies = parse_binary_cookies(&data).unwrap();
        let found: Vec<(&str, &str, &str)> = cookies
            .iter()
            .map(|c| (c.domain.as_str(), c.name.as_str(), c.value()))
            .collect();
        assert_eq!(
            found,
            [
                (".facebook.com", "c_user", "5"),
                (".facebook.com", "xs", "secret-token"),
                ("www.flickr.com", "cookie_session", "abc"),
            ]
        );
        assert_eq!(cookies[2].path, "/photos");
        assert!(cookies[1].http_only);
        assert!(!cookies[2].secure);
    }

    #[test]
    fn test_bad_tag_on_second_page_names_the_page() {
        let mut second = page_bytes(&[record_bytes("b", "n", "/", "v", 0)]);
        second[0] = 0xff;
        let data = pages_store_bytes(&[page_bytes(&[record_bytes("a", "n", "/", "v", 0)]), second]);
        let err = parse_binary_cookies(&data).unwrap_err();
        assert!(matches!(err, CookieStoreError::BadPageTag { page: 1, .. }));
    }

    #[test]
    fn test_page_size_beyond_data_is_truncated() {
        let mut data = store_bytes(&[record_bytes("a", "b", "/", "c", 0)]);
        data[8..12].copy_from_slice(&9999u32.to_be_bytes());
        let err = parse_binary_cookies(&data).unwrap_err();
        assert!(matches!(err, CookieStoreError::Truncated { what: "page" }));
    }

    #[test]
    fn test_fields_trimmed_at_first_nul() {
        let mut record = record_bytes("x.example", "name", "/", "value", 0);
        // Corrupt the value so an early NUL hides the tail.
        let len = record.len();
        record[len - 3] = 0;
        let cookies = parse_binary_cookies(&store_bytes(&[record])).unwrap();
        assert_eq!(cookies[0].value(), "val");
    }

    #[test]
    fn test_zero_pages_is_empty() {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&0u32.to_be_bytes());
        assert!(parse_binary_cookies(&data).unwrap().is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = parse_binary_cookies(b"kooc\0\0\0\0").unwrap_err();
        assert!(matches!(err, CookieStoreError::BadMagic));
    }

    #[test]
    fn test_bad_page_tag_rejected() {
        let mut data = store_bytes(&[record_bytes("a", "b", "/", "c", 0)]);
        data[12] = 0xff;
        let err = parse_binary_cookies(&data).unwrap_err();
        assert!(matches!(err, CookieStoreError::BadPageTag { page: 0, .. }));
    }

    #[test]
    fn test_truncated_page_rejected() {
        let data = store_bytes(&[record_bytes("a", "b", "/", "c", 0)]);
        let err = parse_binary_cookies(&data[..20]).unwrap_err();
        assert!(matches!(err, CookieStoreError::Truncated { .. }));
    }

    #[test]
    fn test_record_offset_out_of_bounds() {
        let mut data = store_bytes(&[record_bytes("a", "b", "/", "c", 0)]);
        // First cookie offset lives right after page tag + count.
        data[20..24].copy_from_slice(&9999u32.to_le_bytes());
        let err = parse_binary_cookies(&data).unwrap_err();
        assert!(matches!(err, CookieStoreError::OffsetOutOfBounds { what: "record", .. }));
    }

    #[test]
    fn test_matches_domain() {
        let cookie = CookieRecord::new(".facebook.com", "n", "/", "v");
        assert!(cookie.matches_domain("facebook.com"));
        let sub = CookieRecord::new("m.facebook.com", "n", "/", "v");
        assert!(sub.matches_domain("facebook.com"));
        let other = CookieRecord::new("notfacebook.com", "n", "/", "v");
        assert!(!other.matches_domain("facebook.com"));
    }

    #[test]
    fn test_debug_redacts_value() {
        let cookie = CookieRecord::new("a", "session", "/", "supersecret");
        let debug = format!("{cookie:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
