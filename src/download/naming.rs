//! Directory and file naming for downloaded galleries.

use crate::site::ImageRef;

/// Fallback directory name when a title sanitizes to nothing.
const FALLBACK_DIR_NAME: &str = "gallery";

/// Turns a gallery title into a directory name: lowercase, runs of
/// non-alphanumerics collapsed to `_`, leading and trailing `_` trimmed.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_separator = false;
    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch);
        } else {
            pending_separator = true;
        }
    }
    if out.is_empty() {
        FALLBACK_DIR_NAME.to_string()
    } else {
        out
    }
}

/// Reduces a display name to `[-_.a-zA-Z0-9]`; other runs become `_`.
#[must_use]
pub fn sanitize_suffix(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches(|c| c == '_' || c == '.').to_string()
}

/// Case-folded name with trailing digits removed; `None` normalizes to "".
fn normalized_name(name: Option<&str>) -> String {
    name.unwrap_or_default()
        .trim()
        .to_lowercase()
        .trim_end_matches(|c: char| c.is_ascii_digit())
        .to_string()
}

/// Returns false when every image carries the same normalized name, in which
/// case names say nothing about the images and are dropped.
#[must_use]
pub fn names_are_discriminating(images: &[ImageRef]) -> bool {
    let mut names = images.iter().map(|image| normalized_name(image.name.as_deref()));
    let Some(first) = names.next() else {
        return false;
    };
    names.any(|name| name != first)
}

/// `NNN[-suffix].ext` with a 3-digit zero-padded 1-based index.
#[must_use]
pub fn positional_file_name(index: usize, suffix: Option<&str>, extension: &str) -> String {
    match suffix.filter(|value| !value.is_empty()) {
        Some(suffix) => format!("{index:03}-{suffix}.{extension}"),
        None => format!("{index:03}.{extension}"),
    }
}
