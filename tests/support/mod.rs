#![allow(dead_code)]

pub mod socket_guard;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Image-sized body; anything under 256 bytes counts as an error page.
#[must_use]
pub fn image_bytes(fill: u8) -> Vec<u8> {
    vec![fill; 1024]
}

/// Serves an image body at `route`, optionally with a `Last-Modified` header.
pub async fn mount_image(server: &MockServer, route: &str, fill: u8, last_modified: Option<&str>) {
    let mut response = ResponseTemplate::new(200)
        .insert_header("Content-Type", "image/jpeg")
        .set_body_bytes(image_bytes(fill));
    if let Some(date) = last_modified {
        response = response.insert_header("Last-Modified", date);
    }
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Serves `html` at `route`.
pub async fn mount_html(server: &MockServer, route: &str, html: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html; charset=utf-8")
                .set_body_string(html),
        )
        .mount(server)
        .await;
}

/// Sorted file names in `dir`.
#[must_use]
pub fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
