//! Download pipeline: gallery directory, positional file names, the default
//! per-image downloader, and capture-time correction.

mod error;
mod metadata;
mod naming;
mod pipeline;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

use crate::fetch::{Fetcher, last_modified};

pub use error::{DownloadError, PipelineError};
pub use metadata::{ExiftoolHook, MetadataHook, NoMetadata};
pub use naming::{names_are_discriminating, positional_file_name, sanitize_suffix, sanitize_title};
pub use pipeline::{DownloadPipeline, DownloadedFile, GalleryDownload, GalleryPlan, PlannedImage};

/// Bodies shorter than this are error pages, not images.
pub const MIN_IMAGE_BYTES: u64 = 256;

/// Default downloader: GET `url`, stream the body to `dest`, and set the
/// file's modification time.
///
/// The body is written to a `.part` sibling and renamed into place only once
/// it is complete and at least [`MIN_IMAGE_BYTES`] long, so a failed download
/// leaves no file at `dest`. The modification time is `explicit_time` when
/// given, otherwise the response's `Last-Modified`; the applied time is
/// returned.
///
/// # Errors
///
/// Returns [`DownloadError`] for fetch failures, short bodies, and IO errors.
#[instrument(level = "debug", skip(fetcher, explicit_time), fields(dest = %dest.display()))]
pub async fn default_download(
    fetcher: &Fetcher,
    url: &str,
    dest: &Path,
    explicit_time: Option<SystemTime>,
) -> Result<Option<SystemTime>, DownloadError> {
    let response = fetcher.fetch_stream(url).await?;
    let transport_time = last_modified(&response);

    let part = part_path(dest);
    let mut file = File::create(&part)
        .await
        .map_err(|e| DownloadError::io(&part, e))?;
    let written = match stream_to_file(&mut file, response, url, &part).await {
        Ok(written) => written,
        Err(error) => {
            drop(file);
            remove_quietly(&part).await;
            return Err(error);
        }
    };
    drop(file);

    if written < MIN_IMAGE_BYTES {
        remove_quietly(&part).await;
        return Err(DownloadError::EmptyBody {
            url: url.to_string(),
            bytes: written,
        });
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| DownloadError::io(dest, e))?;

    let applied = explicit_time.or(transport_time);
    if let Some(time) = applied {
        set_file_mtime(dest, time).map_err(|e| DownloadError::io(dest, e))?;
    }
    debug!(bytes = written, timestamped = applied.is_some(), "downloaded");
    Ok(applied)
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %error, "cannot remove partial download");
    }
}

/// Sets the modification time of the file at `path`.
///
/// # Errors
///
/// Returns the IO error from opening or updating the file.
pub fn set_file_mtime(path: &Path, time: SystemTime) -> std::io::Result<()> {
    std::fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(time)
}
