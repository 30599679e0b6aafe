//! Per-gallery download run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use indicatif::ProgressBar;
use tracing::{debug, info, instrument, warn};

use super::error::PipelineError;
use super::metadata::{MetadataHook, NoMetadata};
use super::naming::{names_are_discriminating, positional_file_name, sanitize_suffix, sanitize_title};
use super::set_file_mtime;
use crate::site::{Gallery, ImageRef, SiteHandler};
use crate::urls::{extension_from_url, strip_fragment};

/// A downloaded image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Location of the file.
    pub path: PathBuf,
    /// Capture or modification time, when one is known.
    pub timestamp: Option<SystemTime>,
}

/// One image and where it will be written.
#[derive(Debug, Clone)]
pub struct PlannedImage {
    /// Image to fetch; the URL has its fragment removed.
    pub image: ImageRef,
    /// Destination path.
    pub path: PathBuf,
}

/// Destinations for a whole gallery, computed before anything is fetched.
#[derive(Debug, Clone)]
pub struct GalleryPlan {
    /// Gallery directory.
    pub dir: PathBuf,
    /// Images in gallery order, deduplicated by URL.
    pub images: Vec<PlannedImage>,
}

/// Outcome of downloading one gallery.
#[derive(Debug, Clone)]
pub struct GalleryDownload {
    /// Gallery directory.
    pub dir: PathBuf,
    /// Files present after the run, in gallery order.
    pub files: Vec<DownloadedFile>,
    /// Images that failed and were skipped.
    pub skipped: usize,
}

/// Downloads galleries into directories under an output root.
#[derive(Debug, Clone)]
pub struct DownloadPipeline {
    output_root: PathBuf,
    metadata: Arc<dyn MetadataHook>,
    progress: ProgressBar,
}

impl DownloadPipeline {
    /// Creates a pipeline writing under `output_root`, with no metadata hook
    /// and no progress display.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            metadata: Arc::new(NoMetadata),
            progress: ProgressBar::hidden(),
        }
    }

    /// Sets the capture-time hook applied after each download.
    #[must_use]
    pub fn with_metadata_hook(mut self, hook: Arc<dyn MetadataHook>) -> Self {
        self.metadata = hook;
        self
    }

    /// Sets the progress bar advanced once per image.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Output root.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Computes every destination without touching the network or disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoExtension`] when any image URL lacks a file
    /// extension; the gallery is then not downloaded at all.
    pub fn plan(&self, gallery: &Gallery) -> Result<GalleryPlan, PipelineError> {
        let dir = self.output_root.join(sanitize_title(&gallery.title));

        let mut seen = HashSet::new();
        let unique: Vec<ImageRef> = gallery
            .images
            .iter()
            .filter_map(|image| {
                let url = strip_fragment(&image.url).to_string();
                seen.insert(url.clone()).then(|| ImageRef {
                    url,
                    ..image.clone()
                })
            })
            .collect();
        if unique.len() < gallery.images.len() {
            debug!(duplicates = gallery.images.len() - unique.len(), "dropped duplicate image URLs");
        }

        let keep_names = names_are_discriminating(&unique);
        let mut images = Vec::with_capacity(unique.len());
        for (offset, image) in unique.into_iter().enumerate() {
            let extension = extension_from_url(&image.url).ok_or_else(|| {
                PipelineError::NoExtension {
                    url: image.url.clone(),
                }
            })?;
            let suffix = if keep_names {
                image.name.as_deref().map(sanitize_suffix)
            } else {
                None
            };
            let file_name = positional_file_name(offset + 1, suffix.as_deref(), &extension);
            images.push(PlannedImage {
                path: dir.join(file_name),
                image,
            });
        }

        Ok(GalleryPlan { dir, images })
    }

    /// Downloads every image of `gallery` with `handler`'s downloader.
    ///
    /// A failed image is logged and skipped. Any file already at a
    /// destination is removed first, so success is judged by the file
    /// existing afterwards. A capture time from the metadata hook replaces
    /// the downloader's timestamp and is written to the file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when planning fails or the gallery directory
    /// cannot be created.
    #[instrument(skip(self, handler, gallery), fields(site = handler.name(), title = %gallery.title))]
    pub async fn run(
        &self,
        handler: &dyn SiteHandler,
        gallery: &Gallery,
    ) -> Result<GalleryDownload, PipelineError> {
        let plan = self.plan(gallery)?;
        tokio::fs::create_dir_all(&plan.dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: plan.dir.clone(),
                source,
            })?;

        self.progress.set_length(plan.images.len() as u64);
        let mut files = Vec::with_capacity(plan.images.len());
        let mut skipped = 0usize;

        for planned in &plan.images {
            self.progress.set_message(display_name(&planned.path));
            if let Err(error) = remove_stale(&planned.path).await {
                warn!(path = %planned.path.display(), error = %error, "cannot remove existing file; skipping");
                self.progress.inc(1);
                skipped += 1;
                continue;
            }
            let transport_time = match handler.download(&planned.image, &planned.path).await {
                Ok(time) => time,
                Err(error) => {
                    warn!(url = %planned.image.url, error = %error, "download failed");
                    None
                }
            };
            self.progress.inc(1);

            if !planned.path.exists() {
                warn!(url = %planned.image.url, path = %planned.path.display(), "image missing after download; skipping");
                skipped += 1;
                continue;
            }

            let timestamp = match self.capture_time(&planned.path).await {
                Some(captured) => {
                    if let Err(error) = set_file_mtime(&planned.path, captured) {
                        warn!(path = %planned.path.display(), error = %error, "cannot apply capture time");
                    }
                    Some(captured)
                }
                None => transport_time,
            };
            files.push(DownloadedFile {
                path: planned.path.clone(),
                timestamp,
            });
        }

        self.progress.finish_and_clear();
        info!(downloaded = files.len(), skipped, dir = %plan.dir.display(), "gallery downloaded");
        Ok(GalleryDownload {
            dir: plan.dir,
            files,
            skipped,
        })
    }

    /// Runs the metadata hook off the async workers.
    async fn capture_time(&self, path: &Path) -> Option<SystemTime> {
        let hook = Arc::clone(&self.metadata);
        let path = path.to_path_buf();
        match tokio::task::spawn_blocking(move || hook.capture_time(&path)).await {
            Ok(time) => time,
            Err(error) => {
                warn!(error = %error, "metadata lookup task failed");
                None
            }
        }
    }
}

/// Deletes a file left at `path` by an earlier run.
async fn remove_stale(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed existing file before download");
            Ok(())
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gallery(images: Vec<ImageRef>) -> Gallery {
        Gallery::new("My Trip", images)
    }

    fn file_names(plan: &GalleryPlan) -> Vec<String> {
        plan.images.iter().map(|p| display_name(&p.path)).collect()
    }

    #[test]
    fn test_plan_drops_non_discriminating_names() {
        let pipeline = DownloadPipeline::new("/out");
        let plan = pipeline
            .plan(&gallery(vec![
                ImageRef::new("http://h/a.jpg").with_name(Some("evt1".into())),
                ImageRef::new("http://h/b.jpg").with_name(Some("evt2".into())),
                ImageRef::new("http://h/c.jpg").with_name(Some("evt3".into())),
            ]))
            .unwrap();
        assert_eq!(plan.dir, PathBuf::from("/out/my_trip"));
        assert_eq!(file_names(&plan), ["001.jpg", "002.jpg", "003.jpg"]);
    }

    #[test]
    fn test_plan_keeps_distinct_names() {
        let pipeline = DownloadPipeline::new("/out");
        let plan = pipeline
            .plan(&gallery(vec![
                ImageRef::new("http://h/a.jpg").with_name(Some("beach".into())),
                ImageRef::new("http://h/b.JPG?x=1").with_name(Some("party".into())),
            ]))
            .unwrap();
        assert_eq!(file_names(&plan), ["001-beach.jpg", "002-party.jpg"]);
    }

    #[test]
    fn test_plan_dedupes_urls_after_fragment_strip() {
        let pipeline = DownloadPipeline::new("/out");
        let plan = pipeline
            .plan(&gallery(vec![
                ImageRef::new("http://h/a.jpg#one"),
                ImageRef::new("http://h/a.jpg#two"),
                ImageRef::new("http://h/b.png"),
            ]))
            .unwrap();
        assert_eq!(file_names(&plan), ["001.jpg", "002.png"]);
        assert_eq!(plan.images[0].image.url, "http://h/a.jpg");
    }

    #[test]
    fn test_plan_missing_extension_fails_gallery() {
        let pipeline = DownloadPipeline::new("/out");
        let err = pipeline
            .plan(&gallery(vec![
                ImageRef::new("http://h/a.jpg"),
                ImageRef::new("http://h/photo?id=3"),
            ]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoExtension { ref url } if url == "http://h/photo?id=3"));
    }
}
