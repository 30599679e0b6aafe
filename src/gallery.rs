//! End-to-end processing of one gallery URL: select, list, download, renumber.

use std::path::Path;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::download::{DownloadPipeline, GalleryDownload, GalleryPlan, PipelineError};
use crate::rename::{RenameError, rename_sequentially};
use crate::site::{ExtractError, HandlerRegistry};

/// Errors that abort one gallery. The next URL is still processed.
#[derive(Debug, Error)]
pub enum GalleryError {
    /// Selection or listing failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The gallery could not be laid out on disk.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Renumbering by timestamp failed.
    #[error(transparent)]
    Rename(#[from] RenameError),

    /// Listing succeeded but found nothing to download.
    #[error("{site}: no images found at {url}\n  Suggestion: check that the URL is a gallery or album page")]
    NoImages {
        /// Handler that produced the empty listing.
        site: &'static str,
        /// Gallery URL.
        url: String,
    },
}

/// What happened to one gallery.
#[derive(Debug)]
pub enum GalleryOutcome {
    /// Dry run: destinations only, nothing written.
    Planned(GalleryPlan),
    /// Images were downloaded and renumbered.
    Downloaded {
        /// Files and skip count from the pipeline.
        download: GalleryDownload,
        /// Files renamed into timestamp order.
        renamed: usize,
    },
}

/// Summary of one processed gallery.
#[derive(Debug)]
pub struct GalleryReport {
    /// Handler that listed the gallery.
    pub site: &'static str,
    /// Inferred gallery title.
    pub title: String,
    /// Images in the listing.
    pub listed: usize,
    /// Count the site claimed, when it shows one.
    pub expected: Option<usize>,
    /// Result of the download stage.
    pub outcome: GalleryOutcome,
}

impl GalleryReport {
    /// Gallery directory, planned or created.
    #[must_use]
    pub fn dir(&self) -> &Path {
        match &self.outcome {
            GalleryOutcome::Planned(plan) => plan.dir.as_path(),
            GalleryOutcome::Downloaded { download, .. } => download.dir.as_path(),
        }
    }

    /// Images now on disk.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        match &self.outcome {
            GalleryOutcome::Planned(_) => 0,
            GalleryOutcome::Downloaded { download, .. } => download.files.len(),
        }
    }

    /// Images that failed and were skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        match &self.outcome {
            GalleryOutcome::Planned(_) => 0,
            GalleryOutcome::Downloaded { download, .. } => download.skipped,
        }
    }
}

/// Processes one gallery URL.
///
/// With `dry_run` the listing pages are still fetched but only the plan is
/// returned. Otherwise images are downloaded and then renumbered by
/// timestamp. A mismatch between listed and site-reported image counts is a
/// warning.
///
/// # Errors
///
/// Returns [`GalleryError`] for anything that stops this gallery.
#[instrument(skip(registry, pipeline), fields(site))]
pub async fn process_gallery(
    registry: &HandlerRegistry,
    pipeline: &DownloadPipeline,
    url: &str,
    dry_run: bool,
) -> Result<GalleryReport, GalleryError> {
    let selection = registry.select(url).await?;
    let handler = selection.handler;
    tracing::Span::current().record("site", handler.name());

    let gallery = handler.list(url, selection.body.as_deref()).await?;
    if gallery.images.is_empty() {
        return Err(GalleryError::NoImages {
            site: handler.name(),
            url: url.to_string(),
        });
    }
    if let Some(expected) = gallery.expected_count.filter(|&n| n != gallery.images.len()) {
        warn!(
            expected,
            found = gallery.images.len(),
            "image count differs from the count the site reports"
        );
    }
    info!(title = %gallery.title, images = gallery.images.len(), "gallery listed");

    let outcome = if dry_run {
        GalleryOutcome::Planned(pipeline.plan(&gallery)?)
    } else {
        let download = pipeline.run(handler, &gallery).await?;
        let renamed = rename_sequentially(&download.files)?;
        GalleryOutcome::Downloaded { download, renamed }
    };

    Ok(GalleryReport {
        site: handler.name(),
        title: gallery.title,
        listed: gallery.images.len(),
        expected: gallery.expected_count,
        outcome,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::fetch::Fetcher;
    use crate::site::{Gallery, ImageRef, Matcher, SiteHandler};

    struct FixedHandler {
        matcher: Matcher,
        fetcher: Fetcher,
        images: Vec<ImageRef>,
    }

    #[async_trait]
    impl SiteHandler for FixedHandler {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn matcher(&self) -> &Matcher {
            &self.matcher
        }

        fn fetcher(&self) -> &Fetcher {
            &self.fetcher
        }

        async fn list(&self, _url: &str, _body: Option<&str>) -> Result<Gallery, ExtractError> {
            Ok(Gallery::new("Fixed Set", self.images.clone()).with_expected_count(Some(9)))
        }
    }

    fn registry(images: Vec<ImageRef>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new(Fetcher::new().unwrap());
        registry.register(Box::new(FixedHandler {
            matcher: Matcher::url(r"^https?://fixed\.test/"),
            fetcher: Fetcher::new().unwrap(),
            images,
        }));
        registry
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DownloadPipeline::new(dir.path());
        let registry = registry(vec![
            ImageRef::new("http://127.0.0.1:9/a.jpg"),
            ImageRef::new("http://127.0.0.1:9/b.png"),
        ]);

        let report = process_gallery(&registry, &pipeline, "https://fixed.test/g", true)
            .await
            .unwrap();
        assert_eq!(report.site, "fixed");
        assert_eq!(report.listed, 2);
        assert_eq!(report.expected, Some(9));
        assert_eq!(report.dir(), dir.path().join("fixed_set").as_path());
        assert_eq!(report.downloaded(), 0);
        assert!(!report.dir().exists());
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_images() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DownloadPipeline::new(dir.path());
        let err = process_gallery(&registry(Vec::new()), &pipeline, "https://fixed.test/g", false)
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::NoImages { site: "fixed", .. }));
    }

    #[tokio::test]
    async fn test_unmatched_url_is_extract_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DownloadPipeline::new(dir.path());
        let err = process_gallery(&registry(Vec::new()), &pipeline, "https://other.test/g", true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GalleryError::Extract(ExtractError::NoHandlerMatched { .. })
        ));
    }
}
