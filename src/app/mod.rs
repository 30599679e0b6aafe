//! Binary-side orchestration: settings, the per-URL loop, and reporting.

mod exit_handler;
mod settings;
mod terminal;

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use galfetch_core::download::{DownloadPipeline, ExiftoolHook, GalleryPlan};
use galfetch_core::gallery::{GalleryOutcome, process_gallery};
use galfetch_core::site::build_default_registry;
use tracing::{debug, error, info};

use crate::app_config::load_config;
use crate::cli::Args;
use exit_handler::{RunSummary, determine_exit_code};
use settings::RunSettings;

/// Runs every URL in `args` and returns the process exit code.
pub(crate) async fn run(args: Args) -> Result<ExitCode> {
    let file_config = load_config(args.config.as_deref())?;

    let level = terminal::default_log_level(args.quiet, args.verbose, file_config.verbosity);
    terminal::init_tracing(level);
    debug!(?args, "CLI arguments parsed");

    let home = std::env::var_os("HOME").map(std::path::PathBuf::from);
    let settings = RunSettings::resolve(&args, &file_config, home.as_deref());
    debug!(?settings, "settings resolved");

    let registry = build_default_registry(&settings.registry_options())
        .context("cannot build HTTP client")?;
    debug!(handlers = ?registry.handler_names(), "site handlers registered");

    let show_progress = terminal::should_show_progress(
        std::io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );

    let mut summary = RunSummary::default();
    for url in &args.urls {
        let mut pipeline = DownloadPipeline::new(&settings.output_dir)
            .with_progress(terminal::gallery_progress(show_progress));
        if settings.exiftool {
            pipeline = pipeline.with_metadata_hook(Arc::new(ExiftoolHook::default()));
        }

        match process_gallery(&registry, &pipeline, url, settings.dry_run).await {
            Ok(report) => {
                summary.galleries_ok += 1;
                summary.images_downloaded += report.downloaded();
                summary.images_skipped += report.skipped();
                match &report.outcome {
                    GalleryOutcome::Planned(plan) => print_plan(plan),
                    GalleryOutcome::Downloaded { renamed, .. } => info!(
                        site = report.site,
                        title = %report.title,
                        dir = %report.dir().display(),
                        downloaded = report.downloaded(),
                        skipped = report.skipped(),
                        renamed,
                        "gallery complete"
                    ),
                }
            }
            Err(err) => {
                summary.galleries_failed += 1;
                error!(url = %url, "{err}");
            }
        }
    }

    info!("{}", summary.line());
    Ok(determine_exit_code(&summary))
}

fn print_plan(plan: &GalleryPlan) {
    println!("{}/", plan.dir.display());
    for planned in &plan.images {
        println!("  {} -> {}", planned.image.url, planned.path.display());
    }
}
