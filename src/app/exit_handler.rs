//! Maps run totals to the process exit code.

use std::process::ExitCode;

/// Totals across every gallery in one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) galleries_ok: usize,
    pub(crate) galleries_failed: usize,
    pub(crate) images_downloaded: usize,
    pub(crate) images_skipped: usize,
}

impl RunSummary {
    pub(crate) fn line(&self) -> String {
        format!(
            "{} galleries ok, {} failed; {} images downloaded, {} skipped",
            self.galleries_ok, self.galleries_failed, self.images_downloaded, self.images_skipped
        )
    }
}

/// Exit code 1 when any gallery failed.
pub(crate) fn determine_exit_code(summary: &RunSummary) -> ExitCode {
    if summary.galleries_failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
