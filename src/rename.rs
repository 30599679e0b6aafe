//! Renumbering downloaded files by timestamp.
//!
//! Files are sorted by timestamp (ties keep their current name order) and
//! renamed to `NNN[-suffix].ext`, keeping any suffix after a leading
//! `digits-` prefix. Files without a timestamp follow the timed ones in
//! their original order. Every file first moves to a unique temporary name
//! and only then to its final name, so a file whose target is another
//! file's current name is never overwritten.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::download::{DownloadedFile, positional_file_name};
use crate::site::utils::compile_static_regex;

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"^\d+-(.+)$"));

const TEMP_PREFIX: &str = ".galfetch-renumber-";

/// Errors raised by [`rename_sequentially`].
#[derive(Debug, Error)]
pub enum RenameError {
    /// A rename failed.
    #[error("cannot rename {from} to {to}: {source}")]
    Io {
        /// Current path.
        from: PathBuf,
        /// Target path.
        to: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A final name is already taken by a file outside the batch.
    #[error("rename target {path} already exists; refusing to overwrite it")]
    Collision {
        /// Occupied target path.
        path: PathBuf,
    },
}

struct Move {
    from: PathBuf,
    temp: PathBuf,
    to: PathBuf,
}

/// Renames `files` into timestamp order and returns how many were renamed.
///
/// Files without a timestamp are logged and numbered after the timed files,
/// keeping their relative order. Files already at their final name are not
/// touched.
///
/// # Errors
///
/// Returns [`RenameError::Collision`] when a final name is occupied by a
/// file outside the batch, or [`RenameError::Io`] when a rename fails. A
/// failure during the temporary phase moves already-moved files back.
#[instrument(skip(files), fields(count = files.len()))]
pub fn rename_sequentially(files: &[DownloadedFile]) -> Result<usize, RenameError> {
    let mut dated: Vec<(std::time::SystemTime, &Path)> = Vec::with_capacity(files.len());
    let mut undated: Vec<&Path> = Vec::new();
    for file in files {
        match file.timestamp {
            Some(timestamp) => dated.push((timestamp, file.path.as_path())),
            None => {
                warn!(path = %file.path.display(), "no timestamp; numbering after timed files");
                undated.push(file.path.as_path());
            }
        }
    }
    dated.sort_by(|(a_time, a_path), (b_time, b_path)| {
        a_time
            .cmp(b_time)
            .then_with(|| a_path.file_name().cmp(&b_path.file_name()))
    });

    let moves: Vec<Move> = dated
        .iter()
        .map(|(_, path)| *path)
        .chain(undated)
        .enumerate()
        .map(|(offset, path)| plan_move(path, offset + 1))
        .filter(|planned| planned.from != planned.to)
        .collect();

    let sources: Vec<&Path> = moves.iter().map(|m| m.from.as_path()).collect();
    for planned in &moves {
        if planned.to.exists() && !sources.contains(&planned.to.as_path()) {
            return Err(RenameError::Collision {
                path: planned.to.clone(),
            });
        }
    }

    for (done, planned) in moves.iter().enumerate() {
        if let Err(error) = rename(&planned.from, &planned.temp) {
            roll_back(&moves[..done]);
            return Err(error);
        }
    }
    for planned in &moves {
        rename(&planned.temp, &planned.to)?;
        debug!(from = %planned.from.display(), to = %planned.to.display(), "renumbered");
    }

    info!(renamed = moves.len(), "files renumbered by timestamp");
    Ok(moves.len())
}

fn plan_move(path: &Path, index: usize) -> Move {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = NUMBERED_RE
        .captures(&stem)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let final_name = if extension.is_empty() {
        positional_file_name(index, suffix.as_deref(), "")
            .trim_end_matches('.')
            .to_string()
    } else {
        positional_file_name(index, suffix.as_deref(), &extension)
    };
    Move {
        from: path.to_path_buf(),
        temp: dir.join(format!("{TEMP_PREFIX}{index:03}")),
        to: dir.join(final_name),
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), RenameError> {
    std::fs::rename(from, to).map_err(|source| RenameError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

fn roll_back(moved: &[Move]) {
    for planned in moved.iter().rev() {
        if let Err(error) = std::fs::rename(&planned.temp, &planned.from) {
            warn!(
                temp = %planned.temp.display(),
                original = %planned.from.display(),
                error = %error,
                "cannot restore file after failed rename"
            );
        }
    }
}
