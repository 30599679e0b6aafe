//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Bulk-download photo galleries.
///
/// Each URL is matched to a supported site, its listing is walked page by
/// page, and every image is saved under a directory named after the gallery.
#[derive(Parser, Debug)]
#[command(name = "galfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Gallery URLs to download
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// List galleries and print planned file names without downloading
    #[arg(short = 'n', long, visible_alias = "debug")]
    pub dry_run: bool,

    /// Directory galleries are created in (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Browser cookie store used for sites that need a login
    #[arg(long, value_name = "PATH")]
    pub cookies: Option<PathBuf>,

    /// Read capture times with exiftool and apply them to downloaded files
    #[arg(long)]
    pub exiftool: bool,

    /// Config file (default: $XDG_CONFIG_HOME/galfetch/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
