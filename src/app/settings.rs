//! Merges CLI flags over config-file values over built-in defaults.

use std::path::{Path, PathBuf};

use galfetch_core::fetch::{CONNECT_TIMEOUT_SECS, FetchSettings, READ_TIMEOUT_SECS};
use galfetch_core::site::RegistryOptions;

use crate::app_config::FileConfig;
use crate::cli::Args;

/// Default browser cookie store, relative to `$HOME`.
const DEFAULT_COOKIE_STORE: &str = "Library/Cookies/Cookies.binarycookies";

#[derive(Debug, Clone)]
pub(crate) struct RunSettings {
    pub(crate) output_dir: PathBuf,
    pub(crate) cookie_store: Option<PathBuf>,
    pub(crate) exiftool: bool,
    pub(crate) dry_run: bool,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
}

impl RunSettings {
    pub(crate) fn resolve(args: &Args, file: &FileConfig, home: Option<&Path>) -> Self {
        let cookie_store = args
            .cookies
            .clone()
            .or_else(|| file.cookie_file.clone())
            .or_else(|| default_cookie_store(home));
        Self {
            output_dir: args
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            cookie_store,
            exiftool: args.exiftool || file.exiftool.unwrap_or(false),
            dry_run: args.dry_run,
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        }
    }

    pub(crate) fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            fetch: FetchSettings {
                connect_timeout_secs: self.connect_timeout_secs,
                read_timeout_secs: self.read_timeout_secs,
                cookie_jar: None,
            },
            cookie_store: self.cookie_store.clone(),
        }
    }
}

/// The default store is only used when it exists, so hosts without one stay quiet.
fn default_cookie_store(home: Option<&Path>) -> Option<PathBuf> {
    let path = home?.join(DEFAULT_COOKIE_STORE);
    path.is_file().then_some(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["galfetch"];
        argv.extend_from_slice(extra);
        argv.push("http://a/");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_without_config() {
        let settings = RunSettings::resolve(&args(&[]), &FileConfig::default(), None);
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert!(settings.cookie_store.is_none());
        assert!(!settings.exiftool);
        assert_eq!(settings.connect_timeout_secs, CONNECT_TIMEOUT_SECS);
        assert_eq!(settings.read_timeout_secs, READ_TIMEOUT_SECS);
    }

    #[test]
    fn test_cli_overrides_config() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/from/config")),
            cookie_file: Some(PathBuf::from("/config/cookies")),
            exiftool: Some(true),
            read_timeout_secs: Some(60),
            ..FileConfig::default()
        };
        let settings = RunSettings::resolve(
            &args(&["-o", "/from/cli", "--cookies", "/cli/cookies"]),
            &file,
            None,
        );
        assert_eq!(settings.output_dir, PathBuf::from("/from/cli"));
        assert_eq!(settings.cookie_store, Some(PathBuf::from("/cli/cookies")));
        assert!(settings.exiftool);
        assert_eq!(settings.read_timeout_secs, 60);
        assert_eq!(settings.registry_options().fetch.read_timeout_secs, 60);
    }

    #[test]
    fn test_default_cookie_store_only_when_present() {
        let home = tempfile::tempdir().unwrap();
        assert!(RunSettings::resolve(&args(&[]), &FileConfig::default(), Some(home.path()))
            .cookie_store
            .is_none());

        let store = home.path().join(DEFAULT_COOKIE_STORE);
        std::fs::create_dir_all(store.parent().unwrap()).unwrap();
        std::fs::write(&store, b"cook").unwrap();
        let settings = RunSettings::resolve(&args(&[]), &FileConfig::default(), Some(home.path()));
        assert_eq!(settings.cookie_store, Some(store));
    }
}
