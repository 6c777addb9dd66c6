//! Configuration module for hreview.
//!
//! Handles reading configuration from CLI arguments and the user config file.

use std::fs;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use serde::Deserialize;

use hydrus_review::colorize_bool;
use hydrus_review::duplicates::{BufferOptions, SearchFilter};

use crate::ReviewArgs;

/// Default Hydrus client API address.
const DEFAULT_URL: &str = "http://localhost:45869";

/// User configuration from the config file.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewConfig {
    /// Hydrus client API address.
    #[serde(default)]
    url: Option<String>,
    /// Hydrus client API access key.
    #[serde(default)]
    key: Option<String>,
    /// Tag search for picking potential duplicates.
    #[serde(default)]
    tags: Vec<String>,
    /// Number of groups to prefetch.
    #[serde(default)]
    buffer_size: Option<usize>,
    /// Consecutive failed fetches before giving up.
    #[serde(default)]
    max_failures: Option<u32>,
    /// First retry delay in milliseconds after a failed fetch.
    #[serde(default)]
    backoff_ms: Option<u64>,
    /// Longest retry delay in milliseconds.
    #[serde(default)]
    max_backoff_ms: Option<u64>,
    /// Write diff images to this directory.
    #[serde(default)]
    diff_dir: Option<PathBuf>,
    /// Enable dry-run mode by default.
    #[serde(default)]
    dryrun: bool,
    /// Enable verbose output by default.
    #[serde(default)]
    verbose: bool,
}

/// Wrapper needed for parsing the config file section.
#[derive(Debug, Default, Deserialize)]
struct UserConfig {
    #[serde(default)]
    review: ReviewConfig,
}

/// Final config combined from CLI arguments and user config file.
#[derive(Debug)]
pub struct Config {
    /// Hydrus client API address without a trailing slash.
    pub url: String,
    /// Hydrus client API access key.
    pub key: String,
    /// Candidate search.
    pub filter: SearchFilter,
    /// Prefetch buffer settings.
    pub buffer: BufferOptions,
    /// Directory for diff images.
    pub diff_dir: Option<PathBuf>,
    /// Print decisions instead of sending them.
    pub dryrun: bool,
    /// Verbose output.
    pub verbose: bool,
}

impl ReviewConfig {
    /// Try to read user config from the file if it exists.
    /// Otherwise, fall back to default config.
    ///
    /// # Errors
    /// Returns an error if config file exists but cannot be read or parsed.
    pub fn get_user_config() -> Result<Self> {
        let Some(path) = hydrus_review::config::CONFIG_PATH.as_deref() else {
            return Ok(Self::default());
        };

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse config file {}:\n{e}", path.display())),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {error}",
                path.display()
            )),
        }
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the TOML string is invalid.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str::<UserConfig>(toml_str)
            .map(|config| config.review)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {e}"))
    }
}

impl Config {
    /// Create config from given command line args and the user config file.
    ///
    /// # Errors
    /// Returns an error if the config file is invalid or the access key is missing.
    pub fn from_args(args: ReviewArgs) -> Result<Self> {
        let user_config = ReviewConfig::get_user_config()?;
        Self::try_from_args(args, user_config)
    }

    /// Combine command line args with the given user config, args taking priority.
    ///
    /// # Errors
    /// Returns an error if the access key is missing or a buffer setting is zero.
    pub fn try_from_args(args: ReviewArgs, user_config: ReviewConfig) -> Result<Self> {
        let url = args
            .url
            .or(user_config.url)
            .unwrap_or_else(|| DEFAULT_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let key = args.key.or(user_config.key).unwrap_or_default().trim().to_string();
        if key.is_empty() {
            bail!(
                "Hydrus access key not configured.\n\
                 Set it with --key or in the config file:\n\
                 ~/.config/hydrus-review.toml under [review] section"
            );
        }

        let tags = if args.tags.is_empty() { user_config.tags } else { args.tags };
        let filter = if tags.is_empty() {
            SearchFilter::default()
        } else {
            SearchFilter::new(tags)
        };

        let defaults = BufferOptions::default();
        let capacity = match args.buffer_size.or(user_config.buffer_size) {
            Some(size) => NonZeroUsize::new(size).context("Buffer size must be at least 1")?,
            None => defaults.capacity,
        };
        let max_failures = match args.max_failures.or(user_config.max_failures) {
            Some(count) => NonZeroU32::new(count).context("Max failures must be at least 1")?,
            None => defaults.max_failures,
        };
        let backoff = user_config.backoff_ms.map_or(defaults.backoff, Duration::from_millis);
        let max_backoff = user_config
            .max_backoff_ms
            .map_or(defaults.max_backoff, Duration::from_millis)
            .max(backoff);

        let verbose = args.verbose || user_config.verbose;

        Ok(Self {
            url,
            key,
            filter,
            buffer: BufferOptions {
                capacity,
                max_failures,
                backoff,
                max_backoff,
                verbose,
            },
            diff_dir: args.diff_dir.or(user_config.diff_dir),
            dryrun: args.print || user_config.dryrun,
            verbose,
        })
    }

    /// Print the resolved settings.
    pub fn print(&self) {
        println!("{}", "Config:".bold());
        println!("  {} {}", "Address:".dimmed(), self.url);
        println!("  {} {}", "Tags:".dimmed(), self.filter.tags.join(", "));
        println!("  {} {}", "Buffer size:".dimmed(), self.buffer.capacity);
        println!("  {} {}", "Max failures:".dimmed(), self.buffer.max_failures);
        if let Some(ref dir) = self.diff_dir {
            println!("  {} {}", "Diff images:".dimmed(), dir.display());
        }
        println!("  {} {}", "Dry-run:".dimmed(), colorize_bool(self.dryrun));
    }
}

#[cfg(test)]
mod review_config_tests {
    use super::*;

    #[test]
    fn from_toml_str_parses_empty_config() {
        let config = ReviewConfig::from_toml_str("").expect("should parse empty config");
        assert!(config.url.is_none());
        assert!(config.key.is_none());
        assert!(config.tags.is_empty());
        assert!(config.buffer_size.is_none());
        assert!(!config.dryrun);
        assert!(!config.verbose);
    }

    #[test]
    fn from_toml_str_parses_review_section() {
        let toml = r#"
[review]
url = "http://192.168.1.10:45869"
key = "0123abcd"
tags = ["system:inbox", "system:filetype is image"]
buffer_size = 4
max_failures = 8
backoff_ms = 250
max_backoff_ms = 4000
diff_dir = "/tmp/diffs"
dryrun = true
verbose = true
"#;
        let config = ReviewConfig::from_toml_str(toml).expect("should parse config");
        assert_eq!(config.url.as_deref(), Some("http://192.168.1.10:45869"));
        assert_eq!(config.key.as_deref(), Some("0123abcd"));
        assert_eq!(config.tags.len(), 2);
        assert_eq!(config.buffer_size, Some(4));
        assert_eq!(config.max_failures, Some(8));
        assert_eq!(config.backoff_ms, Some(250));
        assert_eq!(config.max_backoff_ms, Some(4000));
        assert_eq!(config.diff_dir, Some(PathBuf::from("/tmp/diffs")));
        assert!(config.dryrun);
        assert!(config.verbose);
    }

    #[test]
    fn from_toml_str_ignores_other_sections() {
        let toml = r"
[other_section]
some_value = true

[review]
verbose = true
";
        let config = ReviewConfig::from_toml_str(toml).expect("should parse config");
        assert!(config.verbose);
        assert!(!config.dryrun);
    }

    #[test]
    fn from_toml_str_invalid_toml_returns_error() {
        assert!(ReviewConfig::from_toml_str("this is not valid toml {{{").is_err());
    }
}
