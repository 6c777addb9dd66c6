use std::fs;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

use hydrus_review::duplicates::{CandidateGroup, Comparison, Decision, RemoteWrite};

use crate::config::Config;
use crate::session::ReviewStats;

/// Session log with buffered writes
pub struct FileLogger {
    writer: BufWriter<File>,
}

impl FileLogger {
    /// Create a new file logger, writing to ~/logs/hydrus-review/review_<timestamp>.log
    pub(crate) fn new() -> Result<Self> {
        let log_dir = hydrus_review::config::LOG_DIR
            .as_deref()
            .context("Failed to get home directory")?;

        Self::in_dir(log_dir)
    }

    /// Create a new file logger in the given directory.
    pub(crate) fn in_dir(log_dir: &Path) -> Result<Self> {
        if !log_dir.exists() {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }

        let log_path = log_dir.join(format!("review_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S")));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn timestamp() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Log session settings
    pub(crate) fn log_init(&mut self, config: &Config) {
        let _ = writeln!(self.writer, "[{}] INIT \"{}\"", Self::timestamp(), config.url);
        let _ = writeln!(self.writer, "  tags: {:?}", config.filter.tags);
        let _ = writeln!(self.writer, "  buffer_size: {}", config.buffer.capacity);
        let _ = writeln!(self.writer, "  max_failures: {}", config.buffer.max_failures);
        if let Some(ref dir) = config.diff_dir {
            let _ = writeln!(self.writer, "  diff_dir: {}", dir.display());
        }
        let _ = writeln!(self.writer, "  dryrun: {}", config.dryrun);
        let _ = writeln!(self.writer, "  verbose: {}", config.verbose);
        let _ = self.writer.flush();
    }

    /// Log a group shown for review
    pub(crate) fn log_group(&mut self, number: usize, group: &CandidateGroup, comparison: Option<&Comparison>) {
        let hashes: Vec<String> = group.remote_ids().iter().map(ToString::to_string).collect();
        let _ = writeln!(
            self.writer,
            "[{}] GROUP   {number} | {} file(s), {} | {}{}",
            Self::timestamp(),
            hashes.len(),
            hydrus_review::format_size(group.total_bytes()),
            hashes.join(" "),
            comparison.map_or_else(String::new, |c| format!(" | contrast: {:.2}", c.contrast_multiplier))
        );
        let _ = self.writer.flush();
    }

    /// Log a decision and the remote write it produced
    pub(crate) fn log_write(&mut self, decision: Decision, write: &RemoteWrite, dryrun: bool) {
        let _ = writeln!(
            self.writer,
            "[{}] {} {decision} | {} file(s)",
            Self::timestamp(),
            if dryrun { "DRYRUN " } else { "WRITE  " },
            write.file_count()
        );
        let _ = write!(self.writer, "{write}");
        let _ = self.writer.flush();
    }

    /// Log a failed operation
    pub(crate) fn log_failure(&mut self, operation: &str, error: &str) {
        let _ = writeln!(
            self.writer,
            "[{}] ERROR   {} | {error}",
            Self::timestamp(),
            operation.to_uppercase()
        );
        let _ = self.writer.flush();
    }

    /// Log final statistics
    pub(crate) fn log_stats(&mut self, stats: &ReviewStats) {
        let _ = writeln!(self.writer, "[{}] STATISTICS", Self::timestamp());
        let _ = writeln!(self.writer, "  Groups reviewed: {}", stats.groups_reviewed);
        let _ = writeln!(self.writer, "  Groups skipped:  {}", stats.groups_skipped);
        let _ = writeln!(self.writer, "  Best chosen:     {}", stats.best_chosen);
        let _ = writeln!(self.writer, "  Alternates:      {}", stats.alternates);
        let _ = writeln!(self.writer, "  False positives: {}", stats.false_positives);
        let _ = writeln!(self.writer, "  Deleted groups:  {}", stats.deleted);
        let _ = writeln!(self.writer, "  Failed writes:   {}", stats.failed_writes);
        let _ = writeln!(
            self.writer,
            "  Total time: {}",
            hydrus_review::format_duration(stats.total_duration)
        );
        let _ = writeln!(self.writer, "[{}] END", Self::timestamp());
        let _ = self.writer.flush();
    }
}
