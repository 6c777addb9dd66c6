use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use hydrus_review::duplicates::{
    CandidateGroup, CandidateGroupFetcher, Comparison, Decision, ImageRecord, PrefetchBuffer, RemoteWrite,
    ReviewError, compare_group, submit,
};
use hydrus_review::{print_error, print_warning};

use crate::ReviewArgs;
use crate::config::Config;
use crate::hydrus::HydrusClient;
use crate::logger::FileLogger;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg} {elapsed:.dim}";
const PROMPT: &str = "b <n> best, a alternates, f false positive, d delete all, s skip, q quit";

/// Reviewer input lines forwarded from the reader thread.
type InputLines = mpsc::UnboundedReceiver<io::Result<String>>;

/// Interactive review of potential duplicate groups.
pub struct ReviewSession {
    config: Config,
    client: Arc<HydrusClient>,
    logger: Option<FileLogger>,
    stats: ReviewStats,
}

/// Counts for the session summary.
#[derive(Debug, Default)]
pub struct ReviewStats {
    pub(crate) groups_reviewed: usize,
    pub(crate) groups_skipped: usize,
    pub(crate) best_chosen: usize,
    pub(crate) alternates: usize,
    pub(crate) false_positives: usize,
    pub(crate) deleted: usize,
    pub(crate) failed_writes: usize,
    pub(crate) total_duration: Duration,
}

/// One line of reviewer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Decide(Decision),
    Skip,
    Quit,
}

/// What to do after a group has been handled.
enum Flow {
    Next,
    Quit,
}

impl ReviewSession {
    /// Create a new session from command line args and the user config file.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the HTTP client cannot be created.
    pub fn new(args: ReviewArgs) -> Result<Self> {
        let config = Config::from_args(args)?;
        let client = HydrusClient::new(&config.url, &config.key)?;

        let logger = match FileLogger::new() {
            Ok(logger) => Some(logger),
            Err(error) => {
                print_warning!("Failed to create log file: {error:#}");
                None
            }
        };

        Ok(Self {
            config,
            client: Arc::new(client),
            logger,
            stats: ReviewStats::default(),
        })
    }

    /// Connect to Hydrus and review groups until the reviewer quits.
    ///
    /// # Errors
    /// Returns an error if the client cannot be reached or candidate fetching keeps failing.
    pub async fn run(mut self) -> Result<()> {
        let start = Instant::now();
        if self.config.verbose {
            self.config.print();
        }

        let description = self.client.verify_access_key().await?;
        println!("{} {}", "Connected:".green(), description);
        if self.config.verbose {
            match self.client.get_api_version().await {
                Ok((api, Some(hydrus))) => println!("{}", format!("API version {api}, Hydrus v{hydrus}").dimmed()),
                Ok((api, None)) => println!("{}", format!("API version {api}").dimmed()),
                Err(error) => print_warning!("{error:#}"),
            }
        }
        if let Some(logger) = self.logger.as_mut() {
            logger.log_init(&self.config);
        }

        let fetcher = CandidateGroupFetcher::new(Arc::clone(&self.client), self.config.filter.clone());
        let buffer = PrefetchBuffer::start(fetcher, self.config.buffer);
        let mut lines = spawn_line_reader(BufReader::new(io::stdin()));

        let result = self.review_loop(&buffer, &mut lines).await;
        buffer.shutdown().await;

        self.stats.total_duration = start.elapsed();
        self.stats.print_summary();
        if let Some(logger) = self.logger.as_mut() {
            logger.log_stats(&self.stats);
        }

        result
    }

    async fn review_loop(&mut self, buffer: &PrefetchBuffer, lines: &mut InputLines) -> Result<()> {
        let mut number = 0;
        loop {
            let group = tokio::select! {
                result = wait_for_group(buffer) => match result {
                    Ok(group) => group,
                    Err(error) => {
                        print_error!("{error}");
                        if let Some(logger) = self.logger.as_mut() {
                            logger.log_failure("fetch", &error.to_string());
                        }
                        return Err(error).context("No more candidate groups");
                    }
                },
                _ = tokio::signal::ctrl_c() => return Ok(()),
            };

            number += 1;
            match self.review_group(number, group, lines).await? {
                Flow::Next => {}
                Flow::Quit => return Ok(()),
            }
        }
    }

    async fn review_group(&mut self, number: usize, group: CandidateGroup, lines: &mut InputLines) -> Result<Flow> {
        let (group, comparison) = self.prepare_group(group);
        print_group(number, &group, comparison.as_ref());
        if let Some(logger) = self.logger.as_mut() {
            logger.log_group(number, &group, comparison.as_ref());
        }
        if let Some(ref dir) = self.config.diff_dir
            && let Some(diff) = group.images().iter().find(|image| image.is_synthetic())
        {
            match write_diff_image(dir, &group, diff) {
                Ok(path) => println!("{} {}", "Diff image:".dimmed(), path.display()),
                Err(error) => print_warning!("{error:#}"),
            }
        }

        loop {
            print!("{} ", format!("[{PROMPT}]:").bold());
            io::stdout().flush().context("Failed to flush stdout")?;

            let line = tokio::select! {
                line = lines.recv() => line.transpose().context("Failed to read input")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                println!();
                return Ok(Flow::Quit);
            };

            let decision = match parse_action(&line) {
                Ok(Action::Quit) => return Ok(Flow::Quit),
                Ok(Action::Skip) => {
                    self.stats.groups_skipped += 1;
                    return Ok(Flow::Next);
                }
                Ok(Action::Decide(decision)) => decision,
                Err(error) => {
                    print_warning!("{error}");
                    continue;
                }
            };

            match decision.plan(&group) {
                Ok(write) => {
                    self.apply(decision, &write).await;
                    return Ok(Flow::Next);
                }
                Err(error) => print_warning!("{error}"),
            }
        }
    }

    /// Sort the group largest first and append the difference image of the two largest.
    fn prepare_group(&mut self, mut group: CandidateGroup) -> (CandidateGroup, Option<Comparison>) {
        group.sort_by_size();
        let comparison = match compare_group(&group) {
            Ok(comparison) => comparison,
            Err(error) => {
                print_warning!("Comparison failed: {error}");
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_failure("compare", &error.to_string());
                }
                None
            }
        };

        if let Some(ref comparison) = comparison {
            match comparison.to_record() {
                Ok(record) => group.push_synthetic(record),
                Err(error) => print_warning!("{error}"),
            }
        }

        (group, comparison)
    }

    /// Send the write to Hydrus, or only print it in dry-run mode.
    async fn apply(&mut self, decision: Decision, write: &RemoteWrite) {
        if self.config.dryrun {
            println!("{}", "Dry-run:".yellow().bold());
            print!("{write}");
            if let Some(logger) = self.logger.as_mut() {
                logger.log_write(decision, write, true);
            }
            self.stats.record(decision);
            return;
        }

        if self.config.verbose {
            print!("{}", write.to_string().dimmed());
        }

        match submit(self.client.as_ref(), write).await {
            Ok(()) => {
                println!(
                    "{}",
                    format!("{}: updated {} file(s)", decision.name(), write.file_count()).green()
                );
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_write(decision, write, false);
                }
                self.stats.record(decision);
            }
            Err(error) => {
                print_error!("Failed to apply {}: {error:#}", decision.name());
                if let Some(logger) = self.logger.as_mut() {
                    logger.log_failure(decision.name(), &format!("{error:#}"));
                }
                self.stats.failed_writes += 1;
            }
        }
    }
}

impl ReviewStats {
    fn record(&mut self, decision: Decision) {
        self.groups_reviewed += 1;
        match decision {
            Decision::Best(_) => self.best_chosen += 1,
            Decision::Alternates => self.alternates += 1,
            Decision::FalsePositive => self.false_positives += 1,
            Decision::DeleteAll => self.deleted += 1,
        }
    }

    fn print_summary(&self) {
        println!("{}", "\n--- Review Summary ---".bold().magenta());
        println!("Groups reviewed:  {}", self.groups_reviewed);
        if self.groups_reviewed > 0 {
            println!("  - Best chosen:  {}", self.best_chosen);
            println!("  - Alternates:   {}", self.alternates);
            println!("  - False pos.:   {}", self.false_positives);
            println!("  - Deleted:      {}", self.deleted);
        }
        println!("Groups skipped:   {}", self.groups_skipped);
        if self.failed_writes > 0 {
            println!("{}", format!("Failed writes:    {}", self.failed_writes).red());
        }
        println!("Total time:       {}", hydrus_review::format_duration(self.total_duration));
    }
}

/// Read lines on a dedicated thread and forward them to the session.
///
/// A blocking read cannot be cancelled, so it must not run on the async runtime:
/// the thread is detached and a pending read does not delay exit.
/// The channel closes at end of input or after a read error.
fn spawn_line_reader<R: BufRead + Send + 'static>(mut reader: R) -> InputLines {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if sender.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    let _ = sender.send(Err(error));
                    break;
                }
            }
        }
    });
    receiver
}

/// Wait for the next group, showing a spinner if none is ready yet.
async fn wait_for_group(buffer: &PrefetchBuffer) -> Result<CandidateGroup, ReviewError> {
    let status = buffer.status().await?;
    let request = buffer.request_next_group();
    if status.ready > 0 {
        return request.await;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template(SPINNER_TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_spinner()));
    spinner.set_message(format!("Fetching candidates ({} in flight)", status.in_flight));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = request.await;
    spinner.finish_and_clear();
    result
}

/// Parse one line of reviewer input.
///
/// Image numbers are shown starting from 1.
fn parse_action(input: &str) -> Result<Action> {
    let input = input.trim().to_lowercase();
    let (command, argument) = match input.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None if input.len() > 1 && input.starts_with('b') => input.split_at(1),
        None => (input.as_str(), ""),
    };

    let action = match (command, argument) {
        ("b", "") => bail!("Give the number of the best image, for example: b 1"),
        ("b", number) => {
            let number: usize = number
                .parse()
                .with_context(|| format!("Invalid image number: {number}"))?;
            if number == 0 {
                bail!("Image numbers start from 1");
            }
            Action::Decide(Decision::Best(number - 1))
        }
        ("a", "") => Action::Decide(Decision::Alternates),
        ("f", "") => Action::Decide(Decision::FalsePositive),
        ("d", "") => Action::Decide(Decision::DeleteAll),
        ("s", "") => Action::Skip,
        ("q", "") => Action::Quit,
        ("", _) => bail!("Empty input. Options: {PROMPT}"),
        _ => bail!("Unknown input: {input}. Options: {PROMPT}"),
    };
    Ok(action)
}

/// Print one line per image, followed by the comparison result.
fn print_group(number: usize, group: &CandidateGroup, comparison: Option<&Comparison>) {
    println!(
        "\n{}",
        format!(
            "Group {number}: {} images, {}",
            group.remote_ids().len(),
            hydrus_review::format_size(group.total_bytes())
        )
        .bold()
    );

    for (index, image) in group.images().iter().enumerate() {
        let name = image
            .remote_id()
            .map_or_else(|| "diff".cyan().to_string(), ToString::to_string);
        println!(
            "  {:>2}: {:>9} {:>11} {}",
            index + 1,
            hydrus_review::format_size(image.size()),
            format!("{}x{}", image.width(), image.height()),
            name
        );
    }

    let Some(comparison) = comparison else {
        print_warning!("Not enough images to compare");
        return;
    };

    println!(
        "Contrast multiplier: {} (higher means less different)",
        format!("{:.2}", comparison.contrast_multiplier).yellow()
    );
    if let Some(resize) = comparison.resize {
        let (width, height) = resize.original_b;
        println!(
            "{}",
            format!(
                "Resized image 2 from {width}x{height}, aspect ratios {:.3} vs {:.3}",
                resize.aspect_a, resize.aspect_b
            )
            .yellow()
        );
    }
}

/// Write the difference image as a PNG named after the two compared files.
fn write_diff_image(dir: &Path, group: &CandidateGroup, diff: &ImageRecord) -> Result<PathBuf> {
    let hashes = group.remote_ids();
    let short: Vec<String> = hashes
        .iter()
        .take(2)
        .map(|hash| hash.as_str().chars().take(12).collect())
        .collect();
    let name = format!("diff_{}.png", short.join("_"));

    fs::create_dir_all(dir).with_context(|| format!("Failed to create diff directory: {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, diff.bytes()).with_context(|| format!("Failed to write diff image: {}", path.display()))?;
    Ok(path)
}


#[cfg(test)]
mod line_reader_tests {
    use super::*;

    use std::io::{Cursor, Read};

    /// Reader that blocks like an idle terminal until the sender is dropped.
    struct IdleReader(std::sync::mpsc::Receiver<()>);

    impl Read for IdleReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    /// Reader that fails on the first read.
    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("broken pipe"))
        }
    }

    #[tokio::test]
    async fn forwards_lines_until_end_of_input() {
        let mut lines = spawn_line_reader(Cursor::new("b 1\ns\n"));

        let first = lines.recv().await.expect("first line").expect("should read");
        assert_eq!(parse_action(&first).expect("should parse"), Action::Decide(Decision::Best(0)));
        let second = lines.recv().await.expect("second line").expect("should read");
        assert_eq!(parse_action(&second).expect("should parse"), Action::Skip);
        assert!(lines.recv().await.is_none());
    }

    #[tokio::test]
    async fn read_error_is_forwarded_and_closes_channel() {
        let mut lines = spawn_line_reader(BufReader::new(BrokenReader));

        let result = lines.recv().await.expect("error result");
        assert!(result.is_err());
        assert!(lines.recv().await.is_none());
    }

    #[test]
    fn runtime_shuts_down_while_read_is_pending() {
        let (_keep_open, receiver) = std::sync::mpsc::channel();
        let runtime = tokio::runtime::Runtime::new().expect("should build runtime");
        let started = Instant::now();

        runtime.block_on(async {
            let mut lines = spawn_line_reader(BufReader::new(IdleReader(receiver)));
            let waited = tokio::time::timeout(Duration::from_millis(50), lines.recv()).await;
            assert!(waited.is_err(), "no line should arrive");
        });
        drop(runtime);

        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
