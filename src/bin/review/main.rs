//! hreview - Review potential duplicate files in a Hydrus client.
//!
//! Prefetches groups of potential duplicates through the Hydrus client API,
//! shows how the two largest images of each group differ,
//! and sends the chosen duplicate relationship back to Hydrus.

mod config;
mod hydrus;
mod logger;
mod session;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::session::ReviewSession;

/// Review potential duplicates from a Hydrus client.
///
/// Keeps a number of candidate groups downloading in the background,
/// so the next group is ready as soon as a decision has been made.
/// For each group, the images are listed largest first
/// and a contrast-boosted difference image of the two largest is generated.
#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Review potential duplicates from a Hydrus client"
)]
pub struct ReviewArgs {
    /// Hydrus client API access key
    #[arg(short = 'k', long, name = "KEY")]
    key: Option<String>,

    /// Hydrus client API address
    #[arg(short = 'u', long, name = "URL")]
    url: Option<String>,

    /// Tag search for picking potential duplicates
    #[arg(short = 't', long = "tag", name = "TAG", num_args = 1, action = clap::ArgAction::Append)]
    tags: Vec<String>,

    /// Number of groups to prefetch
    #[arg(short = 'b', long = "buffer", name = "SIZE")]
    buffer_size: Option<usize>,

    /// Consecutive failed fetches before giving up
    #[arg(short = 'm', long = "max-failures", name = "COUNT")]
    max_failures: Option<u32>,

    /// Write diff images to this directory
    #[arg(short = 'o', long = "diff-dir", name = "DIR", value_hint = clap::ValueHint::DirPath)]
    diff_dir: Option<PathBuf>,

    /// Only print decisions without sending them to Hydrus
    #[arg(short = 'p', long)]
    print: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ReviewArgs::parse();

    if let Some(ref shell) = args.completion {
        hydrus_review::generate_shell_completion(*shell, ReviewArgs::command(), true, env!("CARGO_BIN_NAME"))
    } else {
        ReviewSession::new(args)?.run().await
    }
}
