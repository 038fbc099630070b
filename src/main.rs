/*
    Feed Harvester.
    Crawls channel feeds page by page and collects proxy configs.
*/

use anyhow::{Context, Result};
use clap::Parser;
use feedharvest::config::{
    DEFAULT_BATCH_PAUSE_MS, DEFAULT_PAGE_CONCURRENCY, DEFAULT_PAGE_STRIDE, default_concurrency,
};
use feedharvest::gate::close_on_ctrl_c;
use feedharvest::input::read_sources;
use feedharvest::logger::setup_logging;
use feedharvest::stats::CrawlStats;
use feedharvest::{
    Admission, BatchOptions, BatchOrchestrator, CrawlOptions, FeedSettings, FileSink,
    HttpFeedClient, Naming, SourceProcessor, TextScope, WalkMode,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

/// Crawl channel feeds and collect proxy connection strings.
#[derive(Parser, Debug)]
#[command(name = "feedharvest", version)]
struct Cli {
    /// CSV with `id,maxPages` columns.
    #[arg(value_name = "CHANNELS", default_value = "assets/channels-list.csv")]
    channels: PathBuf,

    /// Channels crawled at once. Default: available parallelism.
    #[arg(long, short = 'c')]
    concurrency: Option<usize>,

    /// Predict older cursors from page 1 and fetch them concurrently.
    #[arg(long)]
    fan_out: bool,

    /// Run channels in fixed batches instead of a sliding window.
    #[arg(long)]
    batched: bool,

    /// Pause between batches (ms), with --batched.
    #[arg(long, default_value_t = DEFAULT_BATCH_PAUSE_MS)]
    batch_pause_ms: u64,

    /// Items per rendered page, used to step cursors with --fan-out.
    #[arg(long, default_value_t = DEFAULT_PAGE_STRIDE)]
    page_stride: u64,

    /// Pages of one channel in flight at once, with --fan-out.
    #[arg(long, default_value_t = DEFAULT_PAGE_CONCURRENCY)]
    page_concurrency: usize,

    /// Only read configs from code/pre blocks.
    #[arg(long)]
    code_only: bool,

    /// Label configs "<NAME> - <n>" instead of clearing vmess names.
    #[arg(long, value_name = "NAME")]
    config_name: Option<String>,

    /// Directory for result files.
    #[arg(long, short = 'o', default_value = "results")]
    output: PathBuf,

    /// No banner, no progress bar.
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Debug logging.
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            mode: if self.fan_out {
                WalkMode::FanOut
            } else {
                WalkMode::Sequential
            },
            page_stride: self.page_stride,
            page_concurrency: self.page_concurrency,
            scope: if self.code_only {
                TextScope::CodeBlocks
            } else {
                TextScope::MessageText
            },
            naming: match &self.config_name {
                Some(name) => Naming::Label(name.clone()),
                None => Naming::Strip,
            },
        }
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            ceiling: self.concurrency.unwrap_or_else(default_concurrency).max(1),
            admission: if self.batched {
                Admission::Batched {
                    pause: Duration::from_millis(self.batch_pause_ms),
                }
            } else {
                Admission::SlidingWindow
            },
        }
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style);
    }
    bar
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    setup_logging(cli.verbose);

    if !cli.quiet {
        banner();
    }

    let settings = FeedSettings::from_env().context("Invalid environment variables")?;
    let client = HttpFeedClient::new(&settings)?;

    if let Some(proxy) = &settings.proxy {
        info!("Testing Proxy {}", proxy);
        let status = client
            .probe()
            .await
            .context("Proxy Test Failed. Aborting initialization.")?;
        info!("Proxy Test Success {}", status);
    }

    let sources = read_sources(&cli.channels)
        .with_context(|| format!("Unable to read channel list {}", cli.channels.display()))?;
    if sources.is_empty() {
        warn!("No channels found in {}", cli.channels.display());
        return Ok(());
    }

    let stats = Arc::new(CrawlStats::default());
    let processor = SourceProcessor::new(
        Arc::new(client),
        Arc::new(FileSink::new(&cli.output)),
        cli.crawl_options(),
    )
    .with_stats(Arc::clone(&stats));

    let orchestrator = BatchOrchestrator::new(Arc::new(processor), cli.batch_options())
        .with_progress(progress_bar(cli.quiet));
    close_on_ctrl_c(orchestrator.gate().clone());

    let start_time = Instant::now();
    let report = orchestrator.run(sources).await;

    if report.failed() > 0 {
        warn!("{} of {} channels failed", report.failed(), report.results.len());
    }
    stats.log_summary();
    info!("Total time: {:?}", start_time.elapsed());
    Ok(())
}

fn banner() {
    println!(
        "
  ___            _   _  _                       _
 | __|__ ___  __| | | || |__ _ _ ___ _____ _____| |_
 | _/ -_) -_)/ _` | | __ / _` | '_\\ V / -_|_-<_-<  _|
 |_|\\___\\___|\\__,_| |_||_\\__,_|_|  \\_/\\___/__/__/\\__|

    Collects vless / vmess / ss / trojan configs from channel feeds.
    "
    );
}
