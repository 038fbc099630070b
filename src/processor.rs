//! Crawl, extract and persist one source.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::CrawlOptions;
use crate::error::CrawlError;
use crate::extract::extract_from_pages;
use crate::fetch::FeedClient;
use crate::input::Source;
use crate::sink::ResultSink;
use crate::stats::CrawlStats;
use crate::vmess::TokenNamer;
use crate::walker::{CursorWalker, WalkEnd};

/// Outcome of one source. Failures are carried in `error`, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceResult {
    pub source_id: String,
    pub token_count: usize,
    pub tokens: Vec<String>,
    pub error: Option<CrawlError>,
    /// Pages that failed without aborting the source.
    pub failed_pages: usize,
    pub output: Option<PathBuf>,
}

impl SourceResult {
    pub fn failed(source_id: &str, error: CrawlError) -> Self {
        Self {
            source_id: source_id.to_string(),
            token_count: 0,
            tokens: Vec::new(),
            error: Some(error),
            failed_pages: 0,
            output: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct SourceProcessor {
    client: Arc<dyn FeedClient>,
    sink: Arc<dyn ResultSink>,
    options: CrawlOptions,
    stats: Arc<CrawlStats>,
}

impl SourceProcessor {
    pub fn new(client: Arc<dyn FeedClient>, sink: Arc<dyn ResultSink>, options: CrawlOptions) -> Self {
        Self {
            client,
            sink,
            options,
            stats: Arc::new(CrawlStats::default()),
        }
    }

    pub fn with_stats(mut self, stats: Arc<CrawlStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<CrawlStats> {
        &self.stats
    }

    pub async fn process(&self, source: &Source) -> SourceResult {
        let result = self.run(source).await;
        match &result.error {
            None => {
                self.stats.increment_ok();
                info!("Crawled {} with {} configs!", result.source_id, result.token_count);
            }
            Some(err) => {
                self.stats.increment_failed();
                warn!("Failed to crawl {}: {}", result.source_id, err);
            }
        }
        result
    }

    async fn run(&self, source: &Source) -> SourceResult {
        if source.id.is_empty() {
            return SourceResult::failed(
                &source.id,
                CrawlError::Configuration("channel id is missing".to_string()),
            );
        }
        if source.page_budget <= 0 {
            return SourceResult::failed(
                &source.id,
                CrawlError::Configuration(format!(
                    "max pages is {} for channel {}",
                    source.page_budget, source.id
                )),
            );
        }
        let budget = u32::try_from(source.page_budget).unwrap_or(u32::MAX);

        let walk = CursorWalker::new(self.client.as_ref(), self.options.mode)
            .with_stride(self.options.page_stride)
            .with_page_concurrency(self.options.page_concurrency)
            .walk(&source.id, budget)
            .await;

        let failed_pages = walk.failed_pages();
        self.stats
            .add_pages(walk.pages.len() - failed_pages, failed_pages);

        if walk.is_aborted() {
            let error = match walk.end {
                WalkEnd::Failed(err) => err,
                WalkEnd::Done => CrawlError::Unsupported(source.id.clone()),
            };
            return SourceResult {
                failed_pages,
                ..SourceResult::failed(&source.id, error)
            };
        }
        if let WalkEnd::Failed(err) = &walk.end {
            debug!("{}: walk stopped early after {} pages: {}", source.id, walk.pages.len(), err);
        }

        let extracted = extract_from_pages(walk.markups(), self.options.scope);
        let mut namer = TokenNamer::new(self.options.naming.clone());
        let mut tokens = Vec::with_capacity(extracted.len());
        let mut dropped = 0;
        for token in &extracted {
            match namer.apply(token) {
                Ok(line) => tokens.push(line),
                Err(e) => {
                    dropped += 1;
                    warn!("{}: dropping malformed {} token: {}", source.id, token.protocol, e);
                }
            }
        }
        self.stats.add_tokens(tokens.len(), dropped);

        let output = match self.sink.persist(&source.id, &tokens).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("{}: {}", source.id, e);
                None
            }
        };

        SourceResult {
            source_id: source.id.clone(),
            token_count: tokens.len(),
            tokens,
            error: None,
            failed_pages,
            output,
        }
    }
}
