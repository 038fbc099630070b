use std::sync::atomic::{AtomicUsize, Ordering};

use log::info;

/// Counters shared by every source of a run.
#[derive(Default, Debug)]
pub struct CrawlStats {
    pages_fetched: AtomicUsize,
    pages_failed: AtomicUsize,
    tokens: AtomicUsize,
    dropped_tokens: AtomicUsize,
    sources_ok: AtomicUsize,
    sources_failed: AtomicUsize,
}

/// Point-in-time copy of [`CrawlStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub tokens: usize,
    pub dropped_tokens: usize,
    pub sources_ok: usize,
    pub sources_failed: usize,
}

impl CrawlStats {
    pub fn add_pages(&self, fetched: usize, failed: usize) {
        self.pages_fetched.fetch_add(fetched, Ordering::Relaxed);
        self.pages_failed.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn add_tokens(&self, kept: usize, dropped: usize) {
        self.tokens.fetch_add(kept, Ordering::Relaxed);
        self.dropped_tokens.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn increment_ok(&self) {
        self.sources_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.sources_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
            tokens: self.tokens.load(Ordering::Relaxed),
            dropped_tokens: self.dropped_tokens.load(Ordering::Relaxed),
            sources_ok: self.sources_ok.load(Ordering::Relaxed),
            sources_failed: self.sources_failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!("=== Crawl Statistics ===");
        info!("Sources: {} succeeded, {} failed", s.sources_ok, s.sources_failed);
        info!("Pages: {} fetched, {} failed", s.pages_fetched, s.pages_failed);
        info!("Tokens: {} kept, {} dropped", s.tokens, s.dropped_tokens);
    }
}
