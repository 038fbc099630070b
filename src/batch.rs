//! Run many sources under one concurrency ceiling.

use std::collections::HashMap;
use std::sync::Arc;

use indicatif::ProgressBar;
use log::info;

use crate::config::BatchOptions;
use crate::dispatch::{DispatchError, dispatch};
use crate::gate::ConcurrencyGate;
use crate::error::CrawlError;
use crate::input::Source;
use crate::processor::{SourceProcessor, SourceResult};

/// Every source's result, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<SourceResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn get(&self, source_id: &str) -> Option<&SourceResult> {
        self.results.iter().find(|r| r.source_id == source_id)
    }

    pub fn log_summary(&self) {
        info!("Completed processing {} channels", self.results.len());
        info!("Successful: {}", self.succeeded());
        info!("Failed: {}", self.failed());
    }
}

pub struct BatchOrchestrator {
    processor: Arc<SourceProcessor>,
    options: BatchOptions,
    gate: ConcurrencyGate,
    progress: ProgressBar,
}

impl BatchOrchestrator {
    pub fn new(processor: Arc<SourceProcessor>, options: BatchOptions) -> Self {
        Self {
            processor,
            gate: ConcurrencyGate::new(options.ceiling),
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// The gate every source is admitted through. Closing it makes the
    /// sources not yet started fail with [`CrawlError::Gate`].
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, sources: Vec<Source>) -> BatchReport {
        info!(
            "Processing {} channels with {} concurrent workers ({:?})",
            sources.len(),
            self.options.ceiling,
            self.options.admission
        );
        self.progress.set_length(sources.len() as u64);

        let mut positions: HashMap<String, usize> = HashMap::new();
        for (index, source) in sources.iter().enumerate() {
            positions.entry(source.id.clone()).or_insert(index);
        }

        let processor = Arc::clone(&self.processor);
        let mut results = Vec::with_capacity(sources.len());
        dispatch(
            sources,
            &self.gate,
            self.options.admission,
            move |source: Source| {
                let processor = Arc::clone(&processor);
                async move { processor.process(&source).await }
            },
            |done| {
                let result = match done.outcome {
                    Ok(result) => result,
                    Err(err) => {
                        self.processor.stats().increment_failed();
                        let error = match err {
                            DispatchError::Gate(closed) => CrawlError::Gate(closed.to_string()),
                            DispatchError::Panicked(msg) => CrawlError::Panicked(msg),
                        };
                        SourceResult::failed(&done.key, error)
                    }
                };
                self.progress.set_message(result.source_id.clone());
                self.progress.inc(1);
                results.push(result);
            },
        )
        .await;
        self.progress.finish_and_clear();

        results.sort_by_key(|r| positions.get(&r.source_id).copied().unwrap_or(usize::MAX));
        let report = BatchReport { results };
        report.log_summary();
        report
    }
}
