#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use feedharvest::error::SinkError;
use feedharvest::{FeedClient, FetchFailure, PageBody, ResultSink};
use tokio::time::{Duration, sleep};

/// Feed page with a canonical link and one message per `(ordinal, text)`.
pub fn feed_page(channel: &str, messages: &[(u64, &str)]) -> String {
    let mut body = String::new();
    for (ordinal, text) in messages {
        body.push_str(&format!(
            r#"<div class="tgme_widget_message_wrap js-widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="{channel}/{ordinal}"><div class="tgme_widget_message_text js-message_text">{text}</div></div></div>"#
        ));
    }
    format!(
        r#"<!DOCTYPE html><html><head><link rel="canonical" href="https://t.me/s/{channel}"></head><body><section class="tgme_channel_history">{body}</section></body></html>"#
    )
}

/// Page for ordinals `from..=to`, each message holding `vless://<channel>-<n>`.
pub fn numbered_page(channel: &str, from: u64, to: u64) -> String {
    let texts: Vec<(u64, String)> = (from..=to)
        .map(|n| (n, format!("vless://{}-{}", channel, n)))
        .collect();
    let messages: Vec<(u64, &str)> = texts.iter().map(|(n, t)| (*n, t.as_str())).collect();
    feed_page(channel, &messages)
}

/// What a feed that redirected away from the preview looks like.
pub fn redirect_page() -> String {
    "<html><head><title>Telegram</title></head><body>Join channel</body></html>".to_string()
}

/// In-memory feed keyed by page address. Unknown addresses answer 404
/// unless a fallback is set.
#[derive(Default)]
pub struct FakeFeed {
    pages: HashMap<String, Result<String, FetchFailure>>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    fallback: Option<String>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, address: &str, markup: String) -> Self {
        self.pages.insert(address.to_string(), Ok(markup));
        self
    }

    pub fn failing(mut self, address: &str, failure: FetchFailure) -> Self {
        self.pages.insert(address.to_string(), Err(failure));
        self
    }

    pub fn delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn fallback(mut self, markup: String) -> Self {
        self.fallback = Some(markup);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn fetch(&self, address: &str) -> Result<PageBody, FetchFailure> {
        self.calls.lock().unwrap().push(address.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(address).copied().unwrap_or(self.default_delay);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let outcome = match self.pages.get(address) {
            Some(outcome) => outcome.clone(),
            None => match &self.fallback {
                Some(markup) => Ok(markup.clone()),
                None => Err(FetchFailure::Status(404)),
            },
        };
        outcome.map(|markup| PageBody {
            status: 200,
            markup,
        })
    }
}

/// Sink that keeps everything in memory.
#[derive(Default)]
pub struct MemorySink {
    stored: Mutex<Vec<(String, Vec<String>)>>,
}

impl MemorySink {
    pub fn stored(&self) -> Vec<(String, Vec<String>)> {
        self.stored.lock().unwrap().clone()
    }

    pub fn tokens_for(&self, source_id: &str) -> Option<Vec<String>> {
        self.stored()
            .into_iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, tokens)| tokens)
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn persist(&self, source_id: &str, tokens: &[String]) -> Result<PathBuf, SinkError> {
        self.stored
            .lock()
            .unwrap()
            .push((source_id.to_string(), tokens.to_vec()));
        Ok(PathBuf::from(format!("memory/{}.txt", source_id)))
    }
}
