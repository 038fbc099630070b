//! Backward pagination over one feed.
//!
//! A walk starts at cursor 0 (most recent page) and moves towards older items
//! by deriving the next cursor from the oldest item rendered on each page.
//! Two strategies are provided:
//!
//! - [`WalkMode::Sequential`]: one page at a time, every cursor taken from the
//!   page before it.
//! - [`WalkMode::FanOut`]: page 1 is fetched to learn the starting cursor, the
//!   remaining cursors are predicted by stepping a fixed stride, and those
//!   pages are fetched concurrently. Results stay in cursor order.

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::error::{CrawlError, FetchFailure};
use crate::fetch::{FeedClient, page_address};

static CANONICAL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"head link[rel="canonical"]"#).expect("valid selector"));
static ITEM_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".tgme_widget_message_wrap .js-widget_message").expect("valid selector")
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WalkMode {
    #[default]
    Sequential,
    FanOut,
}

/// One fetched (or failed) page of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub source_id: String,
    pub cursor: u64,
    pub outcome: Result<String, FetchFailure>,
}

impl PageResult {
    pub fn markup(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEnd {
    Done,
    Failed(CrawlError),
}

/// Pages in walk order plus how the walk ended.
#[derive(Debug, Clone)]
pub struct Walk {
    pub pages: Vec<PageResult>,
    pub end: WalkEnd,
}

impl Walk {
    pub fn markups(&self) -> Vec<&str> {
        self.pages.iter().filter_map(PageResult::markup).collect()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.outcome.is_err()).count()
    }

    /// True when nothing usable was fetched: page 1 failed or the feed is
    /// not crawlable. A later bad page only drops its own content.
    pub fn is_aborted(&self) -> bool {
        match &self.end {
            WalkEnd::Failed(_) => self.markups().is_empty(),
            WalkEnd::Done => false,
        }
    }
}

/// What a walk needs to know about a fetched page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInspection {
    /// The head carries a canonical link, i.e. this is the feed view itself.
    pub canonical: bool,
    /// Smallest item ordinal on the page.
    pub oldest: Option<u64>,
    pub items: usize,
}

pub fn inspect_page(markup: &str) -> PageInspection {
    let document = Html::parse_document(markup);

    let canonical = document
        .select(&CANONICAL_SELECTOR)
        .filter_map(|link| link.value().attr("href"))
        .any(|href| !href.trim().is_empty());

    let mut items = 0;
    let mut oldest: Option<u64> = None;
    for item in document.select(&ITEM_SELECTOR) {
        items += 1;
        if let Some(ordinal) = item.value().attr("data-post").and_then(post_ordinal) {
            oldest = Some(oldest.map_or(ordinal, |o| o.min(ordinal)));
        }
    }

    PageInspection {
        canonical,
        oldest,
        items,
    }
}

/// `"channel/1234"` -> `1234`
fn post_ordinal(data_post: &str) -> Option<u64> {
    data_post.rsplit('/').next()?.trim().parse().ok()
}

/// Cursors for the pages after page 1 in fan-out mode: `start`,
/// `start - stride`, ... Stops early once the cursor would reach 0, since
/// cursor 0 means the most recent page again.
pub fn predict_cursors(start: u64, stride: u64, count: usize) -> Vec<u64> {
    let stride = stride.max(1);
    let reachable = usize::try_from(start / stride).map_or(count, |n| n.saturating_add(1));
    let mut cursors = Vec::with_capacity(count.min(reachable));
    let mut cursor = start;
    while cursors.len() < count && cursor > 0 {
        cursors.push(cursor);
        cursor = cursor.saturating_sub(stride);
    }
    cursors
}

pub struct CursorWalker<'a> {
    client: &'a dyn FeedClient,
    mode: WalkMode,
    stride: u64,
    page_concurrency: usize,
}

impl<'a> CursorWalker<'a> {
    pub fn new(client: &'a dyn FeedClient, mode: WalkMode) -> Self {
        Self {
            client,
            mode,
            stride: crate::config::DEFAULT_PAGE_STRIDE,
            page_concurrency: crate::config::DEFAULT_PAGE_CONCURRENCY,
        }
    }

    pub fn with_stride(mut self, stride: u64) -> Self {
        self.stride = stride.max(1);
        self
    }

    pub fn with_page_concurrency(mut self, page_concurrency: usize) -> Self {
        self.page_concurrency = page_concurrency.max(1);
        self
    }

    /// Walk `source_id` for at most `budget` pages (a budget of 0 is
    /// treated as 1; callers reject it before getting here).
    pub async fn walk(&self, source_id: &str, budget: u32) -> Walk {
        let budget = budget.max(1);
        match self.mode {
            WalkMode::Sequential => self.walk_sequential(source_id, budget).await,
            WalkMode::FanOut => self.walk_fan_out(source_id, budget).await,
        }
    }

    /// Fetch and inspect one page. `Err` ends the walk.
    ///
    /// Page 1 without a canonical link means the source itself is not a
    /// feed and nothing is recorded. On later pages the same condition is
    /// recorded as a failed page so earlier content survives.
    async fn fetch_page(
        &self,
        source_id: &str,
        cursor: u64,
        pages: &mut Vec<PageResult>,
    ) -> Result<PageInspection, CrawlError> {
        match fetch_checked(self.client, source_id, cursor).await {
            Ok((markup, inspection)) => {
                pages.push(PageResult {
                    source_id: source_id.to_string(),
                    cursor,
                    outcome: Ok(markup),
                });
                Ok(inspection)
            }
            Err(FetchFailure::NotAFeed) if pages.is_empty() => {
                Err(CrawlError::Unsupported(source_id.to_string()))
            }
            Err(failure) => {
                pages.push(PageResult {
                    source_id: source_id.to_string(),
                    cursor,
                    outcome: Err(failure.clone()),
                });
                Err(match failure {
                    FetchFailure::NotAFeed => CrawlError::Unsupported(source_id.to_string()),
                    other => CrawlError::Transport(other),
                })
            }
        }
    }

    async fn walk_sequential(&self, source_id: &str, budget: u32) -> Walk {
        let mut pages = Vec::new();
        let mut cursor = 0u64;
        let mut fetched = 0u32;

        let end = loop {
            let inspection = match self.fetch_page(source_id, cursor, &mut pages).await {
                Ok(inspection) => inspection,
                Err(err) => break WalkEnd::Failed(err),
            };
            fetched += 1;

            let next = inspection.oldest.unwrap_or(cursor);
            let progressed = if cursor == 0 { next > 0 } else { next < cursor };

            if fetched >= budget {
                break WalkEnd::Done;
            }
            if !progressed {
                debug!("{}: no older items after cursor {}", source_id, cursor);
                break WalkEnd::Done;
            }
            cursor = next;
        };

        Walk { pages, end }
    }

    async fn walk_fan_out(&self, source_id: &str, budget: u32) -> Walk {
        let mut pages = Vec::new();
        let first = match self.fetch_page(source_id, 0, &mut pages).await {
            Ok(inspection) => inspection,
            Err(err) => {
                return Walk {
                    pages,
                    end: WalkEnd::Failed(err),
                };
            }
        };

        let Some(start) = first.oldest else {
            return Walk {
                pages,
                end: WalkEnd::Done,
            };
        };

        if first.items as u64 != self.stride {
            warn!(
                "{}: page 1 rendered {} items but the fan-out stride is {}; predicted cursors may skip or repeat items",
                source_id, first.items, self.stride
            );
        }

        let cursors = predict_cursors(start, self.stride, budget as usize - 1);
        let client = self.client;
        let rest: Vec<PageResult> = stream::iter(cursors)
            .map(|cursor| async move {
                let outcome = fetch_checked(client, source_id, cursor)
                    .await
                    .map(|(markup, _)| markup);
                PageResult {
                    source_id: source_id.to_string(),
                    cursor,
                    outcome,
                }
            })
            .buffered(self.page_concurrency)
            .collect()
            .await;

        pages.extend(rest);
        Walk {
            pages,
            end: WalkEnd::Done,
        }
    }
}

/// Fetch one page and require the canonical link, so a redirect away
/// from the feed view counts as a failed page in both walk modes.
async fn fetch_checked(
    client: &dyn FeedClient,
    source_id: &str,
    cursor: u64,
) -> Result<(String, PageInspection), FetchFailure> {
    let outcome = match client.fetch(&page_address(source_id, cursor)).await {
        Ok(body) => {
            let inspection = inspect_page(&body.markup);
            if inspection.canonical {
                Ok((body.markup, inspection))
            } else {
                Err(FetchFailure::NotAFeed)
            }
        }
        Err(failure) => Err(failure),
    };
    if let Err(failure) = &outcome {
        debug!("{}: page at cursor {} failed: {}", source_id, cursor, failure);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_is_taken_after_the_slash() {
        assert_eq!(post_ordinal("durov/321"), Some(321));
        assert_eq!(post_ordinal("durov/x"), None);
    }

    #[test]
    fn inspection_finds_canonical_and_oldest_item() {
        let markup = r#"<html><head><link rel="canonical" href="https://t.me/s/durov"></head>
            <body>
              <div class="tgme_widget_message_wrap"><div class="js-widget_message" data-post="durov/41"></div></div>
              <div class="tgme_widget_message_wrap"><div class="js-widget_message" data-post="durov/40"></div></div>
              <div class="tgme_widget_message_wrap"><div class="js-widget_message" data-post="durov/42"></div></div>
            </body></html>"#;
        let inspection = inspect_page(markup);
        assert!(inspection.canonical);
        assert_eq!(inspection.oldest, Some(40));
        assert_eq!(inspection.items, 3);
    }

    #[test]
    fn missing_canonical_is_reported() {
        let inspection = inspect_page("<html><head></head><body>redirected</body></html>");
        assert!(!inspection.canonical);
        assert_eq!(inspection.oldest, None);
    }

    #[test]
    fn predicted_cursors_step_by_stride_and_stop_above_zero() {
        assert_eq!(predict_cursors(100, 20, 3), vec![100, 80, 60]);
        assert_eq!(predict_cursors(30, 20, 5), vec![30, 10]);
        assert!(predict_cursors(0, 20, 5).is_empty());
    }

    #[test]
    fn huge_budget_only_yields_reachable_cursors() {
        let cursors = predict_cursors(100, 20, u32::MAX as usize);
        assert_eq!(cursors, vec![100, 80, 60, 40, 20]);
    }
}
