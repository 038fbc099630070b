//! Environment-backed settings and per-run tuning.
//! Defaults in one place.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::time::Duration;

use crate::dispatch::Admission;
use crate::error::ConfigError;
use crate::extract::TextScope;
use crate::walker::WalkMode;

pub const ENV_BASE_URL: &str = "TELEGRAM_BASE_URL";
pub const ENV_PROXY_URL: &str = "PROXY_URL";
pub const ENV_TIMEOUT_MS: &str = "FETCH_TIMEOUT_MS";

pub const DEFAULT_TIMEOUT_MS: u64 = 6000;
/// Items the feed renders per page; the fan-out walk steps cursors by this.
pub const DEFAULT_PAGE_STRIDE: u64 = 20;
pub const DEFAULT_PAGE_CONCURRENCY: usize = 8;
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 100;
pub const DEFAULT_DNS_CONCURRENCY: usize = 16;

static PROXY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^http://.+:\d+$").expect("proxy pattern is valid"));

/// Where and how pages are fetched.
#[derive(Clone, Debug)]
pub struct FeedSettings {
    pub base_url: Url,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl FeedSettings {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let raw_base = get(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?;
        let base_url = parse_base_url(&raw_base)?;

        let proxy = match get(ENV_PROXY_URL) {
            Some(proxy) if PROXY_PATTERN.is_match(&proxy) => Some(proxy),
            Some(proxy) => return Err(ConfigError::InvalidProxy(proxy)),
            None => None,
        };

        let timeout_ms = match get(ENV_TIMEOUT_MS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        key: ENV_TIMEOUT_MS,
                        value: raw,
                    });
                }
            },
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            base_url,
            proxy,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Parse the base URL and make sure it ends in `/`, so relative page
/// addresses join underneath it instead of replacing its last segment.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        key: ENV_BASE_URL,
        reason,
    };

    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// How names are written into kept tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Naming {
    /// Clear vmess `ps`, leave everything else as found.
    #[default]
    Strip,
    /// Label every token `"<name> - <n>"` with a per-protocol counter.
    Label(String),
}

/// Per-run crawl tuning, filled from the CLI.
#[derive(Clone, Debug)]
pub struct CrawlOptions {
    pub mode: WalkMode,
    pub page_stride: u64,
    pub page_concurrency: usize,
    pub scope: TextScope,
    pub naming: Naming,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            mode: WalkMode::Sequential,
            page_stride: DEFAULT_PAGE_STRIDE,
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
            scope: TextScope::MessageText,
            naming: Naming::Strip,
        }
    }
}

/// Ceiling and admission strategy for a batch run.
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    pub ceiling: usize,
    pub admission: Admission,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            ceiling: default_concurrency(),
            admission: Admission::SlidingWindow,
        }
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn base_url_is_required() {
        let err = FeedSettings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_BASE_URL)));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let settings =
            FeedSettings::from_lookup(lookup(&[(ENV_BASE_URL, "https://t.me/s")])).unwrap();
        assert_eq!(settings.base_url.as_str(), "https://t.me/s/");
        assert_eq!(settings.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert!(settings.proxy.is_none());
    }

    #[test]
    fn proxy_needs_http_scheme_and_port() {
        let err = FeedSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://t.me/s/"),
            (ENV_PROXY_URL, "socks5://localhost"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProxy(_)));

        let ok = FeedSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://t.me/s/"),
            (ENV_PROXY_URL, "http://localhost:2080"),
        ]))
        .unwrap();
        assert_eq!(ok.proxy.as_deref(), Some("http://localhost:2080"));
    }

    #[test]
    fn timeout_must_be_positive() {
        let err = FeedSettings::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://t.me/s/"),
            (ENV_TIMEOUT_MS, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn non_http_base_is_rejected() {
        let err =
            FeedSettings::from_lookup(lookup(&[(ENV_BASE_URL, "ftp://t.me/s/")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }
}
