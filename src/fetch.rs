//! One-page fetches against the feed host.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Proxy, Url};

use crate::config::FeedSettings;
use crate::error::{ConfigError, FetchFailure};

/// A successfully fetched page. `markup` may be empty when a 2xx response
/// carried a body that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBody {
    pub status: u16,
    pub markup: String,
}

/// The HTTP capability the crawler depends on. Non-2xx responses and
/// transport errors come back as [`FetchFailure`], never as panics.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<PageBody, FetchFailure>;
}

/// Address of the page holding items older than `cursor`; cursor 0 is the
/// most recent page.
pub fn page_address(source_id: &str, cursor: u64) -> String {
    if cursor == 0 {
        source_id.to_string()
    } else {
        format!("{}?before={}", source_id, cursor)
    }
}

pub struct HttpFeedClient {
    client: Client,
    base_url: Url,
}

impl HttpFeedClient {
    pub fn new(settings: &FeedSettings) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .user_agent(concat!(
                "Mozilla/5.0 (compatible; ",
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
                ")"
            ));

        if let Some(proxy_url) = &settings.proxy {
            let proxy = Proxy::all(proxy_url.as_str())
                .map_err(|_| ConfigError::InvalidProxy(proxy_url.clone()))?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    /// Fetch the base URL once, used to verify a configured proxy before any
    /// source is crawled.
    pub async fn probe(&self) -> Result<u16, ConfigError> {
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| ConfigError::ProxyUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::ProxyUnreachable(format!("HTTP {}", status.as_u16())));
        }
        Ok(status.as_u16())
    }

    fn resolve(&self, address: &str) -> Result<Url, FetchFailure> {
        self.base_url
            .join(address)
            .map_err(|e| FetchFailure::Transport(format!("invalid page address {}: {}", address, e)))
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, address: &str) -> Result<PageBody, FetchFailure> {
        let url = self.resolve(address)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let markup = response.text().await.unwrap_or_default();
        Ok(PageBody {
            status: status.as_u16(),
            markup,
        })
    }
}
