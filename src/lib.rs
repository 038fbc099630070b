//! Feed harvester: walks channel feeds backwards page by page, extracts
//! proxy connection strings from the rendered messages and writes one result
//! file per channel, with a global ceiling on concurrent work. The same
//! admission machinery drives a batch DNS resolver.

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod dns;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod gate;
pub mod input;
pub mod logger;
pub mod processor;
pub mod sink;
pub mod stats;
pub mod vmess;
pub mod walker;

pub use batch::{BatchOrchestrator, BatchReport};
pub use config::{BatchOptions, CrawlOptions, FeedSettings, Naming};
pub use dispatch::Admission;
pub use error::{ConfigError, CrawlError, FetchFailure, ResolveError, VmessError};
pub use extract::{Protocol, TextScope, Token};
pub use fetch::{FeedClient, HttpFeedClient, PageBody};
pub use gate::{ConcurrencyGate, GateClosed, GatePermit};
pub use input::Source;
pub use processor::{SourceProcessor, SourceResult};
pub use sink::{FileSink, ResultSink};
pub use walker::{CursorWalker, WalkMode};
