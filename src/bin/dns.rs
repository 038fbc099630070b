/*
    Batch DNS resolver.
    Resolves a list of domains through the given nameservers.
*/

use anyhow::{Context, Result};
use clap::Parser;
use feedharvest::Admission;
use feedharvest::config::{DEFAULT_BATCH_PAUSE_MS, DEFAULT_DNS_CONCURRENCY};
use feedharvest::dns::{DnsResolver, resolve_batch};
use feedharvest::gate::{ConcurrencyGate, close_on_ctrl_c};
use feedharvest::input::read_domains;
use feedharvest::logger::setup_logging;
use log::{info, warn};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

/// Resolve A records for every domain in a CSV list.
#[derive(Parser, Debug)]
#[command(name = "feedharvest-dns", version)]
struct Cli {
    /// CSV with a `url` column.
    #[arg(value_name = "DOMAINS", default_value = "assets/doh-list.csv")]
    domains: PathBuf,

    /// Nameserver to query. Repeatable.
    #[arg(long = "nameserver", short = 'n', default_values_t = [IpAddr::V4(Ipv4Addr::LOCALHOST)])]
    nameservers: Vec<IpAddr>,

    /// Lookups in flight at once.
    #[arg(long, short = 'c', default_value_t = DEFAULT_DNS_CONCURRENCY)]
    concurrency: usize,

    /// Resolve in fixed batches instead of a sliding window.
    #[arg(long)]
    batched: bool,

    /// Debug logging.
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    setup_logging(cli.verbose);

    let domains = read_domains(&cli.domains)
        .with_context(|| format!("Unable to read domain list {}", cli.domains.display()))?;
    if domains.is_empty() {
        warn!("No domains found in {}", cli.domains.display());
        return Ok(());
    }

    let admission = if cli.batched {
        Admission::Batched {
            pause: Duration::from_millis(DEFAULT_BATCH_PAUSE_MS),
        }
    } else {
        Admission::SlidingWindow
    };

    let gate = ConcurrencyGate::new(cli.concurrency);
    close_on_ctrl_c(gate.clone());

    let resolver = Arc::new(DnsResolver::new(&cli.nameservers));
    let summary = resolve_batch(resolver, domains, &gate, admission, |resolution| {
        println!("{}", resolution);
    })
    .await;

    info!(
        "DNS resolution completed: {} resolved, {} failed",
        summary.resolved, summary.failed
    );
    Ok(())
}
