//! Batch A-record resolution through a chosen set of nameservers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;

use crate::dispatch::{Admission, dispatch};
use crate::error::ResolveError;
use crate::gate::ConcurrencyGate;

#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError>;
}

pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Resolver that only asks `nameservers` (plain UDP/TCP on port 53).
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let group = NameServerConfigGroup::from_ips_clear(nameservers, 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        Self {
            resolver: TokioAsyncResolver::tokio(config, ResolverOpts::default()),
        }
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolve_a(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        match self.resolver.ipv4_lookup(host).await {
            Ok(lookup) => Ok(lookup.iter().map(|record| record.0).collect()),
            Err(e) => Err(match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => ResolveError::NotFound,
                ResolveErrorKind::Timeout => ResolveError::Other("ETIMEOUT".to_string()),
                _ => ResolveError::Other(e.to_string()),
            }),
        }
    }
}

/// One domain's answer, with the domain always attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub domain: String,
    pub outcome: Result<Vec<Ipv4Addr>, ResolveError>,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(addresses) => write!(f, "{}: {:?}", self.domain, addresses),
            Err(e) => write!(f, "{}: {}", self.domain, e),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub resolved: usize,
    pub failed: usize,
}

/// Resolve every domain with at most `gate.capacity()` lookups in flight,
/// handing each [`Resolution`] to `emit` as soon as it completes.
pub async fn resolve_batch<F>(
    resolver: Arc<dyn NameResolver>,
    domains: Vec<String>,
    gate: &ConcurrencyGate,
    admission: Admission,
    mut emit: F,
) -> ResolveSummary
where
    F: FnMut(Resolution),
{
    info!(
        "Processing {} domains with concurrency limit {}...",
        domains.len(),
        gate.capacity()
    );

    let mut summary = ResolveSummary::default();
    dispatch(
        domains,
        gate,
        admission,
        move |domain: String| {
            let resolver = Arc::clone(&resolver);
            async move {
                let outcome = resolver.resolve_a(domain.trim()).await;
                Resolution { domain, outcome }
            }
        },
        |done| {
            let resolution = match done.outcome {
                Ok(resolution) => resolution,
                Err(err) => Resolution {
                    domain: done.key,
                    outcome: Err(ResolveError::Other(err.to_string())),
                },
            };
            if resolution.outcome.is_ok() {
                summary.resolved += 1;
            } else {
                summary.failed += 1;
            }
            emit(resolution);
        },
    )
    .await;

    summary
}
