use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::system_conf::read_system_conf;
use trust_dns_resolver::TokioAsyncResolver as AsyncResolver;

use crate::error::BdiiError;

/// Forward and reverse name lookups used for endpoint failover and diagnostics
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Resolves a hostname to its addresses, in the order the resolver returns them
    async fn resolve_forward(&self, hostname: &str) -> Result<Vec<IpAddr>, BdiiError>;

    /// Resolves an IP literal back to a hostname
    async fn resolve_reverse(&self, ip: &str) -> Result<String, BdiiError>;
}

/// Parses an IP literal for reverse lookup, rejecting anything else as invalid input
pub fn parse_ip(ip: &str) -> Result<IpAddr, BdiiError> {
    ip.trim()
        .parse::<IpAddr>()
        .map_err(|_| BdiiError::InvalidInput(format!("Not valid IP address given: {:?}", ip)))
}

/// [`DnsLookup`] backed by the operating system's resolver configuration
pub struct SystemResolver {
    resolver: AsyncResolver,
}

impl SystemResolver {
    /// Builds a resolver from `/etc/resolv.conf` (or the platform equivalent)
    ///
    /// The resolver cache is disabled: every query re-resolves its candidates.
    pub fn new(timeout: Duration, attempts: usize) -> Result<Self, BdiiError> {
        let (config, mut opts) = read_system_conf().map_err(|e| BdiiError::Resolution {
            host: "<system configuration>".to_string(),
            reason: format!("Failed to create DNS resolver: {}", e),
        })?;
        opts.cache_size = 0;
        opts.timeout = timeout;
        opts.attempts = attempts;

        Ok(Self {
            resolver: AsyncResolver::tokio(config, opts),
        })
    }
}

#[async_trait]
impl DnsLookup for SystemResolver {
    async fn resolve_forward(&self, hostname: &str) -> Result<Vec<IpAddr>, BdiiError> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(BdiiError::Resolution {
                host: String::new(),
                reason: "Empty hostname provided.".to_string(),
            });
        }
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        debug!("Resolving DNS for host: {}", hostname);
        let lookup = self.resolver.lookup_ip(hostname).await.map_err(|e| {
            warn!("DNS resolution failed for {}: {}", hostname, e);
            BdiiError::Resolution {
                host: hostname.to_string(),
                reason: e.to_string(),
            }
        })?;

        let ips: Vec<IpAddr> = lookup.iter().collect();
        if ips.is_empty() {
            return Err(BdiiError::Resolution {
                host: hostname.to_string(),
                reason: "No IP addresses found".to_string(),
            });
        }

        debug!("Resolved {} IP addresses for {}", ips.len(), hostname);
        Ok(ips)
    }

    async fn resolve_reverse(&self, ip: &str) -> Result<String, BdiiError> {
        let addr = parse_ip(ip)?;

        let lookup = self
            .resolver
            .reverse_lookup(addr)
            .await
            .map_err(|e| BdiiError::Resolution {
                host: ip.to_string(),
                reason: e.to_string(),
            })?;

        lookup
            .iter()
            .next()
            .map(|name| name.to_string().trim_end_matches('.').to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| BdiiError::Resolution {
                host: ip.to_string(),
                reason: "No PTR record found".to_string(),
            })
    }
}
