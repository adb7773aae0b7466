//! Resolved endpoints and their human-readable identities

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

use crate::dns::DnsLookup;
use crate::uri::{write_host, EndpointUri, DEFAULT_BDII_PORT, DEFAULT_SCHEME};

/// A candidate whose host has been replaced by one concrete address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub scheme: Option<String>,
    pub ip: IpAddr,
    pub port: Option<u16>,
    /// Candidate string this endpoint was resolved from
    pub candidate: String,
}

impl ResolvedEndpoint {
    /// Substitutes `ip` for the host of `uri`, keeping scheme and port
    pub fn from_uri(uri: &EndpointUri, ip: IpAddr, candidate: impl Into<String>) -> Self {
        Self {
            scheme: uri.scheme.clone(),
            ip,
            port: uri.port,
            candidate: candidate.into(),
        }
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_BDII_PORT)
    }

    /// `ldap://ip:port` with scheme and port defaults filled in, as handed to LDAP clients
    pub fn ldap_url(&self) -> String {
        let host = match self.ip {
            IpAddr::V6(v6) => format!("[{}]", v6),
            IpAddr::V4(v4) => v4.to_string(),
        };
        format!(
            "{}://{}:{}",
            self.scheme.as_deref().unwrap_or(DEFAULT_SCHEME),
            host,
            self.port_or_default()
        )
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        write_host(f, &self.ip.to_string())?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// Builds the identifier used in diagnostics for one endpoint
///
/// Returns `[ldap://hostname:port [ip]]` when the address has a reverse
/// record and `[ldap://ip:port]` when it doesn't. Reverse lookup is best
/// effort and never fails the caller.
pub async fn identify(dns: &dyn DnsLookup, endpoint: &ResolvedEndpoint) -> String {
    let port = endpoint
        .port
        .map(|p| format!(":{}", p))
        .unwrap_or_default();
    let ip = endpoint.ip.to_string();

    match dns.resolve_reverse(&ip).await {
        Ok(hostname) => format!("[ldap://{}{} [{}]]", hostname, port, ip),
        Err(e) => {
            debug!("Reverse lookup failed for {}: {}", ip, e);
            let host = match endpoint.ip {
                IpAddr::V6(_) => format!("[{}]", ip),
                IpAddr::V4(_) => ip,
            };
            format!("[ldap://{}{}]", host, port)
        }
    }
}
