//! Endpoint URI parsing
//!
//! Candidate endpoints come from operators and environment variables in a
//! handful of loose shapes: `ldap://host:2170`, `host:2170`, `ldap://host/`
//! or just `host`. [`parse`] decomposes all of them into scheme, host and
//! port without touching the network.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::error::BdiiError;

/// Port a top-level or site BDII listens on when none is given
pub const DEFAULT_BDII_PORT: u16 = 2170;

/// Scheme assumed when a candidate carries none
pub const DEFAULT_SCHEME: &str = "ldap";

/// A candidate endpoint split into its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointUri {
    /// Scheme without the trailing `://`
    pub scheme: Option<String>,
    /// Hostname or IP literal, never empty
    pub host: String,
    pub port: Option<u16>,
}

impl EndpointUri {
    /// Port to connect to, falling back to the BDII default
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_BDII_PORT)
    }

    pub fn scheme_or_default(&self) -> &str {
        self.scheme.as_deref().unwrap_or(DEFAULT_SCHEME)
    }
}

impl fmt::Display for EndpointUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}://", scheme)?;
        }
        write_host(f, &self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// Writes a host, bracketing IPv6 literals
pub(crate) fn write_host(f: &mut fmt::Formatter<'_>, host: &str) -> fmt::Result {
    if host.contains(':') {
        write!(f, "[{}]", host)
    } else {
        f.write_str(host)
    }
}

fn uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:([a-zA-Z0-9_]*)://)?(?:\[([0-9A-Fa-f:.]+)\]|([^/:\[\]]*))(?::(\d+))?/?")
            .expect("static URI pattern is valid")
    })
}

/// Parses `scheme://host:port/`, `host:port`, `host` and the other accepted forms
///
/// Only the leading part of the string is matched; anything after the host
/// and port (a path, a search base) is ignored. Fails with
/// [`BdiiError::InvalidInput`] when no host can be extracted or the port is
/// out of range.
///
/// # Examples
///
/// ```
/// use bdiiq::uri::parse;
///
/// let uri = parse("ldap://lcg-bdii.cern.ch:2170").unwrap();
/// assert_eq!(uri.scheme.as_deref(), Some("ldap"));
/// assert_eq!(uri.host, "lcg-bdii.cern.ch");
/// assert_eq!(uri.port, Some(2170));
/// ```
pub fn parse(uri: &str) -> Result<EndpointUri, BdiiError> {
    let trimmed = uri.trim();
    let captures = uri_pattern()
        .captures(trimmed)
        .ok_or_else(|| BdiiError::InvalidInput(format!("Unparsable endpoint URI: {:?}", uri)))?;

    let host = captures
        .get(2)
        .or_else(|| captures.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    if host.is_empty() {
        return Err(BdiiError::InvalidInput(format!(
            "No host found in endpoint URI: {:?}",
            uri
        )));
    }

    let port = match captures.get(4) {
        Some(m) => Some(m.as_str().parse::<u16>().map_err(|_| {
            BdiiError::InvalidInput(format!("Port out of range in endpoint URI: {:?}", uri))
        })?),
        None => None,
    };

    Ok(EndpointUri {
        scheme: captures
            .get(1)
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty()),
        host: host.to_string(),
        port,
    })
}

/// Returns `scheme://host:port`, filling in `ldap` and port 2170 when absent
pub fn to_full_ldap_url(uri: &str) -> Result<String, BdiiError> {
    let parsed = parse(uri)?;
    Ok(EndpointUri {
        scheme: Some(parsed.scheme_or_default().to_string()),
        port: Some(parsed.port_or_default()),
        host: parsed.host,
    }
    .to_string())
}

/// Returns `host:port`, filling in port 2170 when absent
pub fn to_host_port(uri: &str) -> Result<String, BdiiError> {
    let parsed = parse(uri)?;
    Ok(EndpointUri {
        scheme: None,
        port: Some(parsed.port_or_default()),
        host: parsed.host,
    }
    .to_string())
}

/// Splits a comma-separated candidate list, dropping surrounding whitespace
pub fn split_candidates(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_string()).collect()
}
