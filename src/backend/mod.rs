//! Query mechanisms able to probe and search an LDAP endpoint
//!
//! Two implementations exist and are selected at configuration time:
//!
//! - [`LdapSearchCli`] shells out to the OpenLDAP `ldapsearch` tool and
//!   parses its LDIF output with [`crate::ldif::parse`].
//! - [`NativeLdap`] speaks the protocol in-process through the `ldap3` crate.
//!
//! Both report LDAP result codes the same way so the resolver and the
//! executor stay backend agnostic.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackendKind;
use crate::endpoint::ResolvedEndpoint;
use crate::ldif::DirectoryEntry;
use crate::query::QueryRequest;

mod ldapsearch;
mod native;

pub use ldapsearch::LdapSearchCli;
pub use native::NativeLdap;

/// LDAP result code for a successful operation
pub const LDAP_SUCCESS: u32 = 0;
/// LDAP result code `timeLimitExceeded`
pub const LDAP_TIME_LIMIT_EXCEEDED: u32 = 3;
/// LDAP result code `sizeLimitExceeded`
pub const LDAP_SIZE_LIMIT_EXCEEDED: u32 = 4;
/// LDAP result code `noSuchObject`
pub const LDAP_NO_SUCH_OBJECT: u32 = 32;

/// Result of probing one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub diagnostic: String,
}

impl ProbeOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            diagnostic: String::new(),
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            ok: false,
            diagnostic: diagnostic.into(),
        }
    }

    /// Maps a probe's LDAP result code; "no such object" still means the service works
    pub fn from_result_code(rc: u32) -> Self {
        match rc {
            LDAP_SUCCESS | LDAP_NO_SUCH_OBJECT => Self::success(),
            other => Self::failure(other.to_string()),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self::failure(format!("timed out after {}s", whole_seconds(timeout)))
    }
}

/// Failure reported by a query mechanism
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// The time limit elapsed, on the server or on our side
    #[error("time limit of {0:?} exceeded")]
    Timeout(Duration),

    /// The server (or the tool) answered with a non-success result code
    #[error("{message}")]
    Ldap { rc: u32, message: String },

    /// Connecting, spawning or reading the response failed
    #[error("{0}")]
    Io(String),
}

/// A mechanism that can probe an endpoint and run a search against it
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Checks that the endpoint accepts connections and answers a trivial search
    async fn probe(&self, endpoint: &ResolvedEndpoint, timeout: Duration) -> ProbeOutcome;

    /// Runs one search and returns the parsed entries, possibly none
    async fn search(
        &self,
        endpoint: &ResolvedEndpoint,
        request: &QueryRequest,
    ) -> Result<Vec<DirectoryEntry>, SearchError>;

    /// Renders the search as issued, for failure details
    fn describe(&self, endpoint: &ResolvedEndpoint, request: &QueryRequest) -> String;
}

/// Builds the configured backend
pub fn build_backend(kind: BackendKind, net_timeout: Duration) -> Arc<dyn SearchBackend> {
    match kind {
        BackendKind::Ldapsearch => Arc::new(LdapSearchCli::new(net_timeout)),
        BackendKind::Native => Arc::new(NativeLdap::new(net_timeout)),
    }
}

/// Rounds a duration up to whole seconds, never below one
pub fn whole_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}
