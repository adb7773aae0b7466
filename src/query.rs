//! Execution and classification of one directory search
//!
//! [`QueryExecutor`] runs a validated [`QueryRequest`] against an endpoint
//! the resolver already found reachable, then folds every outcome into a
//! [`QueryResult`]: entries, or a failure classified as empty set, protocol
//! error or timeout.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{whole_seconds, SearchBackend, SearchError};
use crate::dns::DnsLookup;
use crate::endpoint::{identify, ResolvedEndpoint};
use crate::error::{BdiiError, FailureKind, QueryFailure, QueryResult};

/// Default search base of a grid information system
pub const DEFAULT_BASE: &str = "o=grid";

/// Default server-side search time limit
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(20);

/// Parameters of one directory search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub filter: String,
    /// Requested attributes, in the order given by the caller
    pub attributes: Vec<String>,
    pub base: String,
    pub time_limit: Duration,
}

impl QueryRequest {
    /// Builds a request with the default base and time limit
    pub fn new<I, S>(filter: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filter: filter.into(),
            attributes: attributes.into_iter().map(Into::into).collect(),
            base: DEFAULT_BASE.to_string(),
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Checks the preconditions that must hold before any network call
    pub fn validate(&self) -> Result<(), BdiiError> {
        if self.filter.trim().is_empty() {
            return Err(BdiiError::InvalidInput(
                "LDAP filter must be specified".to_string(),
            ));
        }
        if self.attributes.is_empty() {
            return Err(BdiiError::InvalidInput(
                "Attribute list must not be empty".to_string(),
            ));
        }
        if self.attributes.iter().any(|a| a.trim().is_empty()) {
            return Err(BdiiError::InvalidInput(
                "Attribute names must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Attribute list as shown in messages, e.g. `['GlueSAPath', 'GlueVOInfoPath']`
    pub fn attribute_list(&self) -> String {
        let quoted: Vec<String> = self.attributes.iter().map(|a| format!("'{}'", a)).collect();
        format!("[{}]", quoted.join(", "))
    }
}

/// Runs searches through a [`SearchBackend`] and classifies their outcome
#[derive(Clone)]
pub struct QueryExecutor {
    dns: Arc<dyn DnsLookup>,
    backend: Arc<dyn SearchBackend>,
}

impl QueryExecutor {
    pub fn new(dns: Arc<dyn DnsLookup>, backend: Arc<dyn SearchBackend>) -> Self {
        Self { dns, backend }
    }

    /// Searches `endpoint` and returns its entries or a classified failure
    ///
    /// Invalid requests fail with [`FailureKind::InvalidInput`] before the
    /// backend is touched.
    pub async fn execute(&self, endpoint: &ResolvedEndpoint, request: &QueryRequest) -> QueryResult {
        request.validate()?;

        debug!(
            "Querying {} via {}: base={} filter={}",
            endpoint,
            self.backend.name(),
            request.base,
            request.filter
        );

        match self.backend.search(endpoint, request).await {
            Ok(entries) if entries.is_empty() => {
                let identity = identify(self.dns.as_ref(), endpoint).await;
                info!("Empty result from {}", identity);
                Err(empty_set(request, &identity))
            }
            Ok(entries) => {
                debug!("Got {} entries from {}", entries.len(), endpoint);
                Ok(entries)
            }
            Err(SearchError::Timeout(_)) => {
                let identity = identify(self.dns.as_ref(), endpoint).await;
                warn!("Search timed out on {}", identity);
                Err(QueryFailure::plain(
                    FailureKind::Timeout,
                    format!(
                        "LDAP search timed out after {} sec. {}",
                        whole_seconds(request.time_limit),
                        identity
                    ),
                ))
            }
            Err(e) => {
                let identity = identify(self.dns.as_ref(), endpoint).await;
                warn!("Search failed on {}: {}", identity, e);
                let summary = format!("{} {}", e.to_string().trim(), identity);
                let detail = format!("{}\n{}", self.backend.describe(endpoint, request), summary);
                Err(QueryFailure::new(FailureKind::ProtocolError, summary, detail))
            }
        }
    }
}

fn empty_set(request: &QueryRequest, identity: &str) -> QueryFailure {
    let attributes = request.attribute_list();
    QueryFailure::new(
        FailureKind::EmptySet,
        format!("No information for [attribute(s): {}] in {}.", attributes, identity),
        format!(
            "No information for [base: {}; filter: {}; attribute(s): {}] in {}.",
            request.base, request.filter, attributes, identity
        ),
    )
}
