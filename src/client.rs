//! Public entry point of the BDII client
//!
//! [`BdiiClient`] ties the endpoint resolver and the query executor
//! together and normalizes every outcome into a [`QueryResult`]:
//!
//! - precondition violations become [`FailureKind::InvalidInput`] before
//!   any network activity,
//! - a candidate list with no reachable endpoint becomes
//!   [`FailureKind::EndpointUnreachable`] carrying the per-attempt
//!   diagnostics,
//! - everything else is whatever the executor classified.
//!
//! A client holds configuration and its two collaborators only. It keeps no
//! memory of previously resolved endpoints, so each query re-probes its
//! candidates.
//!
//! # Examples
//!
//! ```no_run
//! use bdiiq::client::BdiiClient;
//! use bdiiq::config::ClientConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::from_env().with_candidates(["ldap://lcg-bdii.cern.ch:2170"]);
//! let client = BdiiClient::new(config)?;
//!
//! let request = client.config().request("(objectClass=GlueSE)", ["GlueSEUniqueID"]);
//! match client.query(&request).await {
//!     Ok(entries) => println!("{} storage elements", entries.len()),
//!     Err(failure) => eprintln!("{}: {}", failure.kind, failure.detail),
//! }
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backend::{build_backend, SearchBackend};
use crate::config::ClientConfig;
use crate::dns::{DnsLookup, SystemResolver};
use crate::endpoint::ResolvedEndpoint;
use crate::error::{BdiiError, FailureKind, QueryFailure, QueryResult};
use crate::query::{QueryExecutor, QueryRequest};
use crate::resolver::EndpointResolver;

/// Resolves a working BDII from a candidate list and queries it
#[derive(Clone)]
pub struct BdiiClient {
    config: ClientConfig,
    dns: Arc<dyn DnsLookup>,
    backend: Arc<dyn SearchBackend>,
}

impl BdiiClient {
    /// Creates a client using the system DNS resolver and the configured backend
    pub fn new(config: ClientConfig) -> Result<Self, BdiiError> {
        let dns = Arc::new(SystemResolver::new(config.dns_timeout, config.dns_attempts)?);
        let backend = build_backend(config.backend, config.net_timeout);
        Ok(Self::with_components(config, dns, backend))
    }

    /// Creates a client from explicit collaborators
    pub fn with_components(
        config: ClientConfig,
        dns: Arc<dyn DnsLookup>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self { config, dns, backend }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn resolver(&self) -> EndpointResolver {
        EndpointResolver::new(Arc::clone(&self.dns), Arc::clone(&self.backend))
            .with_strategy(self.config.strategy)
    }

    /// Falls back to the configured candidates when none are given
    fn candidates<'a>(&'a self, candidates: &'a [String]) -> &'a [String] {
        if candidates.is_empty() {
            &self.config.candidates
        } else {
            candidates
        }
    }

    /// Finds the first reachable endpoint among `candidates` (or the configured ones)
    pub async fn resolve(&self, candidates: &[String]) -> Result<ResolvedEndpoint, BdiiError> {
        let candidates = self.candidates(candidates);
        self.resolver()
            .resolve(candidates, self.config.net_timeout)
            .await
    }

    /// Queries the first reachable BDII among `candidates`
    ///
    /// An empty `candidates` slice uses the configured default list.
    pub async fn query_directory<I, S>(
        &self,
        filter: &str,
        attributes: I,
        candidates: &[String],
        base: &str,
        time_limit: Duration,
        probe_timeout: Duration,
    ) -> QueryResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = QueryRequest::new(filter, attributes)
            .with_base(base)
            .with_time_limit(time_limit);
        self.query_with(&request, candidates, probe_timeout).await
    }

    /// Queries the configured candidates with the configured probe timeout
    ///
    /// Base and time limit come from `request`; build it with
    /// [`ClientConfig::request`] to use the configured ones too.
    pub async fn query(&self, request: &QueryRequest) -> QueryResult {
        self.query_with(request, &[], self.config.net_timeout).await
    }

    /// Like [`BdiiClient::query`], abandoning the query once `cancel` completes
    ///
    /// Dropping the query future stops any probe or search still in flight.
    pub async fn query_until<F>(&self, request: &QueryRequest, cancel: F) -> QueryResult
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.query(request) => result,
            _ = cancel => {
                warn!("Query cancelled: filter={}", request.filter);
                Err(QueryFailure::plain(
                    FailureKind::Cancelled,
                    "BDII query cancelled before completion",
                ))
            }
        }
    }

    /// Resolves then queries, normalizing every outcome into a [`QueryResult`]
    ///
    /// A panic while resolving or searching becomes a [`FailureKind::ProtocolError`].
    pub async fn query_with(
        &self,
        request: &QueryRequest,
        candidates: &[String],
        probe_timeout: Duration,
    ) -> QueryResult {
        request.validate()?;

        let candidates = self.candidates(candidates);
        let resolved = AssertUnwindSafe(self.resolver().resolve(candidates, probe_timeout))
            .catch_unwind()
            .await;
        let endpoint = match resolved {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(BdiiError::InvalidInput(message))) => {
                return Err(QueryFailure::invalid_input(message));
            }
            Ok(Err(e)) => {
                let summary = format!("Failed to get working BDII from [{}].", candidates.join(","));
                error!("{}", summary);
                return Err(QueryFailure::new(
                    FailureKind::EndpointUnreachable,
                    summary,
                    e.to_string(),
                ));
            }
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                error!("Endpoint resolution panicked: {}", cause);
                return Err(QueryFailure::new(
                    FailureKind::ProtocolError,
                    format!("Exception while querying BDII [{}]", candidates.join(",")),
                    cause,
                ));
            }
        };

        debug!("Resolved {} from {}", endpoint, endpoint.candidate);
        let executor = QueryExecutor::new(Arc::clone(&self.dns), Arc::clone(&self.backend));
        match AssertUnwindSafe(executor.execute(&endpoint, request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                error!("Query against {} panicked: {}", endpoint, cause);
                Err(QueryFailure::new(
                    FailureKind::ProtocolError,
                    format!("Exception while querying BDII [{}]", endpoint),
                    cause,
                ))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
