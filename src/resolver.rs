//! Selection of the first reachable directory endpoint
//!
//! Candidates are tried in the order given, and the addresses behind each
//! candidate in the order DNS returns them. The first address whose probe
//! succeeds wins. Every failed attempt leaves one diagnostic so operators
//! can tell which mirror is down and why.

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{ProbeOutcome, SearchBackend};
use crate::config::ProbeStrategy;
use crate::dns::DnsLookup;
use crate::endpoint::{identify, ResolvedEndpoint};
use crate::error::BdiiError;
use crate::uri::{self, EndpointUri};

/// Drives DNS and probes over a candidate list
#[derive(Clone)]
pub struct EndpointResolver {
    dns: Arc<dyn DnsLookup>,
    backend: Arc<dyn SearchBackend>,
    strategy: ProbeStrategy,
}

/// A candidate after parsing and forward resolution
enum Slot {
    /// Parsing or DNS failed; recorded under the candidate string
    Unusable { key: String, reason: String },
    Probe(ResolvedEndpoint),
}

impl EndpointResolver {
    pub fn new(dns: Arc<dyn DnsLookup>, backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            dns,
            backend,
            strategy: ProbeStrategy::Sequential,
        }
    }

    pub fn with_strategy(mut self, strategy: ProbeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the first candidate address that answers a probe within `timeout`
    ///
    /// Fails with [`BdiiError::InvalidInput`] for an empty or all-blank list
    /// (before any network activity) and with
    /// [`BdiiError::NoReachableEndpoint`] when every attempt failed.
    pub async fn resolve(
        &self,
        candidates: &[String],
        timeout: Duration,
    ) -> Result<ResolvedEndpoint, BdiiError> {
        check_candidates(candidates)?;

        match self.strategy {
            ProbeStrategy::Sequential => self.resolve_sequential(candidates, timeout).await,
            ProbeStrategy::Racing => self.resolve_racing(candidates, timeout).await,
        }
    }

    async fn resolve_sequential(
        &self,
        candidates: &[String],
        timeout: Duration,
    ) -> Result<ResolvedEndpoint, BdiiError> {
        let mut failures = Vec::new();

        for candidate in candidates {
            let uri = match parse_candidate(candidate) {
                None => continue,
                Some(Ok(uri)) => uri,
                Some(Err(reason)) => {
                    failures.push((candidate.clone(), reason));
                    continue;
                }
            };

            let ips = match self.dns.resolve_forward(&uri.host).await {
                Ok(ips) => ips,
                Err(e) => {
                    warn!("Skipping {}: {}", candidate, e);
                    failures.push((candidate.clone(), e.to_string()));
                    continue;
                }
            };

            for ip in ips {
                let endpoint = ResolvedEndpoint::from_uri(&uri, ip, candidate.as_str());
                let outcome = self.backend.probe(&endpoint, timeout).await;
                if outcome.ok {
                    info!("Using {} for {}", endpoint, candidate);
                    return Ok(endpoint);
                }
                let identity = identify(self.dns.as_ref(), &endpoint).await;
                debug!("Probe of {} failed: {}", identity, outcome.diagnostic);
                failures.push((identity, outcome.diagnostic));
            }
        }

        Err(BdiiError::NoReachableEndpoint {
            diagnostics: failures,
        })
    }

    /// Probes every address at once, keeping candidate order as priority
    ///
    /// A successful probe is only accepted once every higher-priority probe
    /// has failed; outstanding probes are dropped as soon as a winner is known.
    async fn resolve_racing(
        &self,
        candidates: &[String],
        timeout: Duration,
    ) -> Result<ResolvedEndpoint, BdiiError> {
        let lookups = candidates
            .iter()
            .filter_map(|candidate| parse_candidate(candidate).map(|parsed| (candidate, parsed)))
            .map(|(candidate, parsed)| async move {
                let uri = match parsed {
                    Ok(uri) => uri,
                    Err(reason) => {
                        return vec![Slot::Unusable {
                            key: candidate.clone(),
                            reason,
                        }]
                    }
                };
                match self.dns.resolve_forward(&uri.host).await {
                    Ok(ips) => ips
                        .into_iter()
                        .map(|ip| Slot::Probe(ResolvedEndpoint::from_uri(&uri, ip, candidate.as_str())))
                        .collect::<Vec<_>>(),
                    Err(e) => vec![Slot::Unusable {
                        key: candidate.clone(),
                        reason: e.to_string(),
                    }],
                }
            });
        let slots: Vec<Slot> = join_all(lookups).await.into_iter().flatten().collect();

        let mut outcomes: Vec<Option<ProbeOutcome>> = slots
            .iter()
            .map(|slot| match slot {
                Slot::Unusable { reason, .. } => Some(ProbeOutcome::failure(reason.clone())),
                Slot::Probe(_) => None,
            })
            .collect();

        let mut pending = FuturesUnordered::new();
        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Probe(endpoint) = slot {
                let backend = self.backend.as_ref();
                pending.push(async move { (index, backend.probe(endpoint, timeout).await) });
            }
        }

        let mut decided = 0;
        loop {
            while decided < slots.len() {
                match &outcomes[decided] {
                    None => break,
                    Some(outcome) if outcome.ok => {
                        if let Slot::Probe(endpoint) = &slots[decided] {
                            info!("Using {} for {}", endpoint, endpoint.candidate);
                            return Ok(endpoint.clone());
                        }
                        decided += 1;
                    }
                    Some(_) => decided += 1,
                }
            }

            match pending.next().await {
                Some((index, outcome)) => outcomes[index] = Some(outcome),
                None => break,
            }
        }

        let mut failures = Vec::with_capacity(slots.len());
        for (slot, outcome) in slots.iter().zip(outcomes) {
            let diagnostic = outcome.map(|o| o.diagnostic).unwrap_or_default();
            match slot {
                Slot::Unusable { key, .. } => failures.push((key.clone(), diagnostic)),
                Slot::Probe(endpoint) => {
                    failures.push((identify(self.dns.as_ref(), endpoint).await, diagnostic))
                }
            }
        }

        Err(BdiiError::NoReachableEndpoint {
            diagnostics: failures,
        })
    }
}

/// Rejects lists that cannot name any endpoint
fn check_candidates(candidates: &[String]) -> Result<(), BdiiError> {
    if candidates.is_empty() {
        return Err(BdiiError::InvalidInput(
            "Empty LDAP endpoints list given.".to_string(),
        ));
    }
    if candidates.iter().all(|c| c.trim().is_empty()) {
        return Err(BdiiError::InvalidInput(
            "List of empty LDAP endpoints given.".to_string(),
        ));
    }
    Ok(())
}

/// `None` for blank entries, otherwise the parsed URI or the reason it failed
fn parse_candidate(candidate: &str) -> Option<Result<EndpointUri, String>> {
    if candidate.trim().is_empty() {
        return None;
    }
    Some(uri::parse(candidate).map_err(|e| e.to_string()))
}
