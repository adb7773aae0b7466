// Shared fixtures: in-process DNS and search backends that never touch the
// network and log every call they receive.
#![allow(dead_code)]

use async_trait::async_trait;
use bdiiq::backend::{ProbeOutcome, SearchBackend, SearchError};
use bdiiq::client::BdiiClient;
use bdiiq::config::ClientConfig;
use bdiiq::dns::{parse_ip, DnsLookup};
use bdiiq::endpoint::ResolvedEndpoint;
use bdiiq::error::BdiiError;
use bdiiq::ldif::DirectoryEntry;
use bdiiq::query::QueryRequest;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of every "network" call made through the fixtures
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Calls whose name starts with `prefix`, e.g. `"probe:"`
    pub fn calls_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub struct MockDns {
    forward: HashMap<String, Vec<IpAddr>>,
    reverse: HashMap<String, String>,
    log: CallLog,
}

impl MockDns {
    pub fn new(log: CallLog) -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
            log,
        }
    }

    pub fn host(mut self, name: &str, ips: &[&str]) -> Self {
        self.forward
            .insert(name.to_string(), ips.iter().map(|s| ip(s)).collect());
        self
    }

    pub fn ptr(mut self, addr: &str, name: &str) -> Self {
        self.reverse.insert(addr.to_string(), name.to_string());
        self
    }
}

#[async_trait]
impl DnsLookup for MockDns {
    async fn resolve_forward(&self, hostname: &str) -> Result<Vec<IpAddr>, BdiiError> {
        self.log.record(format!("forward:{}", hostname));
        self.forward
            .get(hostname)
            .cloned()
            .ok_or_else(|| BdiiError::Resolution {
                host: hostname.to_string(),
                reason: "Name or service not known".to_string(),
            })
    }

    async fn resolve_reverse(&self, addr: &str) -> Result<String, BdiiError> {
        parse_ip(addr)?;
        self.log.record(format!("reverse:{}", addr));
        self.reverse
            .get(addr)
            .cloned()
            .ok_or_else(|| BdiiError::Resolution {
                host: addr.to_string(),
                reason: "host not found".to_string(),
            })
    }
}

pub enum SearchBehaviour {
    Entries(Vec<DirectoryEntry>),
    Fail(SearchError),
    /// Sleeps this long, timing out when it exceeds the request's time limit
    Slow(Duration),
    Panic,
}

pub struct MockBackend {
    reachable: HashSet<IpAddr>,
    probe_delays: HashMap<IpAddr, Duration>,
    probe_panics: HashSet<IpAddr>,
    search: SearchBehaviour,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
    log: CallLog,
}

impl MockBackend {
    pub fn new(log: CallLog) -> Self {
        Self {
            reachable: HashSet::new(),
            probe_delays: HashMap::new(),
            probe_panics: HashSet::new(),
            search: SearchBehaviour::Entries(Vec::new()),
            requests: Arc::default(),
            log,
        }
    }

    pub fn reachable(mut self, addr: &str) -> Self {
        self.reachable.insert(ip(addr));
        self
    }

    pub fn probe_delay(mut self, addr: &str, delay: Duration) -> Self {
        self.probe_delays.insert(ip(addr), delay);
        self
    }

    pub fn search(mut self, behaviour: SearchBehaviour) -> Self {
        self.search = behaviour;
        self
    }

    pub fn panic_on_probe(mut self, addr: &str) -> Self {
        self.probe_panics.insert(ip(addr));
        self
    }

    /// Handle on every request the backend is asked to search
    pub fn requests(&self) -> Arc<Mutex<Vec<QueryRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn probe(&self, endpoint: &ResolvedEndpoint, timeout: Duration) -> ProbeOutcome {
        self.log.record(format!("probe:{}", endpoint.ip));
        if self.probe_panics.contains(&endpoint.ip) {
            panic!("probe exploded");
        }
        if let Some(delay) = self.probe_delays.get(&endpoint.ip) {
            if *delay > timeout {
                tokio::time::sleep(timeout).await;
                return ProbeOutcome::timed_out(timeout);
            }
            tokio::time::sleep(*delay).await;
        }
        if self.reachable.contains(&endpoint.ip) {
            ProbeOutcome::success()
        } else {
            ProbeOutcome::from_result_code(255)
        }
    }

    async fn search(
        &self,
        endpoint: &ResolvedEndpoint,
        request: &QueryRequest,
    ) -> Result<Vec<DirectoryEntry>, SearchError> {
        self.log.record(format!("search:{}", endpoint.ip));
        self.requests.lock().unwrap().push(request.clone());
        match &self.search {
            SearchBehaviour::Entries(entries) => Ok(entries.clone()),
            SearchBehaviour::Fail(e) => Err(e.clone()),
            SearchBehaviour::Slow(delay) => {
                if *delay > request.time_limit {
                    tokio::time::sleep(request.time_limit).await;
                    Err(SearchError::Timeout(request.time_limit))
                } else {
                    tokio::time::sleep(*delay).await;
                    Ok(Vec::new())
                }
            }
            SearchBehaviour::Panic => panic!("backend exploded"),
        }
    }

    fn describe(&self, endpoint: &ResolvedEndpoint, request: &QueryRequest) -> String {
        format!("mocksearch {} -b {} {}", endpoint.ldap_url(), request.base, request.filter)
    }
}

pub fn entry(dn: &str, attrs: &[(&str, &str)]) -> DirectoryEntry {
    let mut entry = DirectoryEntry::new(dn);
    for (key, value) in attrs {
        entry.push(*key, *value);
    }
    entry
}

pub fn client(config: ClientConfig, dns: MockDns, backend: MockBackend) -> BdiiClient {
    BdiiClient::with_components(config, Arc::new(dns), Arc::new(backend))
}

pub fn fast_config() -> ClientConfig {
    ClientConfig {
        time_limit: Duration::from_secs(2),
        net_timeout: Duration::from_millis(500),
        ..ClientConfig::default()
    }
}
