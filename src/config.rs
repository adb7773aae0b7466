//! Client configuration
//!
//! Defaults follow the grid information system conventions: search base
//! `o=grid`, 20 second search and network timeouts, candidates taken from
//! `LCG_GFAL_INFOSYS` when the caller supplies none.

use clap::ValueEnum;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::query::{QueryRequest, DEFAULT_BASE, DEFAULT_TIME_LIMIT};
use crate::uri::split_candidates;

/// Environment variable holding the default comma-separated BDII list
pub const INFOSYS_ENV: &str = "LCG_GFAL_INFOSYS";

/// Environment variable selecting the query backend
pub const BACKEND_ENV: &str = "BDIIQ_BACKEND";

/// Default connection/probe timeout
pub const DEFAULT_NET_TIMEOUT: Duration = Duration::from_secs(20);

/// Mechanism used to talk to the directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Run the OpenLDAP `ldapsearch` command
    #[default]
    Ldapsearch,
    /// Speak LDAP in-process
    Native,
}

impl BackendKind {
    /// Parses `ldapsearch` or `native`, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name.trim(), true).ok()
    }
}

/// How candidate endpoints are probed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStrategy {
    /// One probe at a time, in candidate order
    #[default]
    Sequential,
    /// All probes at once; the earliest candidate that answers wins
    Racing,
}

/// Settings of a [`crate::client::BdiiClient`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Candidates used when a query names none
    pub candidates: Vec<String>,
    pub base: String,
    /// Server-side search time limit
    #[serde(with = "seconds")]
    pub time_limit: Duration,
    /// Timeout of each probe and of connection establishment
    #[serde(with = "seconds")]
    pub net_timeout: Duration,
    #[serde(with = "seconds")]
    pub dns_timeout: Duration,
    pub dns_attempts: usize,
    pub backend: BackendKind,
    pub strategy: ProbeStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            base: DEFAULT_BASE.to_string(),
            time_limit: DEFAULT_TIME_LIMIT,
            net_timeout: DEFAULT_NET_TIMEOUT,
            dns_timeout: Duration::from_secs(5),
            dns_attempts: 2,
            backend: BackendKind::default(),
            strategy: ProbeStrategy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `LCG_GFAL_INFOSYS` and `BDIIQ_BACKEND`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(list) = env::var(INFOSYS_ENV) {
            config.candidates = split_candidates(&list);
        }
        if let Some(kind) = env::var(BACKEND_ENV).ok().and_then(|v| BackendKind::from_name(&v)) {
            config.backend = kind;
        }
        config
    }

    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    /// A request carrying the configured base and time limit
    pub fn request<I, S>(&self, filter: impl Into<String>, attributes: I) -> QueryRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryRequest::new(filter, attributes)
            .with_base(self.base.clone())
            .with_time_limit(self.time_limit)
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
