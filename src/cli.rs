//! Command-line interface for the bdiiq BDII query tool
//!
//! Global options configure the client (candidate BDIIs, search base, time
//! limits, backend); subcommands choose what to do with it:
//!
//! - `query` runs one search and prints the entries as JSON
//! - `resolve` only reports which candidate answers first
//! - `surls` looks up the SRM storage URLs of a storage element
//!
//! Candidates default to the `LCG_GFAL_INFOSYS` environment variable.
//! Exit status is 0 on success, 1 when the BDII answered with an empty set
//! and 2 for every other failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{BackendKind, ClientConfig, ProbeStrategy, INFOSYS_ENV};
use crate::uri::split_candidates;

/// Main command-line interface structure for bdiiq
///
/// Values given on the command line override the configuration file, which
/// in turn overrides the environment and built-in defaults.
///
/// # Examples
///
/// ```
/// use bdiiq::cli::{Cli, Commands};
/// use clap::Parser;
///
/// let cli = Cli::try_parse_from([
///     "bdiiq",
///     "--ldap-url",
///     "ldap://lcg-bdii.cern.ch:2170",
///     "query",
///     "--filter",
///     "(objectClass=GlueSE)",
///     "--attr",
///     "GlueSEUniqueID",
/// ])
/// .unwrap();
/// assert!(matches!(cli.command, Commands::Query { .. }));
/// ```
#[derive(Parser, Debug)]
#[command(
    name = "bdiiq",
    about = "Find a working BDII among mirrors and query it",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Comma-separated list of candidate BDIIs (ldap://host:port)
    #[arg(short = 'H', long, env = INFOSYS_ENV, global = true)]
    pub ldap_url: Option<String>,

    /// JSON configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Search base
    #[arg(short = 'b', long, global = true)]
    pub base: Option<String>,

    /// Server-side search time limit in seconds
    #[arg(short = 'l', long, global = true)]
    pub time_limit: Option<u64>,

    /// Probe and connection timeout in seconds
    #[arg(short = 't', long, global = true)]
    pub net_timeout: Option<u64>,

    /// Query mechanism
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Probe candidates one at a time or all at once
    #[arg(long, value_enum, global = true)]
    pub strategy: Option<ProbeStrategy>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query the first reachable BDII and print matching entries as JSON
    Query {
        /// LDAP search filter
        #[arg(short, long)]
        filter: String,

        /// Attribute to return; repeat or separate with commas
        #[arg(short, long = "attr", value_delimiter = ',', required = true)]
        attributes: Vec<String>,
    },
    /// Report the first candidate address that answers a probe
    Resolve,
    /// Discover the SRM storage URLs a storage element publishes for a VO
    Surls {
        /// Storage element hostname
        #[arg(long)]
        hostname: String,

        /// VO name
        #[arg(long, default_value = "ops")]
        vo: String,

        /// Major SRM service version
        #[arg(long, default_value = "2")]
        service_version: String,
    },
}

impl Cli {
    /// Assembles the client configuration from file, environment and flags
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read configuration file: {:?}", path))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid configuration file: {:?}", path))?
            }
            None => ClientConfig::from_env(),
        };

        if let Some(list) = &self.ldap_url {
            config.candidates = split_candidates(list);
        }
        if let Some(base) = &self.base {
            config.base = base.clone();
        }
        if let Some(secs) = self.time_limit {
            config.time_limit = Duration::from_secs(secs);
        }
        if let Some(secs) = self.net_timeout {
            config.net_timeout = Duration::from_secs(secs);
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        Ok(config)
    }
}
