//! Error and outcome types shared by every layer of the client
//!
//! Two families live here:
//!
//! - [`BdiiError`] is what individual components (URI parsing, DNS, the
//!   endpoint resolver) return to each other.
//! - [`QueryFailure`] is the only failure shape that leaves the query facade.
//!   It carries a [`FailureKind`] classification, a one-line summary for
//!   status output and a longer detail message with the parameters involved.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::ldif::DirectoryEntry;

/// Outcome of one directory query: entries on success, a classified failure otherwise
pub type QueryResult = Result<Vec<DirectoryEntry>, QueryFailure>;

/// Errors raised between components before a query result is assembled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BdiiError {
    /// The caller broke a precondition. Never retried, never touches the network.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Forward or reverse DNS lookup failed for one host
    #[error("DNS resolution failed for {host}: {reason}")]
    Resolution { host: String, reason: String },

    /// Every candidate and every address behind it failed
    #[error("{}", render_diagnostics(.diagnostics))]
    NoReachableEndpoint {
        /// `(attempt identity, diagnostic)` pairs in attempt order
        diagnostics: Vec<(String, String)>,
    },
}

/// Renders resolver diagnostics as one `* key: value` line per failed attempt
pub fn render_diagnostics(diagnostics: &[(String, String)]) -> String {
    diagnostics
        .iter()
        .map(|(key, reason)| format!("* {}: {}", key, reason))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classification of a failed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Precondition violated (empty filter, empty attribute list, bad URI)
    InvalidInput,
    /// No candidate endpoint could be probed successfully
    EndpointUnreachable,
    /// The service answered but matched nothing
    EmptySet,
    /// The query mechanism reported a non-timeout failure
    ProtocolError,
    /// The query exceeded its time limit
    Timeout,
    /// The caller cancelled the query before it completed
    Cancelled,
}

impl FailureKind {
    /// Numeric code understood by existing monitoring consumers
    ///
    /// Empty set is `0`, LDAP/CLI problems `1`, timeouts `2` and everything
    /// else `7`.
    pub fn code(self) -> u8 {
        match self {
            FailureKind::EmptySet => 0,
            FailureKind::ProtocolError => 1,
            FailureKind::Timeout => 2,
            FailureKind::InvalidInput
            | FailureKind::EndpointUnreachable
            | FailureKind::Cancelled => 7,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::InvalidInput => "invalid input",
            FailureKind::EndpointUnreachable => "endpoint unreachable",
            FailureKind::EmptySet => "empty set",
            FailureKind::ProtocolError => "protocol error",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A classified query failure as handed to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind}: {summary}")]
pub struct QueryFailure {
    pub kind: FailureKind,
    /// Short, status-line sized description
    pub summary: String,
    /// Full description including the parameters or raw error involved
    pub detail: String,
}

impl QueryFailure {
    pub fn new(kind: FailureKind, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Failure whose summary and detail are the same text
    pub fn plain(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(kind, message.clone(), message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::plain(FailureKind::InvalidInput, message)
    }
}

impl From<BdiiError> for QueryFailure {
    fn from(err: BdiiError) -> Self {
        match err {
            BdiiError::InvalidInput(message) => QueryFailure::invalid_input(message),
            BdiiError::Resolution { .. } => {
                QueryFailure::plain(FailureKind::EndpointUnreachable, err.to_string())
            }
            BdiiError::NoReachableEndpoint { .. } => {
                QueryFailure::plain(FailureKind::EndpointUnreachable, err.to_string())
            }
        }
    }
}
