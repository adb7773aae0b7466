//! Discovery of SRM storage URLs through the BDII
//!
//! A storage element publishes its SRM service endpoint together with the
//! storage paths each VO may use (`GlueVOInfoPath`, or the older
//! `GlueSAPath`). Combining the two gives the SURLs a storage probe tests:
//! `srm://host:port/srm/managerv2?SFN=/dpm/example.org/home/ops`.

use thiserror::Error;
use tracing::{debug, info};

use crate::client::BdiiClient;
use crate::config::ClientConfig;
use crate::error::{FailureKind, QueryFailure};
use crate::ldif::DirectoryEntry;
use crate::query::QueryRequest;

pub const SERVICE_ENDPOINT: &str = "GlueServiceEndpoint";
pub const SA_PATH: &str = "GlueSAPath";
pub const VO_INFO_PATH: &str = "GlueVOInfoPath";

/// Which storage element, VO and SRM version to look up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurlQuery {
    /// Storage element hostname
    pub hostname: String,
    pub vo: String,
    /// Major SRM version, e.g. `2`
    pub service_version: String,
}

impl SurlQuery {
    pub fn new(hostname: impl Into<String>, vo: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            vo: vo.into(),
            service_version: "2".to_string(),
        }
    }

    /// Glue 1.3 filter matching the storage areas, VO info objects and SRM service of the host
    pub fn filter(&self) -> String {
        let (host, vo, version) = (&self.hostname, &self.vo, &self.service_version);
        format!(
            "(|(&(GlueChunkKey=GlueSEUniqueID={host})(|(GlueSAAccessControlBaseRule={vo})(GlueSAAccessControlBaseRule=VO:{vo})))\
             (&(GlueChunkKey=GlueSEUniqueID={host})(|(GlueVOInfoAccessControlBaseRule={vo})(GlueVOInfoAccessControlBaseRule=VO:{vo})))\
             (&(GlueServiceUniqueID=*://{host}*)(GlueServiceVersion={version}.*)(GlueServiceType=srm*)))"
        )
    }

    /// The lookup as a request using `config`'s base and time limit
    pub fn request(&self, config: &ClientConfig) -> QueryRequest {
        config.request(self.filter(), [SERVICE_ENDPOINT, SA_PATH, VO_INFO_PATH])
    }
}

/// Why no SURL could be built
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurlError {
    #[error("Error querying the BDII: {}", .0.summary)]
    Query(QueryFailure),

    #[error("GlueServiceEndpoint is not published for {0}")]
    EndpointNotPublished(String),

    #[error("More than one SRMv{version} GlueServiceEndpoint is published for {hostname}: {}", .endpoints.join(", "))]
    AmbiguousEndpoint {
        hostname: String,
        version: String,
        endpoints: Vec<String>,
    },

    #[error("GlueVOInfoPath or GlueSAPath not published for {0}")]
    PathNotPublished(String),
}

impl SurlError {
    /// Critical means the storage element is misconfigured or unpublished;
    /// anything else leaves its state unknown
    pub fn is_critical(&self) -> bool {
        match self {
            SurlError::Query(failure) => failure.kind == FailureKind::EmptySet,
            _ => true,
        }
    }
}

/// Values of `attribute` across all entries, first-seen order, without duplicates
pub fn merge_values(entries: &[DirectoryEntry], attribute: &str) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for value in entries.iter().flat_map(|e| e.values(attribute)) {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    merged
}

/// Builds SURLs from the published endpoint and storage paths
///
/// VO info paths are preferred over storage area paths.
pub fn build_surls(query: &SurlQuery, entries: &[DirectoryEntry]) -> Result<Vec<String>, SurlError> {
    let endpoints = merge_values(entries, SERVICE_ENDPOINT);
    let endpoint = match endpoints.as_slice() {
        [] => return Err(SurlError::EndpointNotPublished(query.hostname.clone())),
        [single] => single,
        _ => {
            return Err(SurlError::AmbiguousEndpoint {
                hostname: query.hostname.clone(),
                version: query.service_version.clone(),
                endpoints,
            })
        }
    };

    let mut paths = merge_values(entries, VO_INFO_PATH);
    if paths.is_empty() {
        paths = merge_values(entries, SA_PATH);
    }
    if paths.is_empty() {
        return Err(SurlError::PathNotPublished(endpoint.clone()));
    }

    let base = endpoint.replacen("httpg", "srm", 1);
    Ok(paths
        .iter()
        .map(|path| format!("{}?SFN={}", base, path))
        .collect())
}

/// Looks up the SURLs to test for one storage element and VO
pub async fn discover_surls(client: &BdiiClient, query: &SurlQuery) -> Result<Vec<String>, SurlError> {
    let request = query.request(client.config());
    debug!("Looking up SURLs for {} (VO {})", query.hostname, query.vo);

    let entries = client.query(&request).await.map_err(SurlError::Query)?;
    let surls = build_surls(query, &entries)?;
    info!("Found {} SURLs for {}", surls.len(), query.hostname);
    Ok(surls)
}
