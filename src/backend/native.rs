use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry, SearchOptions};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{
    whole_seconds, ProbeOutcome, SearchBackend, SearchError, LDAP_NO_SUCH_OBJECT, LDAP_SIZE_LIMIT_EXCEEDED,
    LDAP_SUCCESS, LDAP_TIME_LIMIT_EXCEEDED,
};
use crate::endpoint::ResolvedEndpoint;
use crate::ldif::DirectoryEntry;
use crate::query::QueryRequest;

/// Search backend speaking LDAP in-process through `ldap3`
#[derive(Debug, Clone)]
pub struct NativeLdap {
    net_timeout: Duration,
}

impl NativeLdap {
    pub fn new(net_timeout: Duration) -> Self {
        Self { net_timeout }
    }

    /// Opens an anonymous connection and spawns its driver task
    async fn connect(&self, endpoint: &ResolvedEndpoint, conn_timeout: Duration) -> Result<Ldap, SearchError> {
        let url = endpoint.ldap_url();
        let settings = LdapConnSettings::new().set_conn_timeout(conn_timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| match e {
                LdapError::Timeout { .. } => SearchError::Timeout(conn_timeout),
                other => SearchError::Io(other.to_string()),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection to {} failed: {}", url, e);
            }
        });
        Ok(ldap)
    }
}

fn into_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut out = DirectoryEntry::new(entry.dn);
    for (key, values) in entry.attrs {
        for value in values {
            out.push(key.clone(), value);
        }
    }
    for (key, values) in entry.bin_attrs {
        for value in values {
            out.push(key.clone(), String::from_utf8_lossy(&value).into_owned());
        }
    }
    out
}

/// Closes the connection; the search outcome stands either way
async fn unbind(ldap: &mut Ldap) {
    if let Err(e) = ldap.unbind().await {
        debug!("LDAP unbind failed: {}", e);
    }
}

/// Classifies a finished search by its LDAP result code
fn classify_status(
    rc: u32,
    text: &str,
    entries: Vec<SearchEntry>,
    time_limit: Duration,
) -> Result<Vec<DirectoryEntry>, SearchError> {
    match rc {
        LDAP_SUCCESS | LDAP_SIZE_LIMIT_EXCEEDED => Ok(entries
            .into_iter()
            .map(into_entry)
            .filter(|entry| !entry.dn.is_empty())
            .collect()),
        LDAP_NO_SUCH_OBJECT => Ok(Vec::new()),
        LDAP_TIME_LIMIT_EXCEEDED => Err(SearchError::Timeout(time_limit)),
        rc => Err(SearchError::Ldap {
            rc,
            message: if text.is_empty() {
                format!("LDAP search failed with result code {}", rc)
            } else {
                format!("{} (result code {})", text, rc)
            },
        }),
    }
}

#[async_trait]
impl SearchBackend for NativeLdap {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn probe(&self, endpoint: &ResolvedEndpoint, probe_timeout: Duration) -> ProbeOutcome {
        debug!("Probing {} over native LDAP", endpoint);
        let attempt = async {
            let mut ldap = self.connect(endpoint, probe_timeout).await?;
            let result = ldap
                .with_timeout(probe_timeout)
                .search("", Scope::Base, "(objectClass=*)", vec!["1.1"])
                .await
                .map_err(|e| match e {
                    LdapError::Timeout { .. } => SearchError::Timeout(probe_timeout),
                    other => SearchError::Io(other.to_string()),
                })?;
            unbind(&mut ldap).await;
            Ok::<u32, SearchError>(result.1.rc)
        };

        match timeout(probe_timeout, attempt).await {
            Err(_) | Ok(Err(SearchError::Timeout(_))) => ProbeOutcome::timed_out(probe_timeout),
            Ok(Err(e)) => ProbeOutcome::failure(e.to_string()),
            Ok(Ok(rc)) => ProbeOutcome::from_result_code(rc),
        }
    }

    async fn search(
        &self,
        endpoint: &ResolvedEndpoint,
        request: &QueryRequest,
    ) -> Result<Vec<DirectoryEntry>, SearchError> {
        let limit = request.time_limit;
        let attempt = async {
            let mut ldap = self.connect(endpoint, self.net_timeout).await?;
            let options = SearchOptions::new().timelimit(whole_seconds(limit).min(i32::MAX as u64) as i32);
            let result = ldap
                .with_search_options(options)
                .with_timeout(limit)
                .search(
                    &request.base,
                    Scope::Subtree,
                    &request.filter,
                    request.attributes.clone(),
                )
                .await
                .map_err(|e| match e {
                    LdapError::Timeout { .. } => SearchError::Timeout(limit),
                    other => SearchError::Io(other.to_string()),
                })?;
            unbind(&mut ldap).await;
            Ok::<_, SearchError>(result)
        };

        let ldap3::SearchResult(raw_entries, status) = timeout(limit, attempt)
            .await
            .map_err(|_| SearchError::Timeout(limit))??;

        let entries = raw_entries.into_iter().map(SearchEntry::construct).collect();
        classify_status(status.rc, &status.text, entries, limit)
    }

    fn describe(&self, endpoint: &ResolvedEndpoint, request: &QueryRequest) -> String {
        format!(
            "search url={} base={} scope=sub filter={} attrs={} timelimit={}",
            endpoint.ldap_url(),
            request.base,
            request.filter,
            request.attributes.join(","),
            whole_seconds(request.time_limit)
        )
    }
}
