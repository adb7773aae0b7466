use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{
    whole_seconds, ProbeOutcome, SearchBackend, SearchError, LDAP_NO_SUCH_OBJECT, LDAP_SUCCESS,
    LDAP_TIME_LIMIT_EXCEEDED,
};
use crate::endpoint::ResolvedEndpoint;
use crate::ldif::{self, DirectoryEntry};
use crate::query::QueryRequest;

/// Search backend that runs the OpenLDAP `ldapsearch` command
///
/// The exit status of `ldapsearch` is the LDAP result code of the operation,
/// which is how probes and searches are classified. Children are killed when
/// the future driving them is dropped.
#[derive(Debug, Clone)]
pub struct LdapSearchCli {
    program: String,
    net_timeout: Duration,
}

impl LdapSearchCli {
    pub fn new(net_timeout: Duration) -> Self {
        Self {
            program: "ldapsearch".to_string(),
            net_timeout,
        }
    }

    /// Uses another executable, e.g. an absolute path to `ldapsearch`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments of an anonymous base-scope search of the root DSE
    pub fn probe_args(&self, endpoint: &ResolvedEndpoint, probe_timeout: Duration) -> Vec<String> {
        vec![
            "-x".to_string(),
            "-LLL".to_string(),
            "-o".to_string(),
            format!("nettimeout={}", whole_seconds(probe_timeout)),
            "-H".to_string(),
            endpoint.ldap_url(),
            "-s".to_string(),
            "base".to_string(),
            "-b".to_string(),
            String::new(),
            "(objectClass=*)".to_string(),
            "1.1".to_string(),
        ]
    }

    /// Arguments of the subtree search described by `request`
    pub fn search_args(&self, endpoint: &ResolvedEndpoint, request: &QueryRequest) -> Vec<String> {
        let mut args = vec![
            "-x".to_string(),
            "-LLL".to_string(),
            "-o".to_string(),
            format!("nettimeout={}", whole_seconds(self.net_timeout)),
            "-l".to_string(),
            whole_seconds(request.time_limit).to_string(),
            "-H".to_string(),
            endpoint.ldap_url(),
            "-b".to_string(),
            request.base.clone(),
            request.filter.clone(),
        ];
        args.extend(request.attributes.iter().cloned());
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Classifies a finished `ldapsearch` search by its exit status
fn classify_exit(
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: &[u8],
    time_limit: Duration,
) -> Result<Vec<DirectoryEntry>, SearchError> {
    let rc = match code {
        Some(rc) => rc as u32,
        None => return Err(SearchError::Io("ldapsearch terminated by signal".to_string())),
    };

    match rc {
        LDAP_SUCCESS => {
            let raw = String::from_utf8(stdout)
                .map_err(|e| SearchError::Io(format!("ldapsearch output is not valid UTF-8: {}", e)))?;
            Ok(ldif::parse(&raw))
        }
        LDAP_NO_SUCH_OBJECT => Ok(Vec::new()),
        LDAP_TIME_LIMIT_EXCEEDED => Err(SearchError::Timeout(time_limit)),
        rc => {
            let stderr = String::from_utf8_lossy(stderr);
            let message = match stderr.trim() {
                "" => format!("ldapsearch returned non-zero exit status {}", rc),
                text => text.lines().next().unwrap_or(text).to_string(),
            };
            Err(SearchError::Ldap { rc, message })
        }
    }
}

#[async_trait]
impl SearchBackend for LdapSearchCli {
    fn name(&self) -> &'static str {
        "ldapsearch"
    }

    async fn probe(&self, endpoint: &ResolvedEndpoint, probe_timeout: Duration) -> ProbeOutcome {
        let args = self.probe_args(endpoint, probe_timeout);
        debug!("Probing {} with {} {}", endpoint, self.program, args.join(" "));

        let mut cmd = self.command(&args);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        match timeout(probe_timeout, cmd.status()).await {
            Err(_) => ProbeOutcome::timed_out(probe_timeout),
            Ok(Err(e)) => ProbeOutcome::failure(format!("{}: {}", self.program, e)),
            Ok(Ok(status)) => match status.code() {
                Some(rc) => ProbeOutcome::from_result_code(rc as u32),
                None => ProbeOutcome::failure("terminated by signal"),
            },
        }
    }

    async fn search(
        &self,
        endpoint: &ResolvedEndpoint,
        request: &QueryRequest,
    ) -> Result<Vec<DirectoryEntry>, SearchError> {
        let args = self.search_args(endpoint, request);
        debug!("Running {} {}", self.program, args.join(" "));

        let mut cmd = self.command(&args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = timeout(request.time_limit, cmd.output())
            .await
            .map_err(|_| SearchError::Timeout(request.time_limit))?
            .map_err(|e| SearchError::Io(format!("{}: {}", self.program, e)))?;

        classify_exit(
            output.status.code(),
            output.stdout,
            &output.stderr,
            request.time_limit,
        )
    }

    fn describe(&self, endpoint: &ResolvedEndpoint, request: &QueryRequest) -> String {
        format!("{} {}", self.program, self.search_args(endpoint, request).join(" "))
    }
}
