mod common;

use anyhow::Result;
use bdiiq::error::FailureKind;
use bdiiq::query::QueryRequest;
use common::{client, entry, fast_config, strings, CallLog, MockBackend, MockDns, SearchBehaviour};
use std::time::Duration;

const LIMIT: Duration = Duration::from_secs(2);
const PROBE: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_query_directory_returns_entries_from_reachable_bdii() -> Result<()> {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone())
        .reachable("192.0.2.30")
        .search(SearchBehaviour::Entries(vec![entry(
            "GlueSEUniqueID=se.example.org,o=grid",
            &[("GlueSEImplementationName", "DPM")],
        )]));
    let client = client(fast_config(), dns, backend);

    let entries = client
        .query_directory(
            "(GlueSEUniqueID=se.example.org)",
            ["GlueSEImplementationName"],
            &strings(&["ldap://bad1", "ldap://bad2", "ldap://good"]),
            "o=grid",
            LIMIT,
            PROBE,
        )
        .await?;

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].first("GlueSEImplementationName"), Some("DPM"));
    assert_eq!(
        log.calls(),
        [
            "forward:bad1",
            "forward:bad2",
            "forward:good",
            "probe:192.0.2.30",
            "search:192.0.2.30",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_reachable_but_empty_is_empty_set_not_a_fault() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone()).reachable("192.0.2.30");
    let client = client(fast_config(), dns, backend);

    let failure = client
        .query_directory("(objectClass=GlueSA)", ["GlueSAPath"], &strings(&["good"]), "o=grid", LIMIT, PROBE)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::EmptySet);
    assert_eq!(failure.kind.code(), 0);
}

#[tokio::test]
async fn test_invalid_input_makes_no_network_call() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone()).reachable("192.0.2.30");
    let client = client(fast_config(), dns, backend);
    let candidates = strings(&["ldap://good"]);

    let failure = client
        .query_directory("", ["GlueSAPath"], &candidates, "o=grid", LIMIT, PROBE)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::InvalidInput);

    let failure = client
        .query_directory("(objectClass=*)", Vec::<String>::new(), &candidates, "o=grid", LIMIT, PROBE)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::InvalidInput);

    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn test_unreachable_candidates_are_reported_as_such() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("down", &["192.0.2.66"]);
    let backend = MockBackend::new(log.clone());
    let client = client(fast_config(), dns, backend);

    let failure = client
        .query_directory(
            "(objectClass=*)",
            ["GlueSEName"],
            &strings(&["ldap://nowhere:2170", "ldap://down:2170"]),
            "o=grid",
            LIMIT,
            PROBE,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::EndpointUnreachable);
    assert_eq!(
        failure.summary,
        "Failed to get working BDII from [ldap://nowhere:2170,ldap://down:2170]."
    );
    let lines: Vec<&str> = failure.detail.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("* ldap://nowhere:2170: "));
    assert_eq!(lines[1], "* [ldap://192.0.2.66:2170]: 255");
    assert!(log.calls_with("search:").is_empty());
}

#[tokio::test]
async fn test_configured_candidates_used_when_none_given() -> Result<()> {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("bdii.example.org", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone())
        .reachable("192.0.2.30")
        .search(SearchBehaviour::Entries(vec![entry("o=grid", &[("objectClass", "top")])]));
    let config = fast_config().with_candidates(["ldap://bdii.example.org:2170"]);
    let client = client(config, dns, backend);

    let entries = client
        .query(&QueryRequest::new("(objectClass=*)", ["objectClass"]))
        .await?;
    assert_eq!(entries[0].dn, "o=grid");

    let endpoint = client.resolve(&[]).await?;
    assert_eq!(endpoint.to_string(), "ldap://192.0.2.30:2170");
    Ok(())
}

#[tokio::test]
async fn test_no_candidates_anywhere_is_invalid_input() {
    let log = CallLog::default();
    let client = client(fast_config(), MockDns::new(log.clone()), MockBackend::new(log.clone()));

    let failure = client
        .query(&QueryRequest::new("(objectClass=*)", ["objectClass"]))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::InvalidInput);
    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn test_backend_panic_becomes_protocol_error() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone())
        .reachable("192.0.2.30")
        .search(SearchBehaviour::Panic);
    let client = client(fast_config(), dns, backend);

    let failure = client
        .query_directory("(objectClass=*)", ["GlueSEName"], &strings(&["ldap://good:2170"]), "o=grid", LIMIT, PROBE)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::ProtocolError);
    assert_eq!(failure.summary, "Exception while querying BDII [ldap://192.0.2.30:2170]");
    assert_eq!(failure.detail, "backend exploded");
}

#[tokio::test]
async fn test_panic_while_resolving_becomes_protocol_error() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone()).panic_on_probe("192.0.2.30");
    let client = client(fast_config(), dns, backend);

    let failure = client
        .query_directory(
            "(objectClass=*)",
            ["GlueSEName"],
            &strings(&["ldap://good:2170", "ldap://other:2170"]),
            "o=grid",
            LIMIT,
            PROBE,
        )
        .await
        .unwrap_err();

    assert_eq!(failure.kind, FailureKind::ProtocolError);
    assert_eq!(
        failure.summary,
        "Exception while querying BDII [ldap://good:2170,ldap://other:2170]"
    );
    assert_eq!(failure.detail, "probe exploded");
    assert!(log.calls_with("search:").is_empty());
}

#[tokio::test]
async fn test_slow_search_times_out_rather_than_failing() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone())
        .reachable("192.0.2.30")
        .search(SearchBehaviour::Slow(Duration::from_millis(1500)));
    let client = client(fast_config(), dns, backend);

    let failure = client
        .query_directory(
            "(objectClass=*)",
            ["GlueSEName"],
            &strings(&["good"]),
            "o=grid",
            Duration::from_secs(1),
            PROBE,
        )
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn test_query_until_honours_cancellation() {
    let log = CallLog::default();
    let dns = MockDns::new(log.clone()).host("good", &["192.0.2.30"]);
    let backend = MockBackend::new(log.clone())
        .reachable("192.0.2.30")
        .search(SearchBehaviour::Slow(Duration::from_millis(1500)));
    let client = client(fast_config().with_candidates(["good"]), dns, backend);

    let request = QueryRequest::new("(objectClass=*)", ["GlueSEName"]);
    let failure = client
        .query_until(&request, tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::Cancelled);
}
