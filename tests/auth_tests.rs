//! Auth scheme end-to-end tests against a stub server.

use std::path::PathBuf;

use serde_json::json;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use hitspec::config::Config;
use hitspec::runner::{RunnerConfig, TestRunner};

fn write_spec(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn run_spec(spec: PathBuf) -> hitspec::runner::RunResult {
    TestRunner::new(Config::default(), RunnerConfig::default())
        .unwrap()
        .run(&[spec])
        .await
        .unwrap()
}

/// Matches requests that carry no Authorization header.
struct NoAuthorization;

impl Match for NoAuthorization {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

#[tokio::test]
async fn basic_auth_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        // RFC 7617 example credentials.
        .and(wiremock::matchers::header(
            "Authorization",
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==",
        ))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        &dir,
        "basic.http",
        &format!(
            concat!(
                "### private\n# @auth basic Aladdin 'open sesame'\nGET {uri}/private\n",
                ">>>\nexpect status 200\n<<<\n",
            ),
            uri = server.uri()
        ),
    );

    assert!(run_spec(spec).await.passed());
}

#[tokio::test]
async fn apikey_query_lands_in_query_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(query_param("api_key", "k-123"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        &dir,
        "apikey.http",
        &format!(
            concat!(
                "### data\n# @auth apikey-query api_key k-123\nGET {uri}/data\n",
                ">>>\nexpect status 200\n<<<\n",
            ),
            uri = server.uri()
        ),
    );

    assert!(run_spec(spec).await.passed());
}

#[tokio::test]
async fn digest_challenge_is_answered_once() {
    let server = MockServer::start().await;
    // First pass: unauthenticated request draws the challenge.
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(NoAuthorization)
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            "Digest realm=\"api\", nonce=\"abc123\", qop=\"auth\"",
        ))
        .mount(&server)
        .await;
    // Second pass: any digest authorization is accepted.
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        &dir,
        "digest.http",
        &format!(
            concat!(
                "### secure\n# @auth digest mufasa circle\nGET {uri}/secure\n",
                ">>>\nexpect status 200\nexpect body.ok == true\n<<<\n",
            ),
            uri = server.uri()
        ),
    );

    assert!(run_spec(spec).await.passed());

    let hits = server.received_requests().await.unwrap();
    assert_eq!(hits.len(), 2);
    let retry = &hits[1];
    let authorization = retry
        .headers
        .get("authorization")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(authorization.starts_with("Digest username=\"mufasa\""));
    assert!(authorization.contains("nonce=\"abc123\""));
    assert!(authorization.contains("qop=auth"));
    assert!(authorization.contains("nc=00000001"));
}

#[tokio::test]
async fn oauth2_client_credentials_fetches_token_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access_token": "issued-token"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resource"))
        .and(wiremock::matchers::header(
            "Authorization",
            "Bearer issued-token",
        ))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        &dir,
        "oauth.http",
        &format!(
            concat!(
                "### resource\n# @auth oauth2 {uri}/oauth/token my-client my-secret\n",
                "GET {uri}/resource\n",
                ">>>\nexpect status 200\n<<<\n",
            ),
            uri = server.uri()
        ),
    );

    assert!(run_spec(spec).await.passed());

    let hits = server.received_requests().await.unwrap();
    assert_eq!(hits[0].url.path(), "/oauth/token");
    let body = String::from_utf8(hits[0].body.clone()).unwrap();
    assert!(body.contains("grant_type=client_credentials"));
    assert!(body.contains("client_id=my-client"));
}

#[tokio::test]
async fn aws_sigv4_headers_are_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bucket"))
        .and(header_exists("x-amz-date"))
        .and(header_exists("x-amz-content-sha256"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(
        &dir,
        "aws.http",
        &format!(
            concat!(
                "### bucket\n# @auth aws AKIDEXAMPLE secretkey us-east-1 s3\n",
                "GET {uri}/bucket\n",
                ">>>\nexpect status 200\n<<<\n",
            ),
            uri = server.uri()
        ),
    );

    assert!(run_spec(spec).await.passed());

    let hit = &server.received_requests().await.unwrap()[0];
    let authorization = hit.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(authorization.contains("SignedHeaders=host;x-amz-date"));
}
