//! OAuth 1.0a end-to-end tests
//!
//! Runs the built-in OAuth 1.0a handshake against a mocked `MediaWiki`
//! (`Special:OAuth` pages and `api.php`) derived from the provider root.

use std::sync::Arc;

use serde_json::json;
use sso_oauth::prelude::*;
use wiremock::{
    matchers::{header_regex, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const REQUEST_TOKEN: &str = "rt";
const VERIFIER: &str = "v1";

/// Helper to build a plugin for a wiki served by the mock server
async fn setup() -> (MockServer, MemoryHost, Arc<Strategy>) {
    let mock_server = MockServer::start().await;

    let settings = SsoSettings::from_toml_str(&format!(
        r#"
        url = "https://forum.example.org"

        [oauth]
        root = "{}/w"
        key = "consumer"
        secret = "consumer-secret"
        "#,
        mock_server.uri()
    ))
    .unwrap();

    let host = MemoryHost::new();
    let plugin = SsoPlugin::new(&settings, HostServices::from_host(Arc::new(host.clone())));
    let strategies = plugin.get_strategy(Vec::new(), &host).unwrap();
    assert_eq!(strategies[0].url, "/auth/wiki");
    let strategy = host.strategy("wiki").unwrap();

    (mock_server, host, strategy)
}

async fn mount_initiate(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/w/index.php"))
        .and(query_param("title", "Special:OAuth/initiate"))
        .and(header_regex(
            "authorization",
            r#"oauth_callback="https%3A%2F%2Fforum\.example\.org%2Fauth%2Fwiki%2Fcallback""#,
        ))
        .and(header_regex("authorization", r#"oauth_signature_method="HMAC-SHA1""#))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "oauth_token={REQUEST_TOKEN}&oauth_token_secret=rts&oauth_callback_confirmed=true"
        )))
        .mount(mock_server)
        .await;
}

async fn mount_token(mock_server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/w/index.php"))
        .and(query_param("title", "Special:OAuth/token"))
        .and(header_regex("authorization", r#"oauth_token="rt""#))
        .and(header_regex("authorization", r#"oauth_verifier="v1""#))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string("oauth_token=at&oauth_token_secret=ats"),
        )
        .expect(expected_calls)
        .mount(mock_server)
        .await;
}

async fn mount_userinfo(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("meta", "userinfo"))
        .and(header_regex("authorization", r#"oauth_token="at""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batchcomplete": "",
            "query": {"userinfo": {"id": 123, "name": "Alice", "email": "a@x.com"}}
        })))
        .mount(mock_server)
        .await;
}

fn callback(token: &str) -> CallbackParams {
    CallbackParams {
        oauth_token: Some(token.to_string()),
        oauth_verifier: Some(VERIFIER.to_string()),
        ..CallbackParams::default()
    }
}

#[tokio::test]
async fn test_default_wiki_login_creates_and_links_account() {
    let (mock_server, host, strategy) = setup().await;
    mount_initiate(&mock_server).await;
    mount_token(&mock_server, 200, 1).await;
    mount_userinfo(&mock_server).await;

    let request = strategy.begin().await.unwrap();
    assert!(request.url.starts_with(&format!(
        "{}/w/index.php?title=Special:OAuth/authorize",
        mock_server.uri()
    )));
    assert!(request.url.contains("oauth_token=rt"));
    assert!(request.url.contains("oauth_consumer_key=consumer"));
    assert_eq!(request.state.as_deref(), Some(REQUEST_TOKEN));
    assert_eq!(request.request_token_secret.as_deref(), Some("rts"));

    let account = strategy
        .handle_callback(&callback(REQUEST_TOKEN), &request)
        .await
        .unwrap();

    let user = host.user(account.uid).await.unwrap();
    assert_eq!(user.username, "Alice");
    assert_eq!(user.fields.get("wikiId").map(String::as_str), Some("123"));
    assert_eq!(
        host.object_field("wikiId:uid", "123").await,
        Some(account.uid.to_string())
    );
    assert_eq!(host.logins().await, vec![account.uid]);
}

#[tokio::test]
async fn test_rejected_verifier_creates_nothing() {
    let (mock_server, host, strategy) = setup().await;
    mount_initiate(&mock_server).await;
    mount_token(&mock_server, 401, 1).await;

    let request = strategy.begin().await.unwrap();
    let err = strategy
        .handle_callback(&callback(REQUEST_TOKEN), &request)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SsoError::Handshake(HandshakeError::TokenExchangeFailed(_))
    ));
    assert_eq!(host.user_count().await, 0);
}

#[tokio::test]
async fn test_foreign_request_token_skips_exchange() {
    let (mock_server, host, strategy) = setup().await;
    mount_initiate(&mock_server).await;
    mount_token(&mock_server, 200, 0).await;

    let request = strategy.begin().await.unwrap();
    let err = strategy
        .handle_callback(&callback("someone-elses-token"), &request)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SsoError::Handshake(HandshakeError::StateMismatch)
    ));
    assert_eq!(host.user_count().await, 0);
}
