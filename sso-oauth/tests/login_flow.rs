//! Account-linking integration tests
//!
//! Drives the plugin surface with a stand-in OAuth 1.0a handshake (the
//! `MediaWiki` default configuration) and the in-memory host.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sso_oauth::prelude::*;

/// OAuth 1.0a client stand-in that serves a fixed user-info body
#[derive(Default)]
struct StaticHandshake {
    body: Mutex<String>,
    requested: Mutex<Vec<String>>,
}

impl StaticHandshake {
    fn serve(&self, body: &str) {
        *self.body.lock() = body.to_string();
    }
}

#[async_trait]
impl Handshake for StaticHandshake {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OAuth1
    }

    async fn begin(&self, _scope: &[String]) -> Result<AuthorizationRequest, HandshakeError> {
        Ok(AuthorizationRequest {
            url: "https://en.wikipedia.org/w/index.php?title=Special:OAuth/authorize&oauth_token=rt"
                .to_string(),
            request_token_secret: Some("rts".to_string()),
            ..AuthorizationRequest::default()
        })
    }

    async fn complete(
        &self,
        callback: &CallbackParams,
        _pending: &AuthorizationRequest,
    ) -> Result<AccessGrant, HandshakeError> {
        let verifier = callback
            .oauth_verifier
            .clone()
            .ok_or(HandshakeError::MissingParameter("oauth_verifier"))?;
        Ok(AccessGrant::OAuth1 {
            token: format!("token-{verifier}"),
            token_secret: "secret".to_string(),
        })
    }

    async fn get_protected(
        &self,
        url: &str,
        _grant: &AccessGrant,
    ) -> Result<String, HandshakeError> {
        self.requested.lock().push(url.to_string());
        Ok(self.body.lock().clone())
    }
}

struct Fixture {
    host: MemoryHost,
    handshake: Arc<StaticHandshake>,
    plugin: SsoPlugin,
    strategy: Arc<Strategy>,
}

fn fixture() -> Fixture {
    let mut settings = SsoSettings::default();
    settings.url = "https://forum.example.org".to_string();
    settings.oauth.key = Some("consumer".to_string());
    settings.oauth.secret = Some("secret".to_string());

    let host = MemoryHost::new();
    let handshake = Arc::new(StaticHandshake::default());
    let plugin = SsoPlugin::new(&settings, HostServices::from_host(Arc::new(host.clone())))
        .with_handshake(handshake.clone());

    let strategies = plugin.get_strategy(Vec::new(), &host).unwrap();
    assert_eq!(strategies[0].callback_url, "/auth/wiki/callback");
    let strategy = host.strategy("wiki").unwrap();

    Fixture {
        host,
        handshake,
        plugin,
        strategy,
    }
}

async fn login_as(fixture: &Fixture, body: &str) -> Result<LocalAccountRef, SsoError> {
    fixture.handshake.serve(body);
    let pending = fixture.strategy.begin().await?;
    let callback = CallbackParams {
        oauth_token: Some("rt".to_string()),
        oauth_verifier: Some("v".to_string()),
        ..CallbackParams::default()
    };
    fixture.strategy.handle_callback(&callback, &pending).await
}

const ALICE: &str = r#"{"query":{"userinfo":{"id":"w123","name":"alice","email":"a@x.com"}}}"#;

#[tokio::test]
async fn test_first_login_creates_linked_account() {
    let fixture = fixture();

    let account = login_as(&fixture, ALICE).await.unwrap();

    let user = fixture.host.user(account.uid).await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.email, "a@x.com");
    assert_eq!(user.fields.get("wikiId").map(String::as_str), Some("w123"));
    assert_eq!(
        fixture.host.object_field("wikiId:uid", "w123").await,
        Some(account.uid.to_string())
    );
    assert_eq!(
        fixture.handshake.requested.lock().as_slice(),
        ["https://en.wikipedia.org/w/api.php?action=query&meta=userinfo&uiprop=email&format=json"]
    );
}

#[tokio::test]
async fn test_resubmission_returns_same_uid() {
    let fixture = fixture();

    let first = login_as(&fixture, ALICE).await.unwrap();
    let second = login_as(&fixture, ALICE).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fixture.host.user_count().await, 1);
    assert_eq!(fixture.host.object_len("wikiId:uid").await, 1);
}

#[tokio::test]
async fn test_changed_email_keeps_linked_account() {
    let fixture = fixture();

    let first = login_as(&fixture, ALICE).await.unwrap();
    let second = login_as(
        &fixture,
        r#"{"id":"w123","name":"alice","email":"alice@elsewhere.org"}"#,
    )
    .await
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(fixture.host.user_count().await, 1);
}

#[tokio::test]
async fn test_existing_account_linked_by_email() {
    let fixture = fixture();
    let existing = fixture
        .host
        .insert_user("alice_forum", "a@x.com")
        .await
        .unwrap();

    let account = login_as(&fixture, ALICE).await.unwrap();

    assert_eq!(account.uid, existing);
    assert_eq!(fixture.host.user_count().await, 1);
    assert_eq!(
        fixture.host.object_field("wikiId:uid", "w123").await,
        Some(existing.to_string())
    );
}

#[tokio::test]
async fn test_delete_removes_link() {
    let fixture = fixture();
    let account = login_as(&fixture, ALICE).await.unwrap();

    fixture.plugin.delete_user_data(account.uid).await.unwrap();
    assert_eq!(fixture.host.object_field("wikiId:uid", "w123").await, None);

    // The host kept the record, so the email fallback relinks it
    let again = login_as(&fixture, ALICE).await.unwrap();
    assert_eq!(again, account);
    assert_eq!(
        fixture.host.object_field("wikiId:uid", "w123").await,
        Some(account.uid.to_string())
    );
}

#[tokio::test]
async fn test_relinked_account_deletes_cleanly() {
    let fixture = fixture();
    let first = login_as(&fixture, ALICE).await.unwrap();

    // Same person under a recreated provider account
    let second = login_as(
        &fixture,
        r#"{"id":"w456","name":"alice","email":"a@x.com"}"#,
    )
    .await
    .unwrap();
    assert_eq!(first, second);
    assert_eq!(fixture.host.object_field("wikiId:uid", "w123").await, None);

    fixture.plugin.delete_user_data(second.uid).await.unwrap();
    assert_eq!(fixture.host.object_len("wikiId:uid").await, 0);
}

#[tokio::test]
async fn test_missing_id_is_parse_error() {
    let fixture = fixture();

    let err = login_as(&fixture, r#"{"name":"alice","email":"a@x.com"}"#)
        .await
        .unwrap_err();

    assert!(matches!(err, SsoError::Parse(ParseError::MissingField(_))));
    assert_eq!(fixture.host.user_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_username_is_login_error() {
    let fixture = fixture();
    fixture
        .host
        .insert_user("alice", "someone-else@x.com")
        .await
        .unwrap();

    let err = login_as(&fixture, ALICE).await.unwrap_err();

    assert!(matches!(
        err,
        SsoError::Login(LoginError::Host(HostError::UsernameTaken(_)))
    ));
    assert_eq!(fixture.host.object_len("wikiId:uid").await, 0);
}

#[tokio::test]
async fn test_missing_verifier_is_handshake_error() {
    let fixture = fixture();
    let pending = fixture.strategy.begin().await.unwrap();

    let err = fixture
        .strategy
        .handle_callback(&CallbackParams::default(), &pending)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SsoError::Handshake(HandshakeError::MissingParameter("oauth_verifier"))
    ));
}

#[test]
fn test_whitelist_hook() {
    let fixture = fixture();

    let params = fixture
        .plugin
        .whitelist_fields(WhitelistParams::new(["uid", "email"]));
    assert_eq!(params.whitelist, ["uid", "email", "wikiId"]);
}
