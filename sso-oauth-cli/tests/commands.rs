//! Integration tests for CLI commands

use std::fs;
use std::path::PathBuf;

use sso_oauth::config::StrategyKind;
use sso_oauth_cli_lib::{CheckCommand, LoginCommand, NormalizeCommand};
use tempfile::TempDir;

const WIKI_CONFIG: &str = r#"
url = "https://forum.example.org"

[oauth]
root = "https://wiki.example.org/w"
type = "oauth"
name = "wiki"
key = "consumer"
secret = "secret"
scope = "basic,email"
"#;

const ALICE: &str = r#"{"query":{"userinfo":{"id":"w123","name":"alice","email":"a@x.com"}}}"#;

/// Helper to write a file into the temp dir
fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_check_reports_derived_endpoints() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", WIKI_CONFIG);

    let report = CheckCommand::new(Some(config)).run().unwrap();

    assert_eq!(report.kind, StrategyKind::OAuth1);
    assert_eq!(report.strategy.url, "/auth/wiki");
    assert_eq!(report.callback_url, "https://forum.example.org/auth/wiki/callback");
    assert_eq!(
        report.authorize_url,
        "https://wiki.example.org/w/index.php?title=Special:OAuth/authorize"
    );
    assert_eq!(report.id_field, "wikiId");
    assert_eq!(report.mapping_key, "wikiId:uid");
}

#[test]
fn test_check_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "config.toml",
        r#"
        [oauth]
        type = "saml"
        key = "consumer"
        secret = "secret"
        "#,
    );

    let err = CheckCommand::new(Some(config)).run().unwrap_err();
    assert!(format!("{err:#}").contains("saml"));
}

#[test]
fn test_check_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(CheckCommand::new(Some(missing)).run().is_err());
}

#[test]
fn test_normalize_profile_file() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", WIKI_CONFIG);
    let profile = write(&dir, "alice.json", ALICE);

    let normalized = NormalizeCommand::new(profile, Some(config)).run().unwrap();

    assert_eq!(normalized.external_id, "w123");
    assert_eq!(normalized.display_name, "alice");
    assert_eq!(normalized.primary_email(), Some("a@x.com"));
    assert_eq!(normalized.provider, "wiki");
}

#[test]
fn test_normalize_rejects_garbage() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", WIKI_CONFIG);
    let profile = write(&dir, "broken.json", "<html>Service Unavailable</html>");

    assert!(NormalizeCommand::new(profile, Some(config)).run().is_err());
}

#[tokio::test]
async fn test_repeated_login_resolves_same_uid() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", WIKI_CONFIG);
    let profile = write(&dir, "alice.json", ALICE);

    let report = LoginCommand::new(profile, Some(config), 3)
        .run()
        .await
        .unwrap();

    assert_eq!(report.external_id, "w123");
    assert_eq!(report.uids, vec![1, 1, 1]);
    assert_eq!(report.accounts, 1);
    assert!(!report.is_admin);
}

#[tokio::test]
async fn test_login_links_seeded_account() {
    let dir = TempDir::new().unwrap();
    let config = write(&dir, "config.toml", WIKI_CONFIG);
    let profile = write(&dir, "alice.json", ALICE);

    let report = LoginCommand::new(profile, Some(config), 1)
        .with_existing_user("bob", "b@x.com")
        .with_existing_user("alice_forum", "a@x.com")
        .run()
        .await
        .unwrap();

    assert_eq!(report.uids, vec![2]);
    assert_eq!(report.accounts, 2);
}

#[tokio::test]
async fn test_login_admin_claim() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "config.toml",
        &format!("{WIKI_CONFIG}admin_claim = \"isAdmin\"\n"),
    );
    let profile = write(
        &dir,
        "root.json",
        r#"{"id":"1","name":"root","email":"root@x.com","isAdmin":true}"#,
    );

    let report = LoginCommand::new(profile, Some(config), 1)
        .run()
        .await
        .unwrap();

    assert!(report.is_admin);
}
