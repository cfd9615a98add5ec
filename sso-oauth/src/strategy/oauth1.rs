//! OAuth 1.0a three-legged handshake
//!
//! Requests carry an `Authorization: OAuth ...` header signed with HMAC-SHA1
//! (RFC 5849 section 3.4.2). Query parameters of the endpoint URL are part of
//! the signature base string, which `MediaWiki`'s `index.php?title=...` endpoints
//! rely on.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use oauth2::url::{form_urlencoded, Url};
use rand::Rng;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde_json::Value;
use sha1::Sha1;

use super::types::{AccessGrant, AuthorizationRequest, CallbackParams, Handshake, HandshakeError};
use crate::config::{ClientCredentials, ConfigError, Endpoints, ProviderConfig, StrategyKind};

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const NONCE_LEN: usize = 32;

/// Token and token secret borrowed for signing
type TokenRef<'a> = (&'a str, &'a str);

/// Built-in OAuth 1.0a handshake
pub struct OAuth1Handshake {
    request_token_url: String,
    access_token_url: String,
    authorize_url: String,
    callback_url: String,
    consumer: ClientCredentials,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OAuth1Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Handshake")
            .field("request_token_url", &self.request_token_url)
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

impl OAuth1Handshake {
    /// Build the client from an OAuth 1.0a provider configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HandshakeKindMismatch`] for an OAuth 2.0
    /// configuration, or [`ConfigError::HttpClient`] if the HTTP client cannot
    /// be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let Endpoints::OAuth1 {
            request_token_url,
            access_token_url,
            authorize_url,
        } = config.endpoints()
        else {
            return Err(ConfigError::HandshakeKindMismatch {
                expected: config.kind(),
                actual: StrategyKind::OAuth1,
            });
        };

        Ok(Self {
            request_token_url: request_token_url.clone(),
            access_token_url: access_token_url.clone(),
            authorize_url: authorize_url.clone(),
            callback_url: config.callback_url().to_string(),
            consumer: config.credentials().clone(),
            http_client: super::token_endpoint_client()?,
        })
    }

    /// `Authorization` header value for one request
    fn authorization(
        &self,
        method: &Method,
        url: &str,
        token: Option<TokenRef<'_>>,
        extra: &[(&str, &str)],
    ) -> Result<String, HandshakeError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| HandshakeError::Invalid(e.to_string()))?
            .as_secs()
            .to_string();
        let nonce: String = rand::rng()
            .sample_iter(rand::distr::Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();

        let mut params = vec![
            ("oauth_consumer_key", self.consumer.key.as_str()),
            ("oauth_nonce", nonce.as_str()),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_version", "1.0"),
        ];
        if let Some((token, _)) = token {
            params.push(("oauth_token", token));
        }
        params.extend_from_slice(extra);

        let base = signature_base(method.as_str(), url, &params)?;
        let signature = sign(
            &base,
            &self.consumer.secret,
            token.map_or("", |(_, secret)| secret),
        )?;

        let fields = params
            .iter()
            .copied()
            .chain(std::iter::once(("oauth_signature", signature.as_str())))
            .map(|(key, value)| format!("{key}=\"{}\"", urlencoding::encode(value)))
            .collect::<Vec<_>>();

        Ok(format!("OAuth {}", fields.join(", ")))
    }

    /// POST a signed request to a token endpoint and read the credentials
    async fn request_credentials(
        &self,
        url: &str,
        token: Option<TokenRef<'_>>,
        extra: &[(&str, &str)],
    ) -> Result<(String, String), HandshakeError> {
        let header = self.authorization(&Method::POST, url, token, extra)?;

        let response = self
            .http_client
            .post(url)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| HandshakeError::TokenExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HandshakeError::TokenExchangeFailed(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| HandshakeError::TokenExchangeFailed(e.to_string()))?;

        parse_credentials(&body).ok_or_else(|| {
            HandshakeError::TokenExchangeFailed(
                "response does not contain token credentials".to_string(),
            )
        })
    }
}

#[async_trait]
impl Handshake for OAuth1Handshake {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OAuth1
    }

    /// Obtain a request token and build the authorization URL
    ///
    /// OAuth 1.0a has no scope parameter; grants come from the consumer
    /// registration.
    async fn begin(&self, _scope: &[String]) -> Result<AuthorizationRequest, HandshakeError> {
        let (token, secret) = self
            .request_credentials(
                &self.request_token_url,
                None,
                &[("oauth_callback", self.callback_url.as_str())],
            )
            .await?;

        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| HandshakeError::Invalid(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("oauth_token", &token)
            .append_pair("oauth_consumer_key", &self.consumer.key);

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state: Some(token),
            pkce_verifier: None,
            request_token_secret: Some(secret),
        })
    }

    async fn complete(
        &self,
        callback: &CallbackParams,
        pending: &AuthorizationRequest,
    ) -> Result<AccessGrant, HandshakeError> {
        if let Some(denial) = callback.denial() {
            return Err(HandshakeError::ProviderDenied(denial));
        }

        let request_token = callback
            .oauth_token
            .as_deref()
            .ok_or(HandshakeError::MissingParameter("oauth_token"))?;
        if pending.state.as_deref() != Some(request_token) {
            return Err(HandshakeError::StateMismatch);
        }

        let verifier = callback
            .oauth_verifier
            .as_deref()
            .ok_or(HandshakeError::MissingParameter("oauth_verifier"))?;
        let request_secret = pending.request_token_secret.as_deref().ok_or_else(|| {
            HandshakeError::Invalid("pending authorization has no request token secret".to_string())
        })?;

        let (token, token_secret) = self
            .request_credentials(
                &self.access_token_url,
                Some((request_token, request_secret)),
                &[("oauth_verifier", verifier)],
            )
            .await?;

        Ok(AccessGrant::OAuth1 {
            token,
            token_secret,
        })
    }

    async fn get_protected(
        &self,
        url: &str,
        grant: &AccessGrant,
    ) -> Result<String, HandshakeError> {
        let AccessGrant::OAuth1 {
            token,
            token_secret,
        } = grant
        else {
            return Err(HandshakeError::UnsupportedGrant(grant.kind()));
        };

        let header = self.authorization(&Method::GET, url, Some((token, token_secret)), &[])?;

        let response = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, header)
            .send()
            .await
            .map_err(|e| HandshakeError::UserInfoFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(HandshakeError::UserInfoFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| HandshakeError::UserInfoFailed(e.to_string()))
    }
}

/// Signature base string: method, base URI and normalized parameters
fn signature_base(
    method: &str,
    url: &str,
    oauth_params: &[(&str, &str)],
) -> Result<String, HandshakeError> {
    let url = Url::parse(url).map_err(|e| HandshakeError::Invalid(e.to_string()))?;

    let mut base_uri = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        base_uri = format!("{base_uri}:{port}");
    }
    base_uri.push_str(url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            (
                urlencoding::encode(&key).into_owned(),
                urlencoding::encode(&value).into_owned(),
            )
        })
        .chain(oauth_params.iter().map(|(key, value)| {
            (
                urlencoding::encode(key).into_owned(),
                urlencoding::encode(value).into_owned(),
            )
        }))
        .collect();
    params.sort();

    let normalized = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        urlencoding::encode(&base_uri),
        urlencoding::encode(&normalized)
    ))
}

/// HMAC-SHA1 over the base string, keyed by both secrets
fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String, HandshakeError> {
    let key = format!(
        "{}&{}",
        urlencoding::encode(consumer_secret),
        urlencoding::encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| HandshakeError::Invalid(e.to_string()))?;
    mac.update(base.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Read a token pair from a form-encoded or `MediaWiki` JSON response
fn parse_credentials(body: &str) -> Option<(String, String)> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) {
        let field = |names: [&str; 2]| {
            names
                .iter()
                .find_map(|name| object.get(*name)?.as_str())
                .map(ToString::to_string)
        };
        return field(["oauth_token", "key"]).zip(field(["oauth_token_secret", "secret"]));
    }

    let mut pairs: HashMap<String, String> =
        form_urlencoded::parse(body.as_bytes()).into_owned().collect();
    pairs
        .remove("oauth_token")
        .zip(pairs.remove("oauth_token_secret"))
}
