//! OAuth 2.0 authorization code handshake
//!
//! Built on the `oauth2` crate with PKCE and CSRF state. The authorization and
//! token endpoints come from the provider configuration. Token requests go out
//! through the handshake's own `reqwest` client, which does not follow
//! redirects.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    HttpRequest, HttpResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use thiserror::Error;

use super::types::{AccessGrant, AuthorizationRequest, CallbackParams, Handshake, HandshakeError};
use crate::config::{ConfigError, Endpoints, ProviderConfig, StrategyKind};

/// OAuth 2.0 client with the authorization and token endpoints set
pub type ConfiguredClient = BasicClient<
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// Transport failure while talking to the token endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or the body read
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// Response could not be handed back to the `oauth2` client
    #[error("Failed to build HTTP response: {0}")]
    Response(#[from] http::Error),
}

/// Built-in OAuth 2.0 handshake
pub struct OAuth2Handshake {
    client: ConfiguredClient,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OAuth2Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Handshake").finish_non_exhaustive()
    }
}

impl OAuth2Handshake {
    /// Build the client from an OAuth 2.0 provider configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::HandshakeKindMismatch`] for an OAuth 1.0a
    /// configuration, [`ConfigError::InvalidUrl`] if an endpoint is invalid, or
    /// [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let Endpoints::OAuth2 {
            authorize_url,
            token_url,
        } = config.endpoints()
        else {
            return Err(ConfigError::HandshakeKindMismatch {
                expected: config.kind(),
                actual: StrategyKind::OAuth2,
            });
        };

        let invalid = |field: &'static str| {
            move |e: oauth2::url::ParseError| ConfigError::InvalidUrl {
                field,
                reason: e.to_string(),
            }
        };

        let credentials = config.credentials();
        let client = BasicClient::new(ClientId::new(credentials.key.clone()))
            .set_client_secret(ClientSecret::new(credentials.secret.clone()))
            .set_auth_uri(AuthUrl::new(authorize_url.clone()).map_err(invalid("authorize_url"))?)
            .set_token_uri(TokenUrl::new(token_url.clone()).map_err(invalid("token_url"))?)
            .set_redirect_uri(
                RedirectUrl::new(config.callback_url().to_string()).map_err(invalid("url"))?,
            );

        Ok(Self {
            client,
            http_client: super::token_endpoint_client()?,
        })
    }

    /// Send a token request built by the `oauth2` client
    async fn send(
        http_client: reqwest::Client,
        request: HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let (parts, body) = request.into_parts();

        let response = http_client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;

        let mut builder = http::Response::builder().status(response.status());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(response.headers().clone());
        }

        Ok(builder.body(response.bytes().await?.to_vec())?)
    }
}

#[async_trait]
impl Handshake for OAuth2Handshake {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OAuth2
    }

    async fn begin(&self, scope: &[String]) -> Result<AuthorizationRequest, HandshakeError> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_url_builder = self.client.authorize_url(CsrfToken::new_random);
        for scope in scope {
            auth_url_builder = auth_url_builder.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_state) = auth_url_builder.set_pkce_challenge(pkce_challenge).url();

        Ok(AuthorizationRequest {
            url: auth_url.to_string(),
            state: Some(csrf_state.secret().clone()),
            pkce_verifier: Some(pkce_verifier.secret().clone()),
            request_token_secret: None,
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

        let state = callback
            .state
            .as_deref()
            .ok_or(HandshakeError::MissingParameter("state"))?;
        if pending.state.as_deref() != Some(state) {
            return Err(HandshakeError::StateMismatch);
        }

        let code = callback
            .code
            .as_deref()
            .ok_or(HandshakeError::MissingParameter("code"))?;

        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = &pending.pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.clone()));
        }

        let http_client = |request: HttpRequest| Self::send(self.http_client.clone(), request);
        let token_response = request
            .request_async(&http_client)
            .await
            .map_err(|e| HandshakeError::TokenExchangeFailed(e.to_string()))?;

        Ok(AccessGrant::OAuth2 {
            access_token: token_response.access_token().secret().clone(),
            refresh_token: token_response.refresh_token().map(|t| t.secret().clone()),
            expires_at: token_response
                .expires_in()
                .map(|duration| SystemTime::now() + Duration::from_secs(duration.as_secs())),
            scopes: token_response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.to_string()).collect()),
        })
    }

    async fn get_protected(
        &self,
        url: &str,
        grant: &AccessGrant,
    ) -> Result<String, HandshakeError> {
        let AccessGrant::OAuth2 { access_token, .. } = grant else {
            return Err(HandshakeError::UnsupportedGrant(grant.kind()));
        };

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
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
