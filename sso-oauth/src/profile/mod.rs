//! Provider profile normalization
//!
//! User-info responses have no fixed schema. A [`ProfileNormalizer`] turns one
//! into a [`NormalizedProfile`]. The default [`EnvelopeNormalizer`] understands
//! `MediaWiki`'s `query.userinfo` envelope and flat `{id, name, email}` objects.
//!
//! Integrators with a different provider replace the normalizer. Whatever
//! normalizer is used, [`normalize_body`] re-validates its output so that an
//! external id and at least one email address are always present.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Profile parsing errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// The user-info body is not valid JSON
    #[error("User info response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The user-info body is JSON but not an object
    #[error("User info response is not a JSON object")]
    NotAnObject,

    /// A required profile field is absent or empty
    #[error("User info response is missing `{0}`")]
    MissingField(String),
}

/// One email address of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEmail {
    /// The address
    pub value: String,
}

impl ProfileEmail {
    /// Create an email entry
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Canonical profile shape produced by every normalizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedProfile {
    /// Provider-side stable user id
    #[serde(rename = "id")]
    pub external_id: String,
    /// Name to use as the local username
    pub display_name: String,
    /// Email addresses, primary first
    pub emails: Vec<ProfileEmail>,
    /// Whether the user should be made an administrator
    #[serde(default)]
    pub is_admin: bool,
    /// Provider name, stamped by the adapter
    #[serde(default)]
    pub provider: String,
}

impl NormalizedProfile {
    /// First email address, if any
    #[must_use]
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(|email| email.value.as_str())
    }

    /// Check the invariants every downstream login relies on
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingField`] if the external id is empty or the
    /// first email address is missing or empty.
    pub fn validate(self) -> Result<Self, ParseError> {
        if self.external_id.trim().is_empty() {
            return Err(ParseError::MissingField("id".to_string()));
        }
        if self.primary_email().is_none_or(|email| email.trim().is_empty()) {
            return Err(ParseError::MissingField("email".to_string()));
        }
        Ok(self)
    }
}

/// Converts a provider-specific user-info response into a [`NormalizedProfile`]
///
/// Closures with the right signature implement this trait, so a one-off
/// normalizer can be passed without declaring a type.
pub trait ProfileNormalizer: Send + Sync {
    /// Normalize a parsed user-info response
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if required data is absent or malformed.
    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ParseError>;
}

impl<F> ProfileNormalizer for F
where
    F: Fn(&Value) -> Result<NormalizedProfile, ParseError> + Send + Sync,
{
    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ParseError> {
        self(raw)
    }
}

/// Default normalizer
///
/// Unwraps `query.userinfo` when present and maps `id`, `name` and `email`.
/// Numeric ids are accepted (`MediaWiki` returns them as integers). When no
/// `name` is present the external id doubles as the display name.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeNormalizer {
    admin_claim: Option<String>,
}

impl EnvelopeNormalizer {
    /// Create a normalizer that never grants administrator rights
    #[must_use]
    pub const fn new() -> Self {
        Self { admin_claim: None }
    }

    /// Mark users as administrators when `claim` holds a truthy value
    #[must_use]
    pub fn with_admin_claim(mut self, claim: impl Into<String>) -> Self {
        self.admin_claim = Some(claim.into());
        self
    }
}

impl ProfileNormalizer for EnvelopeNormalizer {
    fn normalize(&self, raw: &Value) -> Result<NormalizedProfile, ParseError> {
        let data = raw
            .pointer("/query/userinfo")
            .filter(|inner| inner.is_object())
            .unwrap_or(raw);
        let object = data.as_object().ok_or(ParseError::NotAnObject)?;

        let external_id = object
            .get("id")
            .and_then(scalar_to_string)
            .ok_or_else(|| ParseError::MissingField("id".to_string()))?;

        let display_name = object
            .get("name")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| external_id.clone());

        let emails = object
            .get("email")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(|email| vec![ProfileEmail::new(email)])
            .unwrap_or_default();

        let is_admin = self
            .admin_claim
            .as_deref()
            .and_then(|claim| object.get(claim))
            .is_some_and(is_truthy);

        NormalizedProfile {
            external_id,
            display_name,
            emails,
            is_admin,
            provider: String::new(),
        }
        .validate()
    }
}

/// Parse a raw user-info body
///
/// # Errors
///
/// Returns [`ParseError::InvalidJson`] for malformed input.
pub fn parse_body(body: &str) -> Result<Value, ParseError> {
    Ok(serde_json::from_str(body)?)
}

/// Parse, normalize, validate and stamp a user-info body
///
/// # Errors
///
/// Returns [`ParseError`] if the body is malformed or the normalizer output
/// lacks an external id or email address.
pub fn normalize_body(
    normalizer: &dyn ProfileNormalizer,
    body: &str,
    provider: &str,
) -> Result<NormalizedProfile, ParseError> {
    let raw = parse_body(body)?;
    normalize_value(normalizer, &raw, provider)
}

/// Normalize an already-parsed response, validate it and stamp the provider
///
/// # Errors
///
/// Returns [`ParseError`] if the normalizer fails or its output is incomplete.
pub fn normalize_value(
    normalizer: &dyn ProfileNormalizer,
    raw: &Value,
    provider: &str,
) -> Result<NormalizedProfile, ParseError> {
    let mut profile = normalizer.normalize(raw)?.validate()?;
    profile.provider = provider.to_string();
    Ok(profile)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
