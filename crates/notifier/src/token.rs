//! OAuth2 access tokens for the push gateway.
//!
//! `GoogleTokenMinter` exchanges a freshly signed assertion for a bearer token
//! on every call. `CachedTokenSource` wraps any source and reuses tokens per
//! credential until shortly before they expire.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use pushrelay_common::error::AppError;
use pushrelay_common::types::ServiceAccountCredential;

use crate::assertion::{ASSERTION_LIFETIME_SECS, AssertionSigner};

/// OAuth2 grant type for service-account assertions.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Cached tokens are refreshed this many seconds before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// A bearer token and the instant it stops being valid.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token can still be handed out at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Anything that can produce a bearer token for a service account.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(
        &self,
        credential: &ServiceAccountCredential,
    ) -> Result<AccessToken, AppError>;
}

/// Mints a new token per call via the `jwt-bearer` grant.
pub struct GoogleTokenMinter {
    http: reqwest::Client,
    token_url: String,
}

impl GoogleTokenMinter {
    /// `token_url` is both the POST target and the assertion's `aud` claim.
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }

    /// Pull a validated token out of the endpoint's JSON answer.
    fn parse_token_response(body: &Value, now: DateTime<Utc>) -> Result<AccessToken, AppError> {
        let token = match body.get("access_token") {
            Some(Value::String(token)) if !token.is_empty() => token.clone(),
            Some(Value::String(_)) => {
                return Err(AppError::TokenExchange(
                    "token endpoint returned an empty access_token".to_string(),
                ));
            }
            Some(_) => {
                return Err(AppError::TokenExchange(
                    "token endpoint returned a non-string access_token".to_string(),
                ));
            }
            None => {
                return Err(AppError::TokenExchange(
                    "token endpoint response is missing access_token".to_string(),
                ));
            }
        };

        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_i64)
            .filter(|secs| *secs > 0)
            .unwrap_or(ASSERTION_LIFETIME_SECS);

        Ok(AccessToken {
            token,
            expires_at: now + Duration::seconds(expires_in),
        })
    }

    /// Render an OAuth2 error answer as `<error> (<error_description>)`.
    fn describe_error(body: &Value) -> Option<String> {
        let error = body.get("error").and_then(Value::as_str)?;
        match body.get("error_description").and_then(Value::as_str) {
            Some(description) => Some(format!("{} ({})", error, description)),
            None => Some(error.to_string()),
        }
    }
}

#[async_trait]
impl AccessTokenSource for GoogleTokenMinter {
    async fn access_token(
        &self,
        credential: &ServiceAccountCredential,
    ) -> Result<AccessToken, AppError> {
        let signer = AssertionSigner::from_credential(credential)?;
        let now = Utc::now();
        let assertion = signer.sign_assertion(&self.token_url, now.timestamp())?;

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::TokenExchange(format!("token request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AppError::TokenExchange(format!("failed to read token response: {}", e))
        })?;
        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let detail = body
                .as_ref()
                .and_then(Self::describe_error)
                .unwrap_or(text);
            return Err(AppError::TokenExchange(format!(
                "token endpoint returned {}: {}",
                status, detail
            )));
        }

        let body = body.ok_or_else(|| {
            AppError::TokenExchange("token endpoint returned a non-JSON body".to_string())
        })?;
        let token = Self::parse_token_response(&body, now)?;

        tracing::debug!(
            client_email = %credential.client_email,
            expires_at = %token.expires_at,
            "Minted access token"
        );

        Ok(token)
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<AccessToken>>>;

/// Per-credential token cache with single-flight refresh.
///
/// Each credential fingerprint owns an async mutex that is held across the
/// inner mint, so concurrent callers for the same credential wait for one
/// exchange instead of racing.
pub struct CachedTokenSource<S> {
    inner: S,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<S: AccessTokenSource> CachedTokenSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, fingerprint: String) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(fingerprint).or_default().clone()
    }
}

#[async_trait]
impl<S: AccessTokenSource> AccessTokenSource for CachedTokenSource<S> {
    async fn access_token(
        &self,
        credential: &ServiceAccountCredential,
    ) -> Result<AccessToken, AppError> {
        let slot = self.slot(fingerprint(credential));
        let mut cached = slot.lock().await;

        if let Some(token) = cached.as_ref()
            && token.is_fresh(Utc::now())
        {
            tracing::debug!(client_email = %credential.client_email, "Reusing cached access token");
            return Ok(token.clone());
        }

        let token = self.inner.access_token(credential).await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Hex SHA-256 over the signer identity and key material.
pub fn fingerprint(credential: &ServiceAccountCredential) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.client_email.as_bytes());
    hasher.update([0u8]);
    hasher.update(credential.private_key.as_bytes());
    hex::encode(hasher.finalize())
}
