//! OAuth token source for GigaChat-style `/oauth` endpoints.
//!
//! The endpoint takes a form-encoded `scope`, Basic authentication with the
//! base64 `client:secret` key and a per-request `RqUID` header, and answers
//! with `{"access_token": "...", "expires_at": <unix millis>}`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::CredentialError;
use super::source::TokenSource;
use super::types::Credential;

/// Default OAuth scope for personal API access.
pub const DEFAULT_SCOPE: &str = "GIGACHAT_API_PERS";

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Static material for the token exchange.
#[derive(Clone)]
pub struct OAuthSettings {
    /// Full URL of the token endpoint.
    pub auth_url: String,
    /// Base64-encoded `client:secret`, without the `Basic ` prefix.
    pub basic_key: String,
    pub scope: String,
    pub timeout: Duration,
    /// Extra root certificate (PEM) trusted for the token and API hosts.
    pub root_ca_path: Option<PathBuf>,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("auth_url", &self.auth_url)
            .field("basic_key", &"<redacted>")
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .field("root_ca_path", &self.root_ca_path)
            .finish()
    }
}

impl OAuthSettings {
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.auth_url.trim().is_empty() {
            return Err(CredentialError::Configuration("empty token URL".to_string()));
        }
        if self.basic_key.trim().is_empty() {
            return Err(CredentialError::Configuration("empty basic key".to_string()));
        }
        if self.scope.trim().is_empty() {
            return Err(CredentialError::Configuration("empty scope".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_at: Option<i64>,
}

/// [`TokenSource`] backed by an HTTP token endpoint.
pub struct OAuthTokenSource {
    client: Client,
    settings: OAuthSettings,
}

impl OAuthTokenSource {
    /// Build a source that shares an existing HTTP client.
    pub fn with_client(client: Client, settings: OAuthSettings) -> Result<Self, CredentialError> {
        settings.validate()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    #[instrument(skip(self), fields(url = %self.settings.auth_url))]
    async fn acquire(&self, rq_uid: Uuid) -> Result<Credential, CredentialError> {
        let response = self
            .client
            .post(&self.settings.auth_url)
            .timeout(self.settings.timeout)
            .header(header::AUTHORIZATION, format!("Basic {}", self.settings.basic_key))
            .header(header::ACCEPT, "application/json")
            .header("RqUID", rq_uid.to_string())
            .form(&[("scope", self.settings.scope.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(CredentialError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::MalformedResponse(e.to_string()))?;

        let token = payload
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CredentialError::MalformedResponse("missing access_token".to_string())
            })?;
        let expires_at = payload
            .expires_at
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| {
                CredentialError::MalformedResponse("missing expires_at".to_string())
            })?;

        debug!(%expires_at, "Token endpoint issued credential");
        Ok(Credential::new(token, expires_at))
    }
}
