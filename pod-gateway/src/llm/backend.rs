//! Chat completions endpoint of one model provider.

use std::fmt;

use reqwest::{Client, RequestBuilder, Response, header};
use serde::Serialize;

use crate::credentials::CredentialManager;

/// How requests to a backend are authorized.
#[derive(Clone)]
pub enum BackendAuth {
    /// Bearer token kept fresh by the [`CredentialManager`].
    Managed,
    /// Static API key sent as a bearer token.
    ApiKey(String),
}

impl fmt::Debug for BackendAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => f.write_str("Managed"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// An OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct Backend {
    name: &'static str,
    completions_url: String,
    model: String,
    max_tokens: Option<u32>,
    auth: BackendAuth,
    client: Client,
}

impl Backend {
    /// `api_url` is the API base; `/chat/completions` is appended.
    pub fn new(
        name: &'static str,
        client: Client,
        api_url: &str,
        model: impl Into<String>,
        auth: BackendAuth,
    ) -> Self {
        Self {
            name,
            completions_url: format!("{}/chat/completions", api_url.trim_end_matches('/')),
            model: model.into(),
            max_tokens: None,
            auth,
            client,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    /// `Authorization` header value. Managed tokens come from the cache and
    /// never trigger a refresh.
    pub fn authorization(&self, credentials: &CredentialManager) -> String {
        match &self.auth {
            BackendAuth::Managed => credentials.authorization_header(),
            BackendAuth::ApiKey(key) => format!("Bearer {key}"),
        }
    }

    /// Post a pre-encoded JSON body.
    pub async fn send_raw(
        &self,
        credentials: &CredentialManager,
        body: impl Into<reqwest::Body>,
    ) -> reqwest::Result<Response> {
        self.request(credentials)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        credentials: &CredentialManager,
        body: &T,
    ) -> reqwest::Result<Response> {
        self.request(credentials).json(body).send().await
    }

    fn request(&self, credentials: &CredentialManager) -> RequestBuilder {
        self.client
            .post(&self.completions_url)
            .header(header::AUTHORIZATION, self.authorization(credentials))
            .header(header::ACCEPT, "application/json")
    }
}
