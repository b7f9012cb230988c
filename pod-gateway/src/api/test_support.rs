//! Shared fixtures for router tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::{TimeDelta, Utc};
use tokio::net::TcpListener;
use uuid::Uuid;

use super::server::AppState;
use crate::clock::TokioClock;
use crate::credentials::{
    Credential, CredentialError, CredentialManager, RefreshSettings, TokenSource,
};
use crate::images::EphemeralStore;
use crate::llm::{Backend, BackendAuth};
use crate::metrics::MetricsCollector;
use crate::utils::http_client;

pub(crate) const TEST_TOKEN: &str = "test-token";
pub(crate) const TEST_MODEL: &str = "GigaChat-2";
pub(crate) const VISION_KEY: &str = "vision-key";

/// Issues the same long-lived token on every call.
pub(crate) struct StaticSource;

#[async_trait]
impl TokenSource for StaticSource {
    async fn acquire(&self, _rq_uid: Uuid) -> Result<Credential, CredentialError> {
        Ok(Credential::new(
            TEST_TOKEN,
            Utc::now() + TimeDelta::seconds(3600),
        ))
    }
}

/// State backed by a static token and an API base that points nowhere.
pub(crate) async fn state() -> AppState {
    state_with_api_url("http://127.0.0.1:9/api/v1").await
}

pub(crate) async fn state_with_api_url(api_url: &str) -> AppState {
    let metrics = Arc::new(MetricsCollector::new());
    let clock = Arc::new(TokioClock::new());
    let credentials = CredentialManager::initialize(
        Arc::new(StaticSource),
        clock.clone(),
        RefreshSettings::default(),
        metrics.clone(),
    )
    .await
    .unwrap();
    let images = EphemeralStore::new(clock, metrics.clone());
    let client = http_client::build_client(Duration::from_secs(5), None).unwrap();
    let chat = Backend::new(
        "gigachat",
        client.clone(),
        api_url,
        TEST_MODEL,
        BackendAuth::Managed,
    )
    .with_max_tokens(Some(1024));

    let state = AppState::new(credentials, images, metrics, client, chat);
    state.register_health_checks().await;
    state
}

/// Vision backend at `api_url`, authorized with [`VISION_KEY`].
pub(crate) fn vision_backend(api_url: &str) -> Backend {
    let client = http_client::build_client(Duration::from_secs(5), None).unwrap();
    Backend::new(
        "vision",
        client,
        api_url,
        "gpt-4o-mini",
        BackendAuth::ApiKey(VISION_KEY.to_string()),
    )
}

/// Serve `app` on an ephemeral local port.
pub(crate) async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
