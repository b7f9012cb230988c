//! End-to-end: real OAuth and chat upstreams, the gateway on a local port,
//! and a plain HTTP client on the outside.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{TimeDelta, Utc};
use tokio::net::TcpListener;

use pod_gateway::api::{ApiServer, ApiServerConfig, AppState};
use pod_gateway::clock::{Clock, TokioClock};
use pod_gateway::config::ImageConfig;
use pod_gateway::credentials::{
    CredentialManager, DEFAULT_SCOPE, OAuthSettings, OAuthTokenSource, RefreshSettings,
};
use pod_gateway::images::EphemeralStore;
use pod_gateway::llm::{Backend, BackendAuth};
use pod_gateway::metrics::MetricsCollector;
use pod_gateway::utils::http_client;

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];
const BOUNDARY: &str = "gateway-test-boundary";

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Token endpoint that hands out `live-token` valid for half an hour.
async fn oauth_upstream(calls: Arc<AtomicUsize>) -> SocketAddr {
    let app = Router::new().route(
        "/api/v2/oauth",
        post(move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let expires_at = Utc::now() + TimeDelta::minutes(30);
                Json(serde_json::json!({
                    "access_token": "live-token",
                    "expires_at": expires_at.timestamp_millis(),
                }))
            }
        }),
    );
    serve(app).await
}

/// Chat backend that only answers requests carrying the managed token.
async fn chat_upstream() -> SocketAddr {
    let app = Router::new().route(
        "/api/v1/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
            if headers.get("authorization").and_then(|v| v.to_str().ok())
                != Some("Bearer live-token")
            {
                return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({}))).into_response();
            }
            Json(serde_json::json!({
                "model": body["model"],
                "choices": [{ "message": { "role": "assistant", "content": "pong" } }],
            }))
            .into_response()
        }),
    );
    serve(app).await
}

/// Vision backend that downloads the image it is pointed at, like a hosted
/// model would, and reports how many bytes it got.
async fn vision_upstream() -> SocketAddr {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test")
            {
                return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({}))).into_response();
            }
            let url = body["messages"][1]["content"][1]["image_url"]["url"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let fetched = http_client::build_client(Duration::from_secs(5), None)
                .unwrap()
                .get(&url)
                .send()
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap();
            Json(serde_json::json!({
                "model": body["model"],
                "fetched_bytes": fetched.len(),
                "choices": [{ "message": { "role": "assistant", "content": "[]" } }],
            }))
            .into_response()
        }),
    );
    serve(app).await
}

fn multipart(content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"image\"; filename=\"cat.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

struct Gateway {
    base: String,
    server: Arc<ApiServer>,
    task: tokio::task::JoinHandle<pod_gateway::Result<()>>,
    credentials: Arc<CredentialManager>,
    store: EphemeralStore,
}

async fn start_gateway(oauth: SocketAddr, chat: SocketAddr, vision: Option<SocketAddr>) -> Gateway {
    let metrics = Arc::new(MetricsCollector::new());
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let client = http_client::build_client(Duration::from_secs(5), None).unwrap();

    let source = OAuthTokenSource::with_client(
        client.clone(),
        OAuthSettings {
            auth_url: format!("http://{oauth}/api/v2/oauth"),
            basic_key: "Y2xpZW50OnNlY3JldA==".to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: Duration::from_secs(5),
            root_ca_path: None,
        },
    )
    .unwrap();
    let credentials = CredentialManager::initialize(
        Arc::new(source),
        clock.clone(),
        RefreshSettings::default(),
        metrics.clone(),
    )
    .await
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let chat = Backend::new(
        "gigachat",
        client.clone(),
        &format!("http://{chat}/api/v1"),
        "GigaChat-2",
        BackendAuth::Managed,
    )
    .with_max_tokens(Some(1024));
    let store = EphemeralStore::new(clock, metrics.clone());
    let mut state = AppState::new(credentials.clone(), store.clone(), metrics, client.clone(), chat)
        .with_image_config(ImageConfig {
            ttl: Duration::from_secs(60),
            // Only set when the vision backend must reach the gateway.
            public_base_url: match vision {
                Some(_) => format!("http://{addr}"),
                None => String::new(),
            },
        });
    if let Some(vision) = vision {
        state = state.with_vision(Backend::new(
            "vision",
            client,
            &format!("http://{vision}/v1"),
            "gpt-4o-mini",
            BackendAuth::ApiKey("sk-test".to_string()),
        ));
    }
    state.register_health_checks().await;

    let server = Arc::new(ApiServer::new(ApiServerConfig::default(), state));
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    Gateway {
        base: format!("http://{addr}"),
        server,
        task,
        credentials,
        store,
    }
}

#[tokio::test]
async fn test_upload_serve_and_chat_through_gateway() {
    let oauth_calls = Arc::new(AtomicUsize::new(0));
    let oauth = oauth_upstream(oauth_calls.clone()).await;
    let chat = chat_upstream().await;
    let gateway = start_gateway(oauth, chat, None).await;
    assert_eq!(oauth_calls.load(Ordering::SeqCst), 1);

    let client = http_client::build_client(Duration::from_secs(5), None).unwrap();

    // Upload.
    let response = client
        .post(format!("{}/api/v1/images", gateway.base))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(multipart(PNG))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: serde_json::Value = response.json().await.unwrap();
    let url = created["url"].as_str().unwrap().to_string();
    assert_eq!(created["expires_in_secs"], 60);
    assert_eq!(gateway.store.len(), 1);

    // First fetch streams the bytes and reclaims the entry.
    let response = client
        .get(format!("{}{}", gateway.base, url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(&response.bytes().await.unwrap()[..], PNG);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !gateway.store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let response = client
        .get(format!("{}{}", gateway.base, url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Chat goes out with the cached token and no extra token exchange.
    let response = client
        .post(format!("{}/api/v1/chat/completions", gateway.base))
        .json(&serde_json::json!({ "model": "GigaChat", "messages": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply: serde_json::Value = response.json().await.unwrap();
    assert_eq!(reply["choices"][0]["message"]["content"], "pong");
    assert_eq!(oauth_calls.load(Ordering::SeqCst), 1);

    // Health reports both components.
    let health: serde_json::Value = client
        .get(format!("{}/health", gateway.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    gateway.server.shutdown();
    gateway.task.await.unwrap().unwrap();
    gateway.credentials.close().await;
    assert!(gateway.credentials.is_shut_down());
}

#[tokio::test]
async fn test_image_prompt_is_fetched_by_backend_and_reclaimed() {
    let oauth = oauth_upstream(Arc::new(AtomicUsize::new(0))).await;
    let chat = chat_upstream().await;
    let vision = vision_upstream().await;
    let gateway = start_gateway(oauth, chat, Some(vision)).await;

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"text\"\r\n\r\n");
    body.extend_from_slice(b"pick shoes for this");
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(&multipart(PNG));

    let client = http_client::build_client(Duration::from_secs(5), None).unwrap();
    let response = client
        .post(format!("{}/api/v1/chat/image", gateway.base))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let answer: serde_json::Value = response.json().await.unwrap();

    assert_eq!(answer["completion"]["fetched_bytes"], PNG.len());
    assert!(
        answer["url"]
            .as_str()
            .unwrap()
            .starts_with(&format!("{}/api/v1/images/", gateway.base))
    );

    // The backend's download was the one delivery; the entry is gone.
    tokio::time::timeout(Duration::from_secs(5), async {
        while !gateway.store.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    gateway.server.shutdown();
    gateway.task.await.unwrap().unwrap();
    gateway.credentials.close().await;
}

#[tokio::test]
async fn test_startup_fails_when_token_endpoint_rejects() {
    let app = Router::new().route(
        "/api/v2/oauth",
        post(|| async { (StatusCode::UNAUTHORIZED, "invalid credentials") }),
    );
    let oauth = serve(app).await;
    let client = http_client::build_client(Duration::from_secs(5), None).unwrap();

    let source = OAuthTokenSource::with_client(
        client,
        OAuthSettings {
            auth_url: format!("http://{oauth}/api/v2/oauth"),
            basic_key: "bad".to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: Duration::from_secs(5),
            root_ca_path: None,
        },
    )
    .unwrap();

    let result = CredentialManager::initialize(
        Arc::new(source),
        Arc::new(TokioClock::new()),
        RefreshSettings::default(),
        Arc::new(MetricsCollector::new()),
    )
    .await;

    let err = result.err().unwrap();
    assert!(err.is_fatal());
}
