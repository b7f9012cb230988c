//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::config::ImageConfig;
use crate::credentials::CredentialManager;
use crate::error::{Error, Result};
use crate::images::{DeliveryNotifier, EphemeralStore};
use crate::llm::Backend;
use crate::logging::LoggingConfig;
use crate::metrics::{ComponentHealth, HealthChecker, MetricsCollector};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Request body size limit in bytes
    pub body_limit: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            body_limit: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    pub credentials: Arc<CredentialManager>,
    pub images: EphemeralStore,
    pub notifier: DeliveryNotifier,
    pub metrics: Arc<MetricsCollector>,
    pub health_checker: Arc<HealthChecker>,
    /// Logging configuration for dynamic log level changes
    pub logging_config: Option<Arc<LoggingConfig>>,
    pub image_config: ImageConfig,
    /// Chat backend behind the managed bearer token.
    pub chat: Backend,
    /// Vision backend for image prompts, if configured.
    pub vision: Option<Backend>,
}

impl AppState {
    /// `callback_client` carries delivery callbacks; backend calls go
    /// through each backend's own client.
    pub fn new(
        credentials: Arc<CredentialManager>,
        images: EphemeralStore,
        metrics: Arc<MetricsCollector>,
        callback_client: reqwest::Client,
        chat: Backend,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            notifier: DeliveryNotifier::new(callback_client, metrics.clone()),
            credentials,
            images,
            metrics,
            health_checker: Arc::new(HealthChecker::new()),
            logging_config: None,
            image_config: ImageConfig {
                ttl: Duration::ZERO,
                public_base_url: String::new(),
            },
            chat,
            vision: None,
        }
    }

    pub fn with_vision(mut self, backend: Backend) -> Self {
        self.vision = Some(backend);
        self
    }

    pub fn with_image_config(mut self, image_config: ImageConfig) -> Self {
        self.image_config = image_config;
        self
    }

    pub fn with_logging_config(mut self, config: Arc<LoggingConfig>) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// Register the credential and image store checks with the health checker.
    pub async fn register_health_checks(&self) {
        let credentials = self.credentials.clone();
        self.health_checker
            .register(
                "credentials",
                Arc::new(move || {
                    let status = credentials.status();
                    if !status.valid {
                        ComponentHealth::unhealthy("credentials", "Bearer token has expired")
                    } else if status.consecutive_failures > 0 {
                        ComponentHealth::degraded(
                            "credentials",
                            format!(
                                "{} consecutive refresh failures, token expires in {}s",
                                status.consecutive_failures, status.expires_in_secs
                            ),
                        )
                    } else {
                        ComponentHealth::healthy("credentials")
                            .with_message(format!("Token expires in {}s", status.expires_in_secs))
                    }
                }),
            )
            .await;

        let images = self.images.clone();
        self.health_checker
            .register(
                "image_store",
                Arc::new(move || {
                    ComponentHealth::healthy("image_store").with_message(format!(
                        "{} images, {} bytes",
                        images.len(),
                        images.stored_bytes()
                    ))
                }),
            )
            .await;
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| {
                        if is_health_path(req.uri().path()) {
                            return Span::none();
                        }
                        let request_id = req
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            uri = %req.uri(),
                            request_id = %request_id,
                        )
                    })
                    .on_request(|_req: &Request, span: &Span| {
                        if !span.is_disabled() {
                            tracing::debug!("started processing request");
                        }
                    })
                    .on_response(
                        |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            tracing::info!(
                                status = res.status().as_u16(),
                                latency_ms = latency.as_millis() as u64,
                                "finished processing request"
                            );
                        },
                    )
                    .on_failure(
                        |class: tower_http::classify::ServerErrorsFailureClass,
                         latency: Duration,
                         span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            tracing::error!(
                                %class,
                                latency_ms = latency.as_millis() as u64,
                                "request failed"
                            );
                        },
                    ),
            )
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Bind and serve until the cancel token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::ApiError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("API server listening on http://{}", addr);

        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let router = self.build_router();
        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

fn is_health_path(path: &str) -> bool {
    path.starts_with("/health") || path == "/metrics"
}
