use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use pod_gateway::api::{ApiServer, AppState};
use pod_gateway::clock::{Clock, TokioClock};
use pod_gateway::config::GatewayConfig;
use pod_gateway::credentials::{CredentialManager, OAuthTokenSource};
use pod_gateway::images::EphemeralStore;
use pod_gateway::llm::{Backend, BackendAuth};
use pod_gateway::logging::init_logging;
use pod_gateway::metrics::MetricsCollector;
use pod_gateway::utils::http_client;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_env()?;
    let (logging_config, _log_guard) = init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        api_url = %config.gigachat.api_url,
        image_ttl_secs = config.images.ttl.as_secs(),
        "Starting pod-gateway"
    );

    let metrics = Arc::new(MetricsCollector::new());
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let root_ca = config.gigachat.oauth.root_ca_path.as_deref();
    // Token exchanges and chat calls get separate clients so each keeps its
    // own timeout.
    let auth_client = http_client::build_client(config.gigachat.oauth.timeout, root_ca)?;
    let chat_client = http_client::build_client(config.gigachat.api_timeout, root_ca)?;

    let source = OAuthTokenSource::with_client(auth_client.clone(), config.gigachat.oauth.clone())?;
    let credentials = CredentialManager::initialize(
        Arc::new(source),
        clock.clone(),
        config.gigachat.refresh,
        metrics.clone(),
    )
    .await
    .context("could not obtain the initial backend credential")?;

    let chat = Backend::new(
        "gigachat",
        chat_client,
        &config.gigachat.api_url,
        config.gigachat.model.clone(),
        BackendAuth::Managed,
    )
    .with_max_tokens(Some(config.gigachat.max_tokens));

    let images = EphemeralStore::new(clock, metrics.clone());
    let mut state = AppState::new(credentials.clone(), images, metrics, auth_client, chat)
        .with_image_config(config.images.clone())
        .with_logging_config(logging_config);

    match &config.vision {
        Some(vision) => {
            let client = http_client::build_client(vision.timeout, None)?;
            let backend = Backend::new(
                "vision",
                client,
                &vision.api_url,
                vision.model.clone(),
                BackendAuth::ApiKey(vision.api_key.clone()),
            )
            .with_max_tokens(vision.max_tokens);
            info!(api_url = %vision.api_url, model = %vision.model, "Image prompts enabled");
            state = state.with_vision(backend);
        }
        None => info!("OPENAI_API_KEY not set, image prompts disabled"),
    }
    state.register_health_checks().await;

    let server = Arc::new(ApiServer::new(config.server.clone(), state));
    let mut server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    let outcome = tokio::select! {
        joined = &mut server_task => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, shutting down");
            None
        }
    };

    let joined = match outcome {
        Some(joined) => joined,
        None => {
            server.shutdown();
            server_task.await
        }
    };

    credentials.close().await;
    info!("pod-gateway stopped");

    joined.context("API server task panicked")??;
    Ok(())
}
