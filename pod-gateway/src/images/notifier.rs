//! Fire-and-forget "delivered" callbacks.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::id::ImageId;
use crate::metrics::MetricsCollector;

/// Upper bound for a single callback request.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts `{"id": ..., "status": "delivered"}` to caller-supplied URLs.
///
/// Failures are logged and counted, never reported back to the request that
/// triggered them.
#[derive(Clone)]
pub struct DeliveryNotifier {
    client: Client,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl DeliveryNotifier {
    pub fn new(client: Client, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            client,
            metrics,
            timeout: CALLBACK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parse a callback URL, accepting only http and https.
    pub fn parse_callback(raw: &str) -> Option<Url> {
        let url = Url::parse(raw).ok()?;
        matches!(url.scheme(), "http" | "https").then_some(url)
    }

    /// Spawn the callback request.
    pub fn notify(&self, url: Url, id: ImageId) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.send(url, id).await;
        })
    }

    async fn send(&self, url: Url, id: ImageId) {
        let body = json!({ "id": id, "status": "delivered" });
        let result = self
            .client
            .post(url.clone())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(%id, %url, "Delivery callback sent");
                self.metrics.record_callback(true);
            }
            Ok(response) => {
                warn!(%id, %url, status = %response.status(), "Delivery callback rejected");
                self.metrics.record_callback(false);
            }
            Err(e) => {
                warn!(%id, %url, error = %e, "Delivery callback failed");
                self.metrics.record_callback(false);
            }
        }
    }
}
