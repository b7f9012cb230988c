//! Prometheus scrape endpoint.

use axum::{
    Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};

use crate::api::server::AppState;
use crate::metrics::PrometheusExporter;

pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(export_metrics))
}

async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = PrometheusExporter::new(state.metrics.clone()).export();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use crate::api::routes::create_router;
    use crate::api::test_support;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_reflect_store_activity() {
        let state = test_support::state().await;
        let id = state.images.save(b"\xFF\xD8\xFFdata", Duration::ZERO).unwrap();
        state.images.delete(&id);

        let response = create_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("pod_gateway_images_saved_total 1"));
        assert!(text.contains("pod_gateway_images_deleted_total 1"));
        assert!(text.contains("pod_gateway_credential_refresh_total{outcome=\"success\"} 1"));
    }
}
