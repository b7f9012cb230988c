//! Runtime log filter routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{LogFilterResponse, UpdateLogFilterRequest};
use crate::api::server::AppState;
use crate::logging::LoggingConfig;

pub fn router() -> Router<AppState> {
    Router::new().route("/filter", get(get_filter).put(update_filter))
}

fn logging_config(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))
}

async fn get_filter(State(state): State<AppState>) -> ApiResult<Json<LogFilterResponse>> {
    let filter = logging_config(&state)?.get_filter();
    Ok(Json(LogFilterResponse { filter }))
}

async fn update_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LogFilterResponse>> {
    let config = logging_config(&state)?;
    config
        .set_filter(&request.filter)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(Json(LogFilterResponse {
        filter: config.get_filter(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::api::test_support;
    use crate::logging::detached_config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    fn put_filter(filter: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/api/logging/filter")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "filter": filter }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_and_update_filter() {
        let (config, _subscriber) = detached_config("info");
        let state = test_support::state().await.with_logging_config(config.clone());
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(put_filter("pod_gateway=trace"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/logging/filter")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: LogFilterResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.filter.to_lowercase(), "pod_gateway=trace");
    }

    #[tokio::test]
    async fn test_invalid_filter_is_bad_request() {
        let (config, _subscriber) = detached_config("info");
        let state = test_support::state().await.with_logging_config(config);

        let response = create_router(state)
            .oneshot(put_filter("pod_gateway=loud"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_without_logging_config() {
        let state = test_support::state().await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/logging/filter")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
