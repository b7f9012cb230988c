//! Model routes.
//!
//! `/completions` forwards a caller-built request untouched. `/text` and
//! `/image` shape the request on the caller's behalf; the image is parked in
//! the ephemeral store so the vision backend can fetch it by URL. Backend
//! answers are returned as-is.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::{debug, warn};

use super::images::ImageForm;
use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ImagePromptResponse, TextPromptRequest};
use crate::api::server::AppState;
use crate::images::ImageKind;
use crate::llm::{Backend, prompt};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/completions", post(chat_completions))
        .route("/text", post(text_prompt))
        .route("/image", post(image_prompt))
}

async fn chat_completions(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    // The cached token is used as-is; refreshing is the manager's job.
    let sent = state.chat.send_raw(&state.credentials, body).await;
    relay(&state, &state.chat, sent).await
}

async fn text_prompt(
    State(state): State<AppState>,
    Json(request): Json<TextPromptRequest>,
) -> ApiResult<Response> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("Field 'text' must not be empty"));
    }

    let body = prompt::text_request(&state.chat, text);
    let sent = state.chat.send_json(&state.credentials, &body).await;
    relay(&state, &state.chat, sent).await
}

async fn image_prompt(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ImagePromptResponse>> {
    let vision = state
        .vision
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("Image prompts are not configured"))?;

    let mut form = ImageForm::read(multipart).await?;
    let text = form
        .text
        .take()
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing multipart field 'text'"))?;
    let (payload, kind) = form.take_image()?;

    let id = state.images.save(&payload, state.image_config.ttl)?;
    let url = state.image_config.url_for(id);
    let reference = prompt::image_reference(&url, &payload, kind.unwrap_or(ImageKind::Jpeg));
    debug!(%id, backend = vision.name(), "Sending image prompt");

    let request = prompt::image_request(&vision, &text, &reference);
    let sent = vision.send_json(&state.credentials, &request).await;
    let upstream = accept(&state, &vision, sent)?;

    let status = upstream.status();
    let body = read_body(&vision, upstream).await?;
    if !status.is_success() {
        return Err(
            ApiError::bad_gateway("Vision backend rejected the request").with_details(json!({
                "status": status.as_u16(),
                "body": String::from_utf8_lossy(&body),
            })),
        );
    }

    let completion = serde_json::from_slice(&body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body).into_owned()));

    Ok(Json(ImagePromptResponse {
        id,
        url,
        expires_in_secs: state.image_config.expires_in_secs(),
        completion,
    }))
}

/// Count the outcome and turn transport failures into 502.
fn accept(
    state: &AppState,
    backend: &Backend,
    sent: reqwest::Result<reqwest::Response>,
) -> ApiResult<reqwest::Response> {
    match sent {
        Ok(response) => {
            let status = response.status();
            state.metrics.record_chat_request(Some(status.as_u16()));
            if !status.is_success() {
                warn!(backend = backend.name(), status = %status, "Model backend returned an error");
            }
            Ok(response)
        }
        Err(e) => {
            state.metrics.record_chat_request(None);
            warn!(
                backend = backend.name(),
                error = %e,
                url = backend.completions_url(),
                "Model backend unreachable"
            );
            Err(ApiError::bad_gateway(format!(
                "Backend '{}' unreachable",
                backend.name()
            )))
        }
    }
}

async fn read_body(backend: &Backend, upstream: reqwest::Response) -> ApiResult<Bytes> {
    upstream.bytes().await.map_err(|e| {
        warn!(backend = backend.name(), error = %e, "Failed to read backend response");
        ApiError::bad_gateway("Backend response was interrupted")
    })
}

/// Return the backend's status, content type and body unchanged.
async fn relay(
    state: &AppState,
    backend: &Backend,
    sent: reqwest::Result<reqwest::Response>,
) -> ApiResult<Response> {
    let upstream = accept(state, backend, sent)?;
    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let payload = read_body(backend, upstream).await?;

    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, [(header::CONTENT_TYPE, content_type)], Body::from(payload)).into_response())
}
