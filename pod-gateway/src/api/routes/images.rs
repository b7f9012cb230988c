//! Image upload and hand-off routes.
//!
//! An uploaded image is served at most once through `GET`; the entry is
//! reclaimed as soon as the body has been streamed out, and an optional
//! callback URL is told about the delivery.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ImageQuery, ImageUploadResponse};
use crate::api::server::AppState;
use crate::images::{DeliveryNotifier, ImageId, ImageKind, sniff_image};

/// Multipart field carrying the image.
const IMAGE_FIELD: &str = "image";
/// Multipart field carrying the prompt.
const TEXT_FIELD: &str = "text";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_image))
        .route("/{id}", get(get_image).delete(delete_image))
}

/// Fields of an image upload form.
#[derive(Default)]
pub(super) struct ImageForm {
    pub image: Option<Bytes>,
    pub text: Option<String>,
}

impl ImageForm {
    /// Read the `image` and `text` fields, ignoring any others.
    pub(super) async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            match field.name() {
                Some(IMAGE_FIELD) => {
                    form.image = Some(
                        field
                            .bytes()
                            .await
                            .map_err(|e| ApiError::bad_request(e.body_text()))?,
                    );
                }
                Some(TEXT_FIELD) => {
                    form.text = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| ApiError::bad_request(e.body_text()))?,
                    );
                }
                _ => {}
            }
        }
        Ok(form)
    }

    /// The image bytes, rejecting a missing field or an unsupported format.
    ///
    /// An empty image passes through so the store reports it.
    pub(super) fn take_image(&mut self) -> ApiResult<(Bytes, Option<ImageKind>)> {
        let payload = self.image.take().ok_or_else(|| {
            ApiError::bad_request(format!("Missing multipart field '{}'", IMAGE_FIELD))
        })?;
        let kind = sniff_image(&payload);
        if !payload.is_empty() && kind.is_none() {
            return Err(ApiError::unsupported_media_type(
                "Only PNG and JPEG images are accepted",
            ));
        }
        Ok((payload, kind))
    }
}

async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ImageUploadResponse>)> {
    let (payload, _) = ImageForm::read(multipart).await?.take_image()?;
    let id = state.images.save(&payload, state.image_config.ttl)?;

    let response = ImageUploadResponse {
        id,
        url: state.image_config.url_for(id),
        expires_in_secs: state.image_config.expires_in_secs(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ImageQuery>,
) -> ApiResult<Response> {
    let id: ImageId = id
        .parse()
        .map_err(|_| ApiError::not_found("Image not found"))?;

    let callback = match query.callback.as_deref().filter(|c| !c.is_empty()) {
        Some(raw) => Some(
            DeliveryNotifier::parse_callback(raw)
                .ok_or_else(|| ApiError::bad_request("Callback must be an http(s) URL"))?,
        ),
        None => None,
    };

    let mut checkout = state
        .images
        .checkout(&id)
        .ok_or_else(|| ApiError::not_found("Image not found"))?;

    if let Some(url) = callback {
        let notifier = state.notifier.clone();
        checkout = checkout.on_complete(move |id| {
            notifier.notify(url, id);
        });
    }

    // Undetected content is served as JPEG.
    let content_type = checkout.kind().unwrap_or(ImageKind::Jpeg).mime_type();
    debug!(%id, content_type, "Serving image");

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-store"),
        ],
        Body::from_stream(checkout.into_stream()),
    )
        .into_response())
}

/// Always 204, whether or not the image existed.
async fn delete_image(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if let Ok(id) = id.parse::<ImageId>() {
        state.images.delete(&id);
    }
    StatusCode::NO_CONTENT
}
