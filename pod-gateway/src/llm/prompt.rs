//! Prompt construction for the text and image endpoints.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::backend::Backend;
use super::request::{ChatRequest, Message};
use crate::images::ImageKind;

/// Instructions sent ahead of every image prompt.
pub const SYSTEM_PROMPT: &str = include_str!("system_prompt.txt");

/// Single user message with the backend's model and token limit.
pub fn text_request(backend: &Backend, text: &str) -> ChatRequest {
    ChatRequest::new(backend.model(), vec![Message::user(text)])
        .with_max_tokens(backend.max_tokens())
}

/// System instructions followed by the user's prompt and image.
pub fn image_request(backend: &Backend, text: &str, image_url: &str) -> ChatRequest {
    ChatRequest::new(
        backend.model(),
        vec![
            Message::system(SYSTEM_PROMPT.trim()),
            Message::user_with_image(text, image_url),
        ],
    )
    .with_max_tokens(backend.max_tokens())
}

/// How the backend should reach a stored image.
///
/// An absolute `http(s)` URL is passed through so the backend fetches the
/// image from the gateway. A relative URL is unreachable from outside, so
/// the bytes are inlined as a `data:` URI instead.
pub fn image_reference(public_url: &str, data: &[u8], kind: ImageKind) -> String {
    if public_url.starts_with("http://") || public_url.starts_with("https://") {
        public_url.to_string()
    } else {
        format!("data:{};base64,{}", kind.mime_type(), STANDARD.encode(data))
    }
}
