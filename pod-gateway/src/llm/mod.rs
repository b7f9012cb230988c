//! Model backends and the request shapes sent to them.
//!
//! - [`Backend`]: one OpenAI-compatible `/chat/completions` endpoint with its
//!   own HTTP client and authorization
//! - [`ChatRequest`]: the JSON body, built from plain text or text plus image
//! - [`prompt`]: the fixed instructions and prompt builders used by the routes

mod backend;
pub mod prompt;
mod request;

pub use backend::{Backend, BackendAuth};
pub use request::{ChatRequest, ContentPart, ImageUrl, Message, MessageContent, Role};
