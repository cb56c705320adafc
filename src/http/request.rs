//! Request identification.
//!
//! # Responsibilities
//! - Reuse the upstream request ID when one is present
//! - Otherwise generate a UUID v4 and write it back onto the request
//!
//! # Design Decisions
//! - Request ID resolved as early as possible so every hop and log line sees it
//! - An inbound header is never rewritten; non-UTF-8 bytes are decoded
//!   lossily for the returned string only
//! - Empty header values are treated as absent

use axum::http::{HeaderName, HeaderValue, Request};
use uuid::Uuid;

/// Header carrying the request identifier across service boundaries.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Read the request ID, generating and storing one if missing.
pub fn request_id<B>(req: &mut Request<B>) -> String {
    if let Some(value) = req
        .headers()
        .get(&X_REQUEST_ID)
        .filter(|value| !value.is_empty())
    {
        return String::from_utf8_lossy(value.as_bytes()).into_owned();
    }

    let id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        req.headers_mut().insert(X_REQUEST_ID, value);
    }
    id
}
