//! Synthetic responses served when neither network nor cache can answer.

use crate::http::Response;

const OFFLINE_PLACEHOLDER_SVG: &str = concat!(
  r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">"#,
  r##"<rect width="200" height="200" fill="#e5e7eb"/>"##,
  r##"<text x="100" y="105" font-family="sans-serif" font-size="16" text-anchor="middle" fill="#6b7280">Offline</text>"##,
  "</svg>"
);

/// Structured error for live API calls made while offline.
pub fn offline_api_error() -> Response {
  Response::new(503, "application/json", r#"{"error":"Offline"}"#)
}

/// Stand-in for an image that could not be fetched or found in cache.
pub fn offline_image() -> Response {
  let mut response = Response::new(200, "image/svg+xml", OFFLINE_PLACEHOLDER_SVG);
  response
    .headers
    .insert("cache-control".to_string(), "no-store".to_string());
  response
}

/// Answer for audio that is neither cached nor reachable.
pub fn audio_unavailable() -> Response {
  Response::new(404, "text/plain", "Audio not available offline")
}
