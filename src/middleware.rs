//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::{Result, ServerError};

const BEARER: &str = "Bearer ";

/// Reject requests not carrying the configured API key.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let Some(expected) = state.config.api_key.as_deref() else {
        tracing::warn!("no `api_key` configured, administrative API locked");
        return Err(ServerError::Unauthorized);
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER));

    match provided {
        Some(key) if key == expected => Ok(next.run(req).await),
        _ => Err(ServerError::Unauthorized),
    }
}
