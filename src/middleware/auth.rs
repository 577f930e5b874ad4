//! Authentication middleware

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::header::AUTHORIZATION,
};

use crate::{AppState, AppError};

/// Header carrying the admin token
pub const TOKEN_HEADER: &str = "Token";

/// Middleware: Require the admin token when one is configured
pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let token = extract_token(&req)?;
    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        tracing::warn!("Rejected management request to {} with a bad token", req.uri().path());
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(req).await)
}

/// Extract the token from the `Token` header, falling back to `Authorization: Bearer`
fn extract_token(req: &Request) -> Result<String, AppError> {
    if let Some(value) = req.headers().get(TOKEN_HEADER) {
        let token = value.to_str().map_err(|_| AppError::Unauthorized)?;
        return Ok(token.trim().to_string());
    }

    let auth_header = req.headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .ok_or(AppError::Unauthorized)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
