use aiden_config::ConfigPaths;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::{ApiError, ApiErrorResponse};
use crate::state::AppState;

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// Token written by an earlier run, or a fresh one saved for the next.
pub fn load_or_create_token(paths: &ConfigPaths) -> String {
    let path = paths.token_path();
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let token = existing.trim().to_string();
        if !token.is_empty() {
            return token;
        }
    }
    let token = generate_token();
    if let Err(e) = std::fs::write(&path, &token) {
        tracing::warn!(path = %path.display(), error = %e, "failed to save auth token");
    }
    token
}

/// Replace the saved token.
pub fn regenerate_token(paths: &ConfigPaths) -> anyhow::Result<String> {
    let token = generate_token();
    std::fs::write(paths.token_path(), &token)?;
    Ok(token)
}

pub fn extract_bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Without a configured token every request passes.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiErrorResponse> {
    let Some(expected) = state.token_hash.as_deref() else {
        return Ok(next.run(req).await);
    };

    let token = extract_bearer_from_headers(req.headers()).ok_or_else(|| ApiErrorResponse {
        status: StatusCode::UNAUTHORIZED,
        error: ApiError::unauthorized(),
    })?;

    if hash_token(&token) != expected {
        return Err(ApiErrorResponse {
            status: StatusCode::UNAUTHORIZED,
            error: ApiError::invalid_token(),
        });
    }

    Ok(next.run(req).await)
}
