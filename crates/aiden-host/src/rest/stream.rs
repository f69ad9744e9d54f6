use aiden_proto::HostRequest;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiErrorResponse};
use crate::state::AppState;

/// `POST /api/stream/{endpoint}` → `{streamId}`.
pub async fn start(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let reply = state
        .host
        .handle(HostRequest::StreamStart { endpoint, payload })
        .await?;
    Ok(Json(reply))
}

/// `GET /api/stream/{id}/events`: `data: {"type":"data",...}` records,
/// closed after the `done` or `error` record.
pub async fn events(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiErrorResponse> {
    let rx = state.host.journal().subscribe(&stream_id).ok_or_else(|| {
        ApiErrorResponse::from((StatusCode::NOT_FOUND, ApiError::not_found("Stream")))
    })?;

    let stream = futures::stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        let signal = rx.recv().await?;
        let next = (!signal.is_terminal()).then_some(rx);
        Some((Event::default().json_data(&signal), next))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `POST /api/stream/{id}/cancel` → `{cancelled}`.
pub async fn cancel(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<Json<Value>, ApiErrorResponse> {
    let cancelled = state
        .host
        .handle(HostRequest::StreamCancel { stream_id })
        .await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}
