use aiden_proto::HostRequest;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::error::{ApiErrorResponse, HostError};
use crate::state::AppState;

/// `POST /api/invoke`: one [`HostRequest`], one JSON reply. Terminal
/// operations need the host's own PTY and are refused here.
pub async fn invoke(
    State(state): State<AppState>,
    Json(request): Json<HostRequest>,
) -> Result<Json<Value>, ApiErrorResponse> {
    if request.is_terminal_op() {
        return Err(HostError::Unsupported(request.op_name()).into());
    }
    tracing::debug!(op = request.op_name(), "remote invoke");
    let value = state.host.handle(request).await?;
    Ok(Json(value))
}
