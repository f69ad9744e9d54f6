use aiden_proto::User;
use axum::Json;

/// Reaching this handler means the bearer check passed.
pub async fn me() -> Json<User> {
    Json(User::local_demo())
}
