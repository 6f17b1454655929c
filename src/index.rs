use axum::{Json, debug_handler};

use crate::{AppState, auth::Authentication, db::User};

#[debug_handler(state = AppState)]
pub async fn me(Authentication(user): Authentication) -> Json<User> {
    Json(user)
}
