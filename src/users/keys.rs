use axum::{
    Json, debug_handler,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{AppPath, AppResult, AppState, auth::Managed, identity};

#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedKey {
    pub key: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn issue(
    AppPath(user_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
) -> AppResult<(StatusCode, Json<IssuedKey>)> {
    let key = identity::issue_api_key(&db_pool, user_id).await?;
    Ok((StatusCode::CREATED, Json(IssuedKey { key })))
}
