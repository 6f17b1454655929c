use axum::{
    Json, debug_handler,
    extract::State,
};
use sqlx::SqlitePool;

use crate::{
    AppPath, AppResult, AppState,
    auth::Managed,
    db::{Ownership, User},
    ledger,
};

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(ledger::list_owners(&db_pool, card_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn claim(
    AppPath((card_id, user_id)): AppPath<(i64, i64)>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
) -> AppResult<Json<Ownership>> {
    Ok(Json(ledger::claim(&db_pool, card_id, user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn release(
    AppPath((card_id, user_id)): AppPath<(i64, i64)>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
) -> AppResult<Json<Ownership>> {
    Ok(Json(ledger::release(&db_pool, card_id, user_id).await?))
}
