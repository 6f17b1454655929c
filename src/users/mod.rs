mod discord;
mod keys;

use axum::{
    Json, Router, debug_handler,
    extract::State,
    routing::{get, post, put},
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{AppError, AppPath, AppQuery, AppResult, AppState, auth::Authentication, db::Card, ledger, page};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discord", post(discord::resolve))
        .route("/{user_id}/discord", put(discord::bind))
        .route("/{user_id}/api-keys", post(keys::issue))
        .route("/{user_id}/cards", get(inventory))
}

#[derive(Debug, Deserialize)]
struct InventoryQuery {
    guild_id: Option<i64>,
    page: Option<u32>,
    count: Option<u32>,
}

#[debug_handler(state = AppState)]
async fn inventory(
    AppPath(user_id): AppPath<i64>,
    AppQuery(InventoryQuery { guild_id, page, count }): AppQuery<InventoryQuery>,
    State(db_pool): State<SqlitePool>,
    Authentication(viewer): Authentication,
) -> AppResult<Json<Vec<Card>>> {
    if viewer.id != user_id && !viewer.managed {
        return Err(AppError::Forbidden);
    }

    let cards = ledger::inventory(&db_pool, user_id, guild_id).await?;
    Ok(Json(page::paginate(cards, page, count)?))
}
