use std::collections::HashSet;

use axum::{
    Json, debug_handler,
    extract::State,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    AppError, AppPath, AppQuery, AppResult, AppState,
    auth::Authentication,
    db::Visibility,
    ledger, page, registry,
};

use super::{Access, CardDetail, CardView, access, detail, view};

#[derive(Debug, Deserialize)]
pub(crate) struct ListCardsQuery {
    query: Option<String>,
    page: Option<u32>,
    count: Option<u32>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    AppPath(guild_id): AppPath<i64>,
    AppQuery(ListCardsQuery { query, page, count }): AppQuery<ListCardsQuery>,
    State(db_pool): State<SqlitePool>,
    Authentication(viewer): Authentication,
) -> AppResult<Json<Vec<CardView>>> {
    let cards = registry::list(&db_pool, guild_id, query.as_deref()).await?;

    let owned: HashSet<i64> = ledger::inventory(&db_pool, viewer.id, Some(guild_id))
        .await?
        .into_iter()
        .map(|card| card.id)
        .collect();

    let visible = cards
        .into_iter()
        .filter_map(|card| {
            let access = if viewer.managed || card.visibility == Visibility::Public || owned.contains(&card.id) {
                Access::Full
            } else if card.visibility == Visibility::Hidden {
                Access::Closed
            } else {
                Access::None
            };
            view(card, access)
        })
        .collect();

    Ok(Json(page::paginate(visible, page, count)?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn latest(
    AppPath((guild_id, name)): AppPath<(i64, String)>,
    State(db_pool): State<SqlitePool>,
    Authentication(viewer): Authentication,
) -> AppResult<Json<CardDetail>> {
    let card = registry::resolve_latest(&db_pool, guild_id, &name).await?;

    match access(&db_pool, &viewer, &card).await? {
        Access::Full => Ok(Json(detail(&db_pool, &viewer, card).await?)),
        Access::Closed => Err(AppError::Hidden(card.name)),
        Access::None => Err(crate::RegistryError::not_found(format!("card `{name}` in guild {guild_id}")).into()),
    }
}
