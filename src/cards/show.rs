use axum::{
    Json, debug_handler,
    extract::State,
};
use sqlx::SqlitePool;

use crate::{
    AppError, AppPath, AppResult, AppState, Markdown, RegistryError,
    auth::Authentication,
    db::Card,
    registry,
};

use super::{Access, CardDetail, CardView, access, detail, view};

async fn readable(db_pool: &SqlitePool, viewer: &crate::db::User, card_id: i64) -> AppResult<Card> {
    let card = registry::get(db_pool, card_id).await?;
    match access(db_pool, viewer, &card).await? {
        Access::Full => Ok(card),
        Access::Closed => Err(AppError::Hidden(card.name)),
        Access::None => Err(RegistryError::not_found(format!("card {card_id}")).into()),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn show(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Authentication(viewer): Authentication,
) -> AppResult<Json<CardDetail>> {
    let card = readable(&db_pool, &viewer, card_id).await?;
    Ok(Json(detail(&db_pool, &viewer, card).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn content(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Authentication(viewer): Authentication,
) -> AppResult<Markdown<String>> {
    let card = readable(&db_pool, &viewer, card_id).await?;
    Ok(Markdown(card.content))
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Authentication(viewer): Authentication,
) -> AppResult<Json<Vec<CardView>>> {
    let head = readable(&db_pool, &viewer, card_id).await?;

    let mut versions = Vec::new();
    for card in registry::history(&db_pool, head.id).await? {
        let access = access(&db_pool, &viewer, &card).await?;
        versions.extend(view(card, access));
    }
    Ok(Json(versions))
}
