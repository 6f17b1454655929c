use axum::{
    Json, debug_handler,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    AppError, AppJson, AppPath, AppResult, AppState,
    auth::Managed,
    db::{Card, Visibility},
    registry::{self, NewCard, Revision},
};

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    AppPath(guild_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
    AppJson(mut card): AppJson<NewCard>,
) -> AppResult<(StatusCode, Json<Card>)> {
    card.name = card.name.trim().to_owned();
    if card.name.is_empty() {
        return Err(AppError::BadRequest("Field `name` must not be blank".to_owned()));
    }

    let card = registry::create_card(&db_pool, guild_id, card).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn revise(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
    AppJson(revision): AppJson<Revision>,
) -> AppResult<(StatusCode, Json<Card>)> {
    let card = registry::revise_card(&db_pool, card_id, revision).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetVisibility {
    visibility: Visibility,
}

#[debug_handler(state = AppState)]
pub(crate) async fn visibility(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
    AppJson(SetVisibility { visibility }): AppJson<SetVisibility>,
) -> AppResult<Json<Card>> {
    Ok(Json(registry::set_visibility(&db_pool, card_id, visibility).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkPrevious {
    previous_id: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn previous(
    AppPath(card_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
    AppJson(LinkPrevious { previous_id }): AppJson<LinkPrevious>,
) -> AppResult<Json<Card>> {
    Ok(Json(registry::link_previous(&db_pool, card_id, previous_id).await?))
}
