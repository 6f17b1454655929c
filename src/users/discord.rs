use axum::{
    Json, debug_handler,
    extract::State,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    AppJson, AppPath, AppResult, AppState,
    auth::Managed,
    db::{DiscordAuth, User},
    identity::{self, AuthMethod},
};

#[derive(Debug, Deserialize)]
pub(crate) struct DiscordIdentity {
    discord_id: i64,
    display_name: String,
}

/// Bots resolve the people they talk to through here.
#[debug_handler(state = AppState)]
pub(crate) async fn resolve(
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
    AppJson(DiscordIdentity { discord_id, display_name }): AppJson<DiscordIdentity>,
) -> AppResult<Json<User>> {
    let user = identity::resolve(&db_pool, AuthMethod::Discord(discord_id), display_name.trim()).await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub(crate) struct BindDiscord {
    discord_id: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn bind(
    AppPath(user_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    Managed(_): Managed,
    AppJson(BindDiscord { discord_id }): AppJson<BindDiscord>,
) -> AppResult<Json<DiscordAuth>> {
    Ok(Json(identity::bind_discord(&db_pool, user_id, discord_id).await?))
}
