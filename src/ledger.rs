//! Who owns which card.
//!
//! There is one `ownership` row per (card, user) pair at most. Claims and
//! releases flip its `owned` flag instead of adding or removing rows.

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    db::{Card, Ownership, User},
    error::{RegistryError, RegistryResult, constraint_error},
};

/// Marks `user_id` as an owner of `card_id`. Claiming twice changes nothing.
pub async fn claim(db_pool: &SqlitePool, card_id: i64, user_id: i64) -> RegistryResult<Ownership> {
    let ownership: Ownership = sqlx::query_as(
        r#"
        INSERT INTO ownership (card_id, owner_id, owned)
        VALUES (?, ?, TRUE)
        ON CONFLICT (card_id, owner_id) DO UPDATE SET owned = TRUE
        RETURNING *
        "#,
    )
    .bind(card_id)
    .bind(user_id)
    .fetch_one(db_pool)
    .await
    .map_err(|e| {
        constraint_error(
            e,
            || RegistryError::not_found(format!("card {card_id}")),
            || RegistryError::not_found(format!("card {card_id} or user {user_id}")),
        )
    })?;

    info!(card_id, user_id, "claimed card");
    Ok(ownership)
}

/// Clears the claim. There has to have been a claim at some point.
pub async fn release(db_pool: &SqlitePool, card_id: i64, user_id: i64) -> RegistryResult<Ownership> {
    let ownership: Ownership = sqlx::query_as(
        "UPDATE ownership SET owned = FALSE WHERE card_id = ? AND owner_id = ? RETURNING *",
    )
    .bind(card_id)
    .bind(user_id)
    .fetch_optional(db_pool)
    .await?
    .ok_or_else(|| RegistryError::not_found(format!("ownership of card {card_id} by user {user_id}")))?;

    info!(card_id, user_id, "released card");
    Ok(ownership)
}

pub async fn list_owners(db_pool: &SqlitePool, card_id: i64) -> RegistryResult<Vec<User>> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM card WHERE id = ?")
        .bind(card_id)
        .fetch_optional(db_pool)
        .await?;
    if exists.is_none() {
        return Err(RegistryError::not_found(format!("card {card_id}")));
    }

    let owners = sqlx::query_as(
        r#"
        SELECT u.*
        FROM user u, ownership o
        WHERE u.id = o.owner_id AND o.card_id = ? AND o.owned
        ORDER BY u.id
        "#,
    )
    .bind(card_id)
    .fetch_all(db_pool)
    .await?;
    Ok(owners)
}

pub async fn is_owner(db_pool: &SqlitePool, card_id: i64, user_id: i64) -> RegistryResult<bool> {
    let owned: Option<bool> =
        sqlx::query_scalar("SELECT owned FROM ownership WHERE card_id = ? AND owner_id = ?")
            .bind(card_id)
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?;
    Ok(owned.unwrap_or(false))
}

/// Cards `user_id` currently owns, optionally limited to one guild.
pub async fn inventory(db_pool: &SqlitePool, user_id: i64, guild_id: Option<i64>) -> RegistryResult<Vec<Card>> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM user WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;
    if exists.is_none() {
        return Err(RegistryError::not_found(format!("user {user_id}")));
    }

    let cards = sqlx::query_as(
        r#"
        SELECT c.*
        FROM card c, ownership o
        WHERE o.card_id = c.id
            AND o.owner_id = ?1
            AND o.owned
            AND (?2 IS NULL OR c.guild_id = ?2)
        ORDER BY c.id
        "#,
    )
    .bind(user_id)
    .bind(guild_id)
    .fetch_all(db_pool)
    .await?;
    Ok(cards)
}
