//! Maps credentials to users.
//!
//! A user can be reached through a Discord identity or any number of API
//! keys. Each method resolves on its own; they only meet at the `user` row.

pub mod api_key;

pub use api_key::{KeyHash, generate_key, hash_key};

use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    db::{self, DiscordAuth, User},
    error::{RegistryError, RegistryResult, constraint_error},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    Discord(i64),
    ApiKey(KeyHash),
}

impl AuthMethod {
    fn describe(&self) -> String {
        match self {
            AuthMethod::Discord(discord_id) => format!("discord id {discord_id}"),
            AuthMethod::ApiKey(hash) => format!("api key {hash:?}"),
        }
    }
}

/// Returns the user bound to `method`, creating the user and the binding
/// on first sight.
///
/// Discord resolutions also refresh a stale display name.
pub async fn resolve(
    db_pool: &SqlitePool,
    method: AuthMethod,
    display_name: &str,
) -> RegistryResult<User> {
    let mut tx = db::begin_write(db_pool).await?;
    let now = OffsetDateTime::now_utc();

    let user = match find_in(&mut tx, method).await? {
        Some(user) if matches!(method, AuthMethod::Discord(_)) && user.display_name != display_name => {
            info!(user_id = user.id, old = %user.display_name, new = display_name, "updating stale display name");

            sqlx::query_as::<_, User>(
                "UPDATE user SET display_name = ?, updated_at = ? WHERE id = ? RETURNING *",
            )
            .bind(display_name)
            .bind(now)
            .bind(user.id)
            .fetch_one(&mut *tx)
            .await?
        }
        Some(user) => user,
        None => {
            let user = insert_user(&mut tx, display_name, false, now).await?;
            bind_in(&mut tx, user.id, method, now).await?;
            info!(user_id = user.id, via = %method.describe(), "created user");
            user
        }
    };

    tx.commit().await?;
    Ok(user)
}

/// Looks a credential up without creating anything.
pub async fn find(db_pool: &SqlitePool, method: AuthMethod) -> RegistryResult<Option<User>> {
    let mut conn = db_pool.acquire().await?;
    find_in(&mut conn, method).await
}

pub async fn user(db_pool: &SqlitePool, user_id: i64) -> RegistryResult<User> {
    sqlx::query_as("SELECT * FROM user WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| RegistryError::not_found(format!("user {user_id}")))
}

/// Binds a Discord identity to an existing user.
///
/// Rebinding the exact same pair is a no-op. A user holds at most one
/// Discord identity and a Discord identity belongs to at most one user.
pub async fn bind_discord(
    db_pool: &SqlitePool,
    user_id: i64,
    discord_id: i64,
) -> RegistryResult<DiscordAuth> {
    let mut tx = db::begin_write(db_pool).await?;

    let existing: Option<DiscordAuth> =
        sqlx::query_as("SELECT * FROM discord_auth WHERE user_id = ? OR discord_id = ?")
            .bind(user_id)
            .bind(discord_id)
            .fetch_optional(&mut *tx)
            .await?;

    if let Some(existing) = existing {
        if existing.user_id == user_id && existing.discord_id == discord_id {
            return Ok(existing);
        }
        return Err(if existing.user_id == user_id {
            RegistryError::AuthConflict(format!(
                "user {user_id} is already bound to discord id {}",
                existing.discord_id
            ))
        } else {
            RegistryError::AuthConflict(format!(
                "discord id {discord_id} belongs to user {}",
                existing.user_id
            ))
        });
    }

    let auth = sqlx::query_as::<_, DiscordAuth>(
        "INSERT INTO discord_auth (user_id, discord_id, inserted_at) VALUES (?, ?, ?) RETURNING *",
    )
    .bind(user_id)
    .bind(discord_id)
    .bind(OffsetDateTime::now_utc())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        constraint_error(
            e,
            || RegistryError::AuthConflict(format!("discord id {discord_id} is already bound")),
            || RegistryError::not_found(format!("user {user_id}")),
        )
    })?;

    tx.commit().await?;

    info!(user_id, discord_id, "bound discord identity");
    Ok(auth)
}

pub async fn bind_api_key(db_pool: &SqlitePool, user_id: i64, hash: KeyHash) -> RegistryResult<()> {
    let mut conn = db_pool.acquire().await?;
    bind_in(&mut conn, user_id, AuthMethod::ApiKey(hash), OffsetDateTime::now_utc()).await
}

/// Mints a new API key for `user_id` and returns the secret.
///
/// Only the hash is stored, so this is the one chance to read the key.
pub async fn issue_api_key(db_pool: &SqlitePool, user_id: i64) -> RegistryResult<String> {
    let key = generate_key();
    bind_api_key(db_pool, user_id, hash_key(&key)).await?;
    info!(user_id, "issued api key");
    Ok(key)
}

/// Finds the managed account called `display_name`, creating it if needed.
pub async fn managed_user(db_pool: &SqlitePool, display_name: &str) -> RegistryResult<User> {
    let mut tx = db::begin_write(db_pool).await?;

    let existing: Option<User> =
        sqlx::query_as("SELECT * FROM user WHERE display_name = ? AND managed = TRUE")
            .bind(display_name)
            .fetch_optional(&mut *tx)
            .await?;

    let user = match existing {
        Some(user) => user,
        None => {
            let user = insert_user(&mut tx, display_name, true, OffsetDateTime::now_utc()).await?;
            info!(user_id = user.id, display_name, "created managed user");
            user
        }
    };

    tx.commit().await?;
    Ok(user)
}

async fn find_in(conn: &mut SqliteConnection, method: AuthMethod) -> RegistryResult<Option<User>> {
    let user = match method {
        AuthMethod::Discord(discord_id) => {
            sqlx::query_as(
                r#"
                SELECT u.*
                FROM user u, discord_auth da
                WHERE u.id = da.user_id AND da.discord_id = ?
                "#,
            )
            .bind(discord_id)
            .fetch_optional(conn)
            .await?
        }
        AuthMethod::ApiKey(hash) => {
            sqlx::query_as(
                r#"
                SELECT u.*
                FROM user u, api_auth aa
                WHERE u.id = aa.user_id AND aa.hash = ?
                "#,
            )
            .bind(hash.to_hex())
            .fetch_optional(conn)
            .await?
        }
    };
    Ok(user)
}

async fn insert_user(
    conn: &mut SqliteConnection,
    display_name: &str,
    managed: bool,
    now: OffsetDateTime,
) -> RegistryResult<User> {
    let user = sqlx::query_as(
        r#"
        INSERT INTO user (display_name, managed, inserted_at, updated_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(display_name)
    .bind(managed)
    .bind(now)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(user)
}

async fn bind_in(
    conn: &mut SqliteConnection,
    user_id: i64,
    method: AuthMethod,
    now: OffsetDateTime,
) -> RegistryResult<()> {
    let query = match method {
        AuthMethod::Discord(discord_id) => {
            sqlx::query("INSERT INTO discord_auth (user_id, discord_id, inserted_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(discord_id)
        }
        AuthMethod::ApiKey(hash) => {
            sqlx::query("INSERT INTO api_auth (user_id, hash, inserted_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(hash.to_hex())
        }
    };

    query.bind(now).execute(conn).await.map_err(|e| {
        constraint_error(
            e,
            || RegistryError::AuthConflict(format!("{} is already bound", method.describe())),
            || RegistryError::not_found(format!("user {user_id}")),
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn discord_identity_is_created_once() {
        let db_pool = db::memory().await.unwrap();

        let first = resolve(&db_pool, AuthMethod::Discord(42), "rin").await.unwrap();
        let again = resolve(&db_pool, AuthMethod::Discord(42), "rin").await.unwrap();

        assert_eq!(first, again);
        assert!(!first.managed);
        assert_eq!(find(&db_pool, AuthMethod::Discord(42)).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn discord_resolution_refreshes_display_name() {
        let db_pool = db::memory().await.unwrap();

        let user = resolve(&db_pool, AuthMethod::Discord(42), "rin").await.unwrap();
        let renamed = resolve(&db_pool, AuthMethod::Discord(42), "rin2").await.unwrap();

        assert_eq!(renamed.id, user.id);
        assert_eq!(renamed.display_name, "rin2");
    }

    #[tokio::test]
    async fn api_key_resolution_binds_the_hash() {
        let db_pool = db::memory().await.unwrap();
        let hash = hash_key("not-a-real-key");

        assert_eq!(find(&db_pool, AuthMethod::ApiKey(hash)).await.unwrap(), None);
        let user = resolve(&db_pool, AuthMethod::ApiKey(hash), "script").await.unwrap();
        let found = find(&db_pool, AuthMethod::ApiKey(hash)).await.unwrap();

        assert_eq!(found.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn second_discord_identity_conflicts() {
        let db_pool = db::memory().await.unwrap();
        let user = resolve(&db_pool, AuthMethod::Discord(1), "one").await.unwrap();

        let err = bind_discord(&db_pool, user.id, 2).await.unwrap_err();
        assert!(matches!(err, RegistryError::AuthConflict(_)), "{err:?}");

        // same binding again is fine
        let auth = bind_discord(&db_pool, user.id, 1).await.unwrap();
        assert_eq!(auth.discord_id, 1);
    }

    #[tokio::test]
    async fn discord_identity_of_someone_else_conflicts() {
        let db_pool = db::memory().await.unwrap();
        resolve(&db_pool, AuthMethod::Discord(1), "one").await.unwrap();
        let other = managed_user(&db_pool, "bot").await.unwrap();

        let err = bind_discord(&db_pool, other.id, 1).await.unwrap_err();
        assert!(matches!(err, RegistryError::AuthConflict(_)), "{err:?}");
    }

    #[tokio::test]
    async fn binding_to_a_missing_user_is_not_found() {
        let db_pool = db::memory().await.unwrap();

        let err = bind_discord(&db_pool, 999, 1).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");

        let err = bind_api_key(&db_pool, 999, hash_key("k")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn api_key_hash_is_globally_unique() {
        let db_pool = db::memory().await.unwrap();
        let a = managed_user(&db_pool, "a").await.unwrap();
        let b = managed_user(&db_pool, "b").await.unwrap();

        bind_api_key(&db_pool, a.id, hash_key("shared")).await.unwrap();
        let err = bind_api_key(&db_pool, b.id, hash_key("shared")).await.unwrap_err();
        assert!(matches!(err, RegistryError::AuthConflict(_)), "{err:?}");
    }

    #[tokio::test]
    async fn issued_keys_authenticate_their_owner() {
        let db_pool = db::memory().await.unwrap();
        let bot = managed_user(&db_pool, "bot").await.unwrap();

        let first = issue_api_key(&db_pool, bot.id).await.unwrap();
        let second = issue_api_key(&db_pool, bot.id).await.unwrap();
        assert_ne!(first, second);

        for key in [first, second] {
            let found = find(&db_pool, AuthMethod::ApiKey(hash_key(&key))).await.unwrap();
            assert_eq!(found.map(|u| u.id), Some(bot.id));
        }
    }

    #[tokio::test]
    async fn managed_user_is_reused_by_name() {
        let db_pool = db::memory().await.unwrap();

        let bot = managed_user(&db_pool, "bot").await.unwrap();
        assert!(bot.managed);
        assert_eq!(managed_user(&db_pool, "bot").await.unwrap().id, bot.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_first_sight_resolves_share_one_user() {
        let (_dir, db_pool) = db::scratch_file(8).await;

        for discord_id in 1..=5 {
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let db_pool = db_pool.clone();
                    tokio::spawn(async move { resolve(&db_pool, AuthMethod::Discord(discord_id), "rin").await })
                })
                .collect();

            let mut ids = Vec::new();
            for task in tasks {
                ids.push(task.await.unwrap().unwrap().id);
            }
            ids.dedup();
            assert_eq!(ids.len(), 1, "discord id {discord_id}");
        }

        let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM user")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(users, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_managed_lookups_share_one_user() {
        let (_dir, db_pool) = db::scratch_file(8).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let db_pool = db_pool.clone();
                tokio::spawn(async move { managed_user(&db_pool, "bot").await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
