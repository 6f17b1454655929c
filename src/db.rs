mod schema;

pub use schema::{SCHEMA_VERSION, migrate, migrate_to};

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{
    Connection, FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tracing::info;

use crate::config::Config;

// unique: id
// unique among live rows: guild_id, name
// previous_id walks back to older versions of the same guild
#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub guild_id: i64,
    pub name: String,
    pub category_name: Option<String>,
    pub previous_id: Option<i64>,
    pub visibility: Visibility,
    pub content: String,
    /// A newer revision holds the name now.
    pub superseded: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub inserted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

// unique: id
#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub display_name: String,
    pub managed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub inserted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

// unique: card_id, owner_id
#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Ownership {
    pub card_id: i64,
    pub owner_id: i64,
    pub owned: bool,
}

// unique: user_id
// unique: discord_id
#[derive(Clone, Debug, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DiscordAuth {
    pub user_id: i64,
    pub discord_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub inserted_at: OffsetDateTime,
}

// unique: hash
#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct ApiAuth {
    pub user_id: i64,
    pub hash: String,
    pub inserted_at: OffsetDateTime,
}

/// How much of a card someone who doesn't own it gets to see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Visibility {
    /// Nothing, not even that the card exists.
    #[default]
    Private,
    /// The card shows up in listings but its content stays closed.
    Hidden,
    /// Everything.
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Hidden => "hidden",
            Visibility::Public => "public",
        }
    }

    /// Maps the integer codes of the first schema; unknown codes are private.
    pub fn from_legacy_code(code: i64) -> Visibility {
        match code {
            1 => Visibility::Hidden,
            2 => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "hidden" => Ok(Visibility::Hidden),
            "public" => Ok(Visibility::Public),
            other => Err(format!("no such visibility `{other}`")),
        }
    }
}

/// Opens the pool behind `config.database_url`, migrating it first.
///
/// Schema steps run on a connection of their own that is closed before the
/// pool opens, so no pooled connection has seen the old tables.
pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    let mut conn = SqliteConnection::connect_with(&options).await?;
    migrate(&mut conn).await?;
    conn.close().await?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;

    info!(url = %config.database_url, "connected to database");
    Ok(db_pool)
}

/// A fresh in-memory database with every schema step applied.
///
/// The pool holds exactly one connection that never expires, since each
/// SQLite memory connection is its own database.
pub async fn memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    let mut conn = db_pool.acquire().await?;
    migrate(&mut conn).await?;
    drop(conn);

    Ok(db_pool)
}

/// Starts a transaction that holds the write lock from its first statement.
///
/// A deferred transaction that reads and then writes cannot wait for the
/// lock in WAL mode; it fails with `SQLITE_BUSY` without honoring
/// `busy_timeout`. Every read-then-write transaction goes through here.
pub(crate) async fn begin_write(db_pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    db_pool.begin_with("BEGIN IMMEDIATE").await
}

/// A migrated database file in a temporary directory, shared by
/// `connections` pooled connections. The directory goes away with the guard.
#[cfg(test)]
pub(crate) async fn scratch_file(connections: u32) -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        database_url: format!("sqlite://{}", dir.path().join("cardkeep.db").display()),
        max_connections: connections,
        acquire_timeout: std::time::Duration::from_secs(30),
        busy_timeout: std::time::Duration::from_secs(30),
        ..Config::default()
    };
    let db_pool = connect(&config).await.unwrap();
    (dir, db_pool)
}
