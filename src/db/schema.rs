//! Ordered schema steps.
//!
//! Each step runs inside its own transaction and is recorded in
//! `_migrations`, so a database only ever moves forward.

use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info};

pub const SCHEMA_VERSION: i64 = 2;

const STEPS: [(&str, &str); 2] = [
    ("initial_schema", STEP_1),
    ("named_visibility", STEP_2),
];

/// Brings the database up to [`SCHEMA_VERSION`].
pub async fn migrate(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    migrate_to(conn, SCHEMA_VERSION).await
}

/// Applies pending steps up to and including `target`.
///
/// Steps rewrite tables, so statements `conn` prepared before may describe
/// columns that are gone. Its statement cache is dropped before returning.
pub async fn migrate_to(conn: &mut SqliteConnection, target: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    let (current,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
        .fetch_one(&mut *conn)
        .await?;

    debug!(current, target, "checking schema");

    for (version, (name, sql)) in (1..).zip(STEPS) {
        if version <= current || version > target {
            continue;
        }

        info!(version, name, "applying schema step");

        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(version)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    conn.clear_cached_statements().await?;
    Ok(())
}

// Cards keep every revision; only the newest row of a chain is live and
// holds the name.
const STEP_1: &str = r#"
CREATE TABLE user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name TEXT NOT NULL,
    managed BOOLEAN NOT NULL DEFAULT FALSE,
    inserted_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE card (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    guild_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    category_name TEXT,
    previous_id INTEGER REFERENCES card (id),
    visibility INTEGER NOT NULL DEFAULT 0,
    content TEXT NOT NULL,
    superseded BOOLEAN NOT NULL DEFAULT FALSE,
    inserted_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX card_live_name ON card (guild_id, name) WHERE NOT superseded;
CREATE INDEX card_previous ON card (previous_id);

CREATE TABLE ownership (
    card_id INTEGER NOT NULL REFERENCES card (id),
    owner_id INTEGER NOT NULL REFERENCES user (id),
    owned BOOLEAN NOT NULL DEFAULT TRUE,
    UNIQUE (card_id, owner_id)
);

CREATE INDEX ownership_owner ON ownership (owner_id);

CREATE TABLE discord_auth (
    user_id INTEGER NOT NULL UNIQUE REFERENCES user (id),
    discord_id INTEGER NOT NULL UNIQUE,
    inserted_at TEXT NOT NULL
);

CREATE TABLE api_auth (
    user_id INTEGER NOT NULL REFERENCES user (id),
    hash TEXT NOT NULL UNIQUE,
    inserted_at TEXT NOT NULL
);
"#;

// Integer visibility codes 0/1/2 become private/hidden/public; anything
// else falls back to private.
const STEP_2: &str = r#"
ALTER TABLE card ADD COLUMN visibility_name TEXT NOT NULL DEFAULT 'private'
    CHECK (visibility_name IN ('private', 'hidden', 'public'));

UPDATE card SET visibility_name = CASE visibility
    WHEN 0 THEN 'private'
    WHEN 1 THEN 'hidden'
    WHEN 2 THEN 'public'
    ELSE 'private'
END;

ALTER TABLE card DROP COLUMN visibility;
ALTER TABLE card RENAME COLUMN visibility_name TO visibility;
"#;
