//! Cards, their names and their version chains.
//!
//! Every revision is a new `card` row pointing back at the row it replaced
//! through `previous_id`. Only the newest row of a chain is live; the live
//! row is the one holding the (guild, name) pair.

use std::collections::HashSet;

use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use textdistance::str::levenshtein;
use tracing::info;

use crate::{
    db::{self, Card, Visibility},
    error::{RegistryError, RegistryResult, constraint_error},
};

#[derive(Clone, Debug, Deserialize)]
pub struct NewCard {
    pub name: String,
    #[serde(default)]
    pub category_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Revision {
    pub content: String,
    /// Leaving this out keeps the current category.
    #[serde(default)]
    pub category_name: Option<String>,
}

pub async fn create_card(db_pool: &SqlitePool, guild_id: i64, card: NewCard) -> RegistryResult<Card> {
    let now = OffsetDateTime::now_utc();

    let created: Card = sqlx::query_as(
        r#"
        INSERT INTO card (guild_id, name, category_name, visibility, content, inserted_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(guild_id)
    .bind(&card.name)
    .bind(&card.category_name)
    .bind(card.visibility)
    .bind(&card.content)
    .bind(now)
    .bind(now)
    .fetch_one(db_pool)
    .await
    .map_err(|e| {
        constraint_error(
            e,
            || RegistryError::DuplicateName { guild_id, name: card.name.clone() },
            || RegistryError::not_found(format!("guild {guild_id}")),
        )
    })?;

    info!(card_id = created.id, guild_id, name = %created.name, "created card");
    Ok(created)
}

/// Appends a new version after `card_id`.
///
/// Name, guild and visibility carry over. Revising a row that is no longer
/// live fails with `DuplicateName`: the name already belongs to a newer row.
pub async fn revise_card(db_pool: &SqlitePool, card_id: i64, revision: Revision) -> RegistryResult<Card> {
    let mut tx = db::begin_write(db_pool).await?;
    let now = OffsetDateTime::now_utc();

    let current = fetch_in(&mut tx, card_id).await?;
    let duplicate = || RegistryError::DuplicateName {
        guild_id: current.guild_id,
        name: current.name.clone(),
    };

    let retired = sqlx::query("UPDATE card SET superseded = TRUE, updated_at = ? WHERE id = ? AND NOT superseded")
        .bind(now)
        .bind(card_id)
        .execute(&mut *tx)
        .await?;
    if retired.rows_affected() == 0 {
        return Err(duplicate());
    }

    let revised: Card = sqlx::query_as(
        r#"
        INSERT INTO card (
            guild_id, name, category_name, previous_id, visibility, content,
            inserted_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(current.guild_id)
    .bind(&current.name)
    .bind(revision.category_name.as_ref().or(current.category_name.as_ref()))
    .bind(card_id)
    .bind(current.visibility)
    .bind(&revision.content)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| constraint_error(e, duplicate, || RegistryError::not_found(format!("card {card_id}"))))?;

    ensure_acyclic(&mut tx, revised.id, card_id).await?;
    tx.commit().await?;

    info!(card_id = revised.id, previous_id = card_id, name = %revised.name, "revised card");
    Ok(revised)
}

/// Any visibility may follow any other.
pub async fn set_visibility(db_pool: &SqlitePool, card_id: i64, visibility: Visibility) -> RegistryResult<Card> {
    let card: Card = sqlx::query_as("UPDATE card SET visibility = ?, updated_at = ? WHERE id = ? RETURNING *")
        .bind(visibility)
        .bind(OffsetDateTime::now_utc())
        .bind(card_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| RegistryError::not_found(format!("card {card_id}")))?;

    info!(card_id, %visibility, "changed card visibility");
    Ok(card)
}

/// The live card called `name` in `guild_id`.
pub async fn resolve_latest(db_pool: &SqlitePool, guild_id: i64, name: &str) -> RegistryResult<Card> {
    sqlx::query_as("SELECT * FROM card WHERE guild_id = ? AND name = ? AND NOT superseded")
        .bind(guild_id)
        .bind(name)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| RegistryError::not_found(format!("card `{name}` in guild {guild_id}")))
}

/// Points `card_id` at `previous_id`, refusing anything that closes a loop.
pub async fn link_previous(db_pool: &SqlitePool, card_id: i64, previous_id: i64) -> RegistryResult<Card> {
    let mut tx = db::begin_write(db_pool).await?;

    let card = fetch_in(&mut tx, card_id).await?;
    let previous = fetch_in(&mut tx, previous_id).await?;
    if card.guild_id != previous.guild_id {
        return Err(RegistryError::not_found(format!(
            "card {previous_id} in guild {}",
            card.guild_id
        )));
    }

    ensure_acyclic(&mut tx, card_id, previous_id).await?;

    let card: Card = sqlx::query_as("UPDATE card SET previous_id = ?, updated_at = ? WHERE id = ? RETURNING *")
        .bind(previous_id)
        .bind(OffsetDateTime::now_utc())
        .bind(card_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(card_id, previous_id, "linked card to previous version");
    Ok(card)
}

pub async fn get(db_pool: &SqlitePool, card_id: i64) -> RegistryResult<Card> {
    let mut conn = db_pool.acquire().await?;
    fetch_in(&mut conn, card_id).await
}

/// Live cards of a guild.
///
/// With a search term, exact matches come first, then names starting with
/// the term, then names merely containing it. Matching ignores case. Within
/// each tier, names closer to the term by edit distance come first.
pub async fn list(db_pool: &SqlitePool, guild_id: i64, search: Option<&str>) -> RegistryResult<Vec<Card>> {
    let cards: Vec<Card> = sqlx::query_as("SELECT * FROM card WHERE guild_id = ? AND NOT superseded ORDER BY name")
        .bind(guild_id)
        .fetch_all(db_pool)
        .await?;

    // SQLite's lower() only folds ASCII, so matching happens here
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(search) => Ok(rank_matches(cards, search)),
        None => Ok(cards),
    }
}

/// Rows whose `previous_id` is `card_id`, oldest first.
///
/// A superseded card usually has one; hand-linked chains may fork.
pub async fn upgrades(db_pool: &SqlitePool, card_id: i64) -> RegistryResult<Vec<Card>> {
    let cards = sqlx::query_as("SELECT * FROM card WHERE previous_id = ? ORDER BY id")
        .bind(card_id)
        .fetch_all(db_pool)
        .await?;
    Ok(cards)
}

/// `card_id` followed by every older version, newest first.
pub async fn history(db_pool: &SqlitePool, card_id: i64) -> RegistryResult<Vec<Card>> {
    let mut conn = db_pool.acquire().await?;

    let mut chain = vec![fetch_in(&mut conn, card_id).await?];
    let mut seen = HashSet::from([card_id]);

    while let Some(previous_id) = chain.last().and_then(|card| card.previous_id) {
        if !seen.insert(previous_id) {
            break;
        }
        chain.push(fetch_in(&mut conn, previous_id).await?);
    }

    Ok(chain)
}

async fn fetch_in(conn: &mut SqliteConnection, card_id: i64) -> RegistryResult<Card> {
    sqlx::query_as("SELECT * FROM card WHERE id = ?")
        .bind(card_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| RegistryError::not_found(format!("card {card_id}")))
}

/// Walks back from `previous_id` and fails if `card_id` shows up.
async fn ensure_acyclic(conn: &mut SqliteConnection, card_id: i64, previous_id: i64) -> RegistryResult<()> {
    let cycle = || RegistryError::CycleDetected { card_id, previous_id };

    let mut seen = HashSet::new();
    let mut cursor = Some(previous_id);

    while let Some(id) = cursor {
        if id == card_id || !seen.insert(id) {
            return Err(cycle());
        }
        cursor = sqlx::query_scalar::<_, Option<i64>>("SELECT previous_id FROM card WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();
    }

    Ok(())
}

fn rank_matches(cards: Vec<Card>, search: &str) -> Vec<Card> {
    let search = search.to_lowercase();

    let mut exact = Vec::new();
    let mut prefix = Vec::new();
    let mut rest = Vec::new();

    for card in cards {
        let name = card.name.to_lowercase();
        if name == search {
            exact.push(card);
        } else if name.starts_with(&search) {
            prefix.push((levenshtein(&name, &search), card));
        } else if name.contains(&search) {
            rest.push((levenshtein(&name, &search), card));
        }
    }

    // stable, so equal distances stay in name order
    prefix.sort_by_key(|(distance, _)| *distance);
    rest.sort_by_key(|(distance, _)| *distance);

    exact
        .into_iter()
        .chain(prefix.into_iter().map(|(_, card)| card))
        .chain(rest.into_iter().map(|(_, card)| card))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn new_card(name: &str) -> NewCard {
        NewCard {
            name: name.to_owned(),
            category_name: None,
            content: format!("# {name}"),
            visibility: Visibility::default(),
        }
    }

    fn revision(content: &str) -> Revision {
        Revision {
            content: content.to_owned(),
            category_name: None,
        }
    }

    async fn live_rows(db_pool: &SqlitePool, guild_id: i64, name: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM card WHERE guild_id = ? AND name = ? AND NOT superseded")
            .bind(guild_id)
            .bind(name)
            .fetch_one(db_pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn new_cards_default_to_private() {
        let db_pool = db::memory().await.unwrap();

        let card = create_card(&db_pool, 7, new_card("Ace")).await.unwrap();

        assert_eq!(card.guild_id, 7);
        assert_eq!(card.visibility, Visibility::Private);
        assert_eq!(card.previous_id, None);
        assert!(!card.superseded);
    }

    #[tokio::test]
    async fn names_are_unique_per_guild() {
        let db_pool = db::memory().await.unwrap();
        create_card(&db_pool, 1, new_card("Ace")).await.unwrap();

        let err = create_card(&db_pool, 1, new_card("Ace")).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { guild_id: 1, .. }), "{err:?}");

        // another guild may reuse it
        create_card(&db_pool, 2, new_card("Ace")).await.unwrap();
    }

    #[tokio::test]
    async fn first_create_on_a_fresh_file_succeeds() {
        let (_dir, db_pool) = db::scratch_file(4).await;

        let card = create_card(&db_pool, 1, new_card("Ace")).await.unwrap();
        assert_eq!(card.visibility, Visibility::Private);

        let err = create_card(&db_pool, 1, new_card("Ace")).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }), "{err:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_have_one_winner() {
        let (_dir, db_pool) = db::scratch_file(8).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let db_pool = db_pool.clone();
                tokio::spawn(async move { create_card(&db_pool, 1, new_card("Ace")).await })
            })
            .collect();

        let mut created = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(RegistryError::DuplicateName { .. }) => duplicates += 1,
                Err(err) => panic!("unexpected {err:?}"),
            }
        }

        assert_eq!((created, duplicates), (1, 7));
        assert_eq!(live_rows(&db_pool, 1, "Ace").await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_revisions_have_one_winner() {
        let (_dir, db_pool) = db::scratch_file(8).await;
        let mut head = create_card(&db_pool, 1, new_card("Ace")).await.unwrap();

        for round in 0..5 {
            let tasks: Vec<_> = (0..8)
                .map(|n| {
                    let db_pool = db_pool.clone();
                    let card_id = head.id;
                    tokio::spawn(async move {
                        revise_card(&db_pool, card_id, revision(&format!("round {round} by {n}"))).await
                    })
                })
                .collect();

            let mut winners = Vec::new();
            for task in tasks {
                match task.await.unwrap() {
                    Ok(card) => winners.push(card),
                    Err(RegistryError::DuplicateName { .. }) => {}
                    Err(err) => panic!("unexpected {err:?}"),
                }
            }

            assert_eq!(winners.len(), 1, "round {round}");
            assert_eq!(winners[0].previous_id, Some(head.id));
            assert_eq!(live_rows(&db_pool, 1, "Ace").await, 1);
            head = winners.remove(0);
        }

        assert_eq!(history(&db_pool, head.id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn revisions_keep_one_live_row() {
        let db_pool = db::memory().await.unwrap();
        let first = create_card(&db_pool, 1, new_card("Ace")).await.unwrap();

        let second = revise_card(&db_pool, first.id, revision("v2")).await.unwrap();
        let third = revise_card(&db_pool, second.id, revision("v3")).await.unwrap();

        assert_eq!(second.previous_id, Some(first.id));
        assert_eq!(third.previous_id, Some(second.id));
        assert_eq!(third.name, "Ace");
        assert_eq!(live_rows(&db_pool, 1, "Ace").await, 1);

        let latest = resolve_latest(&db_pool, 1, "Ace").await.unwrap();
        assert_eq!(latest.id, third.id);
        assert_eq!(latest.content, "v3");

        let chain: Vec<_> = history(&db_pool, third.id).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(chain, vec![third.id, second.id, first.id]);

        let forward: Vec<_> = upgrades(&db_pool, first.id).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(forward, vec![second.id]);
        assert!(upgrades(&db_pool, third.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revision_keeps_category_unless_replaced() {
        let db_pool = db::memory().await.unwrap();
        let mut card = new_card("Ace");
        card.category_name = Some("spells".into());
        let first = create_card(&db_pool, 1, card).await.unwrap();

        let kept = revise_card(&db_pool, first.id, revision("v2")).await.unwrap();
        assert_eq!(kept.category_name.as_deref(), Some("spells"));

        let replaced = revise_card(
            &db_pool,
            kept.id,
            Revision { content: "v3".into(), category_name: Some("items".into()) },
        )
        .await
        .unwrap();
        assert_eq!(replaced.category_name.as_deref(), Some("items"));
    }

    #[tokio::test]
    async fn revising_a_stale_version_is_a_duplicate() {
        let db_pool = db::memory().await.unwrap();
        let first = create_card(&db_pool, 1, new_card("Ace")).await.unwrap();
        revise_card(&db_pool, first.id, revision("v2")).await.unwrap();

        let err = revise_card(&db_pool, first.id, revision("fork")).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }), "{err:?}");
        assert_eq!(live_rows(&db_pool, 1, "Ace").await, 1);
    }

    #[tokio::test]
    async fn revising_a_missing_card_is_not_found() {
        let db_pool = db::memory().await.unwrap();

        let err = revise_card(&db_pool, 404, revision("v2")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn linking_back_into_the_chain_is_a_cycle() {
        let db_pool = db::memory().await.unwrap();
        let a = create_card(&db_pool, 1, new_card("Ace")).await.unwrap();
        let b = revise_card(&db_pool, a.id, revision("v2")).await.unwrap();

        let err = link_previous(&db_pool, a.id, b.id).await.unwrap_err();
        assert!(
            matches!(err, RegistryError::CycleDetected { card_id, previous_id } if card_id == a.id && previous_id == b.id),
            "{err:?}"
        );

        let err = link_previous(&db_pool, a.id, a.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::CycleDetected { .. }), "{err:?}");

        // the chain is untouched
        assert_eq!(get(&db_pool, a.id).await.unwrap().previous_id, None);

        // pointing b at the a it already follows closes no loop
        let relinked = link_previous(&db_pool, b.id, a.id).await.unwrap();
        assert_eq!(relinked.previous_id, Some(a.id));
    }

    #[tokio::test]
    async fn linking_unrelated_cards_works_within_a_guild() {
        let db_pool = db::memory().await.unwrap();
        let base = create_card(&db_pool, 1, new_card("Spark")).await.unwrap();
        let upgrade = create_card(&db_pool, 1, new_card("Flame")).await.unwrap();
        let elsewhere = create_card(&db_pool, 2, new_card("Spark")).await.unwrap();

        let linked = link_previous(&db_pool, upgrade.id, base.id).await.unwrap();
        assert_eq!(linked.previous_id, Some(base.id));

        let err = link_previous(&db_pool, elsewhere.id, base.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");

        let err = link_previous(&db_pool, upgrade.id, 404).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn visibility_moves_freely() {
        let db_pool = db::memory().await.unwrap();
        let card = create_card(&db_pool, 1, new_card("Ace")).await.unwrap();

        for visibility in [
            Visibility::Public,
            Visibility::Private,
            Visibility::Hidden,
            Visibility::Public,
            Visibility::Hidden,
            Visibility::Private,
        ] {
            let updated = set_visibility(&db_pool, card.id, visibility).await.unwrap();
            assert_eq!(updated.visibility, visibility);
        }

        let err = set_visibility(&db_pool, 404, Visibility::Public).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let db_pool = db::memory().await.unwrap();
        create_card(&db_pool, 1, new_card("Ace")).await.unwrap();

        let err = resolve_latest(&db_pool, 2, "Ace").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn search_ranks_exact_then_prefix() {
        let db_pool = db::memory().await.unwrap();
        for name in ["Fireball", "Campfire", "Fire", "Water"] {
            create_card(&db_pool, 1, new_card(name)).await.unwrap();
        }

        let names: Vec<_> = list(&db_pool, 1, Some("fire"))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Fire", "Fireball", "Campfire"]);

        let all = list(&db_pool, 1, None).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn search_tiers_order_by_edit_distance() {
        let db_pool = db::memory().await.unwrap();
        for name in ["Firestorm of Ages", "Firewall", "Fires", "Wildfire", "Bonfire Night"] {
            create_card(&db_pool, 1, new_card(name)).await.unwrap();
        }

        let names: Vec<_> = list(&db_pool, 1, Some("Fire"))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Fires", "Firewall", "Firestorm of Ages", "Wildfire", "Bonfire Night"]);
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let db_pool = db::memory().await.unwrap();
        create_card(&db_pool, 1, new_card("Éclair")).await.unwrap();
        create_card(&db_pool, 1, new_card("Ogre")).await.unwrap();

        let found = list(&db_pool, 1, Some("ÉCL")).await.unwrap();
        assert_eq!(found.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["Éclair"]);
    }
}
