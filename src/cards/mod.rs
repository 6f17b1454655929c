mod edit;
mod list;
mod owners;
mod show;

use axum::{
    Router,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    AppResult, AppState,
    db::{Card, User, Visibility},
    ledger, registry,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/guilds/{guild_id}/cards", get(list::list).post(edit::create))
        .route("/guilds/{guild_id}/cards/latest/{name}", get(list::latest))
        .route("/cards/{card_id}", get(show::show))
        .route("/cards/{card_id}/content", get(show::content))
        .route("/cards/{card_id}/history", get(show::history))
        .route("/cards/{card_id}/revisions", post(edit::revise))
        .route("/cards/{card_id}/visibility", put(edit::visibility))
        .route("/cards/{card_id}/previous", put(edit::previous))
        .route("/cards/{card_id}/owners", get(owners::list))
        .route("/cards/{card_id}/owners/{user_id}", put(owners::claim).delete(owners::release))
}

/// A card as one particular user gets to see it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardView {
    #[serde(flatten)]
    pub card: Card,
    /// Set when the content was withheld.
    pub hidden: bool,
}

/// A fully readable card along with its neighbours in the version graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardDetail {
    #[serde(flatten)]
    pub card: Card,
    /// Versions built on this one.
    pub upgrades: Vec<CardView>,
    /// The version this one replaced.
    pub downgrade: Option<CardView>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    Full,
    /// Existence only.
    Closed,
    None,
}

pub(crate) async fn access(db_pool: &SqlitePool, viewer: &User, card: &Card) -> AppResult<Access> {
    if viewer.managed || card.visibility == Visibility::Public {
        return Ok(Access::Full);
    }
    if ledger::is_owner(db_pool, card.id, viewer.id).await? {
        return Ok(Access::Full);
    }
    Ok(match card.visibility {
        Visibility::Hidden => Access::Closed,
        _ => Access::None,
    })
}

pub(crate) fn view(card: Card, access: Access) -> Option<CardView> {
    match access {
        Access::Full => Some(CardView { card, hidden: false }),
        Access::Closed => Some(CardView {
            card: Card { content: String::new(), ..card },
            hidden: true,
        }),
        Access::None => None,
    }
}

/// Attaches the neighbours of `card` that `viewer` may know about.
pub(crate) async fn detail(db_pool: &SqlitePool, viewer: &User, card: Card) -> AppResult<CardDetail> {
    let mut upgrades = Vec::new();
    for upgrade in registry::upgrades(db_pool, card.id).await? {
        let access = access(db_pool, viewer, &upgrade).await?;
        upgrades.extend(view(upgrade, access));
    }

    let downgrade = match card.previous_id {
        Some(previous_id) => {
            let previous = registry::get(db_pool, previous_id).await?;
            let access = access(db_pool, viewer, &previous).await?;
            view(previous, access)
        }
        None => None,
    };

    Ok(CardDetail { card, upgrades, downgrade })
}
