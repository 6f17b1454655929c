use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::HeaderName, request::Parts},
};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    db::User,
    identity::{self, AuthMethod, hash_key},
    session::USER_ID,
    AppError, AppResult, RegistryError,
};

pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Whoever sent the request.
///
/// An `x-api-key` header wins; without one the session set up by the
/// Discord login is used. Requests with neither are rejected.
#[derive(Clone, Debug)]
pub struct Authentication(pub User);

impl<S> FromRequestParts<S> for Authentication
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<Authentication>() {
            return Ok(auth.clone());
        }

        let db_pool = SqlitePool::from_ref(state);

        let key = parts
            .headers
            .get(X_API_KEY)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let user = if let Some(key) = key {
            identity::find(&db_pool, AuthMethod::ApiKey(hash_key(key))).await?
        } else {
            let session = Session::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;
            session_user(&db_pool, session.get::<i64>(USER_ID).await?).await?
        };

        let auth = Authentication(user.ok_or(AppError::Unauthorized)?);
        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

/// The user a session points at. A session outliving its user counts as
/// no session at all.
async fn session_user(db_pool: &SqlitePool, user_id: Option<i64>) -> AppResult<Option<User>> {
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    match identity::user(db_pool, user_id).await {
        Ok(user) => Ok(Some(user)),
        Err(RegistryError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// An authenticated automation account.
#[derive(Clone, Debug)]
pub struct Managed(pub User);

impl<S> FromRequestParts<S> for Managed
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authentication(user) = Authentication::from_request_parts(parts, state).await?;
        if !user.managed {
            return Err(AppError::Forbidden);
        }
        Ok(Managed(user))
    }
}
