use axum::{debug_handler, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    AppQuery, AppResult,
    session::{DEFAULT_RETURN_URL, local_return_url},
};

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler]
pub(crate) async fn logout(
    AppQuery(LogoutQuery { return_url }): AppQuery<LogoutQuery>,
    session: Session
) -> AppResult<Redirect> {
    session.flush().await?;
    Ok(Redirect::to(
        return_url.as_deref().and_then(local_return_url).unwrap_or(DEFAULT_RETURN_URL),
    ))
}
