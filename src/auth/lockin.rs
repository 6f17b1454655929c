use axum::{debug_handler, extract::State, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::info;

use crate::{
    identity::{self, AuthMethod},
    session::{CSRF_STATE, DEFAULT_RETURN_URL, PKCE_VERIFIER, RETURN_URL, USER_ID, local_return_url},
    AppError, AppQuery, AppResult, AppState, GetField,
};

use super::{clients::DISCORD_ME_URL, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// OAuth callback: trades the code for a token, asks Discord who this is and
/// remembers the matching user in the session.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    AppQuery(LockinQuery { state, code }): AppQuery<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or("OAuth: without state")?);
    let code = AuthorizationCode::new(code.ok_or("OAuth: without code")?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err("no csrf_state".into());
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err("csrf tokens don't match".into());
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err("no pkce_verifier".into());
    };

    let client = clients.get_client()?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.get(DISCORD_ME_URL)
        .bearer_auth(access_token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let discord_id: i64 = body.get_str_field("id")?
        .parse()
        .map_err(|e| AppError::internal(format!("discord sent a bad id: {e}")))?;
    let display_name = body.get_str_field("global_name")
        .or_else(|_| body.get_str_field("username"))?;

    let user = identity::resolve(&db_pool, AuthMethod::Discord(discord_id), &display_name).await?;
    session.cycle_id().await?;
    session.insert(USER_ID, user.id).await?;

    info!(user_id = user.id, discord_id, "logged in through discord");

    let return_url: String = session
        .remove::<String>(RETURN_URL)
        .await?
        .filter(|url| local_return_url(url).is_some())
        .unwrap_or_else(|| DEFAULT_RETURN_URL.to_owned());
    Ok(Redirect::to(return_url.as_str()))
}
