mod clients;
mod extract;
mod lockin;
mod login;
mod logout;

pub use clients::Clients;
pub use extract::{Authentication, Managed, X_API_KEY};

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/discord", get(login::login))
        .route("/lockin/discord", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}
