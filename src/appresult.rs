use std::sync::Arc;

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    Registry(RegistryError),
    Unauthorized,
    Forbidden,
    /// The card exists but its owner keeps it closed.
    Hidden(String),
    BadRequest(String),
    Json(JsonRejection),
    Query(QueryRejection),
    Path(PathRejection),
    Internal(anyhow::Error),
}

/// JSON body extractor answering with [`ErrorBody`] on rejection.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Query string extractor answering with [`ErrorBody`] on rejection.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Path parameter extractor answering with [`ErrorBody`] on rejection.
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Error body every failing route answers with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> AppError {
        AppError::Internal(anyhow::Error::msg(message.into()))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::Internal(_))
    }

    fn parts(&self) -> (StatusCode, u32, String) {
        use RegistryError::*;
        match self {
            AppError::Registry(err) => match err {
                NotFound(_) => (StatusCode::NOT_FOUND, 4003, err.to_string()),
                DuplicateName { .. } => (StatusCode::CONFLICT, 4009, err.to_string()),
                AuthConflict(_) => (StatusCode::CONFLICT, 4011, err.to_string()),
                CycleDetected { .. } => (StatusCode::CONFLICT, 4012, err.to_string()),
                StorageUnavailable(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    5003,
                    "Storage is unavailable, try again.".to_owned(),
                ),
            },
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, 4004, "Request is unauthenticated.".to_owned()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, 4005, "This resource is forbidden.".to_owned()),
            AppError::Hidden(name) => (StatusCode::FORBIDDEN, 4006, format!("The card `{name}` is hidden to you.")),
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, 4001, message.clone()),
            AppError::Json(rejection) => match rejection {
                JsonRejection::JsonDataError(_) => (StatusCode::BAD_REQUEST, 4001, rejection.body_text()),
                JsonRejection::JsonSyntaxError(_) => (StatusCode::BAD_REQUEST, 4002, rejection.body_text()),
                JsonRejection::MissingJsonContentType(_) => (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    4007,
                    "Expected a body of type `application/json`.".to_owned(),
                ),
                _ => (rejection.status(), 4001, rejection.body_text()),
            },
            AppError::Query(rejection) => (StatusCode::BAD_REQUEST, 4001, rejection.body_text()),
            AppError::Path(rejection) => match rejection.status() {
                status if status.is_client_error() => (StatusCode::BAD_REQUEST, 4001, rejection.body_text()),
                status => (status, 5000, "An internal server error occurred.".to_owned()),
            },
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                5000,
                "An internal server error occurred.".to_owned(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let mut response = (status, Json(ErrorBody { code, message })).into_response();

        if matches!(self, AppError::Registry(ref err) if err.is_retryable()) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        if status.is_server_error() {
            // picked up and logged by the error logging middleware
            response.extensions_mut().insert(Arc::new(self));
        }
        response
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Registry(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Json(rejection)
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Query(rejection)
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Path(rejection)
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::BadRequest(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::BadRequest(err.to_owned())
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                AppError::Internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(anyhow::Error);
apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(reqwest::Error);
apperr_impl!(oauth2::url::ParseError);

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Registry(RegistryError::from(err))
    }
}

impl<E, R> From<oauth2::RequestTokenError<E, R>> for AppError
where
    E: core::error::Error + Send + Sync + 'static,
    R: oauth2::ErrorResponse + Send + Sync + 'static,
{
    fn from(err: oauth2::RequestTokenError<E, R>) -> Self {
        AppError::Internal(anyhow::Error::from(err))
    }
}
