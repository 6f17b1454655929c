use thiserror::Error;

/// Everything the registry, ledger and identity resolver can refuse.
///
/// None of these are fatal. Only [`RegistryError::StorageUnavailable`] is
/// worth retrying as-is; the rest describe a request that has to change.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a card named `{name}` already exists in guild {guild_id}")]
    DuplicateName { guild_id: i64, name: String },

    #[error("credential conflict: {0}")]
    AuthConflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("card {card_id} cannot follow card {previous_id} without becoming its own ancestor")]
    CycleDetected { card_id: i64, previous_id: i64 },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] sqlx::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl RegistryError {
    pub fn not_found(what: impl Into<String>) -> RegistryError {
        RegistryError::NotFound(what.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::StorageUnavailable(_))
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RegistryError::NotFound("row".to_owned()),
            err => RegistryError::StorageUnavailable(err),
        }
    }
}

/// Turns constraint violations into the caller's domain error.
///
/// Unique violations become `conflict`, foreign key violations become
/// `missing`. Anything else goes through the plain `From` conversion.
pub(crate) fn constraint_error(
    err: sqlx::Error,
    conflict: impl FnOnce() -> RegistryError,
    missing: impl FnOnce() -> RegistryError,
) -> RegistryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return conflict();
        }
        if db_err.is_foreign_key_violation() {
            return missing();
        }
    }
    RegistryError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(RegistryError::StorageUnavailable(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!RegistryError::not_found("card 1").is_retryable());
        assert!(!RegistryError::AuthConflict("discord id 7".into()).is_retryable());
        assert!(!RegistryError::CycleDetected { card_id: 1, previous_id: 2 }.is_retryable());
        assert!(
            !RegistryError::DuplicateName { guild_id: 1, name: "Ace".into() }.is_retryable()
        );
    }

    #[test]
    fn row_not_found_is_not_found() {
        let err = RegistryError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, RegistryError::NotFound(_)));

        let err = RegistryError::from(sqlx::Error::PoolClosed);
        assert!(matches!(err, RegistryError::StorageUnavailable(_)));
    }
}
