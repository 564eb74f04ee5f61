//! Conditions service errors.

use thiserror::Error;

use crate::{
    records::{CompanyUuid, ConditionUuid, UserUuid},
    store::StoreError,
};

/// Errors returned by resolution operations.
///
/// Empty results are never errors, and malformed rules are skipped rather than
/// reported here.
#[derive(Debug, Error)]
pub enum ConditionsError {
    /// The requested user does not exist.
    #[error("user {0} not found")]
    UserNotFound(UserUuid),

    /// The requested company does not exist.
    #[error("company {0} not found")]
    CompanyNotFound(CompanyUuid),

    /// An assignment references a condition the store does not have.
    #[error("condition {0} not found")]
    ConditionNotFound(ConditionUuid),

    /// The entity store could not be reached.
    #[error("entity store unavailable")]
    Unavailable(#[source] StoreError),

    /// The caller cancelled the request before it completed.
    #[error("resolution cancelled")]
    Cancelled,
}

impl ConditionsError {
    /// Map a store error, turning [`StoreError::NotFound`] into `not_found`.
    pub(crate) fn from_store(error: StoreError, not_found: Self) -> Self {
        match error {
            StoreError::NotFound => not_found,
            StoreError::Unavailable(_) => Self::Unavailable(error),
        }
    }
}
