//! Repository error type and Postgres error classification.

use costkeeper_core::assignment::retry::Attempt;
use costkeeper_core::error::CoreError;

/// Unique index keeping rule priorities distinct per organization.
pub const PRIORITY_CONSTRAINT: &str = "uq_assignment_rules_org_priority";

/// Unique index keeping rule names distinct per organization.
pub const NAME_CONSTRAINT: &str = "uq_assignment_rules_org_name";

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors returned by repositories that enforce domain rules on top of SQL.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A domain error detected by the repository (missing rows, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Whether `err` means another writer moved priorities underneath us.
///
/// Covers the priority unique index, serialization failures and deadlocks.
pub fn is_priority_conflict(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    match db_err.code().as_deref() {
        Some(UNIQUE_VIOLATION) => db_err.constraint() == Some(PRIORITY_CONSTRAINT),
        Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => true,
        _ => false,
    }
}

/// Whether `err` is a unique violation on the rule-name index.
pub fn is_name_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db_err.constraint() == Some(NAME_CONSTRAINT)
        }
        _ => false,
    }
}

/// Collapse a sqlx error into a [`CoreError::Internal`] for collaborator traits
/// whose signatures only speak [`CoreError`].
pub fn internal(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Database error in collaborator");
    CoreError::Internal(format!("Database error: {err}"))
}

impl RepoError {
    /// Whether this error should be retried as an optimistic-concurrency loss.
    pub fn is_priority_conflict(&self) -> bool {
        match self {
            RepoError::Database(err) => is_priority_conflict(err),
            RepoError::Core(_) => false,
        }
    }
}

/// Turn a priority-conflict database error into [`Attempt::Conflict`].
pub fn conflict_as_retry<T>(result: Result<Attempt<T>, RepoError>) -> Result<Attempt<T>, RepoError> {
    match result {
        Err(err) if err.is_priority_conflict() => Ok(Attempt::Conflict),
        other => other,
    }
}

/// Map a unique violation on the name index to a domain conflict.
pub fn name_conflict_or(err: sqlx::Error, name: &str) -> RepoError {
    if is_name_conflict(&err) {
        RepoError::Core(CoreError::Conflict(format!(
            "An assignment rule named '{name}' already exists"
        )))
    } else {
        RepoError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(!is_priority_conflict(&sqlx::Error::RowNotFound));
        assert!(!is_name_conflict(&sqlx::Error::PoolTimedOut));
        assert!(!RepoError::Core(CoreError::Conflict("x".to_string())).is_priority_conflict());
    }

    #[test]
    fn domain_errors_pass_through_retry_classification() {
        let result: Result<Attempt<()>, RepoError> = Err(RepoError::Core(CoreError::NotFound {
            entity: "AssignmentRule",
            id: 1,
        }));
        assert_matches!(
            conflict_as_retry(result),
            Err(RepoError::Core(CoreError::NotFound { .. }))
        );
        assert_matches!(conflict_as_retry(Ok(Attempt::Done(7))), Ok(Attempt::Done(7)));
    }

    #[test]
    fn other_database_errors_keep_their_variant() {
        assert_matches!(
            name_conflict_or(sqlx::Error::RowNotFound, "r"),
            RepoError::Database(sqlx::Error::RowNotFound)
        );
    }
}
