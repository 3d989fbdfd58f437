use services::common::RepositoryError;
use tokio_postgres::error::SqlState;

/// Convert tokio_postgres::Error to RepositoryError
pub fn map_db_error(err: tokio_postgres::Error) -> RepositoryError {
    if err.is_closed() {
        return RepositoryError::ConnectionFailed("Connection closed".to_string());
    }

    let Some(db_err) = err.as_db_error() else {
        return RepositoryError::DatabaseError(err.into());
    };

    let message = db_err.message().to_string();
    classify_sql_state(db_err.code(), message)
}

/// SQLSTATE to error kind; unknown codes keep the code in the message
pub fn classify_sql_state(code: &SqlState, message: String) -> RepositoryError {
    match code {
        // Integrity constraint violations
        &SqlState::UNIQUE_VIOLATION => RepositoryError::AlreadyExists,
        &SqlState::FOREIGN_KEY_VIOLATION => RepositoryError::ForeignKeyViolation(message),
        &SqlState::NOT_NULL_VIOLATION => RepositoryError::RequiredFieldMissing(message),
        &SqlState::CHECK_VIOLATION => RepositoryError::ValidationFailed(message),

        // Transaction errors
        &SqlState::T_R_SERIALIZATION_FAILURE | &SqlState::T_R_DEADLOCK_DETECTED => {
            RepositoryError::TransactionConflict
        }

        // Connection/auth errors
        &SqlState::INVALID_PASSWORD | &SqlState::INVALID_AUTHORIZATION_SPECIFICATION => {
            RepositoryError::AuthenticationFailed
        }
        &SqlState::CONNECTION_EXCEPTION
        | &SqlState::CONNECTION_DOES_NOT_EXIST
        | &SqlState::CONNECTION_FAILURE => RepositoryError::ConnectionFailed(message),

        _ => RepositoryError::DatabaseError(anyhow::anyhow!(
            "Database error ({}): {}",
            code.code(),
            message
        )),
    }
}
