use axum::http::StatusCode;
use thiserror::Error;

/// Failure talking to the remote store behind a repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("read failed: {0}")]
    Read(#[source] sqlx::Error),

    #[error("write failed: {0}")]
    Write(#[source] sqlx::Error),

    /// A conditional write found the row changed since it was read.
    #[error("row was modified concurrently")]
    Conflict,
}

impl RepositoryError {
    pub fn status(&self) -> StatusCode {
        match self {
            RepositoryError::Conflict => StatusCode::CONFLICT,
            RepositoryError::Read(_) | RepositoryError::Write(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<RepositoryError> for (StatusCode, String) {
    fn from(e: RepositoryError) -> Self {
        (e.status(), e.to_string())
    }
}
