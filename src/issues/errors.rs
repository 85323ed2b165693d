//! Issue errors

use thiserror::Error;
use uuid::Uuid;

use crate::repository::RepositoryError;

pub type IssueResult<T> = Result<T, IssueError>;

#[derive(Debug, Error)]
pub enum IssueError {
    /// Required field missing or malformed
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Issue {0} not found")]
    NotFound(Uuid),

    /// Caller is neither the owner nor an admin
    #[error("Not authorized to modify this issue")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl IssueError {
    pub fn status_code(&self) -> u16 {
        match self {
            IssueError::Validation(_) => 400,
            IssueError::Forbidden => 403,
            IssueError::NotFound(_) => 404,
            IssueError::Storage(_) => 500,
        }
    }
}
