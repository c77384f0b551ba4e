use thiserror::Error;

/// Errors returned by project repository operations.
///
/// The underlying store error is logged where it happens; only its message
/// is carried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("failed to create project: {0}")]
    Creation(String),
    #[error("failed to fetch projects: {0}")]
    Fetch(String),
    #[error("failed to update project: {0}")]
    Update(String),
    #[error("failed to delete project: {0}")]
    Deletion(String),
    #[error("failed to sync sprint counts: {0}")]
    Sync(String),
    #[error("failed to count sprints: {0}")]
    Count(String),
}
