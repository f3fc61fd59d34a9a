// Error taxonomy, one enum per layer
// Lower layers are re-classified at each boundary; only ServiceError reaches callers.

use thiserror::Error;

/// Token codec failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidToken,
}

/// Session store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,
    #[error("duplicate session token")]
    DuplicateToken,
    #[error("session store is full")]
    StorageFull,
    /// Fault in the underlying storage engine; considered transient
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a single internal retry is worth attempting
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Session issuer failures, already re-classified from store and codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("session not found")]
    NotFound,
    #[error("invalid token")]
    InvalidToken,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for IssueError {
    fn from(_: TokenError) -> Self {
        IssueError::InvalidToken
    }
}

impl From<StoreError> for IssueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => IssueError::NotFound,
            other => IssueError::Internal(other.to_string()),
        }
    }
}

/// Errors visible to callers of the service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("too many session requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("session not found")]
    NotFound,
    #[error("internal error")]
    Internal,
}

impl ServiceError {
    /// Stable error kind reported on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "invalid_argument",
            ServiceError::RateLimited { .. } => "rate_limited",
            ServiceError::NotFound => "not_found",
            ServiceError::Internal => "internal",
        }
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ServiceError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}
