use std::fmt;

use thiserror::Error;

/// Failure codes shared by every remote backend.
///
/// The database side mirrors the codes of the hosted collection the mural was
/// first built against; the storage side carries the `storage/` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    PermissionDenied,
    Unauthenticated,
    FailedPrecondition,
    StorageUnauthorized,
    StorageQuotaExceeded,
    NotFound,
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission-denied",
            Self::Unauthenticated => "unauthenticated",
            Self::FailedPrecondition => "failed-precondition",
            Self::StorageUnauthorized => "storage/unauthorized",
            Self::StorageQuotaExceeded => "storage/quota-exceeded",
            Self::NotFound => "not-found",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: ErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

#[derive(Debug, Error)]
#[error("failed to create post: {0}")]
pub struct CreateError(#[from] pub BackendError);

#[derive(Debug, Error)]
#[error("failed to delete post: {0}")]
pub struct DeleteError(#[from] pub BackendError);
