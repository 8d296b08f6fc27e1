use crate::error::{BackendError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Ineligible,
}

/// Decides whether a remote failure should move the store to local mode.
///
/// Only permission and availability failures qualify. The set is tied to the
/// backends' error taxonomy: a new backend has to map its own failures onto
/// these codes in its adapter.
pub fn classify(err: &BackendError) -> Verdict {
    match err.code {
        ErrorCode::PermissionDenied
        | ErrorCode::Unauthenticated
        | ErrorCode::FailedPrecondition
        | ErrorCode::StorageUnauthorized
        | ErrorCode::StorageQuotaExceeded => Verdict::Eligible,
        ErrorCode::NotFound | ErrorCode::Unavailable | ErrorCode::Internal => Verdict::Ineligible,
    }
}

pub fn is_eligible(err: &BackendError) -> bool {
    classify(err) == Verdict::Eligible
}
