// Error taxonomy shared by the store, auth and HTTP layers.
//
// Library plumbing (db, auth, import) stays on anyhow::Result. This enum is
// what crosses the request boundary, so every variant maps to exactly one
// HTTP outcome in the api module.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    /// Store unreachable, query failed, row could not be decoded.
    /// Reported to callers as a generic failure; the cause is only logged.
    #[error("data access failure: {0}")]
    Store(#[from] anyhow::Error),

    /// Authenticated, but asking for more than the role allows.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No valid session for the request.
    #[error("authentication required")]
    Unauthenticated,
}

impl PortalError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        PortalError::Forbidden(reason.into())
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PortalError::Store(_) => "store_error",
            PortalError::Forbidden(_) => "forbidden",
            PortalError::Unauthenticated => "unauthenticated",
        }
    }
}

impl From<rusqlite::Error> for PortalError {
    fn from(err: rusqlite::Error) -> Self {
        PortalError::Store(err.into())
    }
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;
