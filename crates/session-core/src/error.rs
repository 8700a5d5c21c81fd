//! Session errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Absent, expired or malformed. Callers cannot tell which.
    #[error("Session not found")]
    NotFound,

    /// Transport failure or deadline expiry. Not the same as being logged out.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// Duplicate session id.
    #[error("Session conflict: {0}")]
    Conflict(String),
}

impl SessionError {
    /// What the HTTP layer should treat as "not logged in".
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, SessionError::NotFound | SessionError::StoreUnavailable(_))
    }

    /// Worth retrying or alerting on.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SessionError::NotFound.is_unauthenticated());
        assert!(!SessionError::NotFound.is_transient());

        let down = SessionError::StoreUnavailable("connection refused".into());
        assert!(down.is_unauthenticated());
        assert!(down.is_transient());

        let conflict = SessionError::Conflict("dup".into());
        assert!(!conflict.is_unauthenticated());
        assert!(!conflict.is_transient());
    }
}
