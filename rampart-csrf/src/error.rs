use crate::verdict::RejectReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrfError {
    /// A token failed validation; carries the diagnostic reason
    #[error("CSRF validation failed ({0})")]
    Rejected(RejectReason),

    /// The signing key could not be loaded. Never contains key material.
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Key rotation is disabled (rotation grace period is zero)")]
    RotationDisabled,

    #[error("Invalid CSRF configuration: {0}")]
    Config(String),

    #[error("Revocation store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl CsrfError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn key_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::KeyUnavailable(msg.into())
    }

    /// The rejection reason, if this error is a validation failure
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<RejectReason> for CsrfError {
    fn from(reason: RejectReason) -> Self {
        Self::Rejected(reason)
    }
}

impl From<CsrfError> for rampart_core::Error {
    fn from(err: CsrfError) -> Self {
        match err {
            CsrfError::Rejected(_) => {
                rampart_core::Error::Forbidden("CSRF validation failed".to_string())
            }
            CsrfError::KeyUnavailable(_) => {
                rampart_core::Error::ServiceUnavailable("CSRF protection unavailable".to_string())
            }
            other => rampart_core::Error::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CsrfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_maps_to_forbidden() {
        let err: rampart_core::Error = CsrfError::Rejected(RejectReason::Mismatch).into();
        assert_eq!(err.status_code(), 403);
        assert!(!err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_key_unavailable_maps_to_service_unavailable() {
        let err: rampart_core::Error = CsrfError::key_unavailable("env CSRF_KEY not set").into();
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_reject_reason_accessor() {
        assert_eq!(
            CsrfError::from(RejectReason::Expired).reject_reason(),
            Some(RejectReason::Expired)
        );
        assert_eq!(CsrfError::RotationDisabled.reject_reason(), None);
    }
}
