//! Validation outcomes
//!
//! A [`Verdict`] is produced and consumed within a single request. The
//! [`RejectReason`] codes are stable and appear in rejection response bodies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    MissingCookie,
    MissingHeader,
    Mismatch,
    BadSignature,
    Expired,
    Revoked,
}

impl RejectReason {
    pub const ALL: [RejectReason; 6] = [
        RejectReason::MissingCookie,
        RejectReason::MissingHeader,
        RejectReason::Mismatch,
        RejectReason::BadSignature,
        RejectReason::Expired,
        RejectReason::Revoked,
    ];

    /// Stable, documented reason code
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingCookie => "missing-cookie",
            RejectReason::MissingHeader => "missing-header",
            RejectReason::Mismatch => "mismatch",
            RejectReason::BadSignature => "bad-signature",
            RejectReason::Expired => "expired",
            RejectReason::Revoked => "revoked",
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RejectReason::MissingCookie | RejectReason::MissingHeader | RejectReason::Mismatch => {
                FailureKind::MalformedInput
            }
            RejectReason::BadSignature => FailureKind::CryptographicFailure,
            RejectReason::Expired => FailureKind::Expiry,
            RejectReason::Revoked => FailureKind::Revocation,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failure taxonomy used for diagnostics. Every kind is recoverable at the
/// request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    MalformedInput,
    CryptographicFailure,
    Expiry,
    Revocation,
    /// An unsafe request was exempted by bypass policy and so never
    /// validated. No [`RejectReason`] maps here; the middleware decides
    /// bypass before validation runs.
    PolicyBypassMiss,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MalformedInput => "malformed-input",
            FailureKind::CryptographicFailure => "cryptographic-failure",
            FailureKind::Expiry => "expiry",
            FailureKind::Revocation => "revocation",
            FailureKind::PolicyBypassMiss => "policy-bypass-miss",
        }
    }
}

/// Result of validating one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, Verdict::Reject(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Verdict::Accept => None,
            Verdict::Reject(reason) => Some(*reason),
        }
    }
}

impl From<RejectReason> for Verdict {
    fn from(reason: RejectReason) -> Self {
        Verdict::Reject(reason)
    }
}
