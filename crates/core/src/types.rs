//! Verification results.

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, VerifyError};

/// Outcome of one verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Success,
    Failure { kind: FailureKind, message: String },
}

impl VerificationResult {
    /// A failure. An empty message is replaced by the kind's name so the
    /// host never sees `ok: false` without an error string.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = kind.as_str().to_owned();
        }
        VerificationResult::Failure { kind, message }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, VerificationResult::Success)
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            VerificationResult::Success => None,
            VerificationResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            VerificationResult::Success => None,
            VerificationResult::Failure { message, .. } => Some(message),
        }
    }

    /// The two-field `{ok, error}` shape handed back to the host.
    pub fn into_boundary(self) -> BoundaryResult {
        match self {
            VerificationResult::Success => BoundaryResult {
                ok: true,
                error: None,
            },
            VerificationResult::Failure { message, .. } => BoundaryResult {
                ok: false,
                error: Some(message),
            },
        }
    }
}

impl From<Result<(), VerifyError>> for VerificationResult {
    fn from(result: Result<(), VerifyError>) -> Self {
        match result {
            Ok(()) => VerificationResult::Success,
            Err(e) => VerificationResult::failure(e.kind(), e.to_string()),
        }
    }
}

/// Result crossing the host boundary. `error` is present iff `ok` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
