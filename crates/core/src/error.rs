//! Error types and the failure taxonomy reported across the host boundary.

use serde::{Deserialize, Serialize};

/// Stable failure classification carried by every failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Wrong call shape: arity, argument type, or an empty required string.
    UsageError,
    /// The bundle is not well-formed JSON of the expected shape.
    BundleDecodeError,
    /// Trust-root or verifier setup failed.
    PolicyConstructionError,
    /// The verification engine rejected the bundle under the given policy.
    VerificationFailed,
    /// The caller-supplied key could not be normalized.
    InvalidPublicKey,
    /// The bundle's embedded key differs from the caller's key.
    KeyMismatch,
    /// The bundle's key hint differs from the caller's key fingerprint.
    HintMismatch,
    /// The bundle's embedded key is not valid base64.
    MalformedEmbeddedKey,
    /// The bundle carries neither an embedded key nor a key hint.
    NoPinnableMaterial,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UsageError => "UsageError",
            FailureKind::BundleDecodeError => "BundleDecodeError",
            FailureKind::PolicyConstructionError => "PolicyConstructionError",
            FailureKind::VerificationFailed => "VerificationFailed",
            FailureKind::InvalidPublicKey => "InvalidPublicKey",
            FailureKind::KeyMismatch => "KeyMismatch",
            FailureKind::HintMismatch => "HintMismatch",
            FailureKind::MalformedEmbeddedKey => "MalformedEmbeddedKey",
            FailureKind::NoPinnableMaterial => "NoPinnableMaterial",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from normalizing caller-supplied key material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// No armored block was found.
    #[error("no PEM block found")]
    NoKeyMaterial,

    /// More than one armored block was found.
    #[error("expected exactly one PEM block, found {0}")]
    AmbiguousKeyMaterial(usize),

    /// An armored block is structurally broken.
    #[error("malformed PEM: {0}")]
    MalformedArmor(String),

    /// The block is neither a PKIX key, a PKCS#1 RSA key, nor a certificate
    /// with a supported key.
    #[error("unsupported PEM type `{0}`")]
    UnsupportedKeyFormat(String),
}

/// Errors from decoding the bundle wire format.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("bundle is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bundle must be a JSON object")]
    NotAnObject,
}

/// Key pinning failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinError {
    #[error("bundle publicKey decode: {0}")]
    MalformedEmbeddedKey(String),

    #[error("public key mismatch: bundle key != expected key")]
    KeyMismatch,

    #[error("key hint mismatch: bundle hint `{hint}` != expected fingerprint {expected}")]
    HintMismatch { hint: String, expected: String },

    #[error("bundle has no public key material to pin")]
    NoPinnableMaterial,
}

impl PinError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PinError::MalformedEmbeddedKey(_) => FailureKind::MalformedEmbeddedKey,
            PinError::KeyMismatch => FailureKind::KeyMismatch,
            PinError::HintMismatch { .. } => FailureKind::HintMismatch,
            PinError::NoPinnableMaterial => FailureKind::NoPinnableMaterial,
        }
    }
}

/// Errors reported by a [`crate::engine::VerificationEngine`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The bundle failed cryptographic or policy verification.
    #[error("{0}")]
    Rejected(String),

    /// The engine could not be set up (trust root, verifier construction).
    #[error("new verifier: {0}")]
    Setup(String),
}

impl EngineError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        EngineError::Rejected(msg.into())
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        EngineError::Setup(msg.into())
    }

    /// Prefix a rejection message, leaving setup failures untouched.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            EngineError::Rejected(msg) => EngineError::Rejected(format!("{prefix}: {msg}")),
            setup => setup,
        }
    }
}

/// Any failure of a single verification call.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("issuer and subject are required")]
    MissingIdentity,

    #[error("bundle decode: {0}")]
    BundleDecode(#[from] BundleError),

    #[error("public key: {0}")]
    InvalidPublicKey(#[from] KeyError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Pin(#[from] PinError),
}

impl VerifyError {
    pub fn kind(&self) -> FailureKind {
        match self {
            VerifyError::MissingIdentity => FailureKind::UsageError,
            VerifyError::BundleDecode(_) => FailureKind::BundleDecodeError,
            VerifyError::InvalidPublicKey(_) => FailureKind::InvalidPublicKey,
            VerifyError::Engine(EngineError::Rejected(_)) => FailureKind::VerificationFailed,
            VerifyError::Engine(EngineError::Setup(_)) => FailureKind::PolicyConstructionError,
            VerifyError::Pin(e) => e.kind(),
        }
    }
}
