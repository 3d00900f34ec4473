//! Core Sigstore bundle verification: key normalization, bundle decoding,
//! trust policy construction and key pinning.
//!
//! Cryptographic checks are delegated to a [`VerificationEngine`]; this crate
//! has no network, CLI or trust-root dependencies.

pub mod armor;
pub mod boundary;
pub mod bundle;
pub mod digest;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod key;
pub mod pinning;
pub mod policy;
pub mod types;

pub use boundary::{EntryPoint, HostValue};
pub use bundle::{DecodedBundle, InclusionProof, MaterialContent, MessageSignature, TlogEntry};
pub use engine::VerificationEngine;
pub use error::{EngineError, FailureKind, KeyError, PinError, VerifyError};
pub use gateway::{Gateway, GatewayConfig};
pub use key::{CanonicalPublicKey, normalize};
pub use pinning::{Pinned, pin};
pub use policy::{
    IdentityConstraint, KeyConstraint, PolicyBuilder, PolicyConstraint, ProofRequirements,
    TrustPolicy, VerificationMode, build_policy,
};
pub use types::{BoundaryResult, VerificationResult};
