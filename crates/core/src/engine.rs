//! The cryptographic verification engine seam.

use std::sync::Arc;

use crate::bundle::DecodedBundle;
use crate::error::EngineError;
use crate::policy::TrustPolicy;

/// Checks signatures, certificate chains, transparency-log and timestamp
/// proofs of a bundle under a [`TrustPolicy`].
///
/// Implementations must be stateless per call apart from read-only trust
/// material, so one engine can serve concurrent callers.
pub trait VerificationEngine: Send + Sync {
    fn verify(
        &self,
        artifact: &[u8],
        bundle: &DecodedBundle,
        policy: &TrustPolicy,
    ) -> Result<(), EngineError>;
}

impl<E: VerificationEngine + ?Sized> VerificationEngine for &E {
    fn verify(
        &self,
        artifact: &[u8],
        bundle: &DecodedBundle,
        policy: &TrustPolicy,
    ) -> Result<(), EngineError> {
        (**self).verify(artifact, bundle, policy)
    }
}

impl<E: VerificationEngine + ?Sized> VerificationEngine for Box<E> {
    fn verify(
        &self,
        artifact: &[u8],
        bundle: &DecodedBundle,
        policy: &TrustPolicy,
    ) -> Result<(), EngineError> {
        (**self).verify(artifact, bundle, policy)
    }
}

impl<E: VerificationEngine + ?Sized> VerificationEngine for Arc<E> {
    fn verify(
        &self,
        artifact: &[u8],
        bundle: &DecodedBundle,
        policy: &TrustPolicy,
    ) -> Result<(), EngineError> {
        (**self).verify(artifact, bundle, policy)
    }
}
