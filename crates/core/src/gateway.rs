//! The two verification entry points.
//!
//! Each call runs `decode bundle -> build policy -> engine -> [pin key]` and
//! stops at the first failure. Nothing is cached between calls; the only
//! shared state is the engine's read-only trust material.

use crate::bundle::DecodedBundle;
use crate::engine::VerificationEngine;
use crate::error::VerifyError;
use crate::key::normalize;
use crate::pinning::pin;
use crate::policy::{IdentityConstraint, PolicyBuilder, ProofRequirements, VerificationMode};
use crate::types::VerificationResult;

/// Gateway configuration. Fixed once the gateway is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Proofs required of certificate-identity bundles.
    pub identity_proofs: ProofRequirements,
    /// Proofs required of key-signed bundles.
    pub key_proofs: ProofRequirements,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            identity_proofs: ProofRequirements::STRICT,
            key_proofs: ProofRequirements::RELAXED,
        }
    }
}

/// Verifies artifacts against bundles with an injected engine.
#[derive(Debug)]
pub struct Gateway<E> {
    engine: E,
    policies: PolicyBuilder,
}

impl<E: VerificationEngine> Gateway<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, GatewayConfig::default())
    }

    pub fn with_config(engine: E, config: GatewayConfig) -> Self {
        Self {
            engine,
            policies: PolicyBuilder {
                strict: config.identity_proofs,
                relaxed: config.key_proofs,
            },
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Verify that `artifact` was signed by a certificate issued to exactly
    /// `subject` by `issuer`.
    #[tracing::instrument(
        skip(self, artifact, bundle_json),
        fields(artifact_len = artifact.len(), bundle_len = bundle_json.len())
    )]
    pub fn verify_by_identity(
        &self,
        artifact: &[u8],
        issuer: &str,
        subject: &str,
        bundle_json: &[u8],
    ) -> VerificationResult {
        let result = self.try_verify_by_identity(artifact, issuer, subject, bundle_json);
        report(result.into())
    }

    /// Verify that `artifact` was signed by the key in `public_key_pem`.
    ///
    /// Engine success alone is never enough: the bundle's key must also pin
    /// to the caller's key.
    #[tracing::instrument(
        skip(self, artifact, public_key_pem, bundle_json),
        fields(artifact_len = artifact.len(), bundle_len = bundle_json.len())
    )]
    pub fn verify_by_key(
        &self,
        artifact: &[u8],
        public_key_pem: &str,
        bundle_json: &[u8],
    ) -> VerificationResult {
        let result = self.try_verify_by_key(artifact, public_key_pem, bundle_json);
        report(result.into())
    }

    fn try_verify_by_identity(
        &self,
        artifact: &[u8],
        issuer: &str,
        subject: &str,
        bundle_json: &[u8],
    ) -> Result<(), VerifyError> {
        let identity = IdentityConstraint::new(issuer, subject)?;
        let bundle = DecodedBundle::decode(bundle_json)?;
        let policy = self.policies.build(VerificationMode::Identity(identity), true);

        self.engine.verify(artifact, &bundle, &policy)?;
        tracing::debug!("engine accepted identity bundle");
        Ok(())
    }

    fn try_verify_by_key(
        &self,
        artifact: &[u8],
        public_key_pem: &str,
        bundle_json: &[u8],
    ) -> Result<(), VerifyError> {
        let want = normalize(public_key_pem.as_bytes())?;
        let bundle = DecodedBundle::decode(bundle_json)?;
        let policy = self.policies.build(VerificationMode::Key(want.clone()), false);

        self.engine
            .verify(artifact, &bundle, &policy)
            .map_err(|e| e.context("verify"))?;
        tracing::debug!("engine accepted key bundle");

        let pinned = pin(&bundle, &want)?;
        tracing::debug!(?pinned, fingerprint = %want.fingerprint(), "signing key pinned");
        Ok(())
    }
}

fn report(result: VerificationResult) -> VerificationResult {
    match &result {
        VerificationResult::Success => tracing::info!("verification succeeded"),
        VerificationResult::Failure { kind, message } => {
            tracing::warn!(%kind, error = %message, "verification failed")
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, FailureKind};
    use crate::policy::{PolicyConstraint, TrustPolicy};
    use base64::Engine;
    use std::sync::Mutex;

    const ARTIFACT: &[u8] = b"hello";
    const ISSUER: &str = "https://token.actions.githubusercontent.com";
    const SUBJECT: &str = "repo:org/repo:ref:refs/heads/main";

    const EC_PUB_PEM: &str = include_str!("../../../testdata/ec_p256_pub.pem");
    const EC_CERT_PEM: &str = include_str!("../../../testdata/ec_p256_cert.pem");
    const OTHER_PUB_PEM: &str = include_str!("../../../testdata/other_p256_pub.pem");
    const RSA_PKCS1_PEM: &str = include_str!("../../../testdata/rsa_pkcs1_pub.pem");
    const RSA_PKIX_DER: &[u8] = include_bytes!("../../../testdata/rsa_pkix_pub.der");
    const HINT_BUNDLE: &[u8] = include_bytes!("../../../testdata/key_hint_bundle.json");
    const EMBEDDED_BUNDLE: &[u8] = include_bytes!("../../../testdata/key_embedded_bundle.json");
    const SUBSTITUTED_BUNDLE: &[u8] =
        include_bytes!("../../../testdata/key_substituted_bundle.json");
    const UNPINNED_BUNDLE: &[u8] = include_bytes!("../../../testdata/key_unpinned_bundle.json");
    const IDENTITY_BUNDLE: &[u8] = include_bytes!("../../../testdata/identity_bundle.json");

    /// Accepts every bundle and records the policies it was asked to enforce.
    #[derive(Default)]
    struct RecordingEngine {
        policies: Mutex<Vec<TrustPolicy>>,
    }

    impl VerificationEngine for RecordingEngine {
        fn verify(
            &self,
            _artifact: &[u8],
            _bundle: &DecodedBundle,
            policy: &TrustPolicy,
        ) -> Result<(), EngineError> {
            self.policies.lock().unwrap().push(policy.clone());
            Ok(())
        }
    }

    /// Accepts identity bundles for one subject only, like an exact-match engine.
    struct SubjectEngine(&'static str);

    impl VerificationEngine for SubjectEngine {
        fn verify(
            &self,
            _artifact: &[u8],
            _bundle: &DecodedBundle,
            policy: &TrustPolicy,
        ) -> Result<(), EngineError> {
            match policy.identity() {
                Some(id) if id.subject() == self.0 => Ok(()),
                Some(id) => Err(EngineError::rejected(format!(
                    "certificate identity mismatch: expected {}, found {}",
                    id.subject(),
                    self.0
                ))),
                None => Err(EngineError::rejected("expected identity policy")),
            }
        }
    }

    struct FailingEngine(EngineError);

    impl VerificationEngine for FailingEngine {
        fn verify(
            &self,
            _artifact: &[u8],
            _bundle: &DecodedBundle,
            _policy: &TrustPolicy,
        ) -> Result<(), EngineError> {
            Err(self.0.clone())
        }
    }

    fn embedded_bundle(der: &[u8]) -> Vec<u8> {
        let b64 = base64::engine::general_purpose::STANDARD.encode(der);
        serde_json::json!({
            "verificationMaterial": { "publicKey": { "content": b64 } },
            "messageSignature": { "signature": "" }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn identity_success_uses_strict_exact_policy() {
        let gateway = Gateway::new(RecordingEngine::default());
        let result = gateway.verify_by_identity(ARTIFACT, ISSUER, SUBJECT, IDENTITY_BUNDLE);
        assert_eq!(result, VerificationResult::Success);

        let policies = gateway.engine().policies.lock().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].proofs(), &ProofRequirements::STRICT);
        let id = policies[0].identity().expect("identity constraint");
        assert_eq!(id.issuer(), ISSUER);
        assert_eq!(id.subject(), SUBJECT);
    }

    #[test]
    fn identity_subject_mismatch_fails() {
        let gateway = Gateway::new(SubjectEngine(SUBJECT));
        assert!(gateway
            .verify_by_identity(ARTIFACT, ISSUER, SUBJECT, IDENTITY_BUNDLE)
            .is_ok());

        let result = gateway.verify_by_identity(
            ARTIFACT,
            ISSUER,
            "repo:org/repo:ref:refs/heads/dev",
            IDENTITY_BUNDLE,
        );
        assert_eq!(result.kind(), Some(FailureKind::VerificationFailed));
        assert!(result.message().unwrap().contains("identity"));
    }

    #[test]
    fn identity_requires_issuer_and_subject() {
        let gateway = Gateway::new(RecordingEngine::default());
        for (issuer, subject) in [("", SUBJECT), (ISSUER, "")] {
            let result = gateway.verify_by_identity(ARTIFACT, issuer, subject, IDENTITY_BUNDLE);
            assert_eq!(result.kind(), Some(FailureKind::UsageError));
        }
        assert!(gateway.engine().policies.lock().unwrap().is_empty());
    }

    #[test]
    fn truncated_bundle_is_decode_error() {
        let gateway = Gateway::new(RecordingEngine::default());
        let truncated = &IDENTITY_BUNDLE[..IDENTITY_BUNDLE.len() / 3];

        let result = gateway.verify_by_identity(ARTIFACT, ISSUER, SUBJECT, truncated);
        assert_eq!(result.kind(), Some(FailureKind::BundleDecodeError));

        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, truncated);
        assert_eq!(result.kind(), Some(FailureKind::BundleDecodeError));
    }

    #[test]
    fn engine_message_passes_through() {
        let gateway = Gateway::new(FailingEngine(EngineError::rejected(
            "transparency log entry not found",
        )));
        let result = gateway.verify_by_identity(ARTIFACT, ISSUER, SUBJECT, IDENTITY_BUNDLE);
        assert_eq!(
            result,
            VerificationResult::failure(
                FailureKind::VerificationFailed,
                "transparency log entry not found"
            )
        );

        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, HINT_BUNDLE);
        assert_eq!(
            result,
            VerificationResult::failure(
                FailureKind::VerificationFailed,
                "verify: transparency log entry not found"
            )
        );
    }

    #[test]
    fn empty_engine_message_still_reports_an_error() {
        let gateway = Gateway::new(FailingEngine(EngineError::rejected("")));
        let boundary = gateway
            .verify_by_identity(ARTIFACT, ISSUER, SUBJECT, IDENTITY_BUNDLE)
            .into_boundary();
        assert!(!boundary.ok);
        assert_eq!(boundary.error.as_deref(), Some("VerificationFailed"));

        let boundary = gateway
            .verify_by_key(ARTIFACT, EC_PUB_PEM, HINT_BUNDLE)
            .into_boundary();
        assert!(!boundary.error.unwrap().is_empty());
    }

    #[test]
    fn engine_setup_failure_is_policy_construction_error() {
        let gateway = Gateway::new(FailingEngine(EngineError::setup("empty trusted root")));
        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, HINT_BUNDLE);
        assert_eq!(result.kind(), Some(FailureKind::PolicyConstructionError));
    }

    #[test]
    fn key_mode_uses_relaxed_key_policy() {
        let gateway = Gateway::new(RecordingEngine::default());
        assert!(gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, HINT_BUNDLE).is_ok());

        let policies = gateway.engine().policies.lock().unwrap();
        assert_eq!(policies[0].proofs(), &ProofRequirements::RELAXED);
        assert!(matches!(policies[0].constraint(), PolicyConstraint::Key(_)));
    }

    #[test]
    fn invalid_public_key_is_rejected_before_engine() {
        let gateway = Gateway::new(RecordingEngine::default());
        for pem in ["", "not a key", "-----BEGIN PUBLIC KEY-----\nAAEC\n-----END PUBLIC KEY-----\n"] {
            let result = gateway.verify_by_key(ARTIFACT, pem, HINT_BUNDLE);
            assert_eq!(result.kind(), Some(FailureKind::InvalidPublicKey), "{pem:?}");
        }
        assert!(gateway.engine().policies.lock().unwrap().is_empty());
    }

    #[test]
    fn embedded_key_pins_for_every_input_format() {
        let gateway = Gateway::new(RecordingEngine::default());

        // EC key embedded; caller supplies PKIX key or certificate.
        for pem in [EC_PUB_PEM, EC_CERT_PEM] {
            assert!(gateway.verify_by_key(ARTIFACT, pem, EMBEDDED_BUNDLE).is_ok());
        }

        // RSA key embedded as PKIX; caller supplies PKCS#1.
        let bundle = embedded_bundle(RSA_PKIX_DER);
        assert!(gateway.verify_by_key(ARTIFACT, RSA_PKCS1_PEM, &bundle).is_ok());
    }

    #[test]
    fn hint_pins_caller_key() {
        let gateway = Gateway::new(RecordingEngine::default());
        assert!(gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, HINT_BUNDLE).is_ok());
        assert!(gateway.verify_by_key(ARTIFACT, EC_CERT_PEM, HINT_BUNDLE).is_ok());

        let result = gateway.verify_by_key(ARTIFACT, OTHER_PUB_PEM, HINT_BUNDLE);
        assert_eq!(result.kind(), Some(FailureKind::HintMismatch));
    }

    #[test]
    fn substituted_signer_key_is_key_mismatch() {
        // The engine accepts the bundle; pinning alone must catch the swap.
        let gateway = Gateway::new(RecordingEngine::default());
        assert!(gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, EMBEDDED_BUNDLE).is_ok());

        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, SUBSTITUTED_BUNDLE);
        assert_eq!(result.kind(), Some(FailureKind::KeyMismatch));
    }

    #[test]
    fn unpinned_bundle_never_succeeds() {
        let gateway = Gateway::new(RecordingEngine::default());
        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, UNPINNED_BUNDLE);
        assert_eq!(result.kind(), Some(FailureKind::NoPinnableMaterial));

        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, IDENTITY_BUNDLE);
        assert_eq!(result.kind(), Some(FailureKind::NoPinnableMaterial));
    }

    #[test]
    fn malformed_embedded_key_reported() {
        let gateway = Gateway::new(RecordingEngine::default());
        let bundle = br#"{"verificationMaterial":{"publicKey":{"content":"***"}}}"#;
        let result = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, bundle);
        assert_eq!(result.kind(), Some(FailureKind::MalformedEmbeddedKey));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let gateway = Gateway::new(SubjectEngine(SUBJECT));
        for _ in 0..2 {
            assert_eq!(
                gateway.verify_by_identity(ARTIFACT, ISSUER, "someone-else", IDENTITY_BUNDLE),
                gateway.verify_by_identity(ARTIFACT, ISSUER, "someone-else", IDENTITY_BUNDLE)
            );
        }

        let gateway = Gateway::new(RecordingEngine::default());
        let first = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, SUBSTITUTED_BUNDLE);
        let second = gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, SUBSTITUTED_BUNDLE);
        assert_eq!(first, second);
    }

    #[test]
    fn configured_key_proofs_reach_engine() {
        let config = GatewayConfig {
            key_proofs: ProofRequirements {
                transparency_log: 0,
                integrated_timestamps: 0,
                signed_certificate_timestamps: 0,
            },
            ..GatewayConfig::default()
        };
        let gateway = Gateway::with_config(RecordingEngine::default(), config);
        assert!(gateway.verify_by_key(ARTIFACT, EC_PUB_PEM, HINT_BUNDLE).is_ok());
        let policies = gateway.engine().policies.lock().unwrap();
        assert_eq!(policies[0].proofs(), &config.key_proofs);
    }
}
