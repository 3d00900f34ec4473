//! Sigstore bundle verification engine.

use anyhow::Context;
use base64::Engine;
use sigstore::crypto::{CosignVerificationKey, Signature};
use sigverify_core::digest::sha256;
use sigverify_core::{
  CanonicalPublicKey, DecodedBundle, EngineError, IdentityConstraint, KeyConstraint,
  MaterialContent, MessageSignature, PolicyConstraint, ProofRequirements, TrustPolicy,
  VerificationEngine,
};
use x509_cert::Certificate;
use x509_cert::der::{Decode, Encode};

use crate::certificate::{
  Authorities, check_code_signing, check_validity, extract_identity, verified_scts,
};
use crate::tlog::{LogKeys, SignedArtifact, verify_entry};
use crate::trust_root::TrustedRoot;

const SHA2_256: &str = "SHA2_256";

/// Production engine: checks bundles offline against a trusted root.
///
/// The trust material is parsed once here and shared read-only by every
/// verification.
#[derive(Debug, Clone)]
pub struct SigstoreEngine {
  authorities: Authorities,
  tlogs: LogKeys,
  ctlogs: LogKeys,
}

/// The key that produced the signature, with the certificate and its trusted
/// issuer for certificate bundles.
struct Signer<'a> {
  key: CanonicalPublicKey,
  certificate: Option<(Certificate, &'a Certificate)>,
}

#[derive(Debug, Default)]
struct Proofs {
  tlog: usize,
  timestamps: usize,
  scts: usize,
}

impl SigstoreEngine {
  pub fn new(trust_root: &TrustedRoot) -> anyhow::Result<Self> {
    let engine = Self {
      authorities: Authorities::from_chains(&trust_root.certificate_authorities)
        .context("Invalid certificate authority in trusted root")?,
      tlogs: LogKeys::from_spki(&trust_root.tlog_keys)
        .context("Invalid transparency log key in trusted root")?,
      ctlogs: LogKeys::from_spki(&trust_root.ctlog_keys)
        .context("Invalid CT log key in trusted root")?,
    };
    tracing::debug!(
      cas = engine.authorities.len(),
      tlogs = engine.tlogs.len(),
      ctlogs = engine.ctlogs.len(),
      "verification engine ready"
    );
    Ok(engine)
  }

  /// Policies this trusted root cannot satisfy fail before any bundle check.
  fn check_setup(&self, policy: &TrustPolicy) -> Result<(), EngineError> {
    let required = policy.proofs();
    if policy.identity().is_some() && self.authorities.is_empty() {
      return Err(EngineError::setup("trusted root has no certificate authorities"));
    }
    if required.transparency_log > 0 && self.tlogs.is_empty() {
      return Err(EngineError::setup("trusted root has no transparency logs"));
    }
    if policy.identity().is_some()
      && required.signed_certificate_timestamps > 0
      && self.ctlogs.is_empty()
    {
      return Err(EngineError::setup("trusted root has no CT logs"));
    }
    Ok(())
  }

  fn identity_signer(
    &self,
    bundle: &DecodedBundle,
    identity: &IdentityConstraint,
  ) -> Result<Signer<'_>, EngineError> {
    let leaf = leaf_certificate(bundle)?;
    let issuer = self.authorities.issuer_of(&leaf)?;
    check_code_signing(&leaf)?;

    let (subject, oidc_issuer) = extract_identity(&leaf)?;
    if !identity.matches(&oidc_issuer, &subject) {
      return Err(EngineError::rejected(format!(
        "certificate identity mismatch: expected subject {:?} issued by {:?}, found subject {:?} issued by {:?}",
        identity.subject(),
        identity.issuer(),
        subject,
        oidc_issuer
      )));
    }
    tracing::debug!(%subject, issuer = %oidc_issuer, "certificate identity matches");

    let spki = leaf
      .tbs_certificate
      .subject_public_key_info
      .to_der()
      .map_err(|e| EngineError::rejected(format!("certificate public key: {e}")))?;
    let key = CanonicalPublicKey::from_der(&spki)
      .map_err(|e| EngineError::rejected(format!("certificate public key: {e}")))?;
    Ok(Signer {
      key,
      certificate: Some((leaf, issuer)),
    })
  }

  fn count_proofs(
    &self,
    bundle: &DecodedBundle,
    signed: &SignedArtifact<'_>,
    signer: &Signer<'_>,
  ) -> Result<Proofs, EngineError> {
    let mut proofs = Proofs::default();
    for (i, entry) in bundle.tlog_entries().iter().enumerate() {
      let verified = verify_entry(entry, signed, &self.tlogs)
        .map_err(|e| e.context(&format!("transparency log entry {i}")))?;
      proofs.tlog += 1;
      if let Some(time) = verified.integrated_time {
        if let Some((leaf, _)) = &signer.certificate {
          check_validity(leaf, time)?;
        }
        proofs.timestamps += 1;
      }
    }
    if let Some((leaf, issuer)) = &signer.certificate {
      proofs.scts = verified_scts(leaf, issuer, &self.ctlogs)?;
    }
    Ok(proofs)
  }
}

impl VerificationEngine for SigstoreEngine {
  #[tracing::instrument(skip_all, fields(artifact_len = artifact.len(), material = bundle.content().kind_name()))]
  fn verify(
    &self,
    artifact: &[u8],
    bundle: &DecodedBundle,
    policy: &TrustPolicy,
  ) -> Result<(), EngineError> {
    self.check_setup(policy)?;
    let signature = check_signature_shape(artifact, bundle)?;

    let signer = match policy.constraint() {
      PolicyConstraint::Identity(identity) => self.identity_signer(bundle, identity)?,
      PolicyConstraint::Key(constraint) => key_signer(bundle, constraint)?,
    };
    verify_signature(&signer.key, &signature, artifact)?;

    let digest = sha256(artifact);
    let signed = SignedArtifact {
      digest: &digest,
      signature: &signature,
      key: &signer.key,
    };
    let proofs = self.count_proofs(bundle, &signed, &signer)?;
    check_thresholds(&proofs, policy.proofs())
  }
}

fn key_signer<'a>(
  bundle: &DecodedBundle,
  constraint: &KeyConstraint,
) -> Result<Signer<'a>, EngineError> {
  if bundle.content().is_certificate() {
    return Err(EngineError::rejected(
      "bundle is signed with a certificate, expected a public key",
    ));
  }
  Ok(Signer {
    key: signing_key(bundle, &constraint.verification_key),
    certificate: None,
  })
}

/// The key the signature is checked with: the embedded key when it decodes,
/// the caller's key otherwise. Pinning decides whether that key is acceptable.
fn signing_key(bundle: &DecodedBundle, fallback: &CanonicalPublicKey) -> CanonicalPublicKey {
  if let MaterialContent::EmbeddedKey(content) = bundle.content()
    && let Ok(der) = base64::engine::general_purpose::STANDARD.decode(content.trim())
    && let Ok(key) = CanonicalPublicKey::from_der(&der)
  {
    return key;
  }
  fallback.clone()
}

fn verify_signature(
  key: &CanonicalPublicKey,
  signature: &[u8],
  artifact: &[u8],
) -> Result<(), EngineError> {
  let verification_key = CosignVerificationKey::try_from_der(key.as_der())
    .map_err(|e| EngineError::rejected(format!("unsupported verification key: {e}")))?;
  verification_key
    .verify_signature(Signature::Raw(signature), artifact)
    .map_err(|e| EngineError::rejected(format!("signature verification failed: {e}")))?;
  tracing::debug!(fingerprint = %key.fingerprint(), "signature verified");
  Ok(())
}

fn message_signature(bundle: &DecodedBundle) -> Result<&MessageSignature, EngineError> {
  match bundle.message_signature() {
    Some(signature) => Ok(signature),
    None if bundle.has_dsse_envelope() => Err(EngineError::rejected(
      "DSSE envelopes are not supported, expected a message signature",
    )),
    None => Err(EngineError::rejected("bundle has no message signature")),
  }
}

/// The bundle must carry a message signature whose digest, if stated, is the
/// SHA-256 of the artifact. Returns the raw signature bytes.
fn check_signature_shape(artifact: &[u8], bundle: &DecodedBundle) -> Result<Vec<u8>, EngineError> {
  let signature = message_signature(bundle)?;
  if signature.signature.trim().is_empty() {
    return Err(EngineError::rejected("bundle has an empty signature"));
  }

  if let Some(digest) = &signature.digest {
    let algorithm = signature.digest_algorithm.as_deref().unwrap_or_default();
    if algorithm != SHA2_256 {
      return Err(EngineError::rejected(format!(
        "unsupported message digest algorithm {algorithm:?}"
      )));
    }
    if decode_b64("message digest", digest)? != sha256(artifact) {
      return Err(EngineError::rejected(
        "message digest mismatch: artifact does not match bundle",
      ));
    }
  }
  decode_b64("signature", &signature.signature)
}

fn check_thresholds(proofs: &Proofs, required: &ProofRequirements) -> Result<(), EngineError> {
  tracing::debug!(?proofs, ?required, "verified proofs");
  let checks = [
    ("transparency log entries", proofs.tlog, required.transparency_log),
    ("integrated timestamps", proofs.timestamps, required.integrated_timestamps),
    ("signed certificate timestamps", proofs.scts, required.signed_certificate_timestamps),
  ];
  for (what, found, want) in checks {
    if found < want {
      return Err(EngineError::rejected(format!(
        "threshold not met for {what}: {found} < {want}"
      )));
    }
  }
  Ok(())
}

fn leaf_certificate(bundle: &DecodedBundle) -> Result<Certificate, EngineError> {
  let encoded = bundle.content().leaf_certificate().ok_or_else(|| {
    EngineError::rejected(format!(
      "expected a signing certificate, bundle has {}",
      bundle.content().kind_name()
    ))
  })?;
  let der = decode_b64("certificate", encoded)?;
  Certificate::from_der(&der).map_err(|e| EngineError::rejected(format!("certificate parse: {e}")))
}

pub(crate) fn decode_b64(what: &str, value: &str) -> Result<Vec<u8>, EngineError> {
  base64::engine::general_purpose::STANDARD
    .decode(value.trim())
    .map_err(|e| EngineError::rejected(format!("{what} decode: {e}")))
}
