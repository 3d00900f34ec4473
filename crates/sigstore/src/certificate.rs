//! Checks on Fulcio-style signing certificates.

use anyhow::{Context, Result, anyhow};
use const_oid::ObjectIdentifier;
use const_oid::db::rfc5280::{
  ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_CE_SUBJECT_ALT_NAME, ID_KP_CODE_SIGNING,
};
use sigstore::crypto::{CosignVerificationKey, Signature};
use sigverify_core::EngineError;
use sigverify_core::digest::sha256;
use x509_cert::Certificate;
use x509_cert::der::asn1::{OctetString, Utf8StringRef};
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, SubjectAltName};

use crate::tlog::LogKeys;

/// Fulcio OIDC issuer, raw string value (deprecated form).
const OIDC_ISSUER_V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.1");
/// Fulcio OIDC issuer, DER-encoded UTF8String.
const OIDC_ISSUER_V2: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.8");
/// Embedded signed certificate timestamp list (RFC 6962).
const CT_PRECERT_SCTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.2");

#[derive(Debug, Clone)]
struct Authority {
  cert: Certificate,
  key: CosignVerificationKey,
}

/// Certificate authorities from the trusted root, parsed once.
#[derive(Debug, Clone, Default)]
pub(crate) struct Authorities(Vec<Authority>);

impl Authorities {
  pub(crate) fn from_chains(chains: &[Vec<Vec<u8>>]) -> Result<Self> {
    chains
      .iter()
      .flatten()
      .enumerate()
      .map(|(i, der)| {
        let cert = Certificate::from_der(der).with_context(|| format!("certificate [{i}]"))?;
        let spki = cert
          .tbs_certificate
          .subject_public_key_info
          .to_der()
          .with_context(|| format!("certificate [{i}] public key"))?;
        let key = CosignVerificationKey::try_from_der(&spki)
          .map_err(|e| anyhow!("Unsupported certificate authority key [{i}]: {e}"))?;
        Ok(Authority { cert, key })
      })
      .collect::<Result<Vec<_>>>()
      .map(Self)
  }

  pub(crate) fn len(&self) -> usize {
    self.0.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// The trusted certificate whose key signed `leaf`.
  pub(crate) fn issuer_of(&self, leaf: &Certificate) -> Result<&Certificate, EngineError> {
    let tbs = leaf
      .tbs_certificate
      .to_der()
      .map_err(|e| EngineError::rejected(format!("certificate encode: {e}")))?;
    let signature = leaf.signature.raw_bytes();

    self
      .0
      .iter()
      .filter(|ca| ca.cert.tbs_certificate.subject == leaf.tbs_certificate.issuer)
      .find(|ca| {
        ca.key
          .verify_signature(Signature::Raw(signature), &tbs)
          .is_ok()
      })
      .map(|ca| &ca.cert)
      .ok_or_else(|| {
        EngineError::rejected("certificate was not issued by a trusted certificate authority")
      })
  }
}

fn extension<'a>(cert: &'a Certificate, oid: ObjectIdentifier) -> Option<&'a Extension> {
  cert
    .tbs_certificate
    .extensions
    .as_deref()
    .unwrap_or_default()
    .iter()
    .find(|ext| ext.extn_id == oid)
}

/// The certificate must allow digital signatures for code signing.
pub(crate) fn check_code_signing(cert: &Certificate) -> Result<(), EngineError> {
  let key_usage = extension(cert, ID_CE_KEY_USAGE)
    .and_then(|ext| KeyUsage::from_der(ext.extn_value.as_bytes()).ok());
  if !key_usage.is_some_and(|usage| usage.digital_signature()) {
    return Err(EngineError::rejected(
      "certificate key usage does not allow digital signatures",
    ));
  }

  let extended = extension(cert, ID_CE_EXT_KEY_USAGE)
    .and_then(|ext| ExtendedKeyUsage::from_der(ext.extn_value.as_bytes()).ok());
  if !extended.is_some_and(|usage| usage.0.contains(&ID_KP_CODE_SIGNING)) {
    return Err(EngineError::rejected(
      "certificate is not valid for code signing",
    ));
  }
  Ok(())
}

/// The log recorded the signature while the certificate was valid.
pub(crate) fn check_validity(cert: &Certificate, integrated_time: i64) -> Result<(), EngineError> {
  let validity = &cert.tbs_certificate.validity;
  let not_before = validity.not_before.to_unix_duration().as_secs();
  let not_after = validity.not_after.to_unix_duration().as_secs();
  match u64::try_from(integrated_time) {
    Ok(t) if (not_before..=not_after).contains(&t) => Ok(()),
    _ => Err(EngineError::rejected(format!(
      "certificate was not valid at integrated time {integrated_time}"
    ))),
  }
}

/// Number of embedded SCTs that verify against a trusted CT log.
pub(crate) fn verified_scts(
  leaf: &Certificate,
  issuer: &Certificate,
  ct_logs: &LogKeys,
) -> Result<usize, EngineError> {
  let Some(ext) = extension(leaf, CT_PRECERT_SCTS) else {
    return Ok(0);
  };
  let list = OctetString::from_der(ext.extn_value.as_bytes())
    .map_err(|e| EngineError::rejected(format!("SCT list: {e}")))?;
  let scts = parse_sct_list(list.as_bytes())
    .ok_or_else(|| EngineError::rejected("SCT list is malformed"))?;

  let precertificate = precertificate_tbs(leaf)?;
  let issuer_spki = issuer
    .tbs_certificate
    .subject_public_key_info
    .to_der()
    .map_err(|e| EngineError::rejected(format!("issuer public key: {e}")))?;
  let issuer_key_hash = sha256(&issuer_spki);

  let verified = scts
    .iter()
    .filter(|sct| match ct_logs.find(sct.log_id) {
      Some(log) => {
        let signed = sct.signed_data(&issuer_key_hash, &precertificate);
        log.verify(sct.signature, &signed)
      }
      None => {
        tracing::debug!(log_id = %hex::encode(sct.log_id), "SCT from unknown CT log");
        false
      }
    })
    .count();
  tracing::debug!(total = scts.len(), verified, "embedded SCTs checked");
  Ok(verified)
}

/// The TBS certificate the CT log signed: the final one without its SCT list.
fn precertificate_tbs(cert: &Certificate) -> Result<Vec<u8>, EngineError> {
  let mut tbs = cert.tbs_certificate.clone();
  if let Some(extensions) = tbs.extensions.as_mut() {
    extensions.retain(|ext| ext.extn_id != CT_PRECERT_SCTS);
  }
  tbs
    .to_der()
    .map_err(|e| EngineError::rejected(format!("precertificate encode: {e}")))
}

#[derive(Debug)]
struct Sct<'a> {
  log_id: &'a [u8],
  timestamp: u64,
  extensions: &'a [u8],
  signature: &'a [u8],
}

impl Sct<'_> {
  /// RFC 6962 section 3.2 `digitally-signed` input for a precertificate entry.
  fn signed_data(&self, issuer_key_hash: &[u8], tbs: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(47 + tbs.len() + self.extensions.len());
    data.push(0); // v1
    data.push(0); // certificate_timestamp
    data.extend_from_slice(&self.timestamp.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes()); // precert_entry
    data.extend_from_slice(issuer_key_hash);
    data.extend_from_slice(&(tbs.len() as u32).to_be_bytes()[1..]);
    data.extend_from_slice(tbs);
    data.extend_from_slice(&(self.extensions.len() as u16).to_be_bytes());
    data.extend_from_slice(self.extensions);
    data
  }
}

/// TLS-encoded `SignedCertificateTimestampList`. SCTs of unknown versions are
/// skipped.
fn parse_sct_list(data: &[u8]) -> Option<Vec<Sct<'_>>> {
  let mut outer = Reader(data);
  let mut list = Reader(outer.vec16()?);
  if !outer.is_empty() {
    return None;
  }

  let mut scts = Vec::new();
  while !list.is_empty() {
    let mut sct = Reader(list.vec16()?);
    if sct.u8()? != 0 {
      continue;
    }
    let log_id = sct.take(32)?;
    let timestamp = u64::from_be_bytes(sct.take(8)?.try_into().ok()?);
    let extensions = sct.vec16()?;
    let _hash_algorithm = sct.u8()?;
    let _signature_algorithm = sct.u8()?;
    let signature = sct.vec16()?;
    scts.push(Sct {
      log_id,
      timestamp,
      extensions,
      signature,
    });
  }
  Some(scts)
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
  fn take(&mut self, n: usize) -> Option<&'a [u8]> {
    if self.0.len() < n {
      return None;
    }
    let (head, tail) = self.0.split_at(n);
    self.0 = tail;
    Some(head)
  }

  fn u8(&mut self) -> Option<u8> {
    self.take(1).map(|b| b[0])
  }

  fn vec16(&mut self) -> Option<&'a [u8]> {
    let len = self.take(2)?;
    self.take(usize::from(u16::from_be_bytes([len[0], len[1]])))
  }

  fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Extract the SAN identity (email or URI) and the OIDC issuer from a
/// Fulcio-style certificate.
pub fn extract_identity(cert: &Certificate) -> Result<(String, String), EngineError> {
  let san_ext = extension(cert, ID_CE_SUBJECT_ALT_NAME)
    .ok_or_else(|| EngineError::rejected("certificate has no subject alternative name"))?;
  let san = SubjectAltName::from_der(san_ext.extn_value.as_bytes())
    .map_err(|e| EngineError::rejected(format!("certificate SAN: {e}")))?;
  let subject = san
    .0
    .iter()
    .find_map(|name| match name {
      GeneralName::Rfc822Name(email) => Some(email.to_string()),
      GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
      _ => None,
    })
    .ok_or_else(|| EngineError::rejected("no email or URI in certificate SAN"))?;

  let v2 = extension(cert, OIDC_ISSUER_V2)
    .and_then(|ext| Utf8StringRef::from_der(ext.extn_value.as_bytes()).ok())
    .map(|s| s.as_str().to_owned());
  let v1 = || {
    extension(cert, OIDC_ISSUER_V1)
      .and_then(|ext| std::str::from_utf8(ext.extn_value.as_bytes()).ok())
      .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_owned())
  };
  let issuer = v2
    .or_else(v1)
    .ok_or_else(|| EngineError::rejected("certificate has no OIDC issuer extension"))?;

  Ok((subject, issuer))
}
