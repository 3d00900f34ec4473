//! Public-key normalization into canonical SubjectPublicKeyInfo DER.
//!
//! Callers may hand us a PKIX `PUBLIC KEY`, a PKCS#1 `RSA PUBLIC KEY`, or a
//! `CERTIFICATE`. Every form is reduced to the same SPKI DER encoding so the
//! pinning matcher can compare keys byte-for-byte.

use const_oid::ObjectIdentifier;
use const_oid::db::{rfc5912, rfc8410};
use x509_cert::Certificate;
use x509_cert::der::asn1::BitString;
use x509_cert::der::{Any, Decode, Encode, Tag};
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::armor::find_blocks;
use crate::digest::sha256_hex;
use crate::error::KeyError;

/// Key algorithms the verification engine can check signatures with.
const SUPPORTED_ALGORITHMS: &[ObjectIdentifier] = &[
    rfc5912::RSA_ENCRYPTION,
    rfc5912::ID_EC_PUBLIC_KEY,
    rfc8410::ID_ED_25519,
];

/// A public key in SubjectPublicKeyInfo DER form.
///
/// Two keys are equal iff their DER bytes are identical.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPublicKey(Vec<u8>);

impl CanonicalPublicKey {
    /// Normalize raw SPKI DER (e.g. a key embedded in a bundle).
    pub fn from_der(der: &[u8]) -> Result<Self, KeyError> {
        parse_pkix(der).ok_or_else(|| KeyError::UnsupportedKeyFormat("DER".to_owned()))
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex SHA-256 of the SPKI DER bytes.
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.0)
    }
}

impl std::fmt::Debug for CanonicalPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CanonicalPublicKey")
            .field(&self.fingerprint())
            .finish()
    }
}

impl AsRef<[u8]> for CanonicalPublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

type KeyParser = fn(&[u8]) -> Option<CanonicalPublicKey>;

/// Parsers tried in priority order; the first success wins.
const PARSERS: &[(&str, KeyParser)] = &[
    ("pkix", parse_pkix),
    ("pkcs1", parse_pkcs1_rsa),
    ("certificate", parse_certificate),
];

/// Decode an ASCII-armored key or certificate into its canonical SPKI DER.
///
/// The input must contain exactly one armored block.
#[tracing::instrument(skip(armored), fields(armored_len = armored.len()))]
pub fn normalize(armored: &[u8]) -> Result<CanonicalPublicKey, KeyError> {
    let blocks = find_blocks(armored)?;
    let block = match blocks.as_slice() {
        [] => return Err(KeyError::NoKeyMaterial),
        [block] => block,
        many => return Err(KeyError::AmbiguousKeyMaterial(many.len())),
    };
    let der = block.decode()?;

    for (format, parse) in PARSERS {
        if let Some(key) = parse(&der) {
            tracing::debug!(label = block.label, format, "normalized public key");
            return Ok(key);
        }
    }

    Err(KeyError::UnsupportedKeyFormat(block.label.to_owned()))
}

fn canonicalize(spki: &SubjectPublicKeyInfoOwned) -> Option<CanonicalPublicKey> {
    if !SUPPORTED_ALGORITHMS.contains(&spki.algorithm.oid) {
        tracing::debug!(oid = %spki.algorithm.oid, "unsupported key algorithm");
        return None;
    }
    spki.to_der().ok().map(CanonicalPublicKey)
}

fn parse_pkix(der: &[u8]) -> Option<CanonicalPublicKey> {
    let spki = SubjectPublicKeyInfoOwned::from_der(der).ok()?;
    canonicalize(&spki)
}

fn parse_pkcs1_rsa(der: &[u8]) -> Option<CanonicalPublicKey> {
    let rsa = pkcs1::RsaPublicKey::from_der(der).ok()?;
    let rsa_der = rsa.to_der().ok()?;
    let spki = SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: rfc5912::RSA_ENCRYPTION,
            parameters: Some(Any::new(Tag::Null, Vec::<u8>::new()).ok()?),
        },
        subject_public_key: BitString::from_bytes(&rsa_der).ok()?,
    };
    canonicalize(&spki)
}

fn parse_certificate(der: &[u8]) -> Option<CanonicalPublicKey> {
    let cert = Certificate::from_der(der).ok()?;
    canonicalize(&cert.tbs_certificate.subject_public_key_info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EC_PUB_PEM: &str = include_str!("../../../testdata/ec_p256_pub.pem");
    const EC_PUB_DER: &[u8] = include_bytes!("../../../testdata/ec_p256_pub.der");
    const EC_CERT_PEM: &str = include_str!("../../../testdata/ec_p256_cert.pem");
    const EC_FINGERPRINT: &str = include_str!("../../../testdata/ec_p256_fingerprint.txt");
    const RSA_PKCS1_PEM: &str = include_str!("../../../testdata/rsa_pkcs1_pub.pem");
    const RSA_PKIX_PEM: &str = include_str!("../../../testdata/rsa_pkix_pub.pem");
    const RSA_PKIX_DER: &[u8] = include_bytes!("../../../testdata/rsa_pkix_pub.der");
    const OTHER_PUB_PEM: &str = include_str!("../../../testdata/other_p256_pub.pem");

    #[test]
    fn pkix_key_normalizes_to_spki_der() {
        let key = normalize(EC_PUB_PEM.as_bytes()).unwrap();
        assert_eq!(key.as_der(), EC_PUB_DER);
    }

    #[test]
    fn certificate_yields_embedded_key() {
        let from_cert = normalize(EC_CERT_PEM.as_bytes()).unwrap();
        let from_key = normalize(EC_PUB_PEM.as_bytes()).unwrap();
        assert_eq!(from_cert, from_key);
    }

    #[test]
    fn pkcs1_rsa_is_reencoded_as_pkix() {
        let from_pkcs1 = normalize(RSA_PKCS1_PEM.as_bytes()).unwrap();
        let from_pkix = normalize(RSA_PKIX_PEM.as_bytes()).unwrap();
        assert_eq!(from_pkcs1, from_pkix);
        assert_eq!(from_pkcs1.as_der(), RSA_PKIX_DER);
    }

    #[test]
    fn fingerprint_is_sha256_of_spki() {
        let key = normalize(EC_PUB_PEM.as_bytes()).unwrap();
        assert_eq!(key.fingerprint(), EC_FINGERPRINT.trim());
    }

    #[test]
    fn distinct_keys_are_not_equal() {
        let a = normalize(EC_PUB_PEM.as_bytes()).unwrap();
        let b = normalize(OTHER_PUB_PEM.as_bytes()).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn normalization_is_idempotent() {
        let key = normalize(EC_CERT_PEM.as_bytes()).unwrap();
        let again = CanonicalPublicKey::from_der(key.as_der()).unwrap();
        assert_eq!(key, again);
    }

    #[test]
    fn missing_block_is_no_key_material() {
        assert_eq!(
            normalize(b"just some text").unwrap_err(),
            KeyError::NoKeyMaterial
        );
        assert_eq!(normalize(b"").unwrap_err(), KeyError::NoKeyMaterial);
    }

    #[test]
    fn two_blocks_are_ambiguous() {
        let both = format!("{EC_PUB_PEM}{OTHER_PUB_PEM}");
        assert_eq!(
            normalize(both.as_bytes()).unwrap_err(),
            KeyError::AmbiguousKeyMaterial(2)
        );
    }

    #[test]
    fn garbage_der_is_unsupported() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAAECAwQ=\n-----END PUBLIC KEY-----\n";
        assert_eq!(
            normalize(pem.as_bytes()).unwrap_err(),
            KeyError::UnsupportedKeyFormat("PUBLIC KEY".to_owned())
        );
    }

    #[test]
    fn label_does_not_select_parser() {
        // A PKIX key under a certificate label still normalizes.
        let relabeled = EC_PUB_PEM.replace("PUBLIC KEY", "CERTIFICATE");
        let key = normalize(relabeled.as_bytes()).unwrap();
        assert_eq!(key.as_der(), EC_PUB_DER);
    }
}
