//! Sigstore bundle decoding.
//!
//! The bundle JSON is parsed exactly once per verification call into a
//! lenient view of the fields the engine, policy and pinning layers need.

use serde::Deserialize;
use serde_json::Value;

use crate::error::BundleError;

/// Signer material carried in `verificationMaterial`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialContent {
    /// Base64 SPKI DER of the signing key.
    EmbeddedKey(String),
    /// Opaque key identifier, conventionally a hex key fingerprint.
    KeyHint(String),
    /// Base64 DER of the leaf signing certificate.
    Certificate(String),
    /// Base64 DER certificates, leaf first.
    CertificateChain(Vec<String>),
    Missing,
}

impl MaterialContent {
    pub fn is_certificate(&self) -> bool {
        matches!(
            self,
            MaterialContent::Certificate(_) | MaterialContent::CertificateChain(_)
        )
    }

    /// Base64 DER of the leaf certificate, if any.
    pub fn leaf_certificate(&self) -> Option<&str> {
        match self {
            MaterialContent::Certificate(cert) => Some(cert),
            MaterialContent::CertificateChain(chain) => chain.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            MaterialContent::EmbeddedKey(_) => "embedded-key",
            MaterialContent::KeyHint(_) => "key-hint",
            MaterialContent::Certificate(_) => "certificate",
            MaterialContent::CertificateChain(_) => "certificate-chain",
            MaterialContent::Missing => "missing",
        }
    }
}

/// A transparency-log entry. Binary fields stay base64-encoded; the engine
/// decodes the ones it checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlogEntry {
    pub log_index: Option<i64>,
    /// Log key id: SHA-256 of the log's SPKI DER.
    pub log_id: Option<String>,
    pub integrated_time: i64,
    /// The entry body exactly as the log stored it.
    pub canonicalized_body: Option<String>,
    /// The log's signature over the entry (inclusion promise).
    pub signed_entry_timestamp: Option<String>,
    pub inclusion_proof: Option<InclusionProof>,
}

/// Merkle inclusion proof for a [`TlogEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionProof {
    /// Leaf index within the tree the proof is for.
    pub log_index: i64,
    pub tree_size: i64,
    pub root_hash: String,
    /// Sibling hashes, leaf to root.
    pub hashes: Vec<String>,
    /// Signed-note checkpoint committing to `root_hash`.
    pub checkpoint: Option<String>,
}

/// The signature over the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSignature {
    pub digest_algorithm: Option<String>,
    /// Base64 message digest.
    pub digest: Option<String>,
    /// Base64 signature bytes.
    pub signature: String,
}

/// A decoded bundle. Immutable for the duration of one verification.
#[derive(Debug, Clone)]
pub struct DecodedBundle {
    content: MaterialContent,
    tlog_entries: Vec<TlogEntry>,
    message_signature: Option<MessageSignature>,
    has_dsse_envelope: bool,
}

impl DecodedBundle {
    /// Decode bundle JSON bytes.
    #[tracing::instrument(skip(bytes), fields(bundle_len = bytes.len()))]
    pub fn decode(bytes: &[u8]) -> Result<Self, BundleError> {
        let document: Value = serde_json::from_slice(bytes)?;
        if !document.is_object() {
            return Err(BundleError::NotAnObject);
        }
        let raw = RawBundle::deserialize(&document)?;

        let material = raw.verification_material.unwrap_or_default();
        let content = material.content();
        let tlog_entries: Vec<TlogEntry> = material
            .tlog_entries
            .iter()
            .map(RawTlogEntry::to_entry)
            .collect();
        let message_signature = raw.message_signature.map(|sig| MessageSignature {
            digest_algorithm: sig.message_digest.as_ref().and_then(|d| d.algorithm.clone()),
            digest: sig.message_digest.and_then(|d| d.digest),
            signature: sig.signature.unwrap_or_default(),
        });

        tracing::debug!(
            media_type = ?raw.media_type,
            material = content.kind_name(),
            tlog_entries = tlog_entries.len(),
            "bundle decoded"
        );

        Ok(Self {
            content,
            tlog_entries,
            message_signature,
            has_dsse_envelope: raw.dsse_envelope.is_some(),
        })
    }

    pub fn content(&self) -> &MaterialContent {
        &self.content
    }

    pub fn tlog_entries(&self) -> &[TlogEntry] {
        &self.tlog_entries
    }

    pub fn message_signature(&self) -> Option<&MessageSignature> {
        self.message_signature.as_ref()
    }

    pub fn has_dsse_envelope(&self) -> bool {
        self.has_dsse_envelope
    }
}

// Wire shapes. Every field is optional so that unexpected bundles surface as
// policy failures rather than decode failures.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawBundle {
    media_type: Option<String>,
    verification_material: Option<RawVerificationMaterial>,
    message_signature: Option<RawMessageSignature>,
    dsse_envelope: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVerificationMaterial {
    /// Nested form: `verificationMaterial.content.publicKey`.
    content: Option<RawMaterialContent>,
    /// Flattened protobuf-JSON form: `verificationMaterial.publicKey`.
    #[serde(flatten)]
    inline: RawMaterialContent,
    tlog_entries: Vec<RawTlogEntry>,
}

impl RawVerificationMaterial {
    fn content(&self) -> MaterialContent {
        let nested = self
            .content
            .as_ref()
            .map(RawMaterialContent::resolve)
            .unwrap_or(MaterialContent::Missing);
        match nested {
            MaterialContent::Missing => self.inline.resolve(),
            found => found,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMaterialContent {
    public_key: Option<RawPublicKey>,
    public_key_identifier: Option<RawPublicKey>,
    certificate: Option<RawCertificate>,
    x509_certificate_chain: Option<RawCertificateChain>,
}

impl RawMaterialContent {
    fn resolve(&self) -> MaterialContent {
        if let Some(content) = self
            .public_key
            .as_ref()
            .and_then(|pk| pk.content.as_deref())
            .filter(|c| !c.is_empty())
        {
            return MaterialContent::EmbeddedKey(content.to_owned());
        }

        // An explicit identifier is a hint even when its value is empty.
        if let Some(identifier) = &self.public_key_identifier {
            return MaterialContent::KeyHint(identifier.hint.clone().unwrap_or_default());
        }
        if let Some(hint) = self.public_key.as_ref().and_then(|pk| pk.hint.clone()) {
            return MaterialContent::KeyHint(hint);
        }

        if let Some(cert) = &self.certificate {
            return MaterialContent::Certificate(cert.raw_bytes.clone());
        }
        if let Some(chain) = &self.x509_certificate_chain {
            return MaterialContent::CertificateChain(
                chain
                    .certificates
                    .iter()
                    .map(|c| c.raw_bytes.clone())
                    .collect(),
            );
        }
        MaterialContent::Missing
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPublicKey {
    #[serde(alias = "rawBytes")]
    content: Option<String>,
    hint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCertificate {
    raw_bytes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCertificateChain {
    certificates: Vec<RawCertificate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTlogEntry {
    log_index: Option<Int64>,
    log_id: Option<RawLogId>,
    integrated_time: Option<Int64>,
    inclusion_promise: Option<RawInclusionPromise>,
    inclusion_proof: Option<RawInclusionProof>,
    canonicalized_body: Option<String>,
}

impl RawTlogEntry {
    fn to_entry(&self) -> TlogEntry {
        TlogEntry {
            log_index: int64(&self.log_index),
            log_id: self.log_id.as_ref().and_then(|id| id.key_id.clone()),
            integrated_time: int64(&self.integrated_time).unwrap_or(0),
            canonicalized_body: self.canonicalized_body.clone(),
            signed_entry_timestamp: self
                .inclusion_promise
                .as_ref()
                .and_then(|p| p.signed_entry_timestamp.clone()),
            inclusion_proof: self.inclusion_proof.as_ref().map(|p| InclusionProof {
                log_index: int64(&p.log_index).unwrap_or(0),
                tree_size: int64(&p.tree_size).unwrap_or(0),
                root_hash: p.root_hash.clone().unwrap_or_default(),
                hashes: p.hashes.clone(),
                checkpoint: p.checkpoint.as_ref().and_then(|c| c.envelope.clone()),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawLogId {
    key_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawInclusionPromise {
    signed_entry_timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawInclusionProof {
    log_index: Option<Int64>,
    root_hash: Option<String>,
    tree_size: Option<Int64>,
    hashes: Vec<String>,
    checkpoint: Option<RawCheckpoint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCheckpoint {
    envelope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMessageSignature {
    message_digest: Option<RawMessageDigest>,
    signature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMessageDigest {
    algorithm: Option<String>,
    digest: Option<String>,
}

/// protobuf-JSON encodes int64 as a string; accept numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Int64 {
    Number(i64),
    Text(String),
}

impl Int64 {
    fn value(&self) -> Option<i64> {
        match self {
            Int64::Number(n) => Some(*n),
            Int64::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn int64(value: &Option<Int64>) -> Option<i64> {
    value.as_ref().and_then(Int64::value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> DecodedBundle {
        DecodedBundle::decode(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn truncated_json_is_decode_error() {
        let full = include_str!("../../../testdata/key_hint_bundle.json");
        let truncated = &full[..full.len() / 2];
        let err = DecodedBundle::decode(truncated.as_bytes()).unwrap_err();
        assert!(matches!(err, BundleError::Json(_)));
    }

    #[test]
    fn non_object_is_decode_error() {
        let err = DecodedBundle::decode(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, BundleError::NotAnObject));
    }

    #[test]
    fn flattened_hint_fixture() {
        let bundle =
            DecodedBundle::decode(include_bytes!("../../../testdata/key_hint_bundle.json"))
                .unwrap();
        assert!(matches!(bundle.content(), MaterialContent::KeyHint(_)));
        assert_eq!(bundle.tlog_entries().len(), 1);
        let entry = &bundle.tlog_entries()[0];
        assert_eq!(entry.log_index, Some(12345));
        assert_eq!(entry.integrated_time, 1_704_067_200);
        assert!(entry.signed_entry_timestamp.is_some());
        assert!(entry.canonicalized_body.is_some());
        assert!(entry.log_id.is_some());
        assert!(entry.inclusion_proof.is_none());
        let sig = bundle.message_signature().unwrap();
        assert_eq!(sig.digest_algorithm.as_deref(), Some("SHA2_256"));
        assert!(!bundle.has_dsse_envelope());
    }

    #[test]
    fn inclusion_proof_fields() {
        let bundle = DecodedBundle::decode(include_bytes!(
            "../../../testdata/key_inclusion_proof_bundle.json"
        ))
        .unwrap();
        let entry = &bundle.tlog_entries()[0];
        assert_eq!(entry.signed_entry_timestamp, None);
        let proof = entry.inclusion_proof.as_ref().unwrap();
        assert_eq!((proof.log_index, proof.tree_size), (2, 6));
        assert_eq!(proof.hashes.len(), 3);
        assert!(proof.checkpoint.as_deref().unwrap().contains("\n6\n"));
    }

    #[test]
    fn nested_content_shape_is_accepted() {
        let bundle = decode(json!({
            "verificationMaterial": {
                "content": { "publicKeyIdentifier": { "hint": "ABCD" } }
            }
        }));
        assert_eq!(bundle.content(), &MaterialContent::KeyHint("ABCD".into()));

        let bundle = decode(json!({
            "verificationMaterial": {
                "content": { "publicKey": { "content": "AAEC" } }
            }
        }));
        assert_eq!(
            bundle.content(),
            &MaterialContent::EmbeddedKey("AAEC".into())
        );
    }

    #[test]
    fn embedded_key_wins_over_hint() {
        let bundle = decode(json!({
            "verificationMaterial": {
                "publicKey": { "rawBytes": "AAEC", "hint": "abcd" }
            }
        }));
        assert_eq!(
            bundle.content(),
            &MaterialContent::EmbeddedKey("AAEC".into())
        );
    }

    #[test]
    fn empty_embedded_key_falls_back_to_hint() {
        let bundle = decode(json!({
            "verificationMaterial": {
                "publicKey": { "content": "", "hint": "abcd" }
            }
        }));
        assert_eq!(bundle.content(), &MaterialContent::KeyHint("abcd".into()));
    }

    #[test]
    fn certificate_shapes() {
        let bundle = decode(json!({
            "verificationMaterial": { "certificate": { "rawBytes": "MIIB" } }
        }));
        assert!(bundle.content().is_certificate());
        assert_eq!(bundle.content().leaf_certificate(), Some("MIIB"));

        let bundle = decode(json!({
            "verificationMaterial": {
                "x509CertificateChain": {
                    "certificates": [{ "rawBytes": "LEAF" }, { "rawBytes": "ROOT" }]
                }
            }
        }));
        assert_eq!(bundle.content().leaf_certificate(), Some("LEAF"));
    }

    #[test]
    fn missing_material_and_numeric_ints() {
        let bundle = decode(json!({
            "verificationMaterial": {
                "tlogEntries": [{ "logIndex": 7, "integratedTime": 1 }]
            },
            "dsseEnvelope": { "payload": "" }
        }));
        assert_eq!(bundle.content(), &MaterialContent::Missing);
        assert_eq!(bundle.tlog_entries()[0].log_index, Some(7));
        assert_eq!(bundle.tlog_entries()[0].signed_entry_timestamp, None);
        assert!(bundle.has_dsse_envelope());
        assert!(bundle.message_signature().is_none());
    }
}
