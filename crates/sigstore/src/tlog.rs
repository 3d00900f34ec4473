//! Transparency-log entry verification.
//!
//! An entry counts as a proof only when its body records this signature over
//! this artifact by this key, and the log vouches for the entry with a signed
//! entry timestamp or an inclusion proof under a signed checkpoint.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use sigstore::crypto::{CosignVerificationKey, Signature};
use sigverify_core::digest::sha256;
use sigverify_core::{CanonicalPublicKey, EngineError, InclusionProof, TlogEntry, normalize};

use crate::verify::decode_b64;

const HASHEDREKORD: &str = "hashedrekord";
/// Signature lines of a signed note start with an em dash and a space.
const NOTE_SIGNATURE_PREFIX: &str = "\u{2014} ";

type Hash = [u8; 32];

/// A log's verification key, addressed by its key id.
#[derive(Debug, Clone)]
pub(crate) struct LogKey {
  /// SHA-256 of the log's SPKI DER.
  id: Hash,
  key: CosignVerificationKey,
}

impl LogKey {
  pub(crate) fn verify(&self, signature: &[u8], message: &[u8]) -> bool {
    self
      .key
      .verify_signature(Signature::Raw(signature), message)
      .is_ok()
  }
}

/// Keys of the logs a trusted root names.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogKeys(Vec<LogKey>);

impl LogKeys {
  pub(crate) fn from_spki(keys: &[Vec<u8>]) -> Result<Self> {
    keys
      .iter()
      .enumerate()
      .map(|(i, der)| {
        let key = CosignVerificationKey::try_from_der(der)
          .map_err(|e| anyhow!("Unsupported log key [{i}]: {e}"))?;
        Ok(LogKey { id: sha256(der), key })
      })
      .collect::<Result<Vec<_>>>()
      .map(Self)
  }

  pub(crate) fn find(&self, id: &[u8]) -> Option<&LogKey> {
    self.0.iter().find(|log| log.id.as_slice() == id)
  }

  pub(crate) fn len(&self) -> usize {
    self.0.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// What a log entry has to record to count for this verification.
pub(crate) struct SignedArtifact<'a> {
  pub digest: &'a [u8],
  pub signature: &'a [u8],
  pub key: &'a CanonicalPublicKey,
}

/// A verified entry. `integrated_time` is set only when the log signed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VerifiedEntry {
  pub integrated_time: Option<i64>,
}

pub(crate) fn verify_entry(
  entry: &TlogEntry,
  signed: &SignedArtifact<'_>,
  logs: &LogKeys,
) -> Result<VerifiedEntry, EngineError> {
  let encoded_body = entry
    .canonicalized_body
    .as_deref()
    .ok_or_else(|| EngineError::rejected("entry has no canonicalized body"))?;
  let body = decode_b64("canonicalized body", encoded_body)?;
  check_body(&body, signed)?;

  let log_id = entry
    .log_id
    .as_deref()
    .ok_or_else(|| EngineError::rejected("entry has no log id"))?;
  let log_id = decode_b64("log id", log_id)?;
  let log = logs.find(&log_id).ok_or_else(|| {
    EngineError::rejected(format!("unknown transparency log {}", hex::encode(&log_id)))
  })?;

  let mut verified = VerifiedEntry {
    integrated_time: None,
  };
  if let Some(set) = &entry.signed_entry_timestamp {
    verify_promise(entry, encoded_body, log, set)?;
    verified.integrated_time = Some(entry.integrated_time).filter(|t| *t > 0);
  }
  if let Some(proof) = &entry.inclusion_proof {
    verify_inclusion(&body, proof, log)?;
  } else if entry.signed_entry_timestamp.is_none() {
    return Err(EngineError::rejected(
      "entry has neither an inclusion promise nor an inclusion proof",
    ));
  }

  tracing::debug!(log_index = ?entry.log_index, ?verified, "transparency log entry verified");
  Ok(verified)
}

#[derive(Debug, Deserialize)]
struct RekorEntry {
  kind: String,
  spec: HashedRekordSpec,
}

#[derive(Debug, Deserialize)]
struct HashedRekordSpec {
  data: HashedRekordData,
  signature: HashedRekordSignature,
}

#[derive(Debug, Deserialize)]
struct HashedRekordData {
  hash: HashedRekordHash,
}

#[derive(Debug, Deserialize)]
struct HashedRekordHash {
  algorithm: String,
  value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashedRekordSignature {
  content: String,
  public_key: HashedRekordKey,
}

#[derive(Debug, Deserialize)]
struct HashedRekordKey {
  content: String,
}

/// The body must be a hashedrekord for this digest, signature and key.
fn check_body(body: &[u8], signed: &SignedArtifact<'_>) -> Result<(), EngineError> {
  let entry: RekorEntry = serde_json::from_slice(body)
    .map_err(|e| EngineError::rejected(format!("entry body is not a hashedrekord: {e}")))?;
  if entry.kind != HASHEDREKORD {
    return Err(EngineError::rejected(format!(
      "unsupported entry kind {:?}",
      entry.kind
    )));
  }

  let hash = &entry.spec.data.hash;
  if !hash.algorithm.eq_ignore_ascii_case("sha256")
    || !hash.value.eq_ignore_ascii_case(&hex::encode(signed.digest))
  {
    return Err(EngineError::rejected(
      "entry body records a different artifact digest",
    ));
  }

  let signature = decode_b64("entry signature", &entry.spec.signature.content)?;
  if signature != signed.signature {
    return Err(EngineError::rejected("entry body records a different signature"));
  }

  let armored = decode_b64("entry public key", &entry.spec.signature.public_key.content)?;
  let key = normalize(&armored)
    .map_err(|e| EngineError::rejected(format!("entry public key: {e}")))?;
  if &key != signed.key {
    return Err(EngineError::rejected("entry body records a different public key"));
  }
  Ok(())
}

/// Canonical JSON the log signs for an inclusion promise. Field order is the
/// sorted key order.
#[derive(Serialize)]
struct PromisePayload<'a> {
  body: &'a str,
  #[serde(rename = "integratedTime")]
  integrated_time: i64,
  #[serde(rename = "logID")]
  log_id: String,
  #[serde(rename = "logIndex")]
  log_index: i64,
}

fn verify_promise(
  entry: &TlogEntry,
  encoded_body: &str,
  log: &LogKey,
  set: &str,
) -> Result<(), EngineError> {
  let log_index = entry
    .log_index
    .ok_or_else(|| EngineError::rejected("entry has no log index"))?;
  let payload = serde_json::to_vec(&PromisePayload {
    body: encoded_body,
    integrated_time: entry.integrated_time,
    log_id: hex::encode(log.id),
    log_index,
  })
  .map_err(|e| EngineError::rejected(format!("signed entry timestamp payload: {e}")))?;

  let set = decode_b64("signed entry timestamp", set)?;
  if !log.verify(&set, &payload) {
    return Err(EngineError::rejected(
      "signed entry timestamp verification failed",
    ));
  }
  Ok(())
}

fn verify_inclusion(
  body: &[u8],
  proof: &InclusionProof,
  log: &LogKey,
) -> Result<(), EngineError> {
  let root = decode_hash("inclusion proof root hash", &proof.root_hash)?;
  let hashes = proof
    .hashes
    .iter()
    .map(|h| decode_hash("inclusion proof hash", h))
    .collect::<Result<Vec<_>, _>>()?;
  let (Ok(index), Ok(size)) = (u64::try_from(proof.log_index), u64::try_from(proof.tree_size))
  else {
    return Err(EngineError::rejected("inclusion proof has a negative index"));
  };

  if !merkle_inclusion(index, size, leaf_hash(body), &hashes, &root) {
    return Err(EngineError::rejected(
      "inclusion proof does not lead to the root hash",
    ));
  }

  let checkpoint = proof
    .checkpoint
    .as_deref()
    .ok_or_else(|| EngineError::rejected("inclusion proof has no checkpoint"))?;
  verify_checkpoint(checkpoint, size, &root, log)
}

fn decode_hash(what: &str, value: &str) -> Result<Hash, EngineError> {
  let bytes = decode_b64(what, value)?;
  Hash::try_from(bytes.as_slice()).map_err(|_| {
    EngineError::rejected(format!("{what}: expected 32 bytes, got {}", bytes.len()))
  })
}

fn leaf_hash(data: &[u8]) -> Hash {
  sha256(&[&[0x00][..], data].concat())
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
  sha256(&[&[0x01][..], &left[..], &right[..]].concat())
}

/// RFC 9162 section 2.1.3.2.
fn merkle_inclusion(index: u64, size: u64, leaf: Hash, proof: &[Hash], root: &Hash) -> bool {
  if index >= size {
    return false;
  }
  let (mut node, mut last) = (index, size - 1);
  let mut hash = leaf;
  for sibling in proof {
    if last == 0 {
      return false;
    }
    if node & 1 == 1 || node == last {
      hash = node_hash(sibling, &hash);
      while node & 1 == 0 && node != 0 {
        node >>= 1;
        last >>= 1;
      }
    } else {
      hash = node_hash(&hash, sibling);
    }
    node >>= 1;
    last >>= 1;
  }
  last == 0 && hash == *root
}

/// A signed-note checkpoint: `origin`, tree size and base64 root hash, a blank
/// line, then signature lines of the form `<em dash> <name> <base64(key hint || sig)>`.
fn verify_checkpoint(
  envelope: &str,
  size: u64,
  root: &Hash,
  log: &LogKey,
) -> Result<(), EngineError> {
  let (note, signatures) = envelope
    .split_once("\n\n")
    .ok_or_else(|| EngineError::rejected("checkpoint has no signatures"))?;

  let mut lines = note.lines().skip(1);
  let checkpoint_size = lines.next().and_then(|line| line.parse::<u64>().ok());
  let checkpoint_root = lines
    .next()
    .and_then(|line| decode_hash("checkpoint root hash", line).ok());
  if checkpoint_size != Some(size) || checkpoint_root.as_ref() != Some(root) {
    return Err(EngineError::rejected(
      "checkpoint does not commit to the inclusion proof",
    ));
  }

  let text = format!("{note}\n");
  let signed = signatures
    .lines()
    .filter_map(|line| line.strip_prefix(NOTE_SIGNATURE_PREFIX))
    .filter_map(|rest| rest.rsplit_once(' '))
    .filter_map(|(_, signature)| decode_b64("checkpoint signature", signature).ok())
    .any(|signature| {
      signature.len() > 4
        && signature[..4] == log.id[..4]
        && log.verify(&signature[4..], text.as_bytes())
    });
  if !signed {
    return Err(EngineError::rejected(
      "checkpoint signature verification failed",
    ));
  }
  Ok(())
}
