//! Trusted-root loading.

use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use serde::Deserialize;

/// Trust material from a Sigstore `trusted_root.json`, decoded to DER.
#[derive(Debug, Clone, Default)]
pub struct TrustedRoot {
  /// Certificate-authority chains (Fulcio), each leaf-first.
  pub certificate_authorities: Vec<Vec<Vec<u8>>>,
  /// Transparency-log (Rekor) SPKI keys.
  pub tlog_keys: Vec<Vec<u8>>,
  /// Certificate-transparency log SPKI keys.
  pub ctlog_keys: Vec<Vec<u8>>,
}

impl TrustedRoot {
  /// Parse `trusted_root.json` bytes.
  #[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
  pub fn from_json(bytes: &[u8]) -> Result<Self> {
    let raw: RawTrustedRoot =
      serde_json::from_slice(bytes).context("Failed to parse trusted root JSON")?;

    let certificate_authorities = raw
      .certificate_authorities
      .iter()
      .enumerate()
      .map(|(i, ca)| {
        ca.cert_chain
          .decode()
          .with_context(|| format!("certificateAuthorities[{i}]"))
      })
      .collect::<Result<Vec<_>>>()?;
    let tlog_keys = decode_keys(&raw.tlogs).context("tlogs")?;
    let ctlog_keys = decode_keys(&raw.ctlogs).context("ctlogs")?;

    if certificate_authorities.iter().all(Vec::is_empty) && tlog_keys.is_empty() {
      bail!("Trusted root contains no certificate authorities or transparency logs");
    }

    tracing::debug!(
      cas = certificate_authorities.len(),
      tlogs = tlog_keys.len(),
      ctlogs = ctlog_keys.len(),
      "trusted root loaded"
    );

    Ok(Self {
      certificate_authorities,
      tlog_keys,
      ctlog_keys,
    })
  }

  /// Read and parse a `trusted_root.json` file.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
      .with_context(|| format!("Failed to read trusted root: {}", path.display()))?;
    Self::from_json(&bytes).with_context(|| format!("Invalid trusted root: {}", path.display()))
  }
}

fn decode_keys(logs: &[RawTransparencyLog]) -> Result<Vec<Vec<u8>>> {
  logs
    .iter()
    .enumerate()
    .map(|(i, log)| {
      let raw = log
        .public_key
        .raw_bytes
        .as_deref()
        .with_context(|| format!("[{i}] has no publicKey.rawBytes"))?;
      decode_b64(raw).with_context(|| format!("[{i}] publicKey"))
    })
    .collect()
}

fn decode_b64(value: &str) -> Result<Vec<u8>> {
  base64::engine::general_purpose::STANDARD
    .decode(value.trim())
    .context("Invalid base64")
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTrustedRoot {
  tlogs: Vec<RawTransparencyLog>,
  certificate_authorities: Vec<RawCertificateAuthority>,
  ctlogs: Vec<RawTransparencyLog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTransparencyLog {
  public_key: RawPublicKey,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPublicKey {
  raw_bytes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCertificateAuthority {
  cert_chain: RawCertChain,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCertChain {
  certificates: Vec<RawCertificate>,
}

impl RawCertChain {
  fn decode(&self) -> Result<Vec<Vec<u8>>> {
    self
      .certificates
      .iter()
      .map(|cert| decode_b64(&cert.raw_bytes))
      .collect()
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawCertificate {
  raw_bytes: String,
}
