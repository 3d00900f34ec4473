//! Verification and fingerprint commands.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use sigverify_core::{
  Gateway, GatewayConfig, ProofRequirements, VerificationResult, normalize,
};
use sigverify_sigstore::{SigstoreEngine, TrustedRoot};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::json::FingerprintJson;
use crate::util::format_bytes;

pub fn verify_identity(
  artifact: PathBuf,
  bundle: PathBuf,
  issuer: String,
  subject: String,
  trusted_root: PathBuf,
  json: bool,
) -> Result<bool> {
  eprintln!("{}", style("==> Verifying by certificate identity").cyan().bold());

  let engine = load_engine(&trusted_root)?;
  let artifact_data = read_input(&artifact, "artifact")?;
  let bundle_data = read_input(&bundle, "bundle")?;

  let gateway = Gateway::new(engine);
  let result = gateway.verify_by_identity(&artifact_data, &issuer, &subject, &bundle_data);

  if result.is_ok() {
    eprintln!("    Subject: {}", style(&subject).cyan());
    eprintln!("    Issuer:  {}", style(&issuer).cyan());
  }
  report(result, json)
}

pub fn verify_key(
  artifact: PathBuf,
  bundle: PathBuf,
  key: PathBuf,
  trusted_root: PathBuf,
  tlog_threshold: usize,
  timestamp_threshold: usize,
  json: bool,
) -> Result<bool> {
  eprintln!("{}", style("==> Verifying by public key").cyan().bold());

  let engine = load_engine(&trusted_root)?;
  let artifact_data = read_input(&artifact, "artifact")?;
  let bundle_data = read_input(&bundle, "bundle")?;
  let key_data = std::fs::read(&key)
    .with_context(|| format!("Failed to read public key: {}", key.display()))?;
  let key_pem = String::from_utf8_lossy(&key_data);

  let config = GatewayConfig {
    key_proofs: ProofRequirements {
      transparency_log: tlog_threshold,
      integrated_timestamps: timestamp_threshold,
      ..ProofRequirements::RELAXED
    },
    ..GatewayConfig::default()
  };
  let gateway = Gateway::with_config(engine, config);
  let result = gateway.verify_by_key(&artifact_data, &key_pem, &bundle_data);

  if result.is_ok()
    && let Ok(pinned) = normalize(key_pem.as_bytes())
  {
    eprintln!("    Key: {}", style(pinned.fingerprint()).cyan());
  }
  report(result, json)
}

pub fn fingerprint(key: PathBuf, json: bool) -> Result<()> {
  let data =
    std::fs::read(&key).with_context(|| format!("Failed to read public key: {}", key.display()))?;
  let canonical = normalize(&data).context("Invalid public key")?;
  let fingerprint = canonical.fingerprint();

  if json {
    let payload = FingerprintJson {
      status: "ok",
      command: "fingerprint",
      key: key.display().to_string(),
      fingerprint,
    };
    println!("{}", serde_json::to_string(&payload)?);
  } else {
    println!("{fingerprint}");
  }
  Ok(())
}

fn load_engine(path: &Path) -> Result<SigstoreEngine> {
  let trust_root = TrustedRoot::from_file(path)?;
  tracing::debug!(path = %path.display(), "trusted root loaded");
  SigstoreEngine::new(&trust_root)
    .with_context(|| format!("Unusable trusted root: {}", path.display()))
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
  let spinner = ProgressBar::new_spinner();
  spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
  spinner.enable_steady_tick(Duration::from_millis(80));
  spinner.set_message(format!("Reading {what} {}", style(path.display()).cyan()));

  let mut data = Vec::new();
  let mut file = BufReader::new(
    File::open(path).with_context(|| format!("Failed to open {what}: {}", path.display()))?,
  );
  file
    .read_to_end(&mut data)
    .with_context(|| format!("Failed to read {what}: {}", path.display()))?;

  spinner.finish_with_message(format!(
    "[OK] Read {what} ({})",
    style(format_bytes(data.len())).cyan()
  ));
  Ok(data)
}

/// Print the outcome and return whether it verified.
fn report(result: VerificationResult, json: bool) -> Result<bool> {
  let ok = result.is_ok();

  if json {
    println!("{}", serde_json::to_string(&result.into_boundary())?);
    return Ok(ok);
  }

  match &result {
    VerificationResult::Success => {
      eprintln!(
        "\n{} {}",
        style("[VALID]").green().bold(),
        style("Signature verified").green()
      );
      // Only print "OK" when stdout is piped (for pipeline composition)
      use std::io::IsTerminal;
      if !std::io::stdout().is_terminal() {
        println!("OK");
      }
    }
    VerificationResult::Failure { kind, message } => eprintln!(
      "\n{} {}: {}",
      style("[INVALID]").red().bold(),
      style(kind).red(),
      style(message).red()
    ),
  }

  Ok(ok)
}
