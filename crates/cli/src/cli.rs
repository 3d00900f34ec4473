use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sigverify",
    about = "Verify artifacts against Sigstore bundles",
    long_about = "Verify an artifact against a Sigstore bundle, either by the signer's certificate identity (issuer + subject) or by a pinned public key."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output machine-readable JSON to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify a keyless (certificate) signature by signer identity
    Identity {
        /// Path to the signed artifact
        #[arg(long)]
        artifact: PathBuf,

        /// Path to the Sigstore bundle JSON
        #[arg(long)]
        bundle: PathBuf,

        /// Expected OIDC issuer (exact match)
        #[arg(long)]
        issuer: String,

        /// Expected certificate subject: email or URI SAN (exact match)
        #[arg(long)]
        subject: String,

        /// Path to trusted_root.json
        #[arg(long, env = "SIGVERIFY_TRUSTED_ROOT")]
        trusted_root: PathBuf,
    },

    /// Verify a key-signed bundle against a pinned public key
    Key {
        /// Path to the signed artifact
        #[arg(long)]
        artifact: PathBuf,

        /// Path to the Sigstore bundle JSON
        #[arg(long)]
        bundle: PathBuf,

        /// Expected public key: PEM PUBLIC KEY, RSA PUBLIC KEY or CERTIFICATE
        #[arg(short, long)]
        key: PathBuf,

        /// Path to trusted_root.json
        #[arg(long, env = "SIGVERIFY_TRUSTED_ROOT")]
        trusted_root: PathBuf,

        /// Minimum transparency-log entries required
        #[arg(long, default_value_t = 1)]
        tlog_threshold: usize,

        /// Minimum integrated timestamps required
        #[arg(long, default_value_t = 1)]
        timestamp_threshold: usize,
    },

    /// Print the SHA-256 fingerprint of a public key's canonical SPKI form
    Fingerprint {
        /// Path to the PEM key or certificate
        #[arg(short, long)]
        key: PathBuf,
    },
}
