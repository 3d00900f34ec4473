//! Key pinning.
//!
//! Runs only after the engine has accepted a key-signed bundle, and
//! independently confirms that the key the bundle names is the caller's key.

use base64::Engine;

use crate::bundle::{DecodedBundle, MaterialContent};
use crate::error::PinError;
use crate::key::CanonicalPublicKey;

/// How the bundle's key was tied to the caller's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pinned {
    /// Embedded SPKI DER is byte-identical to the expected key.
    EmbeddedKey,
    /// Key hint equals the expected key's fingerprint.
    Hint,
}

/// Confirm that `bundle` names `want` as its signing key.
///
/// A bundle with neither an embedded key nor a hint never pins.
#[tracing::instrument(skip_all, fields(want = %want.fingerprint()))]
pub fn pin(bundle: &DecodedBundle, want: &CanonicalPublicKey) -> Result<Pinned, PinError> {
    match bundle.content() {
        MaterialContent::EmbeddedKey(content) => {
            let got = base64::engine::general_purpose::STANDARD
                .decode(content.trim())
                .map_err(|e| PinError::MalformedEmbeddedKey(e.to_string()))?;
            if got != want.as_der() {
                return Err(PinError::KeyMismatch);
            }
            Ok(Pinned::EmbeddedKey)
        }
        MaterialContent::KeyHint(hint) => {
            let hint = hint.trim().to_lowercase();
            let expected = want.fingerprint();
            if hint != expected {
                return Err(PinError::HintMismatch { hint, expected });
            }
            Ok(Pinned::Hint)
        }
        MaterialContent::Certificate(_)
        | MaterialContent::CertificateChain(_)
        | MaterialContent::Missing => Err(PinError::NoPinnableMaterial),
    }
}
