//! Sigstore verification backend: trusted-root loading and the production
//! verification engine.

mod certificate;
mod tlog;
pub mod trust_root;
pub mod verify;

pub use certificate::extract_identity;
pub use trust_root::TrustedRoot;
pub use verify::SigstoreEngine;
