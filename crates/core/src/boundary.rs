//! Host-facing entry points.
//!
//! A host runtime calls into the gateway by name with a list of loosely typed
//! arguments. This layer checks arity and argument types, converts them to
//! Rust values, and flattens the outcome into a [`BoundaryResult`].

use crate::engine::VerificationEngine;
use crate::error::FailureKind;
use crate::gateway::Gateway;
use crate::types::{BoundaryResult, VerificationResult};

const IDENTITY_USAGE: &str = "usage: verifyByIdentity(artifactBytes, issuer, subject, bundleJSON)";
const KEY_USAGE: &str = "usage: verifyByKey(artifactBytes, publicKeyPEM, bundleJSON)";

/// Exported verification functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    VerifyByIdentity,
    VerifyByKey,
}

impl EntryPoint {
    /// Names a host may register each function under.
    pub const NAMES: &'static [(&'static str, EntryPoint)] = &[
        ("verifyByIdentity", EntryPoint::VerifyByIdentity),
        ("sigverifyWithID", EntryPoint::VerifyByIdentity),
        ("sigverify", EntryPoint::VerifyByIdentity),
        ("verifyByKey", EntryPoint::VerifyByKey),
        ("sigverifyWithKey", EntryPoint::VerifyByKey),
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, entry)| *entry)
    }

    pub fn arity(&self) -> usize {
        match self {
            EntryPoint::VerifyByIdentity => 4,
            EntryPoint::VerifyByKey => 3,
        }
    }

    pub fn usage(&self) -> &'static str {
        match self {
            EntryPoint::VerifyByIdentity => IDENTITY_USAGE,
            EntryPoint::VerifyByKey => KEY_USAGE,
        }
    }
}

/// An argument value as handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostValue {
    Bytes(Vec<u8>),
    Text(String),
}

impl HostValue {
    fn as_bytes(&self) -> &[u8] {
        match self {
            HostValue::Bytes(bytes) => bytes,
            HostValue::Text(text) => text.as_bytes(),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            HostValue::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            HostValue::Text(text) => Some(text),
        }
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(bytes: Vec<u8>) -> Self {
        HostValue::Bytes(bytes)
    }
}

impl From<&[u8]> for HostValue {
    fn from(bytes: &[u8]) -> Self {
        HostValue::Bytes(bytes.to_vec())
    }
}

impl From<String> for HostValue {
    fn from(text: String) -> Self {
        HostValue::Text(text)
    }
}

impl From<&str> for HostValue {
    fn from(text: &str) -> Self {
        HostValue::Text(text.to_owned())
    }
}

impl<E: VerificationEngine> Gateway<E> {
    /// Dispatch a host call. Never panics on malformed input.
    pub fn invoke(&self, entry: EntryPoint, args: &[HostValue]) -> BoundaryResult {
        if args.len() != entry.arity() {
            tracing::warn!(?entry, got = args.len(), "wrong argument count");
            return usage(entry);
        }

        let result = match entry {
            EntryPoint::VerifyByIdentity => {
                let (Some(issuer), Some(subject)) = (args[1].as_text(), args[2].as_text()) else {
                    return usage(entry);
                };
                self.verify_by_identity(args[0].as_bytes(), issuer, subject, args[3].as_bytes())
            }
            EntryPoint::VerifyByKey => {
                let Some(pem) = args[1].as_text() else {
                    return usage(entry);
                };
                self.verify_by_key(args[0].as_bytes(), pem, args[2].as_bytes())
            }
        };
        result.into_boundary()
    }

    /// Dispatch by exported name.
    pub fn invoke_named(&self, name: &str, args: &[HostValue]) -> BoundaryResult {
        match EntryPoint::from_name(name) {
            Some(entry) => self.invoke(entry, args),
            None => {
                VerificationResult::failure(FailureKind::UsageError, format!("unknown function `{name}`"))
                    .into_boundary()
            }
        }
    }
}

fn usage(entry: EntryPoint) -> BoundaryResult {
    VerificationResult::failure(FailureKind::UsageError, entry.usage()).into_boundary()
}
