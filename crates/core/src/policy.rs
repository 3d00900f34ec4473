//! Trust policy construction.
//!
//! Identity verification and key verification rest on disjoint trust bases,
//! so each mode gets its own proof requirements and constraint. A policy is
//! built fresh for every call and never mutated afterwards.

use crate::error::VerifyError;
use crate::key::CanonicalPublicKey;

/// Minimum number of each proof the engine must see in a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofRequirements {
    /// Transparency-log entries with an inclusion proof or promise.
    pub transparency_log: usize,
    /// Transparency-log integrated timestamps.
    pub integrated_timestamps: usize,
    /// Signed certificate timestamps in the signing certificate.
    pub signed_certificate_timestamps: usize,
}

impl ProofRequirements {
    /// Transparency log, integrated timestamp and SCT all required.
    pub const STRICT: Self = Self {
        transparency_log: 1,
        integrated_timestamps: 1,
        signed_certificate_timestamps: 1,
    };

    /// Key-signed bundles carry no SCT.
    pub const RELAXED: Self = Self {
        transparency_log: 1,
        integrated_timestamps: 1,
        signed_certificate_timestamps: 0,
    };
}

/// Expected certificate identity. Both fields match exactly, never as patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConstraint {
    issuer: String,
    subject: String,
}

impl IdentityConstraint {
    /// `issuer` is the OIDC issuer URL; `subject` is the SAN value (email or
    /// URI) without any `email:` prefix.
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Result<Self, VerifyError> {
        let issuer = issuer.into();
        let subject = subject.into();
        if issuer.trim().is_empty() || subject.trim().is_empty() {
            return Err(VerifyError::MissingIdentity);
        }
        Ok(Self { issuer, subject })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Exact, case-sensitive comparison.
    pub fn matches(&self, issuer: &str, subject: &str) -> bool {
        self.issuer == issuer && self.subject == subject
    }
}

/// The signature must come from a bare key, not a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConstraint {
    /// Key the engine checks the signature with when the bundle does not embed one.
    pub verification_key: CanonicalPublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyConstraint {
    Identity(IdentityConstraint),
    Key(KeyConstraint),
}

/// What the caller wants verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationMode {
    Identity(IdentityConstraint),
    Key(CanonicalPublicKey),
}

/// Immutable per-call policy handed to the verification engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    proofs: ProofRequirements,
    constraint: PolicyConstraint,
}

impl TrustPolicy {
    pub fn proofs(&self) -> &ProofRequirements {
        &self.proofs
    }

    pub fn constraint(&self) -> &PolicyConstraint {
        &self.constraint
    }

    pub fn identity(&self) -> Option<&IdentityConstraint> {
        match &self.constraint {
            PolicyConstraint::Identity(identity) => Some(identity),
            PolicyConstraint::Key(_) => None,
        }
    }

    pub fn key(&self) -> Option<&KeyConstraint> {
        match &self.constraint {
            PolicyConstraint::Key(key) => Some(key),
            PolicyConstraint::Identity(_) => None,
        }
    }
}

/// Builds policies from configured proof sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyBuilder {
    pub strict: ProofRequirements,
    pub relaxed: ProofRequirements,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        Self {
            strict: ProofRequirements::STRICT,
            relaxed: ProofRequirements::RELAXED,
        }
    }
}

impl PolicyBuilder {
    pub fn build(&self, mode: VerificationMode, strict: bool) -> TrustPolicy {
        let proofs = if strict { self.strict } else { self.relaxed };
        let constraint = match mode {
            VerificationMode::Identity(identity) => PolicyConstraint::Identity(identity),
            VerificationMode::Key(key) => PolicyConstraint::Key(KeyConstraint {
                verification_key: key,
            }),
        };
        tracing::debug!(strict, ?proofs, "trust policy built");
        TrustPolicy { proofs, constraint }
    }
}

/// Build a policy with the default proof sets.
pub fn build_policy(mode: VerificationMode, strict: bool) -> TrustPolicy {
    PolicyBuilder::default().build(mode, strict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::normalize;

    const ISSUER: &str = "https://token.actions.githubusercontent.com";
    const SUBJECT: &str = "repo:org/repo:ref:refs/heads/main";

    #[test]
    fn identity_requires_both_fields() {
        assert!(IdentityConstraint::new(ISSUER, SUBJECT).is_ok());
        for (issuer, subject) in [("", SUBJECT), (ISSUER, ""), ("  ", SUBJECT), ("", "")] {
            assert!(matches!(
                IdentityConstraint::new(issuer, subject),
                Err(VerifyError::MissingIdentity)
            ));
        }
    }

    #[test]
    fn identity_match_is_exact() {
        let id = IdentityConstraint::new(ISSUER, SUBJECT).unwrap();
        assert!(id.matches(ISSUER, SUBJECT));
        assert!(!id.matches(ISSUER, "repo:org/repo:ref:refs/heads/dev"));
        assert!(!id.matches(ISSUER, "repo:org/repo:ref:refs/heads/mai"));
        assert!(!id.matches(ISSUER, &format!("{SUBJECT}x")));
        assert!(!id.matches(&ISSUER.to_uppercase(), SUBJECT));
        assert!(!id.matches(ISSUER, ".*"));
    }

    #[test]
    fn strict_identity_policy_requires_all_proofs() {
        let id = IdentityConstraint::new(ISSUER, SUBJECT).unwrap();
        let policy = build_policy(VerificationMode::Identity(id.clone()), true);
        assert_eq!(policy.proofs(), &ProofRequirements::STRICT);
        assert_eq!(policy.identity(), Some(&id));
        assert!(policy.key().is_none());
    }

    #[test]
    fn relaxed_key_policy_skips_sct() {
        let key = normalize(include_bytes!("../../../testdata/ec_p256_pub.pem")).unwrap();
        let policy = build_policy(VerificationMode::Key(key.clone()), false);
        assert_eq!(policy.proofs().signed_certificate_timestamps, 0);
        assert_eq!(policy.proofs().transparency_log, 1);
        assert_eq!(policy.proofs().integrated_timestamps, 1);
        assert_eq!(policy.key().unwrap().verification_key, key);
    }

    #[test]
    fn configured_proof_sets_are_used() {
        let builder = PolicyBuilder {
            relaxed: ProofRequirements {
                transparency_log: 2,
                integrated_timestamps: 0,
                signed_certificate_timestamps: 0,
            },
            ..PolicyBuilder::default()
        };
        let key = normalize(include_bytes!("../../../testdata/ec_p256_pub.pem")).unwrap();
        let policy = builder.build(VerificationMode::Key(key), false);
        assert_eq!(policy.proofs().transparency_log, 2);
        assert_eq!(policy.proofs().integrated_timestamps, 0);
    }
}
