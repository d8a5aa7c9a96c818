//! Constant-time secret comparison.
//!
//! Both inputs are hashed with SHA-256 before the byte-wise comparison, so the
//! work done does not depend on the inputs' lengths or on where they first
//! differ. Unequal lengths still compare unequal.

use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

const BEARER_PREFIX: &str = "Bearer ";

/// Compare two byte strings in constant time.
pub fn timing_safe_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    let left = Sha256::digest(a);
    let right = Sha256::digest(b);
    left.as_slice().ct_eq(right.as_slice()).into()
}

/// Compare two strings in constant time.
///
/// ```
/// use portal_guard::domain::secret::timing_safe_eq;
///
/// assert!(timing_safe_eq("", ""));
/// assert!(timing_safe_eq("héllo wörld 🔒", "héllo wörld 🔒"));
/// assert!(!timing_safe_eq("secret", "secreT"));
/// assert!(!timing_safe_eq("short", "longer value"));
/// ```
pub fn timing_safe_eq(a: &str, b: &str) -> bool {
    timing_safe_eq_bytes(a.as_bytes(), b.as_bytes())
}

/// Compare optional strings. A missing value never equals anything.
pub fn timing_safe_eq_opt(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => timing_safe_eq(a, b),
        _ => false,
    }
}

/// Compare untyped JSON inputs. Only two strings can be equal.
pub fn timing_safe_eq_value(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    timing_safe_eq_opt(a.as_str(), b.as_str())
}

/// Check an `Authorization` header against a shared secret.
///
/// The header must start with the literal, case-sensitive `"Bearer "`.
/// Returns `false` whenever the secret is missing or empty.
pub fn validate_bearer_secret(header: Option<&str>, secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(token) = header.and_then(|h| h.strip_prefix(BEARER_PREFIX)) else {
        return false;
    };
    timing_safe_eq(token, secret)
}

/// A configured shared secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    /// Wrap a secret. Empty strings are rejected.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Check a bearer header against this secret.
    pub fn verify_bearer(&self, header: Option<&str>) -> bool {
        validate_bearer_secret(header, Some(&self.0))
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(***)")
    }
}
