use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string holding secret material (passwords, API keys, tokens).
///
/// Neither `Debug` nor `Display` ever print the inner value; both render
/// [`REDACTED_PLACEHOLDER`]. Access goes through [`reveal`](Self::reveal),
/// which keeps every read of the raw value greppable. The backing buffer is
/// zeroed on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

/// Marker printed instead of secret values, shared with diff redaction.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read-only access to the raw secret.
    ///
    /// The returned slice must not be logged or persisted.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Constant-shape equality check against another secret.
    ///
    /// Compares every byte regardless of where the first mismatch occurs so
    /// the comparison time does not depend on the common-prefix length.
    #[must_use]
    pub fn matches(&self, other: &SecretString) -> bool {
        let a = self.0.as_bytes();
        let b = other.0.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        let mut diff = 0u8;
        for (x, y) in a.iter().zip(b.iter()) {
            diff |= x ^ y;
        }
        diff == 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_PLACEHOLDER)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED_PLACEHOLDER)
    }
}
