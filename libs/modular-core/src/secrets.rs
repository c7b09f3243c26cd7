//! Secret handling behind a provider contract.
//!
//! Callers hold opaque handles; the provider owns the secret material.
//! The default provider keeps secrets in zeroizing buffers and compares in
//! constant shape; the insecure variant is for tests and development
//! setups where plain strings are acceptable.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use modular_utils::SecretString;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretHandle(Uuid);

impl SecretHandle {
    fn next() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHandle({})", self.0)
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {handle}")]
    NotFound { handle: SecretHandle },
}

/// Storage contract for secret material.
pub trait SecretProvider: Send + Sync {
    fn store(&self, value: SecretString) -> SecretHandle;

    /// # Errors
    /// `NotFound` for unknown or destroyed handles.
    fn retrieve(&self, handle: &SecretHandle) -> Result<SecretString, SecretError>;

    /// Compare a candidate against the stored secret without exposing it.
    ///
    /// # Errors
    /// `NotFound` for unknown or destroyed handles.
    fn compare(&self, handle: &SecretHandle, candidate: &SecretString) -> Result<bool, SecretError>;

    /// Remove the secret; returns whether a secret was destroyed.
    fn destroy(&self, handle: &SecretHandle) -> bool;
}

/// In-memory provider over zeroizing buffers; comparison time does not
/// depend on the common-prefix length.
#[derive(Default)]
pub struct MemorySecretProvider {
    secrets: RwLock<HashMap<SecretHandle, SecretString>>,
}

impl MemorySecretProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

impl SecretProvider for MemorySecretProvider {
    fn store(&self, value: SecretString) -> SecretHandle {
        let handle = SecretHandle::next();
        self.secrets.write().insert(handle, value);
        handle
    }

    fn retrieve(&self, handle: &SecretHandle) -> Result<SecretString, SecretError> {
        self.secrets
            .read()
            .get(handle)
            .cloned()
            .ok_or(SecretError::NotFound { handle: *handle })
    }

    fn compare(&self, handle: &SecretHandle, candidate: &SecretString) -> Result<bool, SecretError> {
        let r = self.secrets.read();
        let stored = r.get(handle).ok_or(SecretError::NotFound { handle: *handle })?;
        Ok(stored.matches(candidate))
    }

    fn destroy(&self, handle: &SecretHandle) -> bool {
        self.secrets.write().remove(handle).is_some()
    }
}

/// Plain-string provider without zeroization. Only for tests and
/// development setups.
#[derive(Default)]
pub struct InsecureSecretProvider {
    secrets: RwLock<HashMap<SecretHandle, String>>,
}

impl InsecureSecretProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretProvider for InsecureSecretProvider {
    fn store(&self, value: SecretString) -> SecretHandle {
        let handle = SecretHandle::next();
        self.secrets.write().insert(handle, value.reveal().to_owned());
        handle
    }

    fn retrieve(&self, handle: &SecretHandle) -> Result<SecretString, SecretError> {
        self.secrets
            .read()
            .get(handle)
            .map(|s| SecretString::new(s.clone()))
            .ok_or(SecretError::NotFound { handle: *handle })
    }

    fn compare(&self, handle: &SecretHandle, candidate: &SecretString) -> Result<bool, SecretError> {
        let r = self.secrets.read();
        let stored = r.get(handle).ok_or(SecretError::NotFound { handle: *handle })?;
        Ok(stored == candidate.reveal())
    }

    fn destroy(&self, handle: &SecretHandle) -> bool {
        self.secrets.write().remove(handle).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(provider: &dyn SecretProvider) {
        let handle = provider.store(SecretString::new("api-key-1"));
        assert_eq!(provider.retrieve(&handle).unwrap().reveal(), "api-key-1");

        assert!(provider.compare(&handle, &SecretString::new("api-key-1")).unwrap());
        assert!(!provider.compare(&handle, &SecretString::new("api-key-2")).unwrap());

        assert!(provider.destroy(&handle));
        assert!(!provider.destroy(&handle));
        assert!(matches!(
            provider.retrieve(&handle),
            Err(SecretError::NotFound { .. })
        ));
    }

    #[test]
    fn memory_provider_roundtrip() {
        roundtrip(&MemorySecretProvider::new());
    }

    #[test]
    fn insecure_provider_roundtrip() {
        roundtrip(&InsecureSecretProvider::new());
    }

    #[test]
    fn handles_are_unique() {
        let provider = MemorySecretProvider::new();
        let a = provider.store(SecretString::new("x"));
        let b = provider.store(SecretString::new("x"));
        assert_ne!(a, b);
        assert_eq!(provider.len(), 2);
    }
}
