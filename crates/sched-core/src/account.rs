//! Account credential consumed by the schedule store.
//!
//! The store only needs two things from an account: the symmetric key its
//! file is encrypted with, and a stable identifier that names the
//! account's shared cache, lock and store file.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Length of the storage key in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    name: String,
    key: [u8; KEY_LEN],
    identifier: String,
}

impl Account {
    /// Derive an account credential from a username and password.
    ///
    /// Usernames must be non-empty ASCII alphanumerics.
    pub fn new(name: &str, password: &str) -> Result<Self> {
        if !Self::validate_name(name) {
            return Err(Error::InvalidName(name.to_string()));
        }
        let key: [u8; KEY_LEN] = Sha256::digest(password.as_bytes()).into();
        let name_hash = Sha256::digest(name.as_bytes());
        Ok(Self {
            name: name.to_string(),
            key,
            identifier: hex::encode(&name_hash[..8]),
        })
    }

    pub fn validate_name(name: &str) -> bool {
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symmetric key for the account's store file.
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Stable identifier, safe to embed in file and segment names.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_stable_and_hex() {
        let a = Account::new("alice", "pw1").unwrap();
        let b = Account::new("alice", "pw2").unwrap();
        assert_eq!(a.identifier(), b.identifier());
        assert_eq!(a.identifier().len(), 16);
        assert!(a.identifier().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(Account::new("", "pw"), Err(Error::InvalidName(_))));
        assert!(matches!(Account::new("bob smith", "pw"), Err(Error::InvalidName(_))));
        assert!(matches!(Account::new("../etc", "pw"), Err(Error::InvalidName(_))));
        assert!(Account::new("Bob42", "pw").is_ok());
    }

    #[test]
    fn test_debug_hides_key() {
        let a = Account::new("carol", "secret").unwrap();
        let dbg = format!("{:?}", a);
        assert!(dbg.contains("carol"));
        assert!(!dbg.contains("key"));
    }
}
