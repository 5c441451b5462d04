//! Password-based key derivation using Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::{Error, Result};

/// Length of the derived key in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

/// Length of the random salt stored in the file header.
pub const SALT_LENGTH: usize = 16;

/// Default Argon2id memory cost: 64 MiB.
pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
/// Default Argon2id pass count.
pub const DEFAULT_ITERATIONS: u32 = 3;
/// Default Argon2id lanes.
pub const DEFAULT_PARALLELISM: u32 = 1;

pub type Salt = [u8; SALT_LENGTH];

/// Argon2id cost parameters. They are recorded in the store header so a
/// store always reopens with the parameters it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl KdfParams {
    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, Some(KEY_LENGTH))
            .map_err(|e| Error::Crypto(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// A symmetric key derived from a password. Zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey").field("key", &"[REDACTED]").finish()
    }
}

/// Generates a fresh random salt from the operating system RNG.
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives a key from `password` and `salt`.
///
/// Deterministic for a given (password, salt, params) and deliberately slow;
/// run it off any interactive thread.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("password is required".to_string()));
    }

    let mut key = [0u8; KEY_LENGTH];
    params
        .argon2()?
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Crypto(format!("key derivation failed: {}", e)))?;

    Ok(DerivedKey { key })
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams { memory_kib: 1024, iterations: 1, parallelism: 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [7u8; SALT_LENGTH];
        let k1 = derive_key("hunter2", &salt, &test_params()).unwrap();
        let k2 = derive_key("hunter2", &salt, &test_params()).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_salt_and_password_change_key() {
        let salt = [7u8; SALT_LENGTH];
        let base = derive_key("hunter2", &salt, &test_params()).unwrap();

        let other_salt = derive_key("hunter2", &[8u8; SALT_LENGTH], &test_params()).unwrap();
        assert_ne!(base.as_bytes(), other_salt.as_bytes());

        let other_password = derive_key("hunter3", &salt, &test_params()).unwrap();
        assert_ne!(base.as_bytes(), other_password.as_bytes());
    }

    #[test]
    fn test_empty_password_rejected() {
        let res = derive_key("", &generate_salt(), &test_params());
        assert!(matches!(res, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bad_params_rejected() {
        let params = KdfParams { memory_kib: 1, iterations: 0, parallelism: 1 };
        let res = derive_key("hunter2", &generate_salt(), &params);
        assert!(matches!(res, Err(Error::Crypto(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_key("hunter2", &[1u8; SALT_LENGTH], &test_params()).unwrap();
        let out = format!("{:?}", key);
        assert!(out.contains("REDACTED"));
    }

    #[test]
    fn test_generated_salts_differ() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
