use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use crate::engine::kdf::DerivedKey;
use crate::{Result, Error};

/// Length of the AES-GCM nonce (96 bits).
pub const NONCE_LENGTH: usize = 12;
/// Length of the AES-GCM authentication tag.
pub const TAG_LENGTH: usize = 16;

/// Encrypts `plaintext` with AES-256-GCM, binding `aad` as associated data.
///
/// A fresh random nonce is drawn for every call. Returns the nonce followed by
/// the ciphertext and tag.
pub fn seal(plaintext: &[u8], aad: &[u8], key: &DerivedKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| Error::Crypto(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|e| Error::Crypto(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypts the output of [`seal`].
///
/// Any failure (wrong key, modified ciphertext or aad, truncated input) is
/// reported as [`Error::Unlock`].
pub fn open(sealed: &[u8], aad: &[u8], key: &DerivedKey) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LENGTH + TAG_LENGTH {
        return Err(Error::Unlock);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| Error::Crypto(e.to_string()))?;
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| Error::Unlock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::kdf::{derive_key, test_params};

    fn key(password: &str) -> DerivedKey {
        derive_key(password, &[3u8; 16], &test_params()).unwrap()
    }

    #[test]
    fn test_seal_open() {
        let k = key("hunter2");
        let sealed = seal(b"hello log", b"hdr", &k).unwrap();
        assert_ne!(&sealed[NONCE_LENGTH..], b"hello log");
        assert_eq!(open(&sealed, b"hdr", &k).unwrap(), b"hello log");
    }

    #[test]
    fn test_open_with_wrong_key() {
        let sealed = seal(b"secret", b"hdr", &key("hunter2")).unwrap();
        assert!(matches!(open(&sealed, b"hdr", &key("wrong")), Err(Error::Unlock)));
    }

    #[test]
    fn test_tampering_detected() {
        let k = key("hunter2");
        let mut sealed = seal(b"secret", b"hdr", &k).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(open(&sealed, b"hdr", &k), Err(Error::Unlock)));

        let sealed = seal(b"secret", b"hdr", &k).unwrap();
        assert!(matches!(open(&sealed, b"HDR", &k), Err(Error::Unlock)));
        assert!(matches!(open(&sealed[..10], b"hdr", &k), Err(Error::Unlock)));
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let k = key("hunter2");
        let a = seal(b"same", b"", &k).unwrap();
        let b = seal(b"same", b"", &k).unwrap();
        assert_ne!(a[..NONCE_LENGTH], b[..NONCE_LENGTH]);
    }
}
