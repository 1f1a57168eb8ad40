use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{KEY_SIZE, NONCE_SIZE, SALT_SIZE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Encrypted value is too short")]
    InvalidData,
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("Encryption failed")]
    EncryptionFailed,
}

// Random salt for a new keystore
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Symmetric cipher derived from the wallet password.
///
/// Each value is stored as `nonce || ciphertext` with a fresh random nonce.
pub struct Cipher {
    cipher: XChaCha20Poly1305,
}

impl Cipher {
    pub fn new(password: &str, salt: &[u8], algorithm: &Argon2) -> Result<Self, CipherError> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        algorithm
            .hash_password_into(password.as_bytes(), salt, &mut *key)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&*key)),
        })
    }

    pub fn encrypt_value(&self, value: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), value)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut encrypted = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        encrypted.extend_from_slice(&nonce);
        encrypted.extend_from_slice(&ciphertext);
        Ok(encrypted)
    }

    // A failed authentication means the key, so the password, is wrong
    pub fn decrypt_value(&self, encrypted: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        if encrypted.len() < NONCE_SIZE {
            return Err(CipherError::InvalidData);
        }

        let (nonce, ciphertext) = encrypted.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CipherError::InvalidPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEVNET_PASSWORD_ALGORITHM;

    #[test]
    fn test_encrypt_decrypt() {
        let salt = generate_salt();
        let cipher = Cipher::new("hunter2", &salt, &DEVNET_PASSWORD_ALGORITHM).unwrap();
        let encrypted = cipher.encrypt_value(b"secret key bytes").unwrap();
        assert_ne!(&encrypted[NONCE_SIZE..], b"secret key bytes");

        let decrypted = cipher.decrypt_value(&encrypted).unwrap();
        assert_eq!(decrypted.as_slice(), b"secret key bytes");
    }

    #[test]
    fn test_wrong_password() {
        let salt = generate_salt();
        let cipher = Cipher::new("hunter2", &salt, &DEVNET_PASSWORD_ALGORITHM).unwrap();
        let encrypted = cipher.encrypt_value(b"value").unwrap();

        let other = Cipher::new("hunter3", &salt, &DEVNET_PASSWORD_ALGORITHM).unwrap();
        assert_eq!(
            other.decrypt_value(&encrypted),
            Err(CipherError::InvalidPassword)
        );
        assert_eq!(
            other.decrypt_value(&[0u8; 4]),
            Err(CipherError::InvalidData)
        );
    }
}
