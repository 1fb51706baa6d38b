//! AES-256-GCM encryption for stored credentials.
//!
//! Stored format: base64(nonce || ciphertext). The key is handed in at
//! start-up; there is no process-wide key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::DbError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64(key: &str) -> Result<Self, DbError> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| DbError::Cipher(format!("key is not valid base64: {e}")))?;
        if bytes.len() != KEY_SIZE {
            return Err(DbError::Cipher(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| DbError::Cipher(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, DbError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| DbError::Cipher(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, DbError> {
        let bytes = BASE64
            .decode(stored)
            .map_err(|e| DbError::Cipher(format!("stored value is not valid base64: {e}")))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(DbError::Cipher("stored value too short".into()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DbError::Cipher("decryption failed (wrong key or corrupted value)".into()))?;

        String::from_utf8(plaintext).map_err(|e| DbError::Cipher(e.to_string()))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher(..)")
    }
}
