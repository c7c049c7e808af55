use crate::error::{BlockchainError, Result};
use crate::utils::random_bytes;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use zeroize::ZeroizeOnDrop;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12; // AES-GCM uses 96-bit nonces

/// Ciphertext plus the nonce it was sealed with
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct EncryptionResult {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Secure key wrapper that automatically zeros memory on drop
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureKey {
    key: Vec<u8>,
}

impl SecureKey {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Get key bytes (use carefully)
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl std::fmt::Debug for SecureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKey")
            .field("length", &self.key.len())
            .finish()
    }
}

/// AES-256-GCM cipher for wallet key material
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    pub fn new(key: &SecureKey) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(BlockchainError::Encryption(
                "AES-256-GCM requires a 32-byte key".to_string(),
            ));
        }

        let aes_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Ok(Self {
            cipher: Aes256Gcm::new(aes_key),
        })
    }

    /// Encrypt data with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptionResult> {
        let nonce_bytes = random_bytes(NONCE_LEN);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self.cipher.encrypt(nonce, plaintext).map_err(|e| {
            BlockchainError::Encryption(format!("AES-256-GCM encryption failed: {e}"))
        })?;

        Ok(EncryptionResult {
            ciphertext,
            nonce: nonce_bytes,
        })
    }

    /// Decrypt and authenticate. A wrong key shows up here as an error.
    pub fn decrypt(&self, sealed: &EncryptionResult) -> Result<SecureKey> {
        if sealed.nonce.len() != NONCE_LEN {
            return Err(BlockchainError::Encryption(
                "AES-256-GCM requires a 12-byte nonce".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(&sealed.nonce);
        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.ciphertext.as_slice())
            .map_err(|e| {
                BlockchainError::Encryption(format!("AES-256-GCM decryption failed: {e}"))
            })?;

        Ok(SecureKey::new(plaintext))
    }
}

/// Secure memory utilities
pub struct SecureMemory;

impl SecureMemory {
    /// Compare two byte arrays in constant time
    pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        if a.len() != b.len() {
            return false;
        }

        let mut result = 0u8;
        for (x, y) in a.iter().zip(b.iter()) {
            result |= x ^ y;
        }
        result == 0
    }
}
