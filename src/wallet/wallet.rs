use crate::error::{BlockchainError, Result};
use crate::storage::{
    derive_key_material, Aes256GcmCipher, EncryptionResult, KdfParams, SecureKey, SecureMemory,
    WalletRecord,
};
use crate::utils::{ed25519_public_key, ed25519_sign, random_bytes, sha256_digest, SEED_LEN};
use uuid::Uuid;

const SALT_LEN: usize = 16;

/// Secrets that only exist in memory after a successful password check
pub struct UnlockedKeys {
    storage_key: SecureKey,
    seeds: Vec<SecureKey>,
}

/// A password-protected set of Ed25519 keys.
///
/// The password material is stretched with argon2id into 64 bytes. The first
/// half is the AES key sealing the seeds at rest, the second half is the root
/// seed. Each further seed is `sha256(previous_seed || index)`, so the keys of a
/// wallet are reproducible from the password and its salt alone.
pub struct Wallet {
    id: Uuid,
    salt: Vec<u8>,
    verifier: Vec<u8>,
    kdf: KdfParams,
    addresses: Vec<String>,
    sealed_seeds: Vec<EncryptionResult>,
    unlocked: Option<UnlockedKeys>,
}

impl Wallet {
    /// Creates a wallet with its first address. The new wallet starts unlocked.
    pub fn create(password_material: &str, kdf: KdfParams) -> Result<Wallet> {
        let salt = random_bytes(SALT_LEN);
        let key_material = derive_key_material(password_material.as_bytes(), &salt, &kdf)?;
        let (storage_key, root_seed) = split_key_material(&key_material);

        let cipher = Aes256GcmCipher::new(&storage_key)?;
        let address = ed25519_public_key(root_seed.as_bytes())?;
        let sealed = cipher.encrypt(root_seed.as_bytes())?;

        Ok(Wallet {
            id: Uuid::new_v4(),
            salt,
            verifier: sha256_digest(key_material.as_bytes()),
            kdf,
            addresses: vec![address],
            sealed_seeds: vec![sealed],
            unlocked: Some(UnlockedKeys {
                storage_key,
                seeds: vec![root_seed],
            }),
        })
    }

    /// Restores a wallet from the vault. It stays locked until [`Wallet::unlock`] succeeds.
    pub fn from_record(record: WalletRecord) -> Result<Wallet> {
        if record.addresses.is_empty() || record.addresses.len() != record.sealed_seeds.len() {
            return Err(BlockchainError::Serialization(
                "Wallet record has mismatched addresses and keys".to_string(),
            ));
        }
        Ok(Wallet {
            id: Uuid::from_bytes(record.id),
            salt: record.salt,
            verifier: record.verifier,
            kdf: record.kdf,
            addresses: record.addresses,
            sealed_seeds: record.sealed_seeds,
            unlocked: None,
        })
    }

    pub fn to_record(&self) -> WalletRecord {
        WalletRecord {
            id: *self.id.as_bytes(),
            salt: self.salt.clone(),
            verifier: self.verifier.clone(),
            kdf: self.kdf,
            addresses: self.addresses.clone(),
            sealed_seeds: self.sealed_seeds.clone(),
        }
    }

    /// Checks the password material and, when it matches, opens the sealed seeds.
    /// A wrong password is `Ok(false)`, not an error.
    pub fn unlock(&mut self, password_material: &str) -> Result<bool> {
        match self.password_check().open(password_material)? {
            Some(keys) => {
                self.install_keys(keys);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// A copy of what a password check needs, so the key derivation can run
    /// without holding on to the wallet
    pub fn password_check(&self) -> PasswordCheck {
        PasswordCheck {
            salt: self.salt.clone(),
            verifier: self.verifier.clone(),
            kdf: self.kdf,
            addresses: self.addresses.clone(),
            sealed_seeds: self.sealed_seeds.clone(),
        }
    }

    /// Keeps the keys opened by a [`PasswordCheck`]. A wallet that is already
    /// unlocked keeps its own keys, they may cover addresses added since.
    pub fn install_keys(&mut self, keys: UnlockedKeys) {
        if self.unlocked.is_none() && keys.seeds.len() == self.addresses.len() {
            self.unlocked = Some(keys);
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.is_some()
    }

    /// Derives the next key pair and appends its address
    pub fn generate_address(&mut self) -> Result<String> {
        let keys = self.unlocked.as_mut().ok_or_else(|| {
            BlockchainError::Unauthorized("Wallet is locked, check the password first".to_string())
        })?;
        let previous = keys
            .seeds
            .last()
            .ok_or_else(|| BlockchainError::Crypto("Wallet has no root seed".to_string()))?;

        let index = keys.seeds.len() as u64;
        let mut material = previous.as_bytes().to_vec();
        material.extend_from_slice(&index.to_be_bytes());
        let seed = SecureKey::new(sha256_digest(&material));

        let address = ed25519_public_key(seed.as_bytes())?;
        let sealed = Aes256GcmCipher::new(&keys.storage_key)?.encrypt(seed.as_bytes())?;

        keys.seeds.push(seed);
        self.sealed_seeds.push(sealed);
        self.addresses.push(address.clone());
        Ok(address)
    }

    /// Signs `payload` with the key behind `address`
    pub fn sign(&self, address: &str, payload: &[u8]) -> Result<String> {
        let keys = self.unlocked.as_ref().ok_or_else(|| {
            BlockchainError::Unauthorized("Wallet is locked, check the password first".to_string())
        })?;
        let position = self
            .addresses
            .iter()
            .position(|a| a == address)
            .ok_or_else(|| {
                BlockchainError::Argument(format!("Address {address} does not belong to this wallet"))
            })?;
        let seed = keys
            .seeds
            .get(position)
            .ok_or_else(|| BlockchainError::Crypto(format!("No key for address {address}")))?;
        ed25519_sign(seed.as_bytes(), payload)
    }

    pub fn owns(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn get_addresses(&self) -> &[String] {
        &self.addresses
    }
}

/// Detached password check of one wallet
pub struct PasswordCheck {
    salt: Vec<u8>,
    verifier: Vec<u8>,
    kdf: KdfParams,
    addresses: Vec<String>,
    sealed_seeds: Vec<EncryptionResult>,
}

impl PasswordCheck {
    /// Runs the key derivation and opens the sealed seeds on a match.
    /// A wrong password is `Ok(None)`.
    pub fn open(&self, password_material: &str) -> Result<Option<UnlockedKeys>> {
        let key_material = derive_key_material(password_material.as_bytes(), &self.salt, &self.kdf)?;
        let verifier = sha256_digest(key_material.as_bytes());
        if !SecureMemory::constant_time_eq(&verifier, &self.verifier) {
            return Ok(None);
        }

        let (storage_key, _) = split_key_material(&key_material);
        let cipher = Aes256GcmCipher::new(&storage_key)?;
        let mut seeds = Vec::with_capacity(self.sealed_seeds.len());
        for (sealed, address) in self.sealed_seeds.iter().zip(&self.addresses) {
            let seed = cipher.decrypt(sealed)?;
            // The vault must agree with itself, otherwise it was tampered with
            if ed25519_public_key(seed.as_bytes())? != *address {
                return Err(BlockchainError::Encryption(format!(
                    "Sealed key does not match address {address}"
                )));
            }
            seeds.push(seed);
        }

        Ok(Some(UnlockedKeys { storage_key, seeds }))
    }
}

fn split_key_material(key_material: &SecureKey) -> (SecureKey, SecureKey) {
    let bytes = key_material.as_bytes();
    let (storage, seed) = bytes.split_at(bytes.len() - SEED_LEN);
    (SecureKey::new(storage.to_vec()), SecureKey::new(seed.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ed25519_verify;

    fn new_wallet() -> Wallet {
        Wallet::create("correct horse battery staple", KdfParams::insecure_for_tests()).unwrap()
    }

    #[test]
    fn test_new_wallet_has_one_address() {
        let wallet = new_wallet();
        assert!(wallet.is_unlocked());
        assert_eq!(wallet.get_addresses().len(), 1);
        assert_eq!(wallet.get_addresses()[0].len(), 64);
    }

    #[test]
    fn test_generated_addresses_are_distinct() {
        let mut wallet = new_wallet();
        let second = wallet.generate_address().unwrap();
        let third = wallet.generate_address().unwrap();

        assert_ne!(second, third);
        assert_ne!(wallet.get_addresses()[0], second);
        assert!(wallet.owns(&third));
    }

    #[test]
    fn test_sign_verifies_under_address() {
        let mut wallet = new_wallet();
        let address = wallet.generate_address().unwrap();

        let signature = wallet.sign(&address, b"payload").unwrap();
        assert!(ed25519_verify(&address, &signature, b"payload"));
        assert!(wallet.sign(&"00".repeat(32), b"payload").is_err());
    }

    #[test]
    fn test_restored_wallet_is_locked_until_password_matches() {
        let mut original = new_wallet();
        original.generate_address().unwrap();

        let mut restored = Wallet::from_record(original.to_record()).unwrap();
        assert!(!restored.is_unlocked());
        assert!(matches!(
            restored.generate_address(),
            Err(BlockchainError::Unauthorized(_))
        ));

        assert!(!restored.unlock("wrong password").unwrap());
        assert!(!restored.is_unlocked());

        assert!(restored.unlock("correct horse battery staple").unwrap());
        let address = restored.get_addresses()[1].clone();
        let signature = restored.sign(&address, b"payload").unwrap();
        assert!(ed25519_verify(&address, &signature, b"payload"));
    }

    #[test]
    fn test_password_check_runs_detached_from_the_wallet() {
        let original = new_wallet();
        let mut restored = Wallet::from_record(original.to_record()).unwrap();

        let check = restored.password_check();
        assert!(check.open("wrong password").unwrap().is_none());
        let keys = check.open("correct horse battery staple").unwrap().unwrap();
        assert!(!restored.is_unlocked());

        restored.install_keys(keys);
        assert!(restored.is_unlocked());
        let address = restored.get_addresses()[0].clone();
        assert!(restored.sign(&address, b"payload").is_ok());
    }

    #[test]
    fn test_stale_keys_do_not_replace_newer_ones() {
        let mut wallet = new_wallet();
        let keys = wallet
            .password_check()
            .open("correct horse battery staple")
            .unwrap()
            .unwrap();
        let added = wallet.generate_address().unwrap();

        // Opened before the new address existed
        wallet.install_keys(keys);
        assert!(wallet.sign(&added, b"payload").is_ok());
    }

    #[test]
    fn test_restored_wallet_derives_same_next_key() {
        let mut original = new_wallet();
        let record = original.to_record();
        let next = original.generate_address().unwrap();

        let mut restored = Wallet::from_record(record).unwrap();
        restored.unlock("correct horse battery staple").unwrap();
        assert_eq!(restored.generate_address().unwrap(), next);
    }
}
