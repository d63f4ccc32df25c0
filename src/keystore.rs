//! Keystore-backed signer.
//!
//! Wraps [`alloy_signer_local::PrivateKeySigner`]'s scrypt-encrypted,
//! go-ethereum-compatible keystore support (the same format the original
//! `accounts/keystore` layer used), so private keys are never held in
//! plaintext outside of the moment a transaction is signed. Follows
//! `foundry`'s `cast wallet new` usage of `PrivateKeySigner::new_keystore`
//! for keystore creation.

use std::path::{Path, PathBuf};

use alloy_consensus::TxLegacy;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Signature};
use alloy_signer_local::PrivateKeySigner;

/// Minimum accepted keystore password length, checked before any write to
/// disk so a short password never produces a keystore file at all.
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
    #[error("incorrect keystore password")]
    BadPassword,
    #[error("no unlocked account for address {0}")]
    NotUnlocked(Address),
    #[error("no keystore file for account {0}")]
    NoSuchAccount(Address),
    #[error("keystore I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid private key")]
    BadPrivateKey,
}

/// Holds unlocked signers in memory, keyed by address. An address must be
/// unlocked via [`Keystore::unlock`] before [`Keystore::sign`] will work for
/// it.
#[derive(Default)]
pub struct Keystore {
    dir: PathBuf,
    unlocked: dashmap::DashMap<Address, PrivateKeySigner>,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            unlocked: dashmap::DashMap::new(),
        }
    }

    /// Creates a new keystore file under the configured directory, encrypted
    /// with `password`, and leaves the resulting account unlocked.
    pub fn create(&self, password: &str) -> Result<Address, KeystoreError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(KeystoreError::PasswordTooShort);
        }
        std::fs::create_dir_all(&self.dir)?;
        let mut rng = rand::rng();
        let (signer, _filename) =
            PrivateKeySigner::new_keystore(&self.dir, &mut rng, password, None)
                .map_err(|_| KeystoreError::BadPrivateKey)?;
        let address = signer.address();
        self.unlocked.insert(address, signer);
        Ok(address)
    }

    /// Imports a raw private key (hex, with or without `0x`) into a new
    /// keystore file encrypted with `password`, leaving it unlocked.
    pub fn import(&self, private_key_hex: &str, password: &str) -> Result<Address, KeystoreError> {
        if password.len() < MIN_PASSWORD_LEN {
            return Err(KeystoreError::PasswordTooShort);
        }
        std::fs::create_dir_all(&self.dir)?;
        let trimmed = private_key_hex.trim_start_matches("0x");
        let key_bytes = hex::decode(trimmed).map_err(|_| KeystoreError::BadPrivateKey)?;
        let mut rng = rand::rng();
        let (signer, _filename) = PrivateKeySigner::encrypt_keystore(
            &self.dir,
            &mut rng,
            &key_bytes,
            password,
            None,
        )
        .map_err(|_| KeystoreError::BadPrivateKey)?;
        let address = signer.address();
        self.unlocked.insert(address, signer);
        Ok(address)
    }

    /// Decrypts the keystore file for `address` (named `<address>` or
    /// `<address>.json` under the configured directory) with `password` and
    /// keeps it unlocked for subsequent [`Keystore::sign`] calls.
    pub fn unlock(&self, address: Address, password: &str) -> Result<(), KeystoreError> {
        let path = self
            .find_keystore_file(address)
            .ok_or(KeystoreError::NoSuchAccount(address))?;
        let signer = PrivateKeySigner::decrypt_keystore(&path, password)
            .map_err(|_| KeystoreError::BadPassword)?;
        self.unlocked.insert(address, signer);
        Ok(())
    }

    /// Signs `tx` with the unlocked signer for `address`.
    pub fn sign(&self, address: Address, tx: &mut TxLegacy) -> Result<Signature, KeystoreError> {
        let signer = self
            .unlocked
            .get(&address)
            .ok_or(KeystoreError::NotUnlocked(address))?;
        signer
            .sign_transaction_sync(tx)
            .map_err(|_| KeystoreError::NotUnlocked(address))
    }

    fn find_keystore_file(&self, address: Address) -> Option<PathBuf> {
        let plain = self.dir.join(format!("{address:#x}"));
        if plain.exists() {
            return Some(plain);
        }
        let with_ext = self.dir.join(format!("{address:#x}.json"));
        if with_ext.exists() {
            return Some(with_ext);
        }
        scan_dir_for_address(&self.dir, address)
    }
}

fn scan_dir_for_address(dir: &Path, address: Address) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let needle = hex::encode(address).to_lowercase();
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.to_lowercase().contains(&needle) {
                return Some(path);
            }
        }
    }
    None
}
