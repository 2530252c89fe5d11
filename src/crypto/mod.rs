//! Tenant database password encryption at rest.
//!
//! Passwords are sealed with AES-256-GCM under a key stretched from the shared
//! secret with PBKDF2-HMAC-SHA256. Tokens are `hex(iv):hex(tag):hex(ciphertext)`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;
pub const DEFAULT_KDF_SALT: &str = "club-tenancy-credential-salt";

/// The single failure a caller ever sees from [`decrypt`]. Malformed tokens,
/// bad lengths and failed authentication are indistinguishable on purpose.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("credential token could not be decrypted")]
pub struct CryptoError;

/// Key derivation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
    pub salt: String,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_KDF_ITERATIONS,
            salt: DEFAULT_KDF_SALT.to_string(),
        }
    }
}

fn derive_key(secret: &str, params: &KdfParams) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        secret.as_bytes(),
        params.salt.as_bytes(),
        params.iterations.max(1),
        &mut key[..],
    );
    key
}

/// Cipher bound to one derived key. Derivation is slow, so build this once
/// at startup and share it.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn new(secret: &str, params: &KdfParams) -> Self {
        let key = derive_key(secret, params);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..])),
        }
    }

    /// Seal `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CryptoError)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    pub fn decrypt(&self, token: &str) -> Result<Zeroizing<String>, CryptoError> {
        let mut fields = token.split(':');
        let (iv, tag, ciphertext) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(iv), Some(tag), Some(ciphertext), None) => (iv, tag, ciphertext),
            _ => return Err(CryptoError),
        };

        let iv = hex::decode(iv).map_err(|_| CryptoError)?;
        let tag = hex::decode(tag).map_err(|_| CryptoError)?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError);
        }

        let mut buffer = Zeroizing::new(hex::decode(ciphertext).map_err(|_| CryptoError)?);
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&iv),
                b"",
                buffer.as_mut_slice(),
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError)?;

        let plaintext = std::str::from_utf8(&buffer).map_err(|_| CryptoError)?;
        Ok(Zeroizing::new(plaintext.to_string()))
    }
}

/// One-shot encryption with default KDF parameters.
pub fn encrypt(plaintext: &str, secret: &str) -> Result<String, CryptoError> {
    CredentialCipher::new(secret, &KdfParams::default()).encrypt(plaintext)
}

/// One-shot decryption with default KDF parameters.
pub fn decrypt(token: &str, secret: &str) -> Result<Zeroizing<String>, CryptoError> {
    CredentialCipher::new(secret, &KdfParams::default()).decrypt(token)
}
