// Copyright (c) 2024 Botho Foundation

//! Cryptographic primitives consumed by the onion codec.
//!
//! Two primitives are provided:
//! - A symmetric, authenticated, self-describing layer cipher
//!   (ChaCha20-Poly1305 with a random nonce prepended to the output)
//! - A sealed-box style public key cipher used only during circuit
//!   construction to hand a fresh hop key to exactly one relay
//!   (ephemeral X25519 + HKDF-SHA256 + ChaCha20-Poly1305)
//!
//! # Wire Formats
//!
//! ```text
//! layer:  [nonce (12)][ciphertext][tag (16)]
//! sealed: [ephemeral X25519 public (32)][layer]
//! ```
//!
//! Callers never manage nonces; both formats carry everything needed to
//! decrypt besides the key.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey};

use super::types::{RelayKeypair, RelayPublicKey, SymmetricKey, PUBLIC_KEY_LEN, SYMMETRIC_KEY_LEN};

/// Size of ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of ChaCha20-Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Minimum valid encrypted layer size: nonce + tag (empty plaintext).
pub const MIN_LAYER_SIZE: usize = NONCE_SIZE + TAG_SIZE;

/// Minimum valid sealed message size.
pub const MIN_SEALED_SIZE: usize = PUBLIC_KEY_LEN + MIN_LAYER_SIZE;

/// Domain separation string for sealed-key derivation.
const SEALED_KEY_DOMAIN: &[u8] = b"onionsim-sealed-v1";

/// HKDF salt for sealed-key derivation.
const SEALED_KEY_SALT: &[u8] = b"onionsim-sealed-salt";

/// Errors from either primitive.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encrypted data is too short to be valid.
    #[error("encrypted data too short: got {0} bytes, need at least {1}")]
    TooShort(usize, usize),

    /// Authentication tag verification failed (wrong key or tampering).
    #[error("authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailed,

    /// The AEAD refused to encrypt.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Ephemeral public key produced an all-zero shared secret.
    #[error("non-contributory key exchange")]
    NonContributory,

    /// HKDF expansion failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

fn cipher(key: &[u8; SYMMETRIC_KEY_LEN]) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key))
}

fn seal_raw(key: &[u8; SYMMETRIC_KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher(key)
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

fn open_raw(key: &[u8; SYMMETRIC_KEY_LEN], encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < MIN_LAYER_SIZE {
        return Err(CryptoError::TooShort(encrypted.len(), MIN_LAYER_SIZE));
    }

    let nonce = Nonce::from_slice(&encrypted[..NONCE_SIZE]);
    cipher(key)
        .decrypt(nonce, &encrypted[NONCE_SIZE..])
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Encrypt one layer under a hop key.
///
/// Returns: [nonce (12 bytes)][ciphertext][tag (16 bytes)]
pub fn encrypt_layer(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal_raw(key.as_bytes(), plaintext)
}

/// Decrypt one layer under a hop key.
///
/// Deterministic: the same key and input always yield the same plaintext.
pub fn decrypt_layer(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
    open_raw(key.as_bytes(), encrypted)
}

/// Derive the one-shot sealing key from an X25519 shared secret.
///
/// Both public keys are bound into the HKDF info so a sealed message cannot
/// be replayed against a different recipient.
fn derive_sealing_key(
    shared_secret: &[u8],
    ephemeral: &PublicKey,
    recipient: &RelayPublicKey,
) -> Result<[u8; SYMMETRIC_KEY_LEN], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(SEALED_KEY_SALT), shared_secret);

    let mut info = Vec::with_capacity(SEALED_KEY_DOMAIN.len() + 2 * PUBLIC_KEY_LEN);
    info.extend_from_slice(SEALED_KEY_DOMAIN);
    info.extend_from_slice(ephemeral.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let mut key = [0u8; SYMMETRIC_KEY_LEN];
    hkdf.expand(&info, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {}", e)))?;
    Ok(key)
}

/// Encrypt `plaintext` so that only the holder of `recipient`'s secret key
/// can read it.
pub fn seal_to(recipient: &RelayPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(recipient.inner());
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    let mut key = derive_sealing_key(shared.as_bytes(), &ephemeral_public, recipient)?;
    let layer = seal_raw(&key, plaintext);
    zeroize::Zeroize::zeroize(&mut key);
    let layer = layer?;

    let mut output = Vec::with_capacity(PUBLIC_KEY_LEN + layer.len());
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&layer);
    Ok(output)
}

/// Open a message produced by [`seal_to`].
///
/// Fails with [`CryptoError::AuthenticationFailed`] when the keypair does not
/// match the recipient or the ciphertext was modified.
pub fn open_sealed(keypair: &RelayKeypair, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MIN_SEALED_SIZE {
        return Err(CryptoError::TooShort(sealed.len(), MIN_SEALED_SIZE));
    }

    let mut ephemeral_bytes = [0u8; PUBLIC_KEY_LEN];
    ephemeral_bytes.copy_from_slice(&sealed[..PUBLIC_KEY_LEN]);
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let shared = keypair.secret().diffie_hellman(&ephemeral_public);
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    let mut key = derive_sealing_key(shared.as_bytes(), &ephemeral_public, &keypair.public())?;
    let plaintext = open_raw(&key, &sealed[PUBLIC_KEY_LEN..]);
    zeroize::Zeroize::zeroize(&mut key);
    plaintext
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_key() -> SymmetricKey {
        SymmetricKey::random(&mut rand::thread_rng())
    }

    #[test]
    fn test_layer_round_trip() {
        let key = random_key();
        let encrypted = encrypt_layer(&key, b"hello, onion world!").unwrap();
        assert!(encrypted.len() >= MIN_LAYER_SIZE);

        let decrypted = decrypt_layer(&key, &encrypted).expect("decryption should succeed");
        assert_eq!(decrypted, b"hello, onion world!");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt_layer(&random_key(), b"secret data").unwrap();
        let result = decrypt_layer(&random_key(), &encrypted);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = random_key();
        let mut encrypted = encrypt_layer(&key, b"secret data").unwrap();
        if let Some(byte) = encrypted.get_mut(NONCE_SIZE + 3) {
            *byte ^= 0xFF;
        }
        let result = decrypt_layer(&key, &encrypted);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = random_key();
        let encrypted = encrypt_layer(&key, b"secret data").unwrap();
        let result = decrypt_layer(&key, &encrypted[..MIN_LAYER_SIZE - 1]);
        assert!(matches!(result, Err(CryptoError::TooShort(_, _))));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = random_key();
        let encrypted1 = encrypt_layer(&key, b"same payload").unwrap();
        let encrypted2 = encrypt_layer(&key, b"same payload").unwrap();
        assert_ne!(&encrypted1[..NONCE_SIZE], &encrypted2[..NONCE_SIZE]);
        assert_eq!(
            decrypt_layer(&key, &encrypted1).unwrap(),
            decrypt_layer(&key, &encrypted2).unwrap()
        );
    }

    #[test]
    fn test_decrypt_is_deterministic() {
        let key = random_key();
        let encrypted = encrypt_layer(&key, b"replay me").unwrap();
        assert_eq!(
            decrypt_layer(&key, &encrypted).unwrap(),
            decrypt_layer(&key, &encrypted).unwrap()
        );
    }

    #[test]
    fn test_empty_payload() {
        let key = random_key();
        let encrypted = encrypt_layer(&key, b"").unwrap();
        assert_eq!(encrypted.len(), MIN_LAYER_SIZE);
        assert!(decrypt_layer(&key, &encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_sealed_round_trip() {
        let keypair = RelayKeypair::generate(&mut rand::thread_rng());
        let key = random_key();

        let sealed = seal_to(&keypair.public(), key.as_bytes()).unwrap();
        assert_eq!(sealed.len(), MIN_SEALED_SIZE + SYMMETRIC_KEY_LEN);

        let opened = open_sealed(&keypair, &sealed).unwrap();
        assert_eq!(opened.as_slice(), key.as_bytes());
    }

    #[test]
    fn test_sealed_wrong_keypair_fails() {
        let mut rng = rand::thread_rng();
        let intended = RelayKeypair::generate(&mut rng);
        let other = RelayKeypair::generate(&mut rng);

        let sealed = seal_to(&intended.public(), b"only for intended").unwrap();
        let result = open_sealed(&other, &sealed);
        assert!(matches!(result, Err(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn test_sealed_tampered_fails() {
        let keypair = RelayKeypair::generate(&mut rand::thread_rng());
        let mut sealed = seal_to(&keypair.public(), b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            open_sealed(&keypair, &sealed),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_sealed_too_short() {
        let keypair = RelayKeypair::generate(&mut rand::thread_rng());
        assert!(matches!(
            open_sealed(&keypair, &[0u8; MIN_SEALED_SIZE - 1]),
            Err(CryptoError::TooShort(_, MIN_SEALED_SIZE))
        ));
    }
}
