// Copyright (c) 2024 Botho Foundation

//! Key material for circuit hops.
//!
//! - [`SymmetricKey`]: per-hop key negotiated during circuit construction
//! - [`RelayKeypair`] / [`RelayPublicKey`]: long-lived X25519 identity of a
//!   relay, used to seal the hop key during the handshake
//!
//! # Security
//!
//! All secret material uses `zeroize`. Neither key type prints its bytes in
//! `Debug` output.

use rand::{CryptoRng, RngCore};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of symmetric keys in bytes (256-bit for ChaCha20-Poly1305).
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// Length of an X25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// A symmetric key shared between the circuit initiator and one hop.
///
/// The key is zeroed when dropped. `Clone` is intentionally not derived;
/// use [`SymmetricKey::duplicate`] when a second copy is genuinely needed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Generate a new random symmetric key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SYMMETRIC_KEY_LEN];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a symmetric key from raw bytes.
    ///
    /// Returns `None` if the slice length is not exactly
    /// [`SYMMETRIC_KEY_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SYMMETRIC_KEY_LEN {
            return None;
        }
        let mut arr = [0u8; SYMMETRIC_KEY_LEN];
        arr.copy_from_slice(bytes);
        Some(Self(arr))
    }

    /// Get the raw bytes of this key.
    ///
    /// Avoid copying or logging the returned reference.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }

    /// Create an explicit copy of this key.
    pub fn duplicate(&self) -> Self {
        Self(self.0)
    }

    /// Short SHA-256 fingerprint, safe to log.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(self.0);
        hex::encode(&hash[..4])
    }
}

impl AsRef<[u8]> for SymmetricKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey(sha256:{})", self.fingerprint())
    }
}

/// Public half of a relay's identity keypair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RelayPublicKey(PublicKey);

impl RelayPublicKey {
    /// Parse a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(PublicKey::from(arr)))
    }

    /// Get the raw bytes of this public key.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.0.as_bytes()
    }

    pub(crate) fn inner(&self) -> &PublicKey {
        &self.0
    }
}

impl fmt::Debug for RelayPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelayPublicKey({})", hex::encode(&self.as_bytes()[..4]))
    }
}

/// A relay's X25519 identity keypair, generated once when the relay is
/// created.
pub struct RelayKeypair {
    secret: StaticSecret,
    public: RelayPublicKey,
}

impl RelayKeypair {
    /// Generate a fresh keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = StaticSecret::random_from_rng(rng);
        let public = RelayPublicKey(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// The public key handed out to circuit initiators.
    pub fn public(&self) -> RelayPublicKey {
        self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl fmt::Debug for RelayKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_key_random_uniqueness() {
        let mut rng = rand::thread_rng();
        let key1 = SymmetricKey::random(&mut rng);
        let key2 = SymmetricKey::random(&mut rng);
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_symmetric_key_from_bytes_wrong_length() {
        assert!(SymmetricKey::from_bytes(&[0x42u8; 16]).is_none());
        assert!(SymmetricKey::from_bytes(&[0x42u8; SYMMETRIC_KEY_LEN]).is_some());
    }

    #[test]
    fn test_symmetric_key_debug_does_not_leak() {
        let key = SymmetricKey([0x42u8; SYMMETRIC_KEY_LEN]);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("42424242"));
        assert!(debug.contains("sha256:"));
    }

    #[test]
    fn test_symmetric_key_duplicate() {
        let key1 = SymmetricKey([0x42u8; SYMMETRIC_KEY_LEN]);
        let key2 = key1.duplicate();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(key1.fingerprint(), key2.fingerprint());
    }

    #[test]
    fn test_relay_public_key_round_trip() {
        let keypair = RelayKeypair::generate(&mut rand::thread_rng());
        let public = keypair.public();
        let parsed = RelayPublicKey::from_bytes(public.as_bytes()).unwrap();
        assert_eq!(parsed, public);
        assert!(RelayPublicKey::from_bytes(&[1u8; 31]).is_none());
    }

    #[test]
    fn test_keypair_debug_hides_secret() {
        let keypair = RelayKeypair::generate(&mut rand::thread_rng());
        let debug = format!("{:?}", keypair);
        assert!(debug.contains("RelayPublicKey"));
        assert!(!debug.contains("secret"));
    }
}
