// Copyright (c) 2024 Botho Foundation

//! A circuit hop.
//!
//! A relay holds its long-lived keypair, at most one circuit key, and
//! single-slot `inbox`/`buffer` fields that are overwritten wholesale by
//! every delivery. It only ever learns the name of the participant that
//! delivered to it and the name it must forward to.
//!
//! ```text
//! forward: inbox --decrypt(key)--> [next_hop | inner] --> buffer --> next_hop
//! reply:   inbox --encrypt(key)--> buffer --> received_from
//! ```

use rand::{CryptoRng, RngCore};
use tracing::debug;

use super::{
    crypto::{decrypt_layer, encrypt_layer, open_sealed},
    framing::{Framing, Layer},
    types::{RelayKeypair, RelayPublicKey, SymmetricKey},
};
use crate::error::{ProtocolError, SimResult};

/// State of one relay.
#[derive(Debug)]
pub struct Relay {
    name: String,
    capacity: u32,
    keypair: RelayKeypair,
    key: Option<SymmetricKey>,
    inbox: Vec<u8>,
    buffer: Vec<u8>,
    received_from: Option<String>,
    send_to: Option<String>,
}

impl Relay {
    /// Create a relay with a fresh keypair.
    pub fn new<R: RngCore + CryptoRng>(name: impl Into<String>, capacity: u32, rng: &mut R) -> Self {
        Self {
            name: name.into(),
            capacity,
            keypair: RelayKeypair::generate(rng),
            key: None,
            inbox: Vec::new(),
            buffer: Vec::new(),
            received_from: None,
            send_to: None,
        }
    }

    /// Relay name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advertised capacity, used only for ranking.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Public key handed to circuit initiators.
    pub fn public_key(&self) -> RelayPublicKey {
        self.keypair.public()
    }

    /// The negotiated circuit key, if the key exchange has completed.
    pub fn symmetric_key(&self) -> Option<&SymmetricKey> {
        self.key.as_ref()
    }

    /// Last payload delivered to this relay.
    pub fn inbox(&self) -> &[u8] {
        &self.inbox
    }

    /// Last payload this relay produced.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Participant that last delivered to this relay.
    pub fn received_from(&self) -> Option<&str> {
        self.received_from.as_deref()
    }

    /// Participant this relay last forwarded to.
    pub fn send_to(&self) -> Option<&str> {
        self.send_to.as_deref()
    }

    /// Overwrite the inbox and record the sender.
    pub(crate) fn receive(&mut self, from: &str, payload: Vec<u8>) {
        self.inbox = payload;
        self.received_from = Some(from.to_string());
    }

    /// Overwrite the inbox without touching the recorded sender (reply
    /// direction).
    pub(crate) fn receive_reply(&mut self, payload: Vec<u8>) {
        self.inbox = payload;
    }

    fn require_key(&self) -> SimResult<&SymmetricKey> {
        self.key
            .as_ref()
            .ok_or_else(|| ProtocolError::MissingKey(self.name.clone()).into())
    }

    /// Open the sealed key in the inbox and install it as this relay's
    /// circuit key.
    pub fn complete_key_exchange(&mut self, framing: Framing) -> SimResult<()> {
        if self.key.is_some() {
            return Err(ProtocolError::KeyAlreadyEstablished(self.name.clone()).into());
        }

        let plaintext = open_sealed(&self.keypair, &self.inbox)?;
        match framing.decode(&plaintext)? {
            Layer::Terminal(bytes) => {
                let key = SymmetricKey::from_bytes(&bytes)
                    .ok_or(ProtocolError::InvalidKeyLength(bytes.len()))?;
                debug!(relay = %self.name, key = %key.fingerprint(), "circuit key established");
                self.key = Some(key);
                Ok(())
            }
            Layer::Route { .. } => Err(ProtocolError::UnexpectedRoute(self.name.clone()).into()),
        }
    }

    /// Remove this relay's layer from the inbox.
    ///
    /// A routing instruction sets `send_to` and stores the opaque remainder
    /// in `buffer`, ready to be dispatched verbatim. A terminal payload would
    /// be a new key for this hop, which is refused because the circuit key is
    /// fixed once negotiated.
    ///
    /// Returns the name to forward to.
    pub fn peel(&mut self, framing: Framing) -> SimResult<String> {
        let key = self.require_key()?;
        let plaintext = decrypt_layer(key, &self.inbox)?;

        match framing.decode(&plaintext)? {
            Layer::Route { next_hop, inner } => {
                debug!(relay = %self.name, next_hop = %next_hop, bytes = inner.len(), "peeled layer");
                self.buffer = inner;
                self.send_to = Some(next_hop.clone());
                Ok(next_hop)
            }
            Layer::Terminal(_) => Err(ProtocolError::KeyAlreadyEstablished(self.name.clone()).into()),
        }
    }

    /// Add this relay's layer to a reply travelling back to the initiator.
    ///
    /// Returns the name of the predecessor to return the buffer to.
    pub fn wrap_reply(&mut self) -> SimResult<String> {
        let key = self.require_key()?;
        let predecessor = self
            .received_from
            .clone()
            .ok_or_else(|| ProtocolError::NoPredecessor(self.name.clone()))?;

        self.buffer = encrypt_layer(key, &self.inbox)?;
        debug!(relay = %self.name, to = %predecessor, bytes = self.buffer.len(), "wrapped reply");
        Ok(predecessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::crypto::seal_to;
    use crate::error::SimError;

    fn keyed_relay(framing: Framing) -> (Relay, SymmetricKey) {
        let mut relay = Relay::new("R0", 10, &mut rand::thread_rng());
        let key = SymmetricKey::random(&mut rand::thread_rng());
        let sealed = seal_to(&relay.public_key(), &framing.encode_terminal(key.as_bytes())).unwrap();
        relay.receive("Alice", sealed);
        relay.complete_key_exchange(framing).unwrap();
        (relay, key)
    }

    #[test]
    fn test_key_exchange_installs_key() {
        for framing in [Framing::Separator, Framing::Tagged] {
            let (relay, key) = keyed_relay(framing);
            assert_eq!(relay.symmetric_key().unwrap().as_bytes(), key.as_bytes());
            assert_eq!(relay.received_from(), Some("Alice"));
        }
    }

    #[test]
    fn test_second_key_exchange_rejected() {
        let (mut relay, _) = keyed_relay(Framing::Separator);
        let result = relay.complete_key_exchange(Framing::Separator);
        assert!(matches!(
            result,
            Err(SimError::Protocol(ProtocolError::KeyAlreadyEstablished(_)))
        ));
    }

    #[test]
    fn test_key_exchange_wrong_length() {
        let mut relay = Relay::new("R0", 1, &mut rand::thread_rng());
        let sealed = seal_to(&relay.public_key(), &[1u8; 16]).unwrap();
        relay.receive("Alice", sealed);
        assert!(matches!(
            relay.complete_key_exchange(Framing::Separator),
            Err(SimError::Protocol(ProtocolError::InvalidKeyLength(16)))
        ));
        assert!(relay.symmetric_key().is_none());
    }

    #[test]
    fn test_key_exchange_route_rejected() {
        let mut relay = Relay::new("R0", 1, &mut rand::thread_rng());
        let payload = Framing::Tagged.encode_route("R1", b"inner").unwrap();
        relay.receive("Alice", seal_to(&relay.public_key(), &payload).unwrap());
        assert!(matches!(
            relay.complete_key_exchange(Framing::Tagged),
            Err(SimError::Protocol(ProtocolError::UnexpectedRoute(_)))
        ));
    }

    #[test]
    fn test_peel_without_key() {
        let mut relay = Relay::new("R0", 1, &mut rand::thread_rng());
        relay.receive("Alice", vec![0u8; 64]);
        assert!(matches!(
            relay.peel(Framing::Separator),
            Err(SimError::Protocol(ProtocolError::MissingKey(_)))
        ));
    }

    #[test]
    fn test_peel_routes_and_buffers_remainder() {
        let (mut relay, key) = keyed_relay(Framing::Separator);
        let plaintext = Framing::Separator.encode_route("R1", b"opaque").unwrap();
        relay.receive("Alice", encrypt_layer(&key, &plaintext).unwrap());

        assert_eq!(relay.peel(Framing::Separator).unwrap(), "R1");
        assert_eq!(relay.send_to(), Some("R1"));
        assert_eq!(relay.buffer(), b"opaque");
    }

    #[test]
    fn test_peel_terminal_refused() {
        let (mut relay, key) = keyed_relay(Framing::Tagged);
        let plaintext = Framing::Tagged.encode_terminal(&[9u8; 32]);
        relay.receive("Alice", encrypt_layer(&key, &plaintext).unwrap());
        assert!(matches!(
            relay.peel(Framing::Tagged),
            Err(SimError::Protocol(ProtocolError::KeyAlreadyEstablished(_)))
        ));
        assert_eq!(relay.symmetric_key().unwrap().as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_peel_wrong_key_is_crypto_error() {
        let (mut relay, _) = keyed_relay(Framing::Separator);
        let other = SymmetricKey::random(&mut rand::thread_rng());
        relay.receive("Alice", encrypt_layer(&other, b"R1|*-*|x").unwrap());
        assert!(matches!(relay.peel(Framing::Separator), Err(SimError::Crypto(_))));
    }

    #[test]
    fn test_wrap_reply_encrypts_inbox() {
        let (mut relay, key) = keyed_relay(Framing::Separator);
        relay.receive_reply(b"hi alice".to_vec());

        assert_eq!(relay.wrap_reply().unwrap(), "Alice");
        assert_eq!(decrypt_layer(&key, relay.buffer()).unwrap(), b"hi alice");
    }
}
