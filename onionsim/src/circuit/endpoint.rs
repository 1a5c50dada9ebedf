// Copyright (c) 2024 Botho Foundation

//! Circuit initiator and message recipient.
//!
//! The initiator keeps three index-aligned lists: relay names, the hop keys
//! it negotiated with them, and their public keys. Index 0 is the entry hop,
//! the last index is the exit hop.
//!
//! # Layering
//!
//! Onions are built back to front (innermost layer first):
//!
//! ```text
//! layer[n-1] = encrypt(k[n-1], route(recipient, message))
//! layer[i]   = encrypt(k[i],   route(relays[i+1], layer[i+1]))
//! ```
//!
//! Replies come back with each hop adding a layer in return order, so the
//! outermost layer is `k[0]` and the initiator decrypts in ascending index
//! order.

use tracing::debug;

use super::{
    crypto::{decrypt_layer, encrypt_layer, seal_to},
    framing::Framing,
    types::{RelayPublicKey, SymmetricKey},
};
use crate::error::{ProtocolError, SimResult};

/// An endpoint (the "Alice" or "Bob" role).
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    relays: Vec<String>,
    keys: Vec<SymmetricKey>,
    relay_public_keys: Vec<RelayPublicKey>,
    inbox: Vec<u8>,
    buffer: Vec<u8>,
    received_from: Option<String>,
    received_message: Option<String>,
}

impl Endpoint {
    /// Create an endpoint with no circuit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relays: Vec::new(),
            keys: Vec::new(),
            relay_public_keys: Vec::new(),
            inbox: Vec::new(),
            buffer: Vec::new(),
            received_from: None,
            received_message: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relay names of the circuit, entry first.
    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// Hop keys, index-aligned with [`Endpoint::relays`].
    pub fn keys(&self) -> &[SymmetricKey] {
        &self.keys
    }

    /// Relay public keys, index-aligned with [`Endpoint::relays`].
    pub fn relay_public_keys(&self) -> &[RelayPublicKey] {
        &self.relay_public_keys
    }

    pub fn inbox(&self) -> &[u8] {
        &self.inbox
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn received_from(&self) -> Option<&str> {
        self.received_from.as_deref()
    }

    /// Last reply recovered by [`Endpoint::unwrap_reply`].
    pub fn received_message(&self) -> Option<&str> {
        self.received_message.as_deref()
    }

    /// Name of the entry hop.
    pub fn entry(&self) -> SimResult<&str> {
        self.relays
            .first()
            .map(String::as_str)
            .ok_or_else(|| ProtocolError::EmptyCircuit(self.name.clone()).into())
    }

    pub(crate) fn receive(&mut self, from: &str, payload: Vec<u8>) {
        self.inbox = payload;
        self.received_from = Some(from.to_string());
    }

    /// Wrap `payload` in one route layer per existing hop, from the hop
    /// before `relays[last]` down to the entry.
    fn telescope(&self, mut payload: Vec<u8>, last: usize, framing: Framing) -> SimResult<Vec<u8>> {
        for hop in (0..last).rev() {
            let plaintext = framing.encode_route(&self.relays[hop + 1], &payload)?;
            payload = encrypt_layer(&self.keys[hop], &plaintext)?;
        }
        Ok(payload)
    }

    /// Append a hop to the circuit.
    ///
    /// A fresh hop key is sealed to the new relay's public key and wrapped
    /// through every existing hop so that only the new relay can read it.
    /// Returns the payload to deliver to the entry hop.
    pub fn extend_circuit(
        &mut self,
        relay_name: &str,
        relay_public_key: RelayPublicKey,
        framing: Framing,
    ) -> SimResult<Vec<u8>> {
        let key = SymmetricKey::random(&mut rand::thread_rng());
        let sealed = seal_to(&relay_public_key, &framing.encode_terminal(key.as_bytes()))?;

        debug!(
            endpoint = %self.name,
            relay = %relay_name,
            hop = self.relays.len(),
            key = %key.fingerprint(),
            "extending circuit"
        );

        self.relays.push(relay_name.to_string());
        self.keys.push(key);
        self.relay_public_keys.push(relay_public_key);

        let payload = self.telescope(sealed, self.relays.len() - 1, framing)?;
        self.buffer = payload.clone();
        Ok(payload)
    }

    /// Build the onion for `message` addressed to `recipient`.
    ///
    /// Returns the payload to deliver to the entry hop.
    pub fn wrap_message(
        &mut self,
        recipient: &str,
        message: &[u8],
        framing: Framing,
    ) -> SimResult<Vec<u8>> {
        let exit = self
            .keys
            .len()
            .checked_sub(1)
            .ok_or_else(|| ProtocolError::EmptyCircuit(self.name.clone()))?;

        let innermost = encrypt_layer(&self.keys[exit], &framing.encode_route(recipient, message)?)?;
        let payload = self.telescope(innermost, exit, framing)?;

        debug!(endpoint = %self.name, layers = self.keys.len(), bytes = payload.len(), "wrapped onion");
        self.buffer = payload.clone();
        Ok(payload)
    }

    /// Remove every reply layer from the inbox and return the plaintext.
    pub fn unwrap_reply(&mut self) -> SimResult<String> {
        if self.keys.is_empty() {
            return Err(ProtocolError::EmptyCircuit(self.name.clone()).into());
        }

        let mut plaintext = self.inbox.clone();
        for key in &self.keys {
            plaintext = decrypt_layer(key, &plaintext)?;
        }
        self.buffer = plaintext;

        let text = String::from_utf8(self.buffer.clone())
            .map_err(|_| ProtocolError::NotUtf8(self.name.clone()))?;
        self.received_message = Some(text.clone());
        Ok(text)
    }

    /// Decode the inbox as a delivered text message.
    pub fn read_inbox(&self) -> SimResult<String> {
        String::from_utf8(self.inbox.clone())
            .map_err(|_| ProtocolError::NotUtf8(self.name.clone()).into())
    }
}
