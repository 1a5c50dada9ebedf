// Copyright (c) 2024 Botho Foundation

//! Simulated network.
//!
//! [`Network`] owns every participant and is the only way one participant
//! reaches another: "sending" is a direct overwrite of the target's inbox.
//! Participants refer to each other by name and never hold references to
//! their peers.

use std::collections::HashMap;

use tracing::debug;

use super::{endpoint::Endpoint, framing::Framing, relay::Relay};
use crate::error::{ProtocolError, SimResult};

/// A registered participant.
#[derive(Debug)]
pub enum Participant {
    Relay(Relay),
    Endpoint(Endpoint),
}

/// Name-indexed participant context shared by every protocol step.
#[derive(Debug, Default)]
pub struct Network {
    participants: HashMap<String, Participant>,
    framing: Framing,
}

impl Network {
    pub fn new(framing: Framing) -> Self {
        Self {
            participants: HashMap::new(),
            framing,
        }
    }

    /// Layer encoding spoken on this network.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn contains(&self, name: &str) -> bool {
        self.participants.contains_key(name)
    }

    fn insert(&mut self, name: String, participant: Participant) -> SimResult<()> {
        if self.participants.contains_key(&name) {
            return Err(ProtocolError::DuplicateParticipant(name).into());
        }
        self.participants.insert(name, participant);
        Ok(())
    }

    pub fn add_relay(&mut self, relay: Relay) -> SimResult<()> {
        self.insert(relay.name().to_string(), Participant::Relay(relay))
    }

    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> SimResult<()> {
        self.insert(endpoint.name().to_string(), Participant::Endpoint(endpoint))
    }

    fn get(&self, name: &str) -> SimResult<&Participant> {
        self.participants
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownParticipant(name.to_string()).into())
    }

    fn get_mut(&mut self, name: &str) -> SimResult<&mut Participant> {
        self.participants
            .get_mut(name)
            .ok_or_else(|| ProtocolError::UnknownParticipant(name.to_string()).into())
    }

    fn wrong_role(name: &str, expected: &'static str) -> ProtocolError {
        ProtocolError::WrongRole {
            name: name.to_string(),
            expected,
        }
    }

    pub fn relay(&self, name: &str) -> SimResult<&Relay> {
        match self.get(name)? {
            Participant::Relay(relay) => Ok(relay),
            Participant::Endpoint(_) => Err(Self::wrong_role(name, "relay").into()),
        }
    }

    pub fn relay_mut(&mut self, name: &str) -> SimResult<&mut Relay> {
        match self.get_mut(name)? {
            Participant::Relay(relay) => Ok(relay),
            Participant::Endpoint(_) => Err(Self::wrong_role(name, "relay").into()),
        }
    }

    pub fn endpoint(&self, name: &str) -> SimResult<&Endpoint> {
        match self.get(name)? {
            Participant::Endpoint(endpoint) => Ok(endpoint),
            Participant::Relay(_) => Err(Self::wrong_role(name, "endpoint").into()),
        }
    }

    pub fn endpoint_mut(&mut self, name: &str) -> SimResult<&mut Endpoint> {
        match self.get_mut(name)? {
            Participant::Endpoint(endpoint) => Ok(endpoint),
            Participant::Relay(_) => Err(Self::wrong_role(name, "endpoint").into()),
        }
    }

    /// Forward-direction delivery: overwrite the target's inbox and record
    /// the sender.
    pub fn deliver(&mut self, to: &str, from: &str, payload: Vec<u8>) -> SimResult<()> {
        match self.get_mut(to)? {
            Participant::Relay(relay) => relay.receive(from, payload),
            Participant::Endpoint(endpoint) => endpoint.receive(from, payload),
        }
        Ok(())
    }

    /// Reply-direction delivery. Relays keep their recorded predecessor so
    /// the reply can continue back along the circuit.
    pub fn return_to(&mut self, to: &str, from: &str, payload: Vec<u8>) -> SimResult<()> {
        match self.get_mut(to)? {
            Participant::Relay(relay) => relay.receive_reply(payload),
            Participant::Endpoint(endpoint) => endpoint.receive(from, payload),
        }
        Ok(())
    }

    /// Extend `endpoint`'s circuit by `relay` and deliver the handshake
    /// payload to the entry hop.
    pub fn extend_circuit(&mut self, endpoint: &str, relay: &str) -> SimResult<()> {
        let public_key = self.relay(relay)?.public_key();
        let framing = self.framing;

        let initiator = self.endpoint_mut(endpoint)?;
        let payload = initiator.extend_circuit(relay, public_key, framing)?;
        let entry = initiator.entry()?.to_string();

        self.deliver(&entry, endpoint, payload)
    }

    /// Have `relay` open the key sealed in its inbox.
    pub fn complete_key_exchange(&mut self, relay: &str) -> SimResult<()> {
        let framing = self.framing;
        self.relay_mut(relay)?.complete_key_exchange(framing)
    }

    /// Have `relay` peel its layer and pass the remainder on verbatim.
    ///
    /// Returns the name of the participant it was delivered to.
    pub fn forward(&mut self, relay: &str) -> SimResult<String> {
        let framing = self.framing;
        let hop = self.relay_mut(relay)?;
        let next = hop.peel(framing)?;
        let payload = hop.buffer().to_vec();

        self.deliver(&next, relay, payload)?;
        debug!(from = %relay, to = %next, "forwarded layer");
        Ok(next)
    }

    /// Add `relay`'s layer to the reply in its inbox and return it to the
    /// predecessor.
    ///
    /// Returns the predecessor's name.
    pub fn wrap_reply(&mut self, relay: &str) -> SimResult<String> {
        let hop = self.relay_mut(relay)?;
        let previous = hop.wrap_reply()?;
        let payload = hop.buffer().to_vec();

        self.return_to(&previous, relay, payload)?;
        Ok(previous)
    }

    /// Build and send an onion from `endpoint` to `recipient`.
    pub fn send_onion(&mut self, endpoint: &str, recipient: &str, message: &[u8]) -> SimResult<()> {
        let framing = self.framing;
        let initiator = self.endpoint_mut(endpoint)?;
        let payload = initiator.wrap_message(recipient, message, framing)?;
        let entry = initiator.entry()?.to_string();

        self.deliver(&entry, endpoint, payload)
    }

    /// Write an unencrypted reply from `endpoint` into the inbox of whoever
    /// delivered to it last.
    ///
    /// Returns the name written to.
    pub fn reply_direct(&mut self, endpoint: &str, message: &[u8]) -> SimResult<String> {
        let target = self
            .endpoint(endpoint)?
            .received_from()
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::NoPredecessor(endpoint.to_string()))?;

        self.return_to(&target, endpoint, message.to_vec())?;
        Ok(target)
    }

    /// Remove every reply layer at `endpoint`.
    pub fn unwrap_reply(&mut self, endpoint: &str) -> SimResult<String> {
        self.endpoint_mut(endpoint)?.unwrap_reply()
    }
}
