// Copyright (c) 2024 Botho Foundation

//! Error taxonomy for the simulation.
//!
//! Every error is fatal to the run that produced it; nothing in the core
//! retries or recovers.

use thiserror::Error;

use crate::circuit::{CryptoError, FramingError, SelectionError};

/// Malformed or out-of-order protocol traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Layer plaintext could not be decoded.
    #[error("malformed layer: {0}")]
    Framing(#[from] FramingError),

    /// No participant is registered under this name.
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    /// The participant exists but has the other role.
    #[error("participant {name} is not a {expected}")]
    WrongRole {
        /// Participant name.
        name: String,
        /// Role the caller required.
        expected: &'static str,
    },

    /// A participant name was registered twice.
    #[error("participant {0} is already registered")]
    DuplicateParticipant(String),

    /// A relay was asked to process circuit traffic before its key exchange.
    #[error("relay {0} has no circuit key")]
    MissingKey(String),

    /// A relay received a second key for the same circuit.
    #[error("relay {0} already holds a circuit key")]
    KeyAlreadyEstablished(String),

    /// A key-exchange payload decoded as a routing instruction.
    #[error("relay {0} expected a key but found a routing instruction")]
    UnexpectedRoute(String),

    /// A key-exchange payload had the wrong length.
    #[error("negotiated key has {0} bytes")]
    InvalidKeyLength(usize),

    /// An endpoint operation needs at least one hop.
    #[error("endpoint {0} has no circuit")]
    EmptyCircuit(String),

    /// A participant has nothing in its inbox.
    #[error("participant {0} has an empty inbox")]
    EmptyInbox(String),

    /// A participant has no recorded predecessor to reply to.
    #[error("participant {0} has no predecessor")]
    NoPredecessor(String),

    /// A relay has no recorded successor to forward to.
    #[error("relay {0} has no successor")]
    NoSuccessor(String),

    /// Delivered text was not valid UTF-8.
    #[error("message delivered to {0} is not valid UTF-8")]
    NotUtf8(String),

    /// Input was supplied while the simulator was not waiting for it.
    #[error("simulator is not awaiting {0}")]
    NotAwaiting(&'static str),

    /// An earlier event failed; the run cannot continue.
    #[error("simulation aborted: {0}")]
    Aborted(String),
}

/// Setup parameters out of range.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Fewer relays than the minimum.
    #[error("number of relays must be at least {min}, got {got}")]
    TooFewRelays {
        /// Minimum allowed.
        min: usize,
        /// Value supplied.
        got: usize,
    },

    /// Circuit shorter than the minimum.
    #[error("number of relays in a circuit must be at least {min}, got {got}")]
    CircuitTooShort {
        /// Minimum allowed.
        min: usize,
        /// Value supplied.
        got: usize,
    },

    /// Circuit longer than the relay pool.
    #[error("circuit of {circuit_length} relays cannot be built from {relay_count} relays")]
    CircuitLongerThanPool {
        /// Requested circuit length.
        circuit_length: usize,
        /// Relays available.
        relay_count: usize,
    },

    /// Endpoint name unusable as a routing field.
    #[error("invalid endpoint name {name:?}: {source}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        source: FramingError,
    },

    /// Endpoint name collides with a relay or the other endpoint.
    #[error("endpoint name {0:?} collides with another participant")]
    NameCollision(String),
}

/// Any failure that aborts a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed onion payload or out-of-order operation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Decryption or authentication failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Setup parameters out of range.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Circuit could not be chosen from the relay pool.
    #[error("selection error: {0}")]
    Selection(#[from] SelectionError),
}

impl From<FramingError> for SimError {
    fn from(err: FramingError) -> Self {
        SimError::Protocol(ProtocolError::Framing(err))
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
