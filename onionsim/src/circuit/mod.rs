// Copyright (c) 2024 Botho Foundation

//! Onion circuit protocol.
//!
//! An initiator builds a circuit one hop at a time (telescoping), sends an
//! onion through it, and receives a reply along the same path. Each relay
//! learns only its immediate predecessor and successor.
//!
//! # Architecture
//!
//! ```text
//! Alice ──► R0 ──► R1 ──► R2 ──► Bob
//!   k0,k1,k2   k0     k1     k2
//! ```
//!
//! # Modules
//!
//! - [`types`]: hop keys and relay identity keys
//! - [`crypto`]: per-layer AEAD and the sealed key handshake primitive
//! - [`framing`]: layer plaintext encodings
//! - [`relay`]: hop state and per-hop processing
//! - [`endpoint`]: circuit construction, onion wrapping, reply unwrapping
//! - [`registry`]: the simulated network connecting participants by name
//! - [`selection`]: relay pool and capacity-ranked hop selection

pub mod crypto;
pub mod endpoint;
pub mod framing;
pub mod registry;
pub mod relay;
pub mod selection;
pub mod types;

pub use crypto::{decrypt_layer, encrypt_layer, open_sealed, seal_to, CryptoError};
pub use endpoint::Endpoint;
pub use framing::{validate_name, Framing, FramingError, Layer, SEPARATOR};
pub use registry::{Network, Participant};
pub use relay::Relay;
pub use selection::{RelayPool, SelectionError, MAX_CAPACITY, MIN_CAPACITY};
pub use types::{RelayKeypair, RelayPublicKey, SymmetricKey, SYMMETRIC_KEY_LEN};
