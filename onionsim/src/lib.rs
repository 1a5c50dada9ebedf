// Copyright (c) 2024 Botho Foundation

//! Onion routing simulator.
//!
//! Builds a telescoping circuit through simulated relays, sends one message
//! and one reply through it, and optionally lets a passive eavesdropper read
//! a single hop per direction.

#![deny(clippy::print_stdout)]

pub mod circuit;
pub mod config;
pub mod error;
pub mod sim;

// Re-export commands module for CLI binary
#[allow(clippy::print_stdout)]
pub mod commands;

pub use error::{ProtocolError, SimError, SimResult, ValidationError};
