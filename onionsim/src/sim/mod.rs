// Copyright (c) 2024 Botho Foundation

//! Event-driven simulation of one circuit: construction, one message, one
//! reply, and an optional passive eavesdropper.

pub mod eavesdropper;
pub mod event;
pub mod simulator;

pub use eavesdropper::{Direction, Eavesdropper, Interception};
pub use event::Event;
pub use simulator::{Conversation, RunReport, SimStatus, Simulator};
