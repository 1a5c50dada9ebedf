// Copyright (c) 2024 Botho Foundation

//! Passive single-shot eavesdropper.
//!
//! For each direction the eavesdropper is armed once. At every hop of a
//! transfer it draws uniformly from `[0, remaining]`, where `remaining` counts
//! the hops still to visit including the current one; a zero means it reads
//! the payload at this hop and disarms for that direction. A traversal can
//! therefore pass unobserved.

use rand::Rng;
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Which way traffic was travelling when observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Initiator towards recipient.
    Forward,
    /// Recipient back towards initiator.
    Reply,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Reply => f.write_str("reply"),
        }
    }
}

/// What the eavesdropper saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interception {
    pub direction: Direction,
    /// Relay whose payload was read.
    pub hop: String,
    /// Payload bytes at the time of observation.
    pub observed: Vec<u8>,
}

/// Two independent one-shot observers.
#[derive(Debug, Clone)]
pub struct Eavesdropper {
    forward_armed: bool,
    reply_armed: bool,
}

impl Eavesdropper {
    /// Create an observer, armed in both directions when `enabled`.
    pub fn new(enabled: bool) -> Self {
        Self {
            forward_armed: enabled,
            reply_armed: enabled,
        }
    }

    pub fn is_armed(&self, direction: Direction) -> bool {
        match direction {
            Direction::Forward => self.forward_armed,
            Direction::Reply => self.reply_armed,
        }
    }

    /// Possibly observe `contents` at `hop`.
    ///
    /// Draws nothing from `rng` when disarmed for `direction`.
    pub fn observe<R: Rng>(
        &mut self,
        direction: Direction,
        remaining: usize,
        hop: &str,
        contents: &[u8],
        rng: &mut R,
    ) -> Option<Interception> {
        let armed = match direction {
            Direction::Forward => &mut self.forward_armed,
            Direction::Reply => &mut self.reply_armed,
        };
        if !*armed || rng.gen_range(0..=remaining) != 0 {
            return None;
        }
        *armed = false;

        warn!(%direction, hop, bytes = contents.len(), "eavesdropper intercepted payload");
        Some(Interception {
            direction,
            hop: hop.to_string(),
            observed: contents.to_vec(),
        })
    }
}
