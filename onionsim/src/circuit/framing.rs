// Copyright (c) 2024 Botho Foundation

//! Plaintext framing of a single onion layer.
//!
//! After a hop removes its encryption layer it must decide whether the
//! plaintext is a routing instruction (`next hop` + opaque remainder) or a
//! terminal payload (a freshly negotiated key). Two encodings are supported:
//!
//! ```text
//! Separator:  route    = next_hop ++ "|*-*|" ++ inner
//!             terminal = payload            (no separator anywhere)
//!
//! Tagged:     route    = 0x01 ++ len(next_hop) ++ next_hop ++ inner
//!             terminal = 0x02 ++ payload
//! ```
//!
//! # Known Gap
//!
//! The separator encoding discriminates by the presence of the separator
//! byte sequence. A terminal payload that happens to contain the separator
//! decodes as a route. Participant names are validated so that the first
//! separator in `name ++ "|*-*|"` is the one written after the name, and
//! route decoding splits on the first occurrence, so a separator inside
//! `inner` is preserved. The tagged encoding has no such ambiguity.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reserved separator between a routing field and the opaque remainder.
pub const SEPARATOR: &[u8] = b"|*-*|";

/// Maximum length of a participant name in bytes (one length byte when
/// tagged).
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Errors decoding or encoding a layer plaintext.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Empty participant name.
    #[error("participant name is empty")]
    EmptyName,

    /// Participant name does not fit the length byte.
    #[error("participant name is {0} bytes, maximum is {MAX_NAME_LEN}")]
    NameTooLong(usize),

    /// Participant name contains the reserved separator, or ends in a
    /// prefix of it that would merge with the separator after the name.
    #[error("participant name {0:?} overlaps the reserved separator")]
    NameContainsSeparator(String),

    /// Routing field is not valid UTF-8.
    #[error("routing field is not valid UTF-8")]
    InvalidName,

    /// Tagged plaintext is empty or shorter than its declared lengths.
    #[error("layer plaintext truncated")]
    Truncated,

    /// Unknown tag byte.
    #[error("invalid layer tag: {0:#04x}")]
    InvalidTag(u8),
}

/// Which layer encoding a network speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Legacy reserved-separator encoding.
    #[default]
    Separator,
    /// Explicitly tagged, length-prefixed encoding.
    Tagged,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Separator => write!(f, "separator"),
            Framing::Tagged => write!(f, "tagged"),
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "separator" => Ok(Framing::Separator),
            "tagged" => Ok(Framing::Tagged),
            other => Err(format!("unknown framing {other:?} (expected separator or tagged)")),
        }
    }
}

/// Tag byte for the tagged encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerTag {
    Route = 0x01,
    Terminal = 0x02,
}

impl LayerTag {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(LayerTag::Route),
            0x02 => Some(LayerTag::Terminal),
            _ => None,
        }
    }
}

/// A decoded layer plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    /// Forward `inner` verbatim to `next_hop`.
    Route {
        /// Name of the participant to deliver to.
        next_hop: String,
        /// Opaque remainder.
        inner: Vec<u8>,
    },
    /// No routing instruction: the payload is meant for this hop.
    Terminal(Vec<u8>),
}

/// Check that a name can be used as a routing field under either encoding.
pub fn validate_name(name: &str) -> Result<(), FramingError> {
    if name.is_empty() {
        return Err(FramingError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FramingError::NameTooLong(name.len()));
    }
    // "Bob|*-*" followed by the separator would split at "Bob".
    let mut routed = Vec::with_capacity(name.len() + SEPARATOR.len());
    routed.extend_from_slice(name.as_bytes());
    routed.extend_from_slice(SEPARATOR);
    if find_separator(&routed) != Some(name.len()) {
        return Err(FramingError::NameContainsSeparator(name.to_string()));
    }
    Ok(())
}

fn find_separator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
}

impl Framing {
    /// Encode a routing instruction.
    pub fn encode_route(self, next_hop: &str, inner: &[u8]) -> Result<Vec<u8>, FramingError> {
        validate_name(next_hop)?;
        let name = next_hop.as_bytes();

        let plaintext = match self {
            Framing::Separator => {
                let mut out = Vec::with_capacity(name.len() + SEPARATOR.len() + inner.len());
                out.extend_from_slice(name);
                out.extend_from_slice(SEPARATOR);
                out.extend_from_slice(inner);
                out
            }
            Framing::Tagged => {
                let mut out = Vec::with_capacity(2 + name.len() + inner.len());
                out.push(LayerTag::Route as u8);
                out.push(name.len() as u8);
                out.extend_from_slice(name);
                out.extend_from_slice(inner);
                out
            }
        };
        Ok(plaintext)
    }

    /// Encode a terminal payload.
    pub fn encode_terminal(self, payload: &[u8]) -> Vec<u8> {
        match self {
            Framing::Separator => payload.to_vec(),
            Framing::Tagged => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(LayerTag::Terminal as u8);
                out.extend_from_slice(payload);
                out
            }
        }
    }

    /// Decode a layer plaintext.
    pub fn decode(self, plaintext: &[u8]) -> Result<Layer, FramingError> {
        match self {
            Framing::Separator => match find_separator(plaintext) {
                Some(at) => {
                    let next_hop = std::str::from_utf8(&plaintext[..at])
                        .map_err(|_| FramingError::InvalidName)?;
                    validate_name(next_hop)?;
                    Ok(Layer::Route {
                        next_hop: next_hop.to_string(),
                        inner: plaintext[at + SEPARATOR.len()..].to_vec(),
                    })
                }
                None => Ok(Layer::Terminal(plaintext.to_vec())),
            },
            Framing::Tagged => {
                let (&tag, rest) = plaintext.split_first().ok_or(FramingError::Truncated)?;
                match LayerTag::from_byte(tag).ok_or(FramingError::InvalidTag(tag))? {
                    LayerTag::Route => {
                        let (&len, rest) = rest.split_first().ok_or(FramingError::Truncated)?;
                        let len = len as usize;
                        if rest.len() < len {
                            return Err(FramingError::Truncated);
                        }
                        let next_hop = std::str::from_utf8(&rest[..len])
                            .map_err(|_| FramingError::InvalidName)?;
                        validate_name(next_hop)?;
                        Ok(Layer::Route {
                            next_hop: next_hop.to_string(),
                            inner: rest[len..].to_vec(),
                        })
                    }
                    LayerTag::Terminal => Ok(Layer::Terminal(rest.to_vec())),
                }
            }
        }
    }
}
