// Copyright (c) 2024 Botho Foundation

//! Simulation events.

use std::fmt;

/// One step of the protocol. Each variant carries the hop names it still
/// has to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Negotiate a key with each listed relay, in order.
    KeyExchange(Vec<String>),
    /// Ask for the outbound message and wrap it for this circuit.
    SendMessage(Vec<String>),
    /// Forward the onion through the remaining hops.
    SendTransfer(Vec<String>),
    /// The recipient reads the delivered message and answers.
    Received,
    /// Carry the reply back through the remaining hops, exit first.
    SendReply(Vec<String>),
    /// The initiator removes every reply layer.
    Replied,
}

impl Event {
    /// Short event name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::KeyExchange(_) => "key_exchange",
            Event::SendMessage(_) => "send_message",
            Event::SendTransfer(_) => "send_transfer",
            Event::Received => "received",
            Event::SendReply(_) => "send_reply",
            Event::Replied => "replied",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::KeyExchange(hops)
            | Event::SendMessage(hops)
            | Event::SendTransfer(hops)
            | Event::SendReply(hops) => write!(f, "{}[{}]", self.kind(), hops.join(",")),
            Event::Received | Event::Replied => f.write_str(self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let event = Event::SendTransfer(vec!["R1".into(), "R2".into()]);
        assert_eq!(event.to_string(), "send_transfer[R1,R2]");
        assert_eq!(Event::Replied.to_string(), "replied");
    }
}
