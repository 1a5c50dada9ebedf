// Copyright (c) 2024 Botho Foundation

//! Discrete-event driver for one circuit.
//!
//! Events are processed strictly FIFO, one at a time, each to completion.
//! The simulator suspends at two points and hands control back to the
//! caller:
//!
//! ```text
//! KeyExchange ─► SendMessage ─┐ AwaitingMessage
//!                             ▼
//!           SendTransfer* ─► Received ─┐ AwaitingReply
//!                                      ▼
//!                       SendReply* ─► Replied ─► Finished
//! ```
//!
//! Any error aborts the run; nothing is retried. Once aborted, every later
//! call fails with [`ProtocolError::Aborted`].

use std::collections::VecDeque;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    eavesdropper::{Direction, Eavesdropper, Interception},
    event::Event,
};
use crate::{
    circuit::{Endpoint, Network, RelayPool},
    config::SimConfig,
    error::{ProtocolError, SimError, SimResult},
};

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Relay names, entry first.
    pub circuit: Vec<String>,
    /// Message as read by the recipient.
    pub delivered: Option<String>,
    /// Reply as recovered by the initiator.
    pub reply: Option<String>,
    /// Everything the eavesdropper saw.
    pub interceptions: Vec<Interception>,
}

/// Where the simulator stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimStatus {
    /// Supply the outbound message with [`Simulator::provide_message`].
    AwaitingMessage,
    /// Supply the recipient's answer with [`Simulator::provide_reply`].
    AwaitingReply {
        /// What the recipient received.
        delivered: String,
    },
    /// The event queue is empty.
    Finished(RunReport),
}

/// Source of the two human-entered strings of a run.
pub trait Conversation {
    type Error: From<SimError>;

    /// Message `sender` sends to `recipient`.
    fn outbound_message(&mut self, sender: &str, recipient: &str) -> Result<String, Self::Error>;

    /// Answer `recipient` gives after reading `delivered`.
    fn reply(&mut self, recipient: &str, delivered: &str) -> Result<String, Self::Error>;
}

#[derive(Debug)]
enum Suspended {
    Message(Vec<String>),
    Reply(String),
}

/// Single-circuit simulator.
pub struct Simulator<R> {
    network: Network,
    queue: VecDeque<Event>,
    eavesdropper: Eavesdropper,
    rng: R,
    sender: String,
    recipient: String,
    ranking: Vec<(String, u32)>,
    suspended: Option<Suspended>,
    aborted: Option<String>,
    report: RunReport,
}

impl<R: Rng> Simulator<R> {
    /// Create the relay pool, choose the circuit and register every
    /// participant.
    pub fn from_config(config: &SimConfig, mut rng: R) -> SimResult<Self> {
        config.validate()?;

        let pool = RelayPool::generate(config.relay_count, &mut rng);
        let ranking = pool.ranking();
        let circuit = pool.choose_circuit(config.circuit_length)?;

        let mut network = Network::new(config.framing);
        for relay in pool.into_relays() {
            network.add_relay(relay)?;
        }

        let mut sim = Self::new(
            network,
            &config.sender,
            &config.recipient,
            circuit,
            config.eavesdrop,
            rng,
        )?;
        sim.ranking = ranking;
        Ok(sim)
    }

    /// Use an existing network of relays. The two endpoints are added here.
    pub fn new(
        mut network: Network,
        sender: &str,
        recipient: &str,
        circuit: Vec<String>,
        eavesdrop: bool,
        rng: R,
    ) -> SimResult<Self> {
        for hop in &circuit {
            network.relay(hop)?;
        }
        network.add_endpoint(Endpoint::new(sender))?;
        network.add_endpoint(Endpoint::new(recipient))?;

        info!(
            ?circuit,
            framing = %network.framing(),
            eavesdrop,
            "simulation ready"
        );

        let mut queue = VecDeque::new();
        queue.push_back(Event::KeyExchange(circuit.clone()));

        Ok(Self {
            network,
            queue,
            eavesdropper: Eavesdropper::new(eavesdrop),
            rng,
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            ranking: Vec::new(),
            suspended: None,
            aborted: None,
            report: RunReport {
                circuit,
                ..RunReport::default()
            },
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Relay pool as `(name, capacity)` in rank order. Empty when the
    /// network was supplied by the caller.
    pub fn ranking(&self) -> &[(String, u32)] {
        &self.ranking
    }

    pub fn circuit(&self) -> &[String] {
        &self.report.circuit
    }

    /// Report so far.
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    /// Error that ended the run, if any.
    pub fn aborted(&self) -> Option<&str> {
        self.aborted.as_deref()
    }

    /// Process events until input is needed or the queue is empty.
    pub fn advance(&mut self) -> SimResult<SimStatus> {
        self.ensure_running()?;
        let result = self.process_queue();
        self.abort_on_error(result)
    }

    fn process_queue(&mut self) -> SimResult<SimStatus> {
        match &self.suspended {
            Some(Suspended::Message(_)) => return Ok(SimStatus::AwaitingMessage),
            Some(Suspended::Reply(delivered)) => {
                return Ok(SimStatus::AwaitingReply {
                    delivered: delivered.clone(),
                })
            }
            None => {}
        }

        while let Some(event) = self.queue.pop_front() {
            debug!(%event, "processing event");
            if let Some(status) = self.dispatch(event)? {
                return Ok(status);
            }
        }
        Ok(SimStatus::Finished(self.report.clone()))
    }

    /// Resume after [`SimStatus::AwaitingMessage`].
    pub fn provide_message(&mut self, message: &str) -> SimResult<()> {
        self.ensure_running()?;
        let circuit = match self.suspended.take() {
            Some(Suspended::Message(circuit)) => circuit,
            other => {
                self.suspended = other;
                return Err(ProtocolError::NotAwaiting("message").into());
            }
        };

        let result = self.send_message(circuit, message);
        self.abort_on_error(result)
    }

    /// Resume after [`SimStatus::AwaitingReply`].
    pub fn provide_reply(&mut self, reply: &str) -> SimResult<()> {
        self.ensure_running()?;
        match self.suspended.take() {
            Some(Suspended::Reply(_)) => {}
            other => {
                self.suspended = other;
                return Err(ProtocolError::NotAwaiting("reply").into());
            }
        }

        let result = self.send_first_reply(reply);
        self.abort_on_error(result)
    }

    /// Drive the run to completion.
    pub fn run<C: Conversation>(&mut self, conversation: &mut C) -> Result<RunReport, C::Error> {
        loop {
            match self.advance()? {
                SimStatus::AwaitingMessage => {
                    let message = conversation.outbound_message(&self.sender, &self.recipient)?;
                    self.provide_message(&message)?;
                }
                SimStatus::AwaitingReply { delivered } => {
                    let reply = conversation.reply(&self.recipient, &delivered)?;
                    self.provide_reply(&reply)?;
                }
                SimStatus::Finished(report) => return Ok(report),
            }
        }
    }

    fn ensure_running(&self) -> SimResult<()> {
        match &self.aborted {
            Some(reason) => Err(ProtocolError::Aborted(reason.clone()).into()),
            None => Ok(()),
        }
    }

    fn abort_on_error<T>(&mut self, result: SimResult<T>) -> SimResult<T> {
        if let Err(err) = &result {
            warn!(%err, "simulation aborted");
            self.queue.clear();
            self.suspended = None;
            self.aborted = Some(err.to_string());
        }
        result
    }

    fn send_message(&mut self, circuit: Vec<String>, message: &str) -> SimResult<()> {
        self.network
            .send_onion(&self.sender, &self.recipient, message.as_bytes())?;
        info!(from = %self.sender, to = %self.recipient, "message sent");
        self.queue.push_back(Event::SendTransfer(circuit));
        Ok(())
    }

    fn send_first_reply(&mut self, reply: &str) -> SimResult<()> {
        let exit = self.network.reply_direct(&self.recipient, reply.as_bytes())?;
        info!(from = %self.recipient, via = %exit, "reply sent");

        let mut hops = self.network.endpoint(&self.sender)?.relays().to_vec();
        hops.reverse();
        self.queue.push_back(Event::SendReply(hops));
        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> SimResult<Option<SimStatus>> {
        match event {
            Event::KeyExchange(relays) => {
                self.key_exchange(&relays)?;
                self.queue.push_back(Event::SendMessage(relays));
                Ok(None)
            }
            Event::SendMessage(circuit) => {
                self.suspended = Some(Suspended::Message(circuit));
                Ok(Some(SimStatus::AwaitingMessage))
            }
            Event::SendTransfer(remaining) => {
                self.send_transfer(remaining)?;
                Ok(None)
            }
            Event::Received => {
                let delivered = self.network.endpoint(&self.recipient)?.read_inbox()?;
                info!(recipient = %self.recipient, "message delivered");
                self.report.delivered = Some(delivered.clone());
                self.suspended = Some(Suspended::Reply(delivered.clone()));
                Ok(Some(SimStatus::AwaitingReply { delivered }))
            }
            Event::SendReply(remaining) => {
                self.send_reply(remaining)?;
                Ok(None)
            }
            Event::Replied => {
                let reply = self.network.unwrap_reply(&self.sender)?;
                info!(sender = %self.sender, "reply received");
                self.report.reply = Some(reply);
                Ok(None)
            }
        }
    }

    /// Telescope a key to each relay in turn. Every hop already in the
    /// circuit forwards the handshake before the new relay opens it.
    fn key_exchange(&mut self, relays: &[String]) -> SimResult<()> {
        for (k, relay) in relays.iter().enumerate() {
            debug!(sender = %self.sender, relay = %relay, hop = k, "starting key exchange");
            self.network.extend_circuit(&self.sender, relay)?;
            for built in &relays[..k] {
                self.network.forward(built)?;
            }
            self.network.complete_key_exchange(relay)?;
            debug!(sender = %self.sender, relay = %relay, "finished key exchange");
        }
        info!(hops = relays.len(), "key exchange complete");
        Ok(())
    }

    fn send_transfer(&mut self, remaining: Vec<String>) -> SimResult<()> {
        let Some((hop, rest)) = remaining.split_first() else {
            self.queue.push_back(Event::Received);
            return Ok(());
        };

        let inbox = self.network.relay(hop)?.inbox();
        if let Some(seen) = self.eavesdropper.observe(
            Direction::Forward,
            remaining.len(),
            hop,
            inbox,
            &mut self.rng,
        ) {
            self.report.interceptions.push(seen);
        }

        debug!(relay = %hop, "transferring message");
        self.network.forward(hop)?;
        self.queue.push_back(Event::SendTransfer(rest.to_vec()));
        Ok(())
    }

    fn send_reply(&mut self, remaining: Vec<String>) -> SimResult<()> {
        let Some((hop, rest)) = remaining.split_first() else {
            self.queue.push_back(Event::Replied);
            return Ok(());
        };

        debug!(relay = %hop, "transferring reply");
        self.network.wrap_reply(hop)?;

        let buffer = self.network.relay(hop)?.buffer();
        if let Some(seen) = self.eavesdropper.observe(
            Direction::Reply,
            remaining.len(),
            hop,
            buffer,
            &mut self.rng,
        ) {
            self.report.interceptions.push(seen);
        }

        self.queue.push_back(Event::SendReply(rest.to_vec()));
        Ok(())
    }
}
