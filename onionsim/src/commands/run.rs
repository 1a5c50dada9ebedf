use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::info;

use crate::circuit::Framing;
use crate::config::SimConfig;
use crate::sim::{Conversation, RunReport, Simulator};

/// Values given on the command line. `None` falls back to the config file,
/// then to an interactive prompt.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub relays: Option<usize>,
    pub circuit_length: Option<usize>,
    pub eavesdrop: Option<bool>,
    pub framing: Option<Framing>,
    pub seed: Option<u64>,
    pub verbose: bool,
}

/// Run the run command
pub fn run(config_path: &Path, options: RunOptions) -> Result<()> {
    let config = resolve_config(config_path, options)?;
    config.validate().context("Input invalid")?;

    let mut sim = Simulator::from_config(&config, config.rng())?;

    println!("The following relays have been created:");
    for (name, capacity) in sim.ranking() {
        println!("Relay: {}; capacity: {}", name, capacity);
    }
    println!("\nThe following relays are chosen for the circuit:");
    println!("{}\n", sim.circuit().join(" -> "));

    let report = sim.run(&mut StdinConversation)?;
    print_report(&report);

    info!(
        hops = report.circuit.len(),
        interceptions = report.interceptions.len(),
        "simulation finished"
    );
    Ok(())
}

fn resolve_config(config_path: &Path, options: RunOptions) -> Result<SimConfig> {
    let from_file = config_path.exists();
    let mut config = if from_file {
        SimConfig::load(config_path)?
    } else {
        SimConfig::default()
    };

    config.relay_count = match options.relays {
        Some(count) => count,
        None if from_file => config.relay_count,
        None => prompt_number("Enter the number of relays: ")?,
    };
    config.circuit_length = match options.circuit_length {
        Some(length) => length,
        None if from_file => config.circuit_length,
        None => prompt_number("Enter the number of relays in a circuit: ")?,
    };
    config.eavesdrop = match options.eavesdrop {
        Some(enabled) => enabled,
        None if from_file => config.eavesdrop,
        None => prompt_yes_no("Enable Eve (y/n): ")?,
    };
    if let Some(framing) = options.framing {
        config.framing = framing;
    }
    if options.seed.is_some() {
        config.seed = options.seed;
    }
    config.verbose |= options.verbose;

    Ok(config)
}

/// Prompt and read one line. Only the line ending is removed.
fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    next_line(&mut input)
}

fn next_line<B: BufRead>(input: &mut B) -> Result<String> {
    input
        .lines()
        .next()
        .context("Failed to read input")?
        .context("Failed to read input")
}

fn prompt_number(prompt: &str) -> Result<usize> {
    parse_number(&read_line(prompt)?)
}

fn parse_number(answer: &str) -> Result<usize> {
    let answer = answer.trim();
    answer
        .parse()
        .with_context(|| format!("Input invalid: {:?} is not a number", answer))
}

fn prompt_yes_no(prompt: &str) -> Result<bool> {
    parse_yes_no(&read_line(prompt)?)
}

fn parse_yes_no(answer: &str) -> Result<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" => Ok(true),
        "n" => Ok(false),
        other => bail!("Input invalid: expected 'y' or 'n', got {:?}", other),
    }
}

/// Reads both messages from stdin.
struct StdinConversation;

impl Conversation for StdinConversation {
    type Error = anyhow::Error;

    fn outbound_message(&mut self, sender: &str, recipient: &str) -> Result<String> {
        println!("{} wants to send a message to {}", sender, recipient);
        read_line("Enter the message: ")
    }

    fn reply(&mut self, recipient: &str, delivered: &str) -> Result<String> {
        println!("{} received: {}", recipient, delivered);
        println!("\n{} wants to reply", recipient);
        read_line("Enter the message: ")
    }
}

fn print_report(report: &RunReport) {
    for seen in &report.interceptions {
        println!(
            "\nEve eavesdropped the {} traffic on {}!\n{}",
            seen.direction,
            seen.hop,
            hex::encode(&seen.observed)
        );
    }

    if let Some(reply) = &report.reply {
        println!("\nReply received: {}", reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_message_keeps_surrounding_whitespace() {
        let mut input = Cursor::new("  hello bob \r\nnext\n");
        assert_eq!(next_line(&mut input).unwrap(), "  hello bob ");
        assert_eq!(next_line(&mut input).unwrap(), "next");
        assert!(next_line(&mut input).is_err());
    }

    #[test]
    fn test_numeric_and_yes_no_answers_are_trimmed() {
        assert_eq!(parse_number(" 5 ").unwrap(), 5);
        assert!(parse_number("five").is_err());
        assert!(parse_yes_no(" Y ").unwrap());
        assert!(!parse_yes_no("n").unwrap());
        assert!(parse_yes_no("maybe").is_err());
    }
}
