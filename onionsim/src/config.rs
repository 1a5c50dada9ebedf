// Copyright (c) 2024 Botho Foundation

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::circuit::{validate_name, Framing};
use crate::error::ValidationError;

/// Smallest relay pool a run accepts.
pub const MIN_RELAYS: usize = 3;

/// Shortest circuit a run accepts.
pub const MIN_CIRCUIT_LENGTH: usize = 3;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of relays created at startup
    #[serde(default = "default_relay_count")]
    pub relay_count: usize,

    /// Number of relays in the circuit
    #[serde(default = "default_circuit_length")]
    pub circuit_length: usize,

    /// Let the eavesdropper observe one hop per direction
    #[serde(default)]
    pub eavesdrop: bool,

    /// Log every hop
    #[serde(default)]
    pub verbose: bool,

    /// Layer encoding
    #[serde(default)]
    pub framing: Framing,

    /// Seed for relay capacities and eavesdropper draws.
    /// Key material is always drawn from the OS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Circuit initiator
    #[serde(default = "default_sender")]
    pub sender: String,

    /// Final recipient
    #[serde(default = "default_recipient")]
    pub recipient: String,
}

fn default_relay_count() -> usize {
    5
}

fn default_circuit_length() -> usize {
    3
}

fn default_sender() -> String {
    "Alice".to_string()
}

fn default_recipient() -> String {
    "Bob".to_string()
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            relay_count: default_relay_count(),
            circuit_length: default_circuit_length(),
            eavesdrop: false,
            verbose: false,
            framing: Framing::default(),
            seed: None,
            sender: default_sender(),
            recipient: default_recipient(),
        }
    }
}

/// Whether `name` is one of the generated relay names `R0..R{relay_count-1}`.
fn is_relay_name(name: &str, relay_count: usize) -> bool {
    name.strip_prefix('R')
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<usize>().ok())
        .is_some_and(|index| index < relay_count && format!("R{index}") == name)
}

impl SimConfig {
    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Check every parameter before a run is set up.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.relay_count < MIN_RELAYS {
            return Err(ValidationError::TooFewRelays {
                min: MIN_RELAYS,
                got: self.relay_count,
            });
        }
        if self.circuit_length < MIN_CIRCUIT_LENGTH {
            return Err(ValidationError::CircuitTooShort {
                min: MIN_CIRCUIT_LENGTH,
                got: self.circuit_length,
            });
        }
        if self.circuit_length > self.relay_count {
            return Err(ValidationError::CircuitLongerThanPool {
                circuit_length: self.circuit_length,
                relay_count: self.relay_count,
            });
        }

        for name in [&self.sender, &self.recipient] {
            validate_name(name).map_err(|source| ValidationError::InvalidName {
                name: name.clone(),
                source,
            })?;
            if is_relay_name(name, self.relay_count) {
                return Err(ValidationError::NameCollision(name.clone()));
            }
        }
        if self.sender == self.recipient {
            return Err(ValidationError::NameCollision(self.recipient.clone()));
        }

        Ok(())
    }

    /// RNG for everything except key material.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".onionsim")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::FramingError;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = SimConfig::default();
        assert_eq!(config.relay_count, 5);
        assert_eq!(config.circuit_length, 3);
        assert_eq!(config.framing, Framing::Separator);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimums() {
        let config = SimConfig {
            relay_count: 2,
            ..SimConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::TooFewRelays { min: 3, got: 2 })
        );

        let config = SimConfig {
            circuit_length: 2,
            ..SimConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::CircuitTooShort { min: 3, got: 2 })
        );

        let config = SimConfig {
            relay_count: 3,
            circuit_length: 3,
            ..SimConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_circuit_longer_than_pool() {
        let config = SimConfig {
            relay_count: 4,
            circuit_length: 5,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::CircuitLongerThanPool { .. })
        ));
    }

    #[test]
    fn test_endpoint_names() {
        let config = SimConfig {
            recipient: "Alice".to_string(),
            ..SimConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::NameCollision("Alice".to_string()))
        );

        let config = SimConfig {
            sender: "R2".to_string(),
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NameCollision(_))
        ));

        // Outside the generated range.
        let config = SimConfig {
            sender: "R9".to_string(),
            ..SimConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = SimConfig {
            recipient: "B|*-*|ob".to_string(),
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidName {
                source: FramingError::NameContainsSeparator(_),
                ..
            })
        ));

        let config = SimConfig {
            recipient: "Bob|*-*".to_string(),
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidName {
                source: FramingError::NameContainsSeparator(_),
                ..
            })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = SimConfig {
            relay_count: 8,
            circuit_length: 4,
            eavesdrop: true,
            framing: Framing::Tagged,
            seed: Some(42),
            ..SimConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(SimConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "eavesdrop = true\nframing = \"tagged\"\n").unwrap();

        let config = SimConfig::load(&path).unwrap();
        assert!(config.eavesdrop);
        assert_eq!(config.framing, Framing::Tagged);
        assert_eq!(config.relay_count, 5);
        assert_eq!(config.sender, "Alice");
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_seeded_rng_reproducible() {
        use rand::Rng;
        let config = SimConfig {
            seed: Some(7),
            ..SimConfig::default()
        };
        let a: u64 = config.rng().gen();
        let b: u64 = config.rng().gen();
        assert_eq!(a, b);
    }
}
