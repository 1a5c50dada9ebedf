// Copyright (c) 2024 Botho Foundation

//! Relay pool creation and circuit hop selection.
//!
//! Relays are named `R0..R{n-1}` and advertise a random capacity. Circuits
//! are the highest-capacity relays, ranked in descending order; ties keep
//! creation order.
//!
//! Capacities come from the caller's RNG so a seeded run picks the same
//! circuit every time. Relay keypairs always use the thread-local CSPRNG.

use rand::Rng;
use thiserror::Error;
use tracing::debug;

use super::relay::Relay;

/// Smallest capacity a relay can advertise.
pub const MIN_CAPACITY: u32 = 1;

/// Largest capacity a relay can advertise.
pub const MAX_CAPACITY: u32 = 20;

/// Errors that can occur during circuit hop selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// Not enough relays available to build a circuit.
    #[error("insufficient relays: need {needed}, have {available}")]
    InsufficientRelays {
        /// Number of relays needed
        needed: usize,
        /// Number of relays available
        available: usize,
    },
}

/// Relays ranked by capacity, highest first.
#[derive(Debug)]
pub struct RelayPool {
    relays: Vec<Relay>,
}

impl RelayPool {
    /// Create `count` relays with random capacities.
    pub fn generate<R: Rng>(count: usize, rng: &mut R) -> Self {
        let mut keys = rand::thread_rng();
        let relays = (0..count)
            .map(|i| {
                let capacity = rng.gen_range(MIN_CAPACITY..=MAX_CAPACITY);
                Relay::new(format!("R{i}"), capacity, &mut keys)
            })
            .collect();
        Self::from_relays(relays)
    }

    /// Rank existing relays.
    pub fn from_relays(mut relays: Vec<Relay>) -> Self {
        relays.sort_by(|a, b| b.capacity().cmp(&a.capacity()));
        Self { relays }
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// `(name, capacity)` in rank order.
    pub fn ranking(&self) -> Vec<(String, u32)> {
        self.relays
            .iter()
            .map(|relay| (relay.name().to_string(), relay.capacity()))
            .collect()
    }

    /// Names of the `length` highest-ranked relays, entry hop first.
    pub fn choose_circuit(&self, length: usize) -> Result<Vec<String>, SelectionError> {
        if length > self.relays.len() {
            return Err(SelectionError::InsufficientRelays {
                needed: length,
                available: self.relays.len(),
            });
        }

        let circuit: Vec<String> = self.relays[..length]
            .iter()
            .map(|relay| relay.name().to_string())
            .collect();
        debug!(?circuit, "selected circuit");
        Ok(circuit)
    }

    /// Hand the relays over to the network.
    pub fn into_relays(self) -> Vec<Relay> {
        self.relays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn relay(name: &str, capacity: u32) -> Relay {
        Relay::new(name, capacity, &mut rand::thread_rng())
    }

    #[test]
    fn test_generate_names_and_capacity_range() {
        let pool = RelayPool::generate(10, &mut rand::thread_rng());
        assert_eq!(pool.len(), 10);

        let mut names: Vec<String> = pool.ranking().into_iter().map(|(n, _)| n).collect();
        names.sort_by_key(|n| n[1..].parse::<usize>().unwrap());
        assert_eq!(names, (0..10).map(|i| format!("R{i}")).collect::<Vec<_>>());

        for (_, capacity) in pool.ranking() {
            assert!((MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity));
        }
    }

    #[test]
    fn test_ranking_descending() {
        let pool = RelayPool::generate(25, &mut rand::thread_rng());
        let ranking = pool.ranking();
        assert!(ranking.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_ties_keep_creation_order() {
        let pool = RelayPool::from_relays(vec![
            relay("R0", 5),
            relay("R1", 9),
            relay("R2", 5),
            relay("R3", 9),
        ]);
        let names: Vec<String> = pool.ranking().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["R1", "R3", "R0", "R2"]);
    }

    #[test]
    fn test_choose_circuit_takes_top_ranked() {
        let pool = RelayPool::from_relays(vec![
            relay("R0", 3),
            relay("R1", 17),
            relay("R2", 8),
            relay("R3", 12),
        ]);
        assert_eq!(pool.choose_circuit(3).unwrap(), ["R1", "R3", "R2"]);
    }

    #[test]
    fn test_choose_circuit_insufficient() {
        let pool = RelayPool::generate(3, &mut rand::thread_rng());
        assert_eq!(
            pool.choose_circuit(4),
            Err(SelectionError::InsufficientRelays {
                needed: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_seeded_generation_reproducible() {
        let a = RelayPool::generate(8, &mut ChaCha8Rng::seed_from_u64(7));
        let b = RelayPool::generate(8, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a.ranking(), b.ranking());
        assert_eq!(a.choose_circuit(3).unwrap(), b.choose_circuit(3).unwrap());
    }
}
