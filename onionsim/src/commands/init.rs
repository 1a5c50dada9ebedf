use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::config::SimConfig;

/// Run the init command
pub fn run(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Config already exists at {}\nUse a different --config path or pass --force.",
            config_path.display()
        );
    }

    let config = SimConfig::default();
    config.save(config_path)?;

    info!("Config initialized at {}", config_path.display());
    println!("Config saved to: {}", config_path.display());
    println!(
        "\nDefaults: {} relays, circuit of {}, eavesdropper {}, {} framing",
        config.relay_count,
        config.circuit_length,
        if config.eavesdrop { "on" } else { "off" },
        config.framing
    );
    println!("\nNext steps:");
    println!("  1. Edit the config to change the defaults");
    println!("  2. Run 'onionsim run' to start a simulation");

    Ok(())
}
