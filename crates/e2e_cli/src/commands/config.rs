//! Config command.

use anyhow::Result;
use e2e_core::Config;

/// Print the effective configuration as TOML.
pub fn run(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
