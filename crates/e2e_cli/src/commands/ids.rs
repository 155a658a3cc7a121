//! Identity diagnostics.

use anyhow::Result;
use console::style;
use e2e_core::{context, run_id, Config};

/// Print the run id and `count` unique users.
pub fn run(prefix: Option<&str>, count: usize, config: &Config) -> Result<()> {
    let prefix = prefix.unwrap_or(&config.run.user_prefix);

    println!("{} {}", style("Run:").bold(), style(run_id()).cyan());
    for _ in 0..count {
        println!("  {}", context::create_unique_user(prefix));
    }
    context::cleanup();
    Ok(())
}
