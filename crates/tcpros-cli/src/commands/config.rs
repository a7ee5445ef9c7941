//! Configuration commands.

use std::path::Path;

use crate::config::CliConfig;
use crate::error::CliResult;

/// Dumps the effective configuration as TOML.
pub fn dump(config: &CliConfig, path: &Path) -> CliResult<()> {
    println!("# config.toml ({})", path.display());
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Shows the configuration file path.
pub fn path(path: &Path) -> CliResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
