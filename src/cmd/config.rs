//! Configuration view and validation commands for `relboard config`.

use anyhow::{Result, bail};
use console::style;

use relboard::config::RelboardConfig;

use super::super::ConfigCommands;

pub fn cmd_config(config: &RelboardConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!("# Effective configuration (file → environment → CLI)");
            println!();
            print!("{}", config.to_toml_string()?);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("{} Configuration is valid", style("✓").green());
                return Ok(());
            }
            for warning in &warnings {
                println!("{} {}", style("!").yellow(), warning);
            }
            bail!("{} configuration warning(s)", warnings.len());
        }
    }
    Ok(())
}
