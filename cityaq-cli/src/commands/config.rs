//! `cityaq config get|set|list|path`.

use std::path::Path;

use clap::Subcommand;
use cityaq::config::{ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one setting
    Get {
        /// Key as section.key (e.g. executor.url)
        key: String,
    },

    /// Change one setting and save the file
    Set {
        /// Key as section.key (e.g. simulation.poll_interval_secs)
        key: String,

        /// New value; empty clears optional settings
        value: String,
    },

    /// Print every setting, grouped by section
    List,

    /// Print the location of the configuration file
    Path,
}

pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = parse_key(&key)?;
            let config = ConfigFile::load_from(path)?;
            let value = key.get(&config);
            if value.is_empty() {
                println!("(not set)");
            } else {
                println!("{}", value);
            }
        }
        ConfigCommands::Set { key, value } => {
            let key = parse_key(&key)?;
            let mut config = ConfigFile::load_from(path)?;
            key.set(&mut config, &value)?;
            config.save_to(path)?;
            println!("Set {} = {}", key.name(), key.get(&config));
        }
        ConfigCommands::List => {
            let config = ConfigFile::load_from(path)?;
            print!("{}", render_list(&config));
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'cityaq config list' to see available keys.",
            key
        ))
    })
}

fn render_list(config: &ConfigFile) -> String {
    let mut out = String::new();
    let mut current_section = "";

    for key in ConfigKey::all() {
        let section = key.section();
        if section != current_section {
            if !current_section.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            current_section = section;
        }

        let value = key.get(config);
        if value.is_empty() {
            out.push_str(&format!("  {} = (not set)\n", key.key_name()));
        } else {
            out.push_str(&format!("  {} = {}\n", key.key_name(), value));
        }
    }
    out
}
