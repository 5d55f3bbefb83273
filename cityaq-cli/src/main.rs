//! CityAQ CLI - command-line interface
//!
//! Thin front end over the `cityaq` library: serves map tiles, runs one-shot
//! queries and edits `~/.cityaq/config.ini`.

mod commands;
mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cityaq::config::{config_file_path, ConfigFile};
use cityaq::logging::{self, LoggingConfig};

use commands::config::ConfigCommands;
use commands::query::ImpactArgs;
use commands::serve::ServeArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "cityaq", version, about = "Air-quality impacts of urban activities")]
struct Cli {
    /// Configuration file (default: ~/.cityaq/config.ini)
    #[arg(long = "config", global = true)]
    config_file: Option<PathBuf>,

    /// Log level, overriding logging.level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve map tiles over HTTP
    Serve {
        /// Address to listen on, overriding server.listen
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// List known cities
    Cities,

    /// List emissions inventory sectors
    Sectors,

    /// Gridded unit emissions for a city and source type
    Emissions {
        #[command(flatten)]
        args: ImpactArgs,

        /// Also print the colour legend
        #[arg(long)]
        legend: bool,
    },

    /// Simulated concentrations (runs the simulation if needed)
    Concentrations {
        #[command(flatten)]
        args: ImpactArgs,
    },

    /// Population on the simulation grid
    Population {
        #[command(flatten)]
        args: ImpactArgs,
    },

    /// Population, exposure and intake fraction of a marginal simulation
    Impacts {
        #[command(flatten)]
        args: ImpactArgs,
    },

    /// View or change configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config_file.unwrap_or_else(config_file_path);

    // Config commands work on the raw file and must not fail on bad values.
    let command = match cli.command {
        Commands::Config { command } => return commands::config::run(command, &config_path),
        other => other,
    };

    let config = ConfigFile::load_from(&config_path)?;
    let mut logging_config = LoggingConfig::from(&config.logging);
    if let Some(level) = cli.log_level {
        logging_config = logging_config.with_level(level);
    }
    let _log_guard = logging::init(&logging_config)?;

    match command {
        Commands::Serve { listen } => commands::serve::run(&config, ServeArgs { listen }),
        Commands::Cities => commands::query::cities(&config),
        Commands::Sectors => commands::query::sectors(&config),
        Commands::Emissions { args, legend } => commands::query::emissions(&config, &args, legend),
        Commands::Concentrations { args } => commands::query::concentrations(&config, &args),
        Commands::Population { args } => commands::query::population(&config, &args),
        Commands::Impacts { args } => commands::query::impacts(&config, &args),
        Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_emissions() {
        let cli = Cli::try_parse_from([
            "cityaq",
            "emissions",
            "--city",
            "Accra Metropolitan",
            "--source",
            "roadways",
            "--emission",
            "nox",
            "--legend",
        ])
        .unwrap();
        match cli.command {
            Commands::Emissions { args, legend } => {
                assert_eq!(args.city, "Accra Metropolitan");
                assert_eq!(args.emission, commands::common::EmissionArg::Nox);
                assert!(legend);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli =
            Cli::try_parse_from(["cityaq", "config", "set", "executor.url", "http://x"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Set { .. }
            }
        ));
    }
}
