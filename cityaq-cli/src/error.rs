//! CLI error type.

use std::fmt;

use cityaq::config::ConfigError;
use cityaq::logging::LoggingError;
use cityaq::service::ServiceError;
use cityaq::tile::TileError;

#[derive(Debug)]
pub enum CliError {
    /// Bad or missing configuration.
    Config(String),

    /// Failed to create the Tokio runtime.
    Runtime(std::io::Error),

    Logging(LoggingError),

    /// A query against the service failed.
    Service(ServiceError),

    /// The tile server could not start or stopped with an error.
    Serve(TileError),

    /// The operation was interrupted with Ctrl+C.
    Interrupted,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Runtime(e) => write!(f, "Failed to create Tokio runtime: {}", e),
            CliError::Logging(e) => write!(f, "Failed to set up logging: {}", e),
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Serve(e) => write!(f, "Tile server error: {}", e),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Runtime(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Serve(e) => Some(e),
            CliError::Config(_) | CliError::Interrupted => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<TileError> for CliError {
    fn from(e: TileError) -> Self {
        CliError::Serve(e)
    }
}
