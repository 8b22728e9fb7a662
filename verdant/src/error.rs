use thiserror::Error;

/// Errors that abort an irrigation invocation. Weather lookups and
/// individual publishes never surface here, they degrade in place.
#[derive(Error, Debug)]
pub enum IrrigationError {
    /// The config file could not be located, read or deserialised.
    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),

    /// The config deserialised but describes something we cannot run.
    #[error("Config error: {0}")]
    Config(String),

    /// The broker never confirmed the session within the connect timeout.
    #[error("Broker {0} unavailable, valve sequence aborted")]
    BrokerUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IrrigationError>;
