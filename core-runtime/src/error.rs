use bridge_traits::BridgeError;
use thiserror::Error;

/// Failures while assembling or wiring the engine's runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected configuration value or logging setup.
    #[error("Invalid offline configuration: {0}")]
    Config(String),

    /// A host capability the engine cannot run without was not supplied.
    #[error("Host did not provide {capability}: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("Runtime failure: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
